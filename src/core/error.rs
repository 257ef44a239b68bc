//! Compile-time error taxonomy.
//!
//! Every variant aborts the compilation that raised it; no partial artifact is
//! ever returned.

use crate::core::types::StepId;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("step '{step}' in flow '{flow}' references unknown executable '{reference}'")]
    UnresolvedReference {
        flow: String,
        step: String,
        reference: String,
    },

    #[error(
        "step '{step}' in flow '{flow}' navigates result '{result}' to '{target}', \
         which is neither a step nor a declared result"
    )]
    UnresolvedNavigation {
        flow: String,
        step: String,
        result: String,
        target: String,
    },

    #[error("step '{step}' in flow '{flow}' has an invalid loop configuration: {reason}")]
    InvalidLoopConfiguration {
        flow: String,
        step: String,
        reason: String,
    },

    #[error("plan '{plan}' step {step_id} references '{reference}', which has no compiled plan")]
    IncompleteDependencyClosure {
        plan: String,
        step_id: StepId,
        reference: String,
    },

    #[error("dependency plan '{name}' was produced more than once")]
    DuplicateDependency { name: String },

    #[error("executable '{name}' is defined by more than one source")]
    DuplicateExecutable { name: String },

    #[error("{origin}: {}", problems.join("; "))]
    InvalidSource {
        origin: String,
        problems: Vec<String>,
    },

    #[error("{origin}: {message}")]
    Source { origin: String, message: String },
}

impl CompileError {
    pub(crate) fn invalid_source(origin: impl Into<String>, problem: impl Into<String>) -> Self {
        Self::InvalidSource {
            origin: origin.into(),
            problems: vec![problem.into()],
        }
    }
}
