//! flowplan — declarative workflow compiler.
//!
//! Lowers flows (named steps, navigation rules, loops, parallel loops) into
//! flat, numerically addressed execution plans for an external scheduler.

pub mod cli;
pub mod core;

pub use crate::core::compiler::compile;
pub use crate::core::error::CompileError;
pub use crate::core::resolver::SourceSet;
