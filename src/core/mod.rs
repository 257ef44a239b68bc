//! Compiler pipeline: source loading, resolution, lowering, assembly, output.

pub mod assembler;
pub mod codegen;
pub mod compiler;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod parser;
pub mod planner;
pub mod resolver;
pub mod state;
pub mod types;
