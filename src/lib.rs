//! Interpreter for the VG scripting language: lexing, parsing, a
//! tree-walking evaluator with classes, structs, enums and libraries, and
//! REPL utilities.

pub mod ast;
mod classes;
pub mod diagnostics;
pub mod hook;
pub mod imports;
pub mod lexer;
pub mod module;
pub mod object;
pub mod output;
pub mod parser;
pub mod repl;
pub mod runtime;
pub mod scope;
pub mod stdlib;
pub mod value;

pub use diagnostics::{Diagnostic, DiagnosticKind, SourceSpan, VgError};
pub use hook::{ExecutionHook, HookChain, HookControl, HookEvent, HookEventKind, StepBudget, TracingHook};
pub use output::Output;
pub use repl::Repl;
pub use runtime::{ExecutionContext, Interpreter, DEFAULT_MAX_CALL_DEPTH};
pub use value::Value;
