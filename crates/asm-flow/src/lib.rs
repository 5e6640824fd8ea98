//! # asm-flow: Flow Control for a Multi-Pass Cross-Assembler
//!
//! `asm-flow` decides *which* source text reaches the rest of an assembler
//! and *how many times*: conditional assembly, counted and conditioned
//! loops, macro capture and calls, and nested source inclusion, all driven
//! by a multi-pass model in which forward references resolve on later passes.
//!
//! ## Quick Start
//!
//! ```rust
//! use asm_flow::assemble_str;
//!
//! let result = assemble_str("!for i, 1, 3 {\n  !if i != 2 { lda #i }\n}\n").unwrap();
//! assert_eq!(result.texts(), ["lda #i", "lda #i"]);
//! ```
//!
//! ## Pseudo-ops
//!
//! - `!if EXPR { } [else { }]`, `!ifdef NAME`, `!ifndef NAME`
//! - `!for VAR, START, END { }` (and the legacy `!for VAR, END { }`)
//! - `!do [until|while EXPR] { } [until|while EXPR]`
//! - `!macro NAME [PARAM, ...] { }` and calls as `+NAME [ARG, ...]`
//! - `!source "FILE"` / `!src "FILE"`
//! - `!set NAME = EXPR`, `!warn`, `!error`, `!serious`
//!
//! Every other statement is passed through as a [`Statement`].

#![forbid(unsafe_code)]
#![allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_lossless,
    clippy::cast_possible_wrap,
    clippy::match_same_arms,
    clippy::must_use_candidate,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args,
    clippy::doc_markdown,
    clippy::manual_let_else,
    clippy::return_self_not_must_use,
    clippy::missing_errors_doc
)]

/// Public assembler API: builder, pass driver, `AssemblyResult`.
pub mod assembler;
/// Error types, severities and source spans.
pub mod error;
/// Integer expression evaluator.
pub mod expr;
/// Flow-control pseudo-ops: loops, conditionals, macro gate, inclusion.
pub mod flow;
/// Input contexts, tokenizer primitives and block capture.
pub mod input;
/// Source loaders.
pub mod loader;
/// Macro table and macro calls.
pub mod macros;
/// Statement loop and pseudo-op dispatch.
pub mod parser;
/// Zoned symbol table.
pub mod symbols;

// Re-exports
pub use assembler::{Assembler, AssemblyResult, ForSyntax, Options, ResourceLimits};
pub use error::{AsmError, Diagnostic, FileId, Severity, Span};
pub use expr::Value;
pub use input::{Block, Input};
pub use loader::{FsLoader, MemoryLoader, SourceLoader};
pub use macros::{MacroDef, MacroTable};
pub use parser::{PseudoOp, Statement};
pub use symbols::{SetResult, Symbol, SymbolTable, Zone};

/// Name under which [`assemble_str`] registers its source.
pub const INPUT_NAME: &str = "<input>";

/// Assemble a source string with default limits and options.
///
/// The text is served from memory as [`INPUT_NAME`]; `!source` cannot reach
/// the file system from here.
///
/// # Errors
///
/// Returns [`AsmError`] if any pass records errors or a fatal error stops
/// the run.
///
/// # Examples
///
/// ```rust
/// let result = asm_flow::assemble_str("x = 2\n!if x = 2 { ok } else { bad }\n")?;
/// assert_eq!(result.texts(), ["ok"]);
/// # Ok::<(), asm_flow::AsmError>(())
/// ```
pub fn assemble_str(source: &str) -> Result<AssemblyResult, AsmError> {
    let mut asm = Assembler::new();
    asm.with_loader(MemoryLoader::new().file(INPUT_NAME, source));
    asm.assemble_file(INPUT_NAME)
}
