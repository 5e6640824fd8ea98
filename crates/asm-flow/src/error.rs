//! Error types, severities, and source span tracking for diagnostics.

use std::fmt;

/// Identifies a source file registered with the assembler.
///
/// File ids are handed out in the order files are first opened and stay
/// stable across passes. Use [`AssemblyResult::file_name`](crate::AssemblyResult::file_name)
/// or [`Assembler::file_name`](crate::Assembler::file_name) to map an id back to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileId(pub u32);

/// Source location for diagnostics.
///
/// Lines inside replayed blocks (loop bodies, macro bodies) report the line
/// the text was originally written on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Span {
    /// File the location belongs to.
    pub file: FileId,
    /// 1-based line number.
    pub line: u32,
    /// 1-based column number (byte offset within line).
    pub col: u32,
}

impl Span {
    /// Create a new span.
    #[must_use]
    pub fn new(file: FileId, line: u32, col: u32) -> Self {
        Self { file, line, col }
    }

    /// A dummy span for generated/internal constructs.
    #[must_use]
    pub fn dummy() -> Self {
        Self::default()
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

/// How far an error unwinds.
///
/// * `Warning`: informational, never changes control flow.
/// * `Error`: the rest of the current statement is skipped.
/// * `Serious`: the current construct is abandoned; parsing resumes at the
///   next top-level statement of the current file.
/// * `Fatal`: the whole run stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Severity {
    /// Informational diagnostic.
    Warning,
    /// Recoverable syntax or semantic error.
    Error,
    /// Aborts the current construct.
    Serious,
    /// Aborts the assembly run.
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Serious => write!(f, "serious error"),
            Severity::Fatal => write!(f, "fatal error"),
        }
    }
}

/// Assembly error with source location and descriptive message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AsmError {
    /// Malformed statement, unknown keyword, garbage after a statement.
    Syntax {
        /// The syntax error message.
        msg: String,
        /// Source location of the syntax error.
        span: Span,
    },

    /// An expression that must be resolvable right now is not.
    UndefinedValue {
        /// Source location of the expression.
        span: Span,
    },

    /// A symbol received a second, different value without `!set`.
    SymbolRedefined {
        /// The symbol name.
        name: String,
        /// Source location of the offending assignment.
        span: Span,
    },

    /// A macro with the same name was already defined.
    MacroRedefined {
        /// The macro name.
        name: String,
        /// Source location of the second definition.
        span: Span,
        /// Source location of the first definition.
        first_span: Span,
    },

    /// A macro call named a macro that was never defined.
    UnknownMacro {
        /// The macro name.
        name: String,
        /// Source location of the call.
        span: Span,
    },

    /// A macro call passed the wrong number of arguments.
    MacroArity {
        /// The macro name.
        name: String,
        /// Number of declared parameters.
        expected: usize,
        /// Number of arguments given.
        found: usize,
        /// Source location of the call.
        span: Span,
    },

    /// An included source file could not be opened or read.
    CannotOpen {
        /// The file name as written (or resolved).
        path: String,
        /// The I/O error text.
        detail: String,
        /// Source location of the inclusion.
        span: Span,
    },

    /// Error raised by the source itself via `!error`.
    User {
        /// The user-supplied message.
        msg: String,
        /// Source location of the `!error` statement.
        span: Span,
    },

    /// Error that abandons the current construct (missing braces, `!serious`).
    Serious {
        /// The error message.
        msg: String,
        /// Source location of the error.
        span: Span,
    },

    /// Legacy `!for` loop with a negative count.
    NegativeLoopCount {
        /// The loop count that was given.
        count: i64,
        /// Source location of the loop header.
        span: Span,
    },

    /// Source inclusion nested deeper than the configured limit.
    TooDeeplyNested {
        /// The configured inclusion depth.
        limit: usize,
        /// Source location of the inclusion that overflowed.
        span: Span,
    },

    /// Internal invariant violated.
    Bug {
        /// What went wrong.
        what: String,
        /// Source location where the violation surfaced.
        span: Span,
    },

    /// A configurable resource limit was exceeded.
    ResourceLimitExceeded {
        /// Human-readable name of the resource (e.g. "loop iterations").
        resource: String,
        /// The configured limit that was exceeded.
        limit: usize,
    },

    /// Multiple errors collected during assembly.
    Multiple {
        /// The collected assembly errors.
        errors: Vec<AsmError>,
    },
}

impl AsmError {
    /// Shorthand for [`AsmError::Syntax`].
    pub(crate) fn syntax(msg: impl Into<String>, span: Span) -> Self {
        AsmError::Syntax {
            msg: msg.into(),
            span,
        }
    }

    /// Shorthand for [`AsmError::Serious`].
    pub(crate) fn serious(msg: impl Into<String>, span: Span) -> Self {
        AsmError::Serious {
            msg: msg.into(),
            span,
        }
    }

    /// How far this error unwinds.
    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            AsmError::Syntax { .. }
            | AsmError::UndefinedValue { .. }
            | AsmError::SymbolRedefined { .. }
            | AsmError::MacroRedefined { .. }
            | AsmError::UnknownMacro { .. }
            | AsmError::MacroArity { .. }
            | AsmError::CannotOpen { .. }
            | AsmError::User { .. } => Severity::Error,
            AsmError::Serious { .. } => Severity::Serious,
            AsmError::NegativeLoopCount { .. }
            | AsmError::TooDeeplyNested { .. }
            | AsmError::Bug { .. }
            | AsmError::ResourceLimitExceeded { .. } => Severity::Fatal,
            AsmError::Multiple { errors } => errors
                .iter()
                .map(AsmError::severity)
                .max()
                .unwrap_or(Severity::Error),
        }
    }

    /// Source location, if the error has one.
    #[must_use]
    pub fn span(&self) -> Option<Span> {
        match self {
            AsmError::Syntax { span, .. }
            | AsmError::UndefinedValue { span }
            | AsmError::SymbolRedefined { span, .. }
            | AsmError::MacroRedefined { span, .. }
            | AsmError::UnknownMacro { span, .. }
            | AsmError::MacroArity { span, .. }
            | AsmError::CannotOpen { span, .. }
            | AsmError::User { span, .. }
            | AsmError::Serious { span, .. }
            | AsmError::NegativeLoopCount { span, .. }
            | AsmError::TooDeeplyNested { span, .. }
            | AsmError::Bug { span, .. } => Some(*span),
            AsmError::ResourceLimitExceeded { .. } | AsmError::Multiple { .. } => None,
        }
    }

    /// Flatten into the list of individual errors.
    #[must_use]
    pub fn into_errors(self) -> Vec<AsmError> {
        match self {
            AsmError::Multiple { errors } => errors,
            other => vec![other],
        }
    }
}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AsmError::Syntax { msg, span } => write!(f, "{}: {}", span, msg),
            AsmError::UndefinedValue { span } => write!(f, "{}: value not defined", span),
            AsmError::SymbolRedefined { name, span } => {
                write!(f, "{}: symbol '{}' already defined", span, name)
            }
            AsmError::MacroRedefined {
                name,
                span,
                first_span,
            } => write!(
                f,
                "{}: macro '{}' already defined (first defined at {})",
                span, name, first_span
            ),
            AsmError::UnknownMacro { name, span } => {
                write!(f, "{}: macro '{}' not defined", span, name)
            }
            AsmError::MacroArity {
                name,
                expected,
                found,
                span,
            } => write!(
                f,
                "{}: macro '{}' takes {} argument(s), {} given",
                span, name, expected, found
            ),
            AsmError::CannotOpen { path, detail, span } => {
                write!(f, "{}: cannot open input file '{}': {}", span, path, detail)
            }
            AsmError::User { msg, span } => write!(f, "{}: {}", span, msg),
            AsmError::Serious { msg, span } => write!(f, "{}: {}", span, msg),
            AsmError::NegativeLoopCount { count, span } => {
                write!(f, "{}: loop count is negative ({})", span, count)
            }
            AsmError::TooDeeplyNested { limit, span } => write!(
                f,
                "{}: too deeply nested, recursive \"!source\"? (limit: {})",
                span, limit
            ),
            AsmError::Bug { what, span } => write!(f, "{}: internal error: {}", span, what),
            AsmError::ResourceLimitExceeded { resource, limit } => {
                write!(f, "resource limit exceeded: {} (limit: {})", resource, limit)
            }
            AsmError::Multiple { errors } => {
                for (i, e) in errors.iter().enumerate() {
                    if i > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}", e)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for AsmError {}

/// A reported message that did not stop assembly (warnings and advisories).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Diagnostic {
    /// Severity of the message.
    pub severity: Severity,
    /// The message text.
    pub message: String,
    /// Where the message was raised.
    pub span: Span,
}

impl Diagnostic {
    /// Create a warning diagnostic.
    #[must_use]
    pub fn warning(message: impl Into<String>, span: Span) -> Self {
        Self {
            severity: Severity::Warning,
            message: message.into(),
            span,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.span, self.severity, self.message)
    }
}
