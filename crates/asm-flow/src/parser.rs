//! Statement loop, pseudo-op dispatch and the statements that are not flow
//! control: assignments, `!set`, user diagnostics and pass-through text.

use std::collections::HashMap;
use std::path::Path;

use crate::assembler::Assembler;
use crate::error::{AsmError, FileId, Severity, Span};
use crate::expr::{ExprEval, Value};
use crate::input::{is_name_char, is_statement_end, CHAR_EOB, CHAR_EOF, CHAR_SOB};

/// A statement handed on to later assembler stages, text as written
/// (comments stripped, trailing blanks trimmed).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Statement {
    /// Where the statement starts.
    pub span: Span,
    /// The statement text.
    pub text: String,
}

/// Pseudo-ops known to the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PseudoOp {
    /// `!do`
    Do,
    /// `!for`
    For,
    /// `!if`
    If,
    /// `!ifdef`
    IfDef,
    /// `!ifndef`
    IfNDef,
    /// `!macro`
    Macro,
    /// `!source` / `!src`
    Source,
    /// `!set`
    Set,
    /// `!warn`
    Warn,
    /// `!error`
    Error,
    /// `!serious`
    Serious,
}

/// What the statement loop does with the rest of the line after a handler
/// returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Eos {
    /// Only blanks may follow.
    EnsureEos,
    /// The handler already stands on a statement end.
    AtEosAnyway,
    /// Discard the rest of the statement.
    SkipRemainder,
    /// Parse the rest of the line as a further statement.
    ParseRemainder,
}

static STATEMENT_OPS: &[(&str, PseudoOp)] = &[
    ("set", PseudoOp::Set),
    ("warn", PseudoOp::Warn),
    ("error", PseudoOp::Error),
    ("serious", PseudoOp::Serious),
];

/// Install `set`, `warn`, `error` and `serious`.
pub(crate) fn register(table: &mut HashMap<&'static str, PseudoOp>) {
    table.extend(STATEMENT_OPS.iter().copied());
}

impl Assembler {
    /// Open `name` and parse it to end-of-file as a new file context.
    pub(crate) fn parse_file(
        &mut self,
        name: &Path,
        includer: Option<FileId>,
        span: Span,
    ) -> Result<(), AsmError> {
        let input = self.open_source(name, includer, span)?;
        tracing::debug!(file = %name.display(), pass = self.pass, "parsing file");
        self.with_input(input, Self::parse_file_body)
    }

    /// File-level statement loop. Serious errors are recorded here and
    /// parsing resumes at the next top-level statement.
    fn parse_file_body(&mut self) -> Result<(), AsmError> {
        loop {
            if let Err(err) = self.parse_until_eob_or_eof() {
                if err.severity() != Severity::Serious {
                    return Err(err);
                }
                self.record(err)?;
                self.input.resync();
            }
            match self.input.got() {
                CHAR_EOF => return Ok(()),
                CHAR_EOB => self.record(AsmError::syntax(
                    "Found '}' instead of end-of-file.",
                    self.input.span(),
                ))?,
                _ => {}
            }
        }
    }

    /// Parse statements until the current context reaches end-of-block or
    /// end-of-file. Afterwards the current byte is that marker.
    pub(crate) fn parse_until_eob_or_eof(&mut self) -> Result<(), AsmError> {
        loop {
            self.input.next_and_skip_space();
            if !is_statement_end(self.input.got()) {
                self.statement_or_recover()?;
            }
            if matches!(self.input.got(), CHAR_EOB | CHAR_EOF) {
                return Ok(());
            }
        }
    }

    fn statement_or_recover(&mut self) -> Result<(), AsmError> {
        match self.parse_statement() {
            Err(err) if err.severity() <= Severity::Error => {
                self.record(err)?;
                self.input.skip_remainder();
                Ok(())
            }
            other => other,
        }
    }

    fn parse_statement(&mut self) -> Result<(), AsmError> {
        match self.input.got() {
            b'!' => self.pseudo_op(),
            b'+' => self.macro_call(),
            CHAR_SOB => Err(AsmError::syntax("Unexpected block.", self.input.span())),
            _ => self.plain_statement(),
        }
    }

    fn pseudo_op(&mut self) -> Result<(), AsmError> {
        let span = self.input.span();
        self.input.next_byte();
        let keyword = self.input.read_keyword();
        if keyword.is_empty() {
            return Err(AsmError::syntax("Pseudo opcode expected.", span));
        }
        let Some(&op) = self.pseudo_ops.get(keyword.as_str()) else {
            return self.finish_statement(span, format!("!{keyword}").into_bytes());
        };
        match self.dispatch(op, span)? {
            Eos::EnsureEos => self.input.ensure_eos(),
            Eos::AtEosAnyway => Ok(()),
            Eos::SkipRemainder => {
                self.input.skip_remainder();
                Ok(())
            }
            Eos::ParseRemainder => {
                self.input.skip_space();
                if is_statement_end(self.input.got()) {
                    Ok(())
                } else {
                    self.parse_statement()
                }
            }
        }
    }

    fn dispatch(&mut self, op: PseudoOp, span: Span) -> Result<Eos, AsmError> {
        match op {
            PseudoOp::Do => self.po_do(span),
            PseudoOp::For => self.po_for(span),
            PseudoOp::If => self.po_if(span),
            PseudoOp::IfDef => self.po_ifdef(true),
            PseudoOp::IfNDef => self.po_ifdef(false),
            PseudoOp::Macro => self.po_macro(),
            PseudoOp::Source => self.po_source(span),
            PseudoOp::Set => self.po_set(),
            PseudoOp::Warn => {
                let msg = self.user_message()?;
                self.warn(msg, span);
                Ok(Eos::EnsureEos)
            }
            PseudoOp::Error => {
                let msg = self.user_message()?;
                self.input.ensure_eos()?;
                Err(AsmError::User { msg, span })
            }
            PseudoOp::Serious => {
                let msg = self.user_message()?;
                self.input.ensure_eos()?;
                Err(AsmError::serious(msg, span))
            }
        }
    }

    /// `NAME = EXPR`, or anything else recorded as a [`Statement`].
    fn plain_statement(&mut self) -> Result<(), AsmError> {
        let span = self.input.span();
        let got = self.input.got();
        let mut text = Vec::new();
        if got == b'.' || (is_name_char(got) && !got.is_ascii_digit()) {
            let name = self.input.read_symbol_name()?;
            let mut gap = 0;
            while self.input.got() == b' ' {
                gap += 1;
                self.input.next_byte();
            }
            if self.input.got() == b'=' {
                self.input.next_byte();
                self.assign(&name, false, span)?;
                return self.input.ensure_eos();
            }
            text.extend_from_slice(name.as_bytes());
            text.resize(text.len() + gap, b' ');
        }
        self.finish_statement(span, text)
    }

    fn finish_statement(&mut self, span: Span, mut text: Vec<u8>) -> Result<(), AsmError> {
        while !is_statement_end(self.input.got()) {
            if self.input.got() == CHAR_SOB {
                return Err(AsmError::syntax("Unexpected block.", self.input.span()));
            }
            text.push(self.input.got());
            self.input.next_byte();
        }
        while text.last() == Some(&b' ') {
            text.pop();
        }
        let text = String::from_utf8_lossy(&text).into_owned();
        tracing::trace!(line = span.line, %text, "statement");
        self.statements.push(Statement { span, text });
        Ok(())
    }

    /// `!set NAME = EXPR`
    fn po_set(&mut self) -> Result<Eos, AsmError> {
        self.input.skip_space();
        let span = self.input.span();
        let name = self.input.read_symbol_name()?;
        self.input.skip_space();
        if self.input.got() != b'=' {
            return Err(AsmError::syntax("'=' expected.", self.input.span()));
        }
        self.input.next_byte();
        self.assign(&name, true, span)?;
        Ok(Eos::EnsureEos)
    }

    fn assign(&mut self, name: &str, change_allowed: bool, span: Span) -> Result<(), AsmError> {
        let value = self.eval()?;
        if !value.defined {
            if self.report_undefined {
                return Err(AsmError::UndefinedValue { span });
            }
            self.unresolved += 1;
            if change_allowed {
                self.symbols.unset(self.zone, name);
            }
            return Ok(());
        }
        if self
            .symbols
            .set(self.zone, name, value.val, change_allowed)
            .is_redefined()
        {
            return Err(AsmError::SymbolRedefined {
                name: name.to_owned(),
                span,
            });
        }
        Ok(())
    }

    /// Items of `!warn`, `!error` and `!serious`: quoted strings or
    /// expressions, comma separated.
    fn user_message(&mut self) -> Result<String, AsmError> {
        let mut msg = String::new();
        loop {
            self.input.skip_space();
            if self.input.got() == b'"' {
                msg.push_str(&self.input.read_string()?);
            } else {
                let value = self.eval()?;
                if value.defined {
                    msg.push_str(&value.val.to_string());
                } else {
                    msg.push('?');
                }
            }
            if !self.input.accept_comma() {
                return Ok(msg);
            }
        }
    }

    // === expressions ===

    /// Evaluate an expression at the current position.
    pub(crate) fn eval(&mut self) -> Result<Value, AsmError> {
        ExprEval::new(&mut self.input, &mut self.symbols, self.zone, self.pass == 0).eval()
    }

    /// Evaluate an expression that must be resolvable now.
    pub(crate) fn defined_int(&mut self) -> Result<i64, AsmError> {
        self.input.skip_space();
        let span = self.input.span();
        let value = self.eval()?;
        if value.defined {
            Ok(value.val)
        } else {
            Err(AsmError::UndefinedValue { span })
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{assemble_str, AsmError, Severity};

    // === statements ===

    #[test]
    fn statements_keep_text() {
        let result = assemble_str("  lda #$01 ; load\n\tsta $d020:rts\n").unwrap();
        assert_eq!(result.texts(), ["lda #$01", "sta $d020", "rts"]);
        assert_eq!(result.statements()[1].span.line, 2);
    }

    #[test]
    fn unknown_pseudo_op_passes_through() {
        let result = assemble_str("!byte 1, 2\n").unwrap();
        assert_eq!(result.texts(), ["!byte 1, 2"]);
    }

    #[test]
    fn quoted_text_keeps_separators() {
        let result = assemble_str("!text \"a:b;c\" ; real comment\n").unwrap();
        assert_eq!(result.texts(), ["!text \"a:b;c\""]);
    }

    #[test]
    fn block_inside_statement_is_error() {
        let err = assemble_str("lda { x }\n").unwrap_err();
        assert!(matches!(err, AsmError::Syntax { ref msg, .. } if msg == "Unexpected block."));
    }

    #[test]
    fn bare_bang_is_error() {
        assert!(matches!(assemble_str("! x\n"), Err(AsmError::Syntax { .. })));
    }

    // === assignments ===

    #[test]
    fn assignment_and_redefinition() {
        let result = assemble_str("x = 3\nx = 3\n").unwrap();
        assert_eq!(result.symbol("x"), Some(3));
        let err = assemble_str("x = 3\nx = 4\n").unwrap_err();
        assert!(matches!(err, AsmError::SymbolRedefined { ref name, .. } if name == "x"));
    }

    #[test]
    fn set_allows_change() {
        let result = assemble_str("!set x = 3\n!set x = x + 1\n").unwrap();
        assert_eq!(result.symbol("x"), Some(4));
    }

    #[test]
    fn set_requires_equals() {
        assert!(matches!(
            assemble_str("!set x 3\n"),
            Err(AsmError::Syntax { .. })
        ));
    }

    #[test]
    fn assignment_garbage() {
        let err = assemble_str("x = 1 2\n").unwrap_err();
        assert!(matches!(err, AsmError::Syntax { ref msg, .. } if msg.starts_with("Garbage")));
    }

    // === user diagnostics ===

    #[test]
    fn warn_is_a_diagnostic() {
        let result = assemble_str("n = 7\n!warn \"n is \", n, \"/\", later\n").unwrap();
        let diags = result.diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].severity, Severity::Warning);
        assert_eq!(diags[0].message, "n is 7/?");
        assert_eq!(diags[0].span.line, 2);
    }

    #[test]
    fn user_error_and_serious() {
        let err = assemble_str("!error \"bad \", 1 + 1\nnop\n").unwrap_err();
        assert!(matches!(err, AsmError::User { ref msg, .. } if msg == "bad 2"));

        let err = assemble_str("!serious \"stop\"\n").unwrap_err();
        assert_eq!(err.severity(), Severity::Serious);
    }

    #[test]
    fn errors_do_not_stop_the_pass() {
        let errors = assemble_str("!error 1\n!error 2\n").unwrap_err().into_errors();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[1].span().map(|s| s.line), Some(2));
    }

    #[test]
    fn stray_brace_at_file_level() {
        let errors = assemble_str("nop\n}\nrts\n").unwrap_err().into_errors();
        assert_eq!(errors.len(), 1);
        assert!(matches!(
            &errors[0],
            AsmError::Syntax { msg, span } if msg == "Found '}' instead of end-of-file." && span.line == 2
        ));
    }
}
