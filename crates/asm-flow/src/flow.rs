//! Flow-control pseudo-ops: `!do`, `!for`, `!if`, `!ifdef`, `!ifndef`,
//! `!macro` and `!source`/`!src`.
//!
//! All handlers are re-entrant. Loops capture their body once and replay it
//! through a fresh memory context per iteration; conditionals parse the
//! chosen branch in place and skip the other one.

use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;

use crate::assembler::{Assembler, ForSyntax};
use crate::error::{AsmError, FileId, Span};
use crate::input::{is_statement_end, Block, Input, CHAR_EOB, CHAR_EOS, CHAR_SOB};
use crate::parser::{Eos, PseudoOp};

static FLOW_OPS: &[(&str, PseudoOp)] = &[
    ("do", PseudoOp::Do),
    ("for", PseudoOp::For),
    ("if", PseudoOp::If),
    ("ifdef", PseudoOp::IfDef),
    ("ifndef", PseudoOp::IfNDef),
    ("macro", PseudoOp::Macro),
    ("source", PseudoOp::Source),
    ("src", PseudoOp::Source),
];

/// Loop condition keywords and whether they invert the expression.
static CONDITION_KEYWORDS: &[(&str, bool)] = &[("until", true), ("while", false)];

/// Install the flow-control pseudo-ops.
pub fn register(table: &mut HashMap<&'static str, PseudoOp>) {
    table.extend(FLOW_OPS.iter().copied());
}

/// A stored `until`/`while` clause, re-evaluated on every check.
#[derive(Debug, Clone)]
struct Condition {
    file: FileId,
    line: u32,
    invert: bool,
    /// `None`: no clause given, always true.
    body: Option<Rc<[u8]>>,
}

fn left_brace_expected(span: Span) -> AsmError {
    AsmError::serious("Left brace expected.", span)
}

impl Assembler {
    // === block helpers ===

    /// Capture the block at the current byte and keep its text.
    fn store_block(&mut self) -> Result<Block, AsmError> {
        let span = self.input.span();
        self.input
            .capture_block(true)?
            .ok_or_else(|| AsmError::Bug {
                what: String::from("stored block capture returned no text"),
                span,
            })
    }

    /// Parse a captured block through a fresh memory context.
    pub(crate) fn parse_ram_block(&mut self, block: &Block) -> Result<(), AsmError> {
        self.with_input(Input::replay(block), |asm| {
            asm.parse_until_eob_or_eof()?;
            if asm.input.got() != CHAR_EOB {
                return Err(AsmError::Bug {
                    what: String::from("illegal block terminator"),
                    span: asm.input.span(),
                });
            }
            Ok(())
        })
    }

    /// Parse the block at the current byte in place, or skip it.
    /// Afterwards the current byte is the block's closing brace.
    fn skip_or_parse_block(&mut self, parse: bool) -> Result<(), AsmError> {
        if !parse {
            self.input.capture_block(false)?;
            return Ok(());
        }
        self.input.enter_block();
        self.parse_until_eob_or_eof()?;
        if self.input.got() != CHAR_EOB || self.input.is_exhausted() {
            return Err(AsmError::serious("Right brace expected.", self.input.span()));
        }
        self.input.leave_block();
        Ok(())
    }

    /// `{ A } [else { B }]`, parsing A if `parse_first`, B otherwise.
    fn parse_block_else_block(&mut self, parse_first: bool) -> Result<(), AsmError> {
        self.skip_or_parse_block(parse_first)?;
        self.input.next_and_skip_space();
        if is_statement_end(self.input.got()) {
            return Ok(());
        }
        let span = self.input.span();
        if self.input.read_keyword() != "else" {
            return Err(AsmError::syntax(
                "Expected \"else\" or end of statement.",
                span,
            ));
        }
        self.input.skip_space();
        if self.input.got() != CHAR_SOB {
            return Err(left_brace_expected(self.input.span()));
        }
        self.skip_or_parse_block(!parse_first)?;
        self.input.next_byte();
        Ok(())
    }

    // === loop conditions ===

    fn store_condition(&mut self, terminator: u8) -> Result<Condition, AsmError> {
        let mut condition = Condition {
            file: self.input.file_id(),
            line: self.input.line(),
            invert: false,
            body: None,
        };
        let got = self.input.got();
        if got == terminator || (terminator == CHAR_EOS && is_statement_end(got)) {
            return Ok(condition);
        }
        let span = self.input.span();
        let keyword = self.input.read_keyword();
        let Some(&(_, invert)) = CONDITION_KEYWORDS.iter().find(|(k, _)| *k == keyword) else {
            return Err(AsmError::syntax(
                "Expected \"until\" or \"while\".",
                span,
            ));
        };
        self.input.skip_space();
        condition.invert = invert;
        condition.body = Some(Rc::from(self.input.until_terminator(terminator)));
        Ok(condition)
    }

    fn check_condition(&mut self, condition: &Condition) -> Result<bool, AsmError> {
        let Some(body) = &condition.body else {
            return Ok(true);
        };
        let input = Input::expression(condition.file, condition.line, Rc::clone(body));
        let value = self.with_input(input, |asm| {
            asm.input.next_byte();
            let value = asm.defined_int()?;
            asm.input.skip_space();
            if asm.input.got() != CHAR_EOS {
                return Err(AsmError::serious(
                    "Garbage data at end of loop condition.",
                    asm.input.span(),
                ));
            }
            Ok(value)
        })?;
        Ok(if condition.invert {
            value == 0
        } else {
            value != 0
        })
    }

    fn run_iteration(&mut self, body: &Block) -> Result<(), AsmError> {
        self.count_iteration()?;
        tracing::trace!(line = body.line(), "loop iteration");
        self.parse_ram_block(body)
    }

    // === !do ===

    /// `!do [COND] { BLOCK } [COND]`
    pub(crate) fn po_do(&mut self, span: Span) -> Result<Eos, AsmError> {
        self.input.skip_space();
        let head = self.store_condition(CHAR_SOB)?;
        if self.input.got() != CHAR_SOB {
            return Err(left_brace_expected(span));
        }
        let body = self.store_block()?;
        self.input.next_and_skip_space();
        let tail = self.store_condition(CHAR_EOS)?;
        if !is_statement_end(self.input.got()) {
            return Err(AsmError::serious(
                "Garbage data at end of loop condition.",
                self.input.span(),
            ));
        }
        while self.check_condition(&head)? {
            self.run_iteration(&body)?;
            if !self.check_condition(&tail)? {
                break;
            }
        }
        Ok(Eos::AtEosAnyway)
    }

    // === !for ===

    /// `!for VAR, END { BLOCK }` or `!for VAR, START, END { BLOCK }`
    pub(crate) fn po_for(&mut self, span: Span) -> Result<Eos, AsmError> {
        let name = self.input.read_symbol_name()?;
        if !self.input.accept_comma() {
            return Err(AsmError::syntax("Comma expected.", self.input.span()));
        }
        let first = self.defined_int()?;
        let (syntax, start, end) = if self.input.accept_comma() {
            (ForSyntax::Current, first, self.defined_int()?)
        } else {
            if first < 0 {
                return Err(AsmError::NegativeLoopCount { count: first, span });
            }
            (ForSyntax::Legacy, 0, first)
        };
        if syntax != self.options.for_syntax {
            self.advise(
                match syntax {
                    ForSyntax::Legacy => "Found old \"!for\" syntax.",
                    ForSyntax::Current => "Found new \"!for\" syntax.",
                },
                span,
            );
        }
        self.input.skip_space();
        if self.input.got() != CHAR_SOB {
            return Err(left_brace_expected(self.input.span()));
        }
        let body = self.store_block()?;
        self.input.next_byte();

        let mut counter = start;
        self.set_counter(&name, counter);
        match syntax {
            ForSyntax::Legacy => {
                while counter < end {
                    counter += 1;
                    self.set_counter(&name, counter);
                    self.run_iteration(&body)?;
                }
            }
            ForSyntax::Current => {
                let step = if end < start { -1 } else { 1 };
                loop {
                    self.run_iteration(&body)?;
                    counter = counter.wrapping_add(step);
                    self.set_counter(&name, counter);
                    if counter == end.wrapping_add(step) {
                        break;
                    }
                }
            }
        }
        Ok(Eos::EnsureEos)
    }

    fn set_counter(&mut self, name: &str, value: i64) {
        let result = self.symbols.set(self.zone, name, value, true);
        debug_assert!(!result.is_redefined());
    }

    // === !if / !ifdef / !ifndef ===

    /// `!if EXPR { A } [else { B }]`
    pub(crate) fn po_if(&mut self, span: Span) -> Result<Eos, AsmError> {
        let value = self.defined_int()?;
        self.input.skip_space();
        if self.input.got() != CHAR_SOB {
            return Err(left_brace_expected(span));
        }
        self.parse_block_else_block(value != 0)?;
        Ok(Eos::EnsureEos)
    }

    /// `!ifdef NAME ...` (`want_defined`) and `!ifndef NAME ...`
    pub(crate) fn po_ifdef(&mut self, want_defined: bool) -> Result<Eos, AsmError> {
        let name = self.input.read_symbol_name()?;
        let zone = self.zone;
        if self.pass == 0 {
            if let Some(sym) = self.symbols.get_mut(zone, &name) {
                sym.usage += 1;
            }
        }
        let parse = self.symbols.is_defined(zone, &name) == want_defined;
        self.input.skip_space();
        if self.input.got() != CHAR_SOB {
            return Ok(if parse {
                Eos::ParseRemainder
            } else {
                Eos::SkipRemainder
            });
        }
        self.parse_block_else_block(parse)?;
        Ok(Eos::EnsureEos)
    }

    // === !macro ===

    /// Definition on the first pass, verbatim skip on later ones.
    pub(crate) fn po_macro(&mut self) -> Result<Eos, AsmError> {
        if self.pass == 0 {
            self.define_macro()?;
            return Ok(Eos::EnsureEos);
        }
        while self.input.got() != CHAR_SOB {
            if is_statement_end(self.input.got()) {
                return Err(left_brace_expected(self.input.span()));
            }
            self.input.next_byte();
        }
        self.input.capture_block(false)?;
        self.input.next_byte();
        Ok(Eos::EnsureEos)
    }

    // === !source ===

    /// `!source "FILE"` / `!src "FILE"`
    pub(crate) fn po_source(&mut self, span: Span) -> Result<Eos, AsmError> {
        let Some(left) = self.sources_left.checked_sub(1) else {
            return Err(AsmError::TooDeeplyNested {
                limit: self.source_depth_limit(),
                span,
            });
        };
        self.sources_left = left;
        let result = self.include_file(span);
        self.sources_left += 1;
        result?;
        Ok(Eos::EnsureEos)
    }

    fn include_file(&mut self, span: Span) -> Result<(), AsmError> {
        let name = self.input.read_filename()?;
        tracing::debug!(file = %name, left = self.sources_left, "including source");
        let includer = self.input.file_id();
        self.parse_file(Path::new(&name), Some(includer), span)
    }
}
