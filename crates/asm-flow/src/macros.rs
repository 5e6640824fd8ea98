//! Macro definitions and calls.
//!
//! A definition captures the body once, on the first pass. A call binds the
//! arguments to the parameter names in a fresh zone and replays the body
//! from the line it was written on.

use std::collections::BTreeMap;
use std::rc::Rc;

use crate::assembler::Assembler;
use crate::error::{AsmError, Span};
use crate::input::{is_statement_end, Block, CHAR_SOB};

/// A recorded `!macro`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDef {
    /// Macro name as written.
    pub name: String,
    /// Parameter names in order.
    pub params: Vec<String>,
    /// Captured body.
    pub body: Block,
    /// Location of the definition.
    pub span: Span,
}

/// Macros by name. Definitions survive across passes.
#[derive(Debug, Clone, Default)]
pub struct MacroTable {
    defs: BTreeMap<String, Rc<MacroDef>>,
}

impl MacroTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look a macro up.
    pub fn get(&self, name: &str) -> Option<&Rc<MacroDef>> {
        self.defs.get(name)
    }

    /// Register a definition. On a name clash the table is unchanged and
    /// the first definition's location is returned.
    pub fn define(&mut self, def: MacroDef) -> Result<(), Span> {
        if let Some(first) = self.defs.get(&def.name) {
            return Err(first.span);
        }
        self.defs.insert(def.name.clone(), Rc::new(def));
        Ok(())
    }

    /// Number of macros.
    pub fn len(&self) -> usize {
        self.defs.len()
    }

    /// Whether no macro is defined.
    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

impl Assembler {
    /// `NAME [PARAM[, PARAM...]] { BODY }` after `!macro`. Afterwards the
    /// current byte follows the closing brace.
    pub(crate) fn define_macro(&mut self) -> Result<(), AsmError> {
        self.input.skip_space();
        let span = self.input.span();
        let name = self.input.read_symbol_name()?;
        let mut params: Vec<String> = Vec::new();
        self.input.skip_space();
        if self.input.got() != CHAR_SOB && !is_statement_end(self.input.got()) {
            loop {
                self.input.skip_space();
                let param_span = self.input.span();
                let param = self.input.read_symbol_name()?;
                if params.contains(&param) {
                    return Err(AsmError::syntax(
                        "Macro parameter name used twice.",
                        param_span,
                    ));
                }
                params.push(param);
                if !self.input.accept_comma() {
                    break;
                }
            }
            self.input.skip_space();
        }
        if self.input.got() != CHAR_SOB {
            return Err(AsmError::serious("Left brace expected.", self.input.span()));
        }
        let body = self.input.capture_block(true)?.ok_or_else(|| AsmError::Bug {
            what: String::from("stored block capture returned no text"),
            span,
        })?;
        self.input.next_byte();
        tracing::debug!(
            %name,
            params = params.len(),
            file = body.file().0,
            bytes = body.text().len(),
            line = span.line,
            "macro defined"
        );
        self.macros
            .define(MacroDef {
                name: name.clone(),
                params,
                body,
                span,
            })
            .map_err(|first_span| AsmError::MacroRedefined {
                name,
                span,
                first_span,
            })
    }

    /// `+NAME [ARG[, ARG...]]`
    pub(crate) fn macro_call(&mut self) -> Result<(), AsmError> {
        let span = self.input.span();
        self.input.next_byte();
        let name = self.input.read_symbol_name()?;
        let mut args = Vec::new();
        self.input.skip_space();
        if !is_statement_end(self.input.got()) {
            loop {
                args.push(self.eval()?);
                if !self.input.accept_comma() {
                    break;
                }
            }
        }
        self.input.ensure_eos()?;

        let def = self
            .macros
            .get(&name)
            .cloned()
            .ok_or_else(|| AsmError::UnknownMacro {
                name: name.clone(),
                span,
            })?;
        if def.params.len() != args.len() {
            return Err(AsmError::MacroArity {
                name,
                expected: def.params.len(),
                found: args.len(),
                span,
            });
        }

        self.enter_macro()?;
        let zone = self.new_zone();
        tracing::trace!(%name, ?zone, "macro call");
        let result = self.with_zone(zone, |asm| {
            for (param, arg) in def.params.iter().zip(&args) {
                if arg.defined {
                    let stored = asm.symbols.set(zone, param, arg.val, true);
                    debug_assert!(!stored.is_redefined());
                } else {
                    asm.symbols.unset(zone, param);
                }
            }
            asm.parse_ram_block(&def.body)
        });
        self.leave_macro();
        result
    }
}
