//! Public assembler API: configuration, the pass driver and the result.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AsmError, Diagnostic, FileId, Span};
use crate::flow;
use crate::input::Input;
use crate::loader::{FsLoader, SourceLoader};
use crate::macros::MacroTable;
use crate::parser::{self, PseudoOp, Statement};
use crate::symbols::{SymbolTable, Zone};

/// The result of a successful assembly run.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[must_use]
pub struct AssemblyResult {
    statements: Vec<Statement>,
    diagnostics: Vec<Diagnostic>,
    passes: u32,
    symbols: Vec<(String, i64)>,
    files: Vec<PathBuf>,
}

impl AssemblyResult {
    /// Statements that reached the final pass, in parse order.
    ///
    /// # Examples
    ///
    /// ```
    /// let result = asm_flow::assemble_str("!for i, 1, 2 { nop }\n")?;
    /// assert_eq!(result.statements().len(), 2);
    /// assert_eq!(result.statements()[0].text, "nop");
    /// # Ok::<(), asm_flow::AsmError>(())
    /// ```
    #[must_use]
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Statement texts only.
    #[must_use]
    pub fn texts(&self) -> Vec<&str> {
        self.statements.iter().map(|s| s.text.as_str()).collect()
    }

    /// First-pass advisories followed by final-pass warnings.
    #[must_use]
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Number of passes run.
    #[must_use]
    pub fn passes(&self) -> u32 {
        self.passes
    }

    /// Defined global symbols in name order.
    #[must_use]
    pub fn symbols(&self) -> &[(String, i64)] {
        &self.symbols
    }

    /// Value of a defined global symbol.
    ///
    /// # Examples
    ///
    /// ```
    /// let result = asm_flow::assemble_str("!for i, 0, 9 { }\n")?;
    /// assert_eq!(result.symbol("i"), Some(10));
    /// # Ok::<(), asm_flow::AsmError>(())
    /// ```
    #[must_use]
    pub fn symbol(&self, name: &str) -> Option<i64> {
        self.symbols
            .binary_search_by(|(n, _)| n.as_str().cmp(name))
            .ok()
            .map(|i| self.symbols[i].1)
    }

    /// Path of a file that took part in the run.
    #[must_use]
    pub fn file_name(&self, file: FileId) -> Option<&Path> {
        self.files.get(file.0 as usize).map(PathBuf::as_path)
    }

    /// Render the statements as a text listing, one per line, prefixed with
    /// their file and line.
    ///
    /// ```text
    /// main.a:3     lda #0
    /// main.a:3     lda #1
    /// ```
    #[must_use]
    pub fn listing(&self) -> String {
        use std::fmt::Write;

        let mut out = String::new();
        for stmt in &self.statements {
            let file = self
                .file_name(stmt.span.file)
                .map_or_else(|| String::from("?"), |p| p.display().to_string());
            let _ = writeln!(out, "{}:{:<5} {}", file, stmt.span.line, stmt.text);
        }
        out
    }
}

/// Configurable resource limits.
///
/// All limits default to values no reasonable source comes near. A limit
/// that is hit ends the run with [`AsmError::ResourceLimitExceeded`], except
/// the inclusion depth, which reports [`AsmError::TooDeeplyNested`].
///
/// # Examples
///
/// ```rust
/// use asm_flow::{Assembler, ResourceLimits};
///
/// let mut asm = Assembler::new();
/// asm.limits(ResourceLimits {
///     max_source_depth: 8,
///     max_macro_depth: 16,
///     max_iterations: 10_000,
///     max_errors: 16,
///     max_passes: 4,
/// });
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ResourceLimits {
    /// Maximum `!source` nesting depth. Default: 64.
    pub max_source_depth: usize,
    /// Maximum macro call nesting depth. Default: 64.
    pub max_macro_depth: usize,
    /// Maximum loop body executions per pass. Default: 1,000,000.
    pub max_iterations: usize,
    /// Recorded errors allowed per pass; one more is fatal. Default: 64.
    pub max_errors: usize,
    /// Maximum resolution passes, the final reporting pass not counted.
    /// Values below 2 act as 2. Default: 16.
    pub max_passes: u32,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            max_source_depth: 64,
            max_macro_depth: 64,
            max_iterations: 1_000_000,
            max_errors: 64,
            max_passes: 16,
        }
    }
}

/// The two `!for` grammars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ForSyntax {
    /// `!for VAR, END { }`: counts 1..=END.
    Legacy,
    /// `!for VAR, START, END { }`: counts START..=END in either direction.
    #[default]
    Current,
}

/// Source dialect options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Options {
    /// Preferred `!for` grammar. Using the other one produces a first-pass
    /// warning.
    pub for_syntax: ForSyntax,
}

/// Builder-pattern assembler.
///
/// # Examples
///
/// ```rust
/// use asm_flow::{Assembler, MemoryLoader};
///
/// let loader = MemoryLoader::new()
///     .file("main.a", "!source \"defs.a\"\n!if WIDTH > 32 { wide }\n")
///     .file("defs.a", "WIDTH = 40\n");
/// let mut asm = Assembler::new();
/// asm.with_loader(loader);
/// let result = asm.assemble_file("main.a").unwrap();
/// assert_eq!(result.texts(), ["wide"]);
/// ```
#[derive(Debug)]
pub struct Assembler {
    limits: ResourceLimits,
    pub(crate) options: Options,
    loader: Box<dyn SourceLoader>,
    predefined: Vec<(String, i64)>,
    files: Vec<PathBuf>,
    pub(crate) symbols: SymbolTable,
    pub(crate) macros: MacroTable,
    pub(crate) pseudo_ops: HashMap<&'static str, PseudoOp>,
    /// The active input context.
    pub(crate) input: Input,
    pub(crate) pass: u32,
    pub(crate) zone: Zone,
    zone_counter: u32,
    /// Remaining `!source` nesting budget.
    pub(crate) sources_left: usize,
    pub(crate) macro_depth: usize,
    iterations: usize,
    /// Undefined assignment results seen in the current pass.
    pub(crate) unresolved: usize,
    /// Set on the final reporting pass: undefined results become errors.
    pub(crate) report_undefined: bool,
    pub(crate) statements: Vec<Statement>,
    warnings: Vec<Diagnostic>,
    advisories: Vec<Diagnostic>,
    errors: Vec<AsmError>,
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

impl Assembler {
    /// Create an assembler reading from the file system.
    pub fn new() -> Self {
        let mut pseudo_ops = HashMap::new();
        flow::register(&mut pseudo_ops);
        parser::register(&mut pseudo_ops);
        Self {
            limits: ResourceLimits::default(),
            options: Options::default(),
            loader: Box::new(FsLoader::new()),
            predefined: Vec::new(),
            files: Vec::new(),
            symbols: SymbolTable::new(),
            macros: MacroTable::new(),
            pseudo_ops,
            input: Input::default(),
            pass: 0,
            zone: Zone::GLOBAL,
            zone_counter: 0,
            sources_left: 0,
            macro_depth: 0,
            iterations: 0,
            unresolved: 0,
            report_undefined: false,
            statements: Vec::new(),
            warnings: Vec::new(),
            advisories: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Set resource limits.
    ///
    /// See [`ResourceLimits`] for the available limits and their defaults.
    pub fn limits(&mut self, limits: ResourceLimits) -> &mut Self {
        self.limits = limits;
        self
    }

    /// Current resource limits.
    #[must_use]
    pub fn resource_limits(&self) -> &ResourceLimits {
        &self.limits
    }

    /// Set dialect options.
    pub fn options(&mut self, options: Options) -> &mut Self {
        self.options = options;
        self
    }

    /// Replace the source loader.
    pub fn with_loader(&mut self, loader: impl SourceLoader + 'static) -> &mut Self {
        self.loader = Box::new(loader);
        self
    }

    /// Predefine a global symbol, visible from the first pass on.
    pub fn define(&mut self, name: &str, value: i64) -> &mut Self {
        self.predefined.push((name.to_owned(), value));
        self
    }

    /// Path of a file opened during the last run.
    #[must_use]
    pub fn file_name(&self, file: FileId) -> Option<&Path> {
        self.files.get(file.0 as usize).map(PathBuf::as_path)
    }

    /// Assemble `path` and everything it includes.
    ///
    /// # Errors
    ///
    /// Returns the errors of the first pass that recorded any (a single
    /// error or [`AsmError::Multiple`]), or the fatal error that stopped
    /// the run.
    pub fn assemble_file(&mut self, path: impl AsRef<Path>) -> Result<AssemblyResult, AsmError> {
        let path = path.as_ref();
        self.reset_run()?;

        let max_passes = self.limits.max_passes.max(2);
        let mut pass = 0;
        self.run_pass(pass, path)?;
        let mut unresolved = self.unresolved;
        loop {
            pass += 1;
            self.run_pass(pass, path)?;
            let now = self.unresolved;
            if now == 0 || now >= unresolved || pass + 1 >= max_passes {
                break;
            }
            unresolved = now;
        }
        if self.unresolved > 0 {
            tracing::debug!(unresolved = self.unresolved, "reporting unresolved values");
            self.report_undefined = true;
            pass += 1;
            self.run_pass(pass, path)?;
        }
        tracing::debug!(passes = pass + 1, "assembly finished");

        let mut diagnostics = std::mem::take(&mut self.advisories);
        diagnostics.append(&mut self.warnings);
        Ok(AssemblyResult {
            statements: std::mem::take(&mut self.statements),
            diagnostics,
            passes: pass + 1,
            symbols: self
                .symbols
                .globals()
                .map(|(name, sym)| (name.to_owned(), sym.value))
                .collect(),
            files: self.files.clone(),
        })
    }

    fn reset_run(&mut self) -> Result<(), AsmError> {
        self.files.clear();
        self.symbols = SymbolTable::new();
        self.macros = MacroTable::new();
        self.advisories.clear();
        self.errors.clear();
        self.report_undefined = false;
        for (name, value) in &self.predefined {
            if self.symbols.set(Zone::GLOBAL, name, *value, false).is_redefined() {
                return Err(AsmError::SymbolRedefined {
                    name: name.clone(),
                    span: Span::dummy(),
                });
            }
        }
        Ok(())
    }

    fn run_pass(&mut self, pass: u32, path: &Path) -> Result<(), AsmError> {
        tracing::debug!(pass, "starting pass");
        self.pass = pass;
        self.zone = Zone::GLOBAL;
        self.zone_counter = 0;
        self.sources_left = self.limits.max_source_depth;
        self.macro_depth = 0;
        self.iterations = 0;
        self.unresolved = 0;
        self.statements.clear();
        self.warnings.clear();
        self.input = Input::default();

        if let Err(fatal) = self.parse_file(path, None, Span::dummy()) {
            self.errors.push(fatal);
        }
        self.take_errors()
    }

    fn take_errors(&mut self) -> Result<(), AsmError> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(AsmError::Multiple {
                errors: std::mem::take(&mut self.errors),
            }),
        }
    }

    // === input and zone switching ===

    /// Make `input` the active context; returns the one it replaces.
    pub(crate) fn activate(&mut self, input: Input) -> Input {
        std::mem::replace(&mut self.input, input)
    }

    /// Reinstate a context returned by [`Assembler::activate`].
    pub(crate) fn restore(&mut self, previous: Input) {
        self.input = previous;
    }

    /// Run `f` with `input` active, restoring the previous context on every
    /// exit path.
    pub(crate) fn with_input<T>(
        &mut self,
        input: Input,
        f: impl FnOnce(&mut Self) -> Result<T, AsmError>,
    ) -> Result<T, AsmError> {
        let previous = self.activate(input);
        let result = f(self);
        self.restore(previous);
        result
    }

    /// Run `f` in `zone`, restoring the previous zone afterwards.
    pub(crate) fn with_zone<T>(
        &mut self,
        zone: Zone,
        f: impl FnOnce(&mut Self) -> Result<T, AsmError>,
    ) -> Result<T, AsmError> {
        let previous = std::mem::replace(&mut self.zone, zone);
        let result = f(self);
        self.zone = previous;
        result
    }

    /// Open a fresh zone. Numbering restarts every pass, so the n-th macro
    /// call of each pass gets the same zone.
    pub(crate) fn new_zone(&mut self) -> Zone {
        self.zone_counter += 1;
        Zone(self.zone_counter)
    }

    // === files ===

    /// Load `name` and return a context positioned before its first byte.
    pub(crate) fn open_source(
        &mut self,
        name: &Path,
        includer: Option<FileId>,
        span: Span,
    ) -> Result<Input, AsmError> {
        let includer = includer.and_then(|id| self.files.get(id.0 as usize).cloned());
        let (path, text) = self
            .loader
            .load(name, includer.as_deref())
            .map_err(|e| AsmError::CannotOpen {
                path: name.display().to_string(),
                detail: e.to_string(),
                span,
            })?;
        let file = self.intern_file(path);
        Ok(Input::file(file, text))
    }

    fn intern_file(&mut self, path: PathBuf) -> FileId {
        if let Some(i) = self.files.iter().position(|p| *p == path) {
            return FileId(i as u32);
        }
        self.files.push(path);
        FileId((self.files.len() - 1) as u32)
    }

    // === bookkeeping ===

    /// Count one loop body execution against the per-pass limit.
    pub(crate) fn count_iteration(&mut self) -> Result<(), AsmError> {
        self.iterations += 1;
        if self.iterations > self.limits.max_iterations {
            return Err(AsmError::ResourceLimitExceeded {
                resource: String::from("loop iterations"),
                limit: self.limits.max_iterations,
            });
        }
        Ok(())
    }

    pub(crate) fn enter_macro(&mut self) -> Result<(), AsmError> {
        if self.macro_depth >= self.limits.max_macro_depth {
            return Err(AsmError::ResourceLimitExceeded {
                resource: String::from("macro depth"),
                limit: self.limits.max_macro_depth,
            });
        }
        self.macro_depth += 1;
        Ok(())
    }

    pub(crate) fn leave_macro(&mut self) {
        self.macro_depth = self.macro_depth.saturating_sub(1);
    }

    pub(crate) fn source_depth_limit(&self) -> usize {
        self.limits.max_source_depth
    }

    /// Record a recoverable error. Fails once more than `max_errors` are held.
    pub(crate) fn record(&mut self, err: AsmError) -> Result<(), AsmError> {
        tracing::trace!(%err, "error recorded");
        self.errors.push(err);
        if self.errors.len() > self.limits.max_errors {
            return Err(AsmError::ResourceLimitExceeded {
                resource: String::from("errors"),
                limit: self.limits.max_errors,
            });
        }
        Ok(())
    }

    /// Warning for the current pass.
    pub(crate) fn warn(&mut self, message: impl Into<String>, span: Span) {
        self.warnings.push(Diagnostic::warning(message, span));
    }

    /// Warning raised on the first pass only.
    pub(crate) fn advise(&mut self, message: &str, span: Span) {
        if self.pass == 0 {
            self.advisories.push(Diagnostic::warning(message, span));
        }
    }
}
