//! Input contexts: the file or captured text being read right now.
//!
//! An [`Input`] wraps either a whole source file or a span of captured text
//! (a loop body, a macro body, a loop condition) and turns the raw bytes into
//! the processed stream the parser works on: newlines and `:` become
//! [`CHAR_EOS`], braces become [`CHAR_SOB`]/[`CHAR_EOB`], comments vanish, and
//! an exhausted context yields its end marker. The current byte (`got`) is a
//! field of the context, so swapping contexts in and out keeps every
//! lookahead byte intact.

use std::rc::Rc;

use crate::error::{AsmError, FileId, Span};

/// End of statement (newline, `:`, comment end).
pub const CHAR_EOS: u8 = 0x00;
/// Start of block (`{`).
pub const CHAR_SOB: u8 = 0x01;
/// End of block (`}`), also the end marker of replayed blocks.
pub const CHAR_EOB: u8 = 0x02;
/// End of file.
pub const CHAR_EOF: u8 = 0x03;

/// Whether `byte` terminates a statement.
#[inline]
pub(crate) fn is_statement_end(byte: u8) -> bool {
    matches!(byte, CHAR_EOS | CHAR_EOB | CHAR_EOF)
}

#[inline]
pub(crate) fn is_name_char(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'_'
}

/// Raw text of a brace-delimited block, captured for replay.
///
/// The text excludes the delimiters. `line` is the line of the opening
/// brace, so a replay reports the same line numbers as the original text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    file: FileId,
    line: u32,
    text: Rc<[u8]>,
}

impl Block {
    /// File the block was captured from.
    pub fn file(&self) -> FileId {
        self.file
    }

    /// Line of the opening brace.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Raw block text, delimiters excluded.
    pub fn text(&self) -> &[u8] {
        &self.text
    }
}

/// One input context.
#[derive(Debug, Clone)]
pub struct Input {
    file: FileId,
    text: Rc<[u8]>,
    pos: usize,
    line: u32,
    col: u32,
    /// Current (lookahead) byte of the processed stream.
    got: u8,
    /// Marker produced once `text` is exhausted.
    end: u8,
    exhausted: bool,
    quote: Option<u8>,
    /// Blocks entered in place and not yet left; used to resynchronize
    /// after a serious error.
    depth: usize,
}

impl Default for Input {
    fn default() -> Self {
        Self {
            file: FileId::default(),
            text: Rc::from(&[][..]),
            pos: 0,
            line: 0,
            col: 0,
            got: CHAR_EOF,
            end: CHAR_EOF,
            exhausted: true,
            quote: None,
            depth: 0,
        }
    }
}

impl Input {
    /// A file-backed context positioned before the first byte.
    pub fn file(file: FileId, text: impl Into<Rc<[u8]>>) -> Self {
        Self {
            file,
            text: text.into(),
            pos: 0,
            line: 1,
            col: 0,
            got: CHAR_EOS,
            end: CHAR_EOF,
            exhausted: false,
            quote: None,
            depth: 0,
        }
    }

    fn memory(file: FileId, text: Rc<[u8]>, line: u32, end: u8) -> Self {
        Self {
            file,
            text,
            pos: 0,
            line,
            col: 0,
            got: CHAR_EOS,
            end,
            exhausted: false,
            quote: None,
            depth: 0,
        }
    }

    /// A fresh context replaying `block` from its first byte.
    pub fn replay(block: &Block) -> Self {
        Self::memory(block.file(), Rc::clone(&block.text), block.line(), CHAR_EOB)
    }

    /// A fresh context over a stored expression, ending in [`CHAR_EOS`].
    pub fn expression(file: FileId, line: u32, text: Rc<[u8]>) -> Self {
        Self::memory(file, text, line, CHAR_EOS)
    }

    /// File this context belongs to.
    pub fn file_id(&self) -> FileId {
        self.file
    }

    /// Current line number.
    pub fn line(&self) -> u32 {
        self.line
    }

    /// Current byte of the processed stream.
    #[inline]
    pub fn got(&self) -> u8 {
        self.got
    }

    /// Location of the current byte.
    pub fn span(&self) -> Span {
        Span::new(self.file, self.line, self.col.max(1))
    }

    /// Whether the raw text has been fully consumed.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Advance to the next processed byte and return it.
    pub fn next_byte(&mut self) -> u8 {
        self.got = self.fetch();
        self.got
    }

    fn fetch(&mut self) -> u8 {
        loop {
            let Some(&byte) = self.text.get(self.pos) else {
                self.exhausted = true;
                self.quote = None;
                return self.end;
            };
            self.pos += 1;
            if byte == b'\n' {
                self.line += 1;
                self.col = 0;
                self.quote = None;
                return CHAR_EOS;
            }
            self.col += 1;
            if let Some(quote) = self.quote {
                if byte == quote {
                    self.quote = None;
                }
                return if byte < b' ' && byte != b'\t' { b' ' } else { byte };
            }
            match byte {
                b'"' | b'\'' => {
                    self.quote = Some(byte);
                    return byte;
                }
                b';' => self.skip_comment(),
                b':' => return CHAR_EOS,
                b'{' => return CHAR_SOB,
                b'}' => return CHAR_EOB,
                b'\r' => {}
                0x00..=0x1f => return b' ',
                _ => return byte,
            }
        }
    }

    fn skip_comment(&mut self) {
        while let Some(&byte) = self.text.get(self.pos) {
            if byte == b'\n' {
                break;
            }
            self.pos += 1;
        }
    }

    /// Skip blanks at the current position.
    pub fn skip_space(&mut self) {
        while self.got == b' ' {
            self.next_byte();
        }
    }

    /// Advance once, then skip blanks.
    pub fn next_and_skip_space(&mut self) {
        self.next_byte();
        self.skip_space();
    }

    fn read_name_chars(&mut self, lower: bool) -> String {
        let mut name = String::new();
        while is_name_char(self.got) {
            let ch = if lower {
                self.got.to_ascii_lowercase()
            } else {
                self.got
            };
            name.push(char::from(ch));
            self.next_byte();
        }
        name
    }

    /// Read a keyword starting at the current byte, lowered. Empty if none.
    pub fn read_keyword(&mut self) -> String {
        self.read_name_chars(true)
    }

    /// Read a symbol name (`name` or `.local`) after skipping blanks.
    ///
    /// # Errors
    ///
    /// Returns a syntax error if no name starts here.
    pub fn read_symbol_name(&mut self) -> Result<String, AsmError> {
        self.skip_space();
        let span = self.span();
        let mut name = String::new();
        if self.got == b'.' {
            name.push('.');
            self.next_byte();
        }
        if self.got.is_ascii_digit() || !is_name_char(self.got) {
            return Err(AsmError::syntax("Symbol name expected.", span));
        }
        name.push_str(&self.read_name_chars(false));
        Ok(name)
    }

    /// Consume a comma (and following blanks) if one is next.
    pub fn accept_comma(&mut self) -> bool {
        self.skip_space();
        if self.got != b',' {
            return false;
        }
        self.next_and_skip_space();
        true
    }

    /// Copy processed bytes until `terminator`, a block brace, or the end of
    /// the statement. Trailing blanks are dropped.
    pub fn until_terminator(&mut self, terminator: u8) -> Vec<u8> {
        let mut text = Vec::new();
        while self.got != terminator && self.got != CHAR_SOB && !is_statement_end(self.got) {
            text.push(self.got);
            self.next_byte();
        }
        while text.last() == Some(&b' ') {
            text.pop();
        }
        text
    }

    /// Read a double-quoted string; the current byte must be the opening quote.
    /// Afterwards the current byte is the one following the closing quote.
    ///
    /// # Errors
    ///
    /// Returns a syntax error if the line ends inside the string.
    pub fn read_string(&mut self) -> Result<String, AsmError> {
        let span = self.span();
        let quote = self.got;
        let mut bytes = Vec::new();
        loop {
            self.next_byte();
            if self.got == quote {
                break;
            }
            if is_statement_end(self.got) && self.quote.is_none() {
                return Err(AsmError::syntax("Quotes still open at end of line.", span));
            }
            bytes.push(self.got);
        }
        self.next_byte();
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Read a quoted file name after skipping blanks.
    ///
    /// # Errors
    ///
    /// Returns a syntax error if no quoted, non-empty name follows.
    pub fn read_filename(&mut self) -> Result<String, AsmError> {
        self.skip_space();
        let span = self.span();
        if self.got != b'"' {
            return Err(AsmError::syntax("File name expected.", span));
        }
        let name = self.read_string()?;
        if name.is_empty() {
            return Err(AsmError::syntax("No file name given.", span));
        }
        Ok(name)
    }

    /// Require that nothing but blanks remains in the statement.
    ///
    /// # Errors
    ///
    /// Returns a syntax error on trailing garbage.
    pub fn ensure_eos(&mut self) -> Result<(), AsmError> {
        self.skip_space();
        if is_statement_end(self.got) {
            Ok(())
        } else {
            Err(AsmError::syntax(
                "Garbage data at end of statement.",
                self.span(),
            ))
        }
    }

    /// Skip the rest of the current statement, including any complete blocks
    /// it contains. Stops on an end-of-block or end-of-file that belongs to
    /// an enclosing construct without consuming it.
    pub fn skip_remainder(&mut self) {
        self.skip_statement(0);
    }

    /// Skip forward to the next statement at the top level of this context,
    /// closing every block that was entered in place.
    pub fn resync(&mut self) {
        let depth = std::mem::take(&mut self.depth);
        self.skip_statement(depth);
    }

    fn skip_statement(&mut self, mut depth: usize) {
        loop {
            if self.exhausted {
                return;
            }
            match self.got {
                CHAR_SOB => depth += 1,
                CHAR_EOB if depth == 0 => return,
                CHAR_EOB => depth -= 1,
                CHAR_EOS if depth == 0 => return,
                CHAR_EOF => return,
                _ => {}
            }
            self.next_byte();
        }
    }

    pub(crate) fn enter_block(&mut self) {
        self.depth += 1;
    }

    pub(crate) fn leave_block(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Scan a block whose opening brace is the current byte.
    ///
    /// With `store`, the raw text between the braces is returned as a
    /// [`Block`]; otherwise it is discarded. Nested braces must balance;
    /// braces inside quotes and comments do not count. Afterwards the current
    /// byte is the matching [`CHAR_EOB`].
    ///
    /// # Errors
    ///
    /// Returns a serious error if the text ends before the block does.
    pub fn capture_block(&mut self, store: bool) -> Result<Option<Block>, AsmError> {
        let (file, line, start) = (self.file, self.line, self.pos);
        let mut depth = 0usize;
        loop {
            let byte = self.next_byte();
            if self.exhausted {
                return Err(AsmError::serious("Right brace expected.", self.span()));
            }
            match byte {
                CHAR_SOB => depth += 1,
                CHAR_EOB if depth == 0 => break,
                CHAR_EOB => depth -= 1,
                _ => {}
            }
        }
        if !store {
            return Ok(None);
        }
        let end = self.pos - 1;
        Ok(Some(Block {
            file,
            line,
            text: Rc::from(&self.text[start..end]),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(src: &str) -> Input {
        Input::file(FileId(0), src.as_bytes())
    }

    fn drain(input: &mut Input) -> Vec<u8> {
        let mut out = Vec::new();
        loop {
            let b = input.next_byte();
            out.push(b);
            if b == CHAR_EOF || b == CHAR_EOB && input.is_exhausted() {
                return out;
            }
        }
    }

    #[test]
    fn processed_stream() {
        let mut inp = input("a:b\n{}");
        assert_eq!(
            drain(&mut inp),
            vec![b'a', CHAR_EOS, b'b', CHAR_EOS, CHAR_SOB, CHAR_EOB, CHAR_EOF]
        );
        assert_eq!(inp.line(), 2);
    }

    #[test]
    fn comments_are_dropped() {
        let mut inp = input("x ; { not a block\ny");
        assert_eq!(drain(&mut inp), vec![b'x', b' ', CHAR_EOS, b'y', CHAR_EOF]);
    }

    #[test]
    fn quotes_keep_special_bytes() {
        let mut inp = input("\"{;:}\"");
        assert_eq!(
            drain(&mut inp),
            vec![b'"', b'{', b';', b':', b'}', b'"', CHAR_EOF]
        );
    }

    #[test]
    fn tabs_read_as_spaces() {
        let mut inp = input("\tx\r\n");
        assert_eq!(drain(&mut inp), vec![b' ', b'x', CHAR_EOS, CHAR_EOF]);
    }

    #[test]
    fn read_keyword_lowers() {
        let mut inp = input("UnTiL x");
        inp.next_byte();
        assert_eq!(inp.read_keyword(), "until");
        assert_eq!(inp.got(), b' ');
    }

    #[test]
    fn read_symbol_name_keeps_case_and_dot() {
        let mut inp = input("  .Loop1,");
        inp.next_byte();
        assert_eq!(inp.read_symbol_name().unwrap(), ".Loop1");
        assert_eq!(inp.got(), b',');
    }

    #[test]
    fn read_symbol_name_rejects_digit() {
        let mut inp = input("1abc");
        inp.next_byte();
        assert!(matches!(
            inp.read_symbol_name(),
            Err(AsmError::Syntax { .. })
        ));
    }

    #[test]
    fn capture_nested_block() {
        let mut inp = input("{ a { b } \"}\" ; }\n c } tail");
        inp.next_byte();
        assert_eq!(inp.got(), CHAR_SOB);
        let block = inp.capture_block(true).unwrap().unwrap();
        assert_eq!(block.text(), b" a { b } \"}\" ; }\n c ");
        assert_eq!(block.line(), 1);
        assert_eq!(inp.got(), CHAR_EOB);
        inp.next_and_skip_space();
        assert_eq!(inp.read_keyword(), "tail");
    }

    #[test]
    fn capture_without_store_discards() {
        let mut inp = input("{ x }");
        inp.next_byte();
        assert!(inp.capture_block(false).unwrap().is_none());
        assert_eq!(inp.got(), CHAR_EOB);
    }

    #[test]
    fn capture_unterminated_is_serious() {
        let mut inp = input("{ x { y }");
        inp.next_byte();
        let err = inp.capture_block(true).unwrap_err();
        assert!(matches!(err, AsmError::Serious { .. }));
    }

    #[test]
    fn replay_reports_original_lines() {
        let mut inp = input("\n\n{\nfirst\nsecond}");
        while inp.got() != CHAR_SOB {
            inp.next_byte();
        }
        let block = inp.capture_block(true).unwrap().unwrap();
        assert_eq!(block.line(), 3);
        let mut replay = Input::replay(&block);
        replay.next_byte();
        assert_eq!(replay.got(), CHAR_EOS);
        replay.next_byte();
        assert_eq!(replay.read_keyword(), "first");
        assert_eq!(replay.line(), 4);
        replay.next_byte();
        assert_eq!(replay.read_keyword(), "second");
        assert_eq!(replay.line(), 5);
        assert_eq!(replay.got(), CHAR_EOB);
        assert!(replay.is_exhausted());
    }

    #[test]
    fn expression_context_ends_with_eos() {
        let mut inp = Input::expression(FileId(0), 7, Rc::from(&b"x<3"[..]));
        assert_eq!(drain_until_eos(&mut inp), b"x<3");
        assert_eq!(inp.line(), 7);
    }

    fn drain_until_eos(input: &mut Input) -> Vec<u8> {
        let mut out = Vec::new();
        while input.next_byte() != CHAR_EOS {
            out.push(input.got());
        }
        out
    }

    #[test]
    fn until_terminator_stops_at_brace() {
        let mut inp = input("while x < 3   { }");
        inp.next_byte();
        assert_eq!(inp.read_keyword(), "while");
        inp.skip_space();
        assert_eq!(inp.until_terminator(CHAR_SOB), b"x < 3");
        assert_eq!(inp.got(), CHAR_SOB);
    }

    #[test]
    fn skip_remainder_is_brace_aware() {
        let mut inp = input("junk { a\n b } more\nnext");
        inp.next_byte();
        inp.skip_remainder();
        assert_eq!(inp.got(), CHAR_EOS);
        inp.next_byte();
        assert_eq!(inp.read_keyword(), "next");
    }

    #[test]
    fn skip_remainder_stops_at_enclosing_block_end() {
        let mut inp = input("junk } after");
        inp.next_byte();
        inp.skip_remainder();
        assert_eq!(inp.got(), CHAR_EOB);
    }

    #[test]
    fn resync_closes_entered_blocks() {
        let mut inp = input("{ { x } y } z\nnext");
        inp.next_byte();
        inp.enter_block();
        inp.next_and_skip_space();
        inp.enter_block();
        inp.next_and_skip_space();
        assert_eq!(inp.got(), b'x');
        inp.resync();
        assert_eq!(inp.got(), CHAR_EOS);
        inp.next_byte();
        assert_eq!(inp.read_keyword(), "next");
    }

    #[test]
    fn read_filename_variants() {
        let mut inp = input(" \"lib/macros.a\" rest");
        inp.next_byte();
        assert_eq!(inp.read_filename().unwrap(), "lib/macros.a");
        assert_eq!(inp.got(), b' ');

        let mut inp = input("\"open");
        inp.next_byte();
        assert!(inp.read_filename().is_err());

        let mut inp = input("plain");
        inp.next_byte();
        assert!(inp.read_filename().is_err());
    }

    #[test]
    fn ensure_eos_accepts_block_end() {
        let mut inp = input("   }");
        inp.next_byte();
        assert!(inp.ensure_eos().is_ok());

        let mut inp = input("  x");
        inp.next_byte();
        assert!(matches!(inp.ensure_eos(), Err(AsmError::Syntax { .. })));
    }
}
