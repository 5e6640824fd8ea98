//! Integer expression evaluator.
//!
//! Reads directly from the active [`Input`], so it works the same on file
//! text, replayed blocks and stored loop conditions. Binary operators, lowest
//! precedence first:
//!
//!  1. `||`
//!  2. `&&`
//!  3. `|`
//!  4. `^`
//!  5. `&`
//!  6. `=` `==` `!=` `<>`
//!  7. `<` `>` `<=` `>=`
//!  8. `<<` `>>`
//!  9. `+` `-`
//! 10. `*` `/` `%`
//!
//! Unary prefixes are `-`, `!`, `~`, `<` (low byte) and `>` (high byte).
//! Atoms are decimal, `$hex`, `0x` hex, `%binary`, `0b` binary, `'c'`,
//! parenthesized sub-expressions and symbol names.

use crate::error::AsmError;
use crate::input::{is_name_char, is_statement_end, Input};
use crate::symbols::{SymbolTable, Zone};

/// Result of an evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Value {
    /// The integer value; zero when undefined.
    pub val: i64,
    /// False if any symbol in the expression had no value yet.
    pub defined: bool,
}

impl Value {
    /// A known value.
    pub fn defined(val: i64) -> Self {
        Self { val, defined: true }
    }

    /// A value that cannot be computed yet.
    pub fn undefined() -> Self {
        Self {
            val: 0,
            defined: false,
        }
    }

    fn combine(self, rhs: Value, val: i64) -> Value {
        Value {
            val,
            defined: self.defined && rhs.defined,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    LogOr,
    LogAnd,
    Or,
    Xor,
    And,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Shl,
    Shr,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
}

impl BinOp {
    fn precedence(self) -> u8 {
        match self {
            BinOp::LogOr => 1,
            BinOp::LogAnd => 2,
            BinOp::Or => 3,
            BinOp::Xor => 4,
            BinOp::And => 5,
            BinOp::Eq | BinOp::Ne => 6,
            BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => 7,
            BinOp::Shl | BinOp::Shr => 8,
            BinOp::Add | BinOp::Sub => 9,
            BinOp::Mul | BinOp::Div | BinOp::Mod => 10,
        }
    }
}

fn truth(flag: bool) -> i64 {
    i64::from(flag)
}

/// Evaluator over the active input context.
pub(crate) struct ExprEval<'a> {
    input: &'a mut Input,
    symbols: &'a mut SymbolTable,
    zone: Zone,
    count_usage: bool,
    /// Operator already consumed from the input but not yet applied.
    pending: Option<BinOp>,
}

impl<'a> ExprEval<'a> {
    pub(crate) fn new(
        input: &'a mut Input,
        symbols: &'a mut SymbolTable,
        zone: Zone,
        count_usage: bool,
    ) -> Self {
        Self {
            input,
            symbols,
            zone,
            count_usage,
            pending: None,
        }
    }

    /// Evaluate one expression starting at the current byte. Afterwards the
    /// current byte is the first one that does not belong to it.
    pub(crate) fn eval(mut self) -> Result<Value, AsmError> {
        self.input.skip_space();
        self.binary(1)
    }

    fn peek_op(&mut self) -> Result<Option<BinOp>, AsmError> {
        if self.pending.is_none() {
            self.pending = self.scan_op()?;
        }
        Ok(self.pending)
    }

    fn scan_op(&mut self) -> Result<Option<BinOp>, AsmError> {
        let input = &mut *self.input;
        input.skip_space();
        let span = input.span();
        let first = input.got();
        let op = match first {
            b'|' | b'&' | b'<' | b'>' | b'=' | b'!' => {
                input.next_byte();
                let second = input.got();
                let (op, pair) = match (first, second) {
                    (b'|', b'|') => (BinOp::LogOr, true),
                    (b'|', _) => (BinOp::Or, false),
                    (b'&', b'&') => (BinOp::LogAnd, true),
                    (b'&', _) => (BinOp::And, false),
                    (b'<', b'<') => (BinOp::Shl, true),
                    (b'<', b'=') => (BinOp::Le, true),
                    (b'<', b'>') => (BinOp::Ne, true),
                    (b'<', _) => (BinOp::Lt, false),
                    (b'>', b'>') => (BinOp::Shr, true),
                    (b'>', b'=') => (BinOp::Ge, true),
                    (b'>', _) => (BinOp::Gt, false),
                    (b'=', b'=') => (BinOp::Eq, true),
                    (b'=', _) => (BinOp::Eq, false),
                    (b'!', b'=') => (BinOp::Ne, true),
                    _ => return Err(AsmError::syntax("Unknown operator.", span)),
                };
                if pair {
                    input.next_byte();
                }
                op
            }
            b'^' => BinOp::Xor,
            b'+' => BinOp::Add,
            b'-' => BinOp::Sub,
            b'*' => BinOp::Mul,
            b'/' => BinOp::Div,
            b'%' => BinOp::Mod,
            _ => return Ok(None),
        };
        if matches!(first, b'^' | b'+' | b'-' | b'*' | b'/' | b'%') {
            input.next_byte();
        }
        Ok(Some(op))
    }

    fn binary(&mut self, min_prec: u8) -> Result<Value, AsmError> {
        let mut lhs = self.unary()?;
        while let Some(op) = self.peek_op()? {
            if op.precedence() < min_prec {
                break;
            }
            self.pending = None;
            let span = self.input.span();
            let rhs = self.binary(op.precedence() + 1)?;
            lhs = Self::apply(op, lhs, rhs)
                .ok_or_else(|| AsmError::syntax("Division by zero.", span))?;
        }
        Ok(lhs)
    }

    /// `None` only for a defined division by zero.
    fn apply(op: BinOp, lhs: Value, rhs: Value) -> Option<Value> {
        let (a, b) = (lhs.val, rhs.val);
        let val = match op {
            BinOp::LogOr => truth(a != 0 || b != 0),
            BinOp::LogAnd => truth(a != 0 && b != 0),
            BinOp::Or => a | b,
            BinOp::Xor => a ^ b,
            BinOp::And => a & b,
            BinOp::Eq => truth(a == b),
            BinOp::Ne => truth(a != b),
            BinOp::Lt => truth(a < b),
            BinOp::Gt => truth(a > b),
            BinOp::Le => truth(a <= b),
            BinOp::Ge => truth(a >= b),
            BinOp::Shl => u32::try_from(b).ok().and_then(|s| a.checked_shl(s)).unwrap_or(0),
            BinOp::Shr => u32::try_from(b)
                .ok()
                .and_then(|s| a.checked_shr(s))
                .unwrap_or(if a < 0 { -1 } else { 0 }),
            BinOp::Add => a.wrapping_add(b),
            BinOp::Sub => a.wrapping_sub(b),
            BinOp::Mul => a.wrapping_mul(b),
            BinOp::Div | BinOp::Mod => {
                if b == 0 {
                    if lhs.defined && rhs.defined {
                        return None;
                    }
                    return Some(lhs.combine(rhs, 0));
                }
                if op == BinOp::Div {
                    a.wrapping_div(b)
                } else {
                    a.wrapping_rem(b)
                }
            }
        };
        Some(lhs.combine(rhs, val))
    }

    fn unary(&mut self) -> Result<Value, AsmError> {
        self.input.skip_space();
        let prefix = self.input.got();
        if !matches!(prefix, b'-' | b'!' | b'~' | b'<' | b'>') {
            return self.atom();
        }
        self.input.next_byte();
        let v = self.unary()?;
        let val = match prefix {
            b'-' => v.val.wrapping_neg(),
            b'!' => truth(v.val == 0),
            b'~' => !v.val,
            b'<' => v.val & 0xff,
            _ => (v.val >> 8) & 0xff,
        };
        Ok(Value { val, ..v })
    }

    fn atom(&mut self) -> Result<Value, AsmError> {
        let span = self.input.span();
        match self.input.got() {
            b'(' => {
                self.input.next_byte();
                let v = self.binary(1)?;
                self.input.skip_space();
                if self.input.got() != b')' {
                    return Err(AsmError::syntax("Closing parenthesis expected.", span));
                }
                self.input.next_byte();
                Ok(v)
            }
            b'$' => {
                self.input.next_byte();
                self.number(16)
            }
            b'%' => {
                self.input.next_byte();
                self.number(2)
            }
            b'0' => {
                self.input.next_byte();
                match self.input.got() {
                    b'x' | b'X' => {
                        self.input.next_byte();
                        self.number(16)
                    }
                    b'b' | b'B' => {
                        self.input.next_byte();
                        self.number(2)
                    }
                    _ => self.digits(10, 0, false),
                }
            }
            b'1'..=b'9' => self.number(10),
            b'\'' => {
                let ch = self.input.next_byte();
                if ch == b'\'' || is_statement_end(ch) || self.input.next_byte() != b'\'' {
                    return Err(AsmError::syntax("Invalid character constant.", span));
                }
                self.input.next_byte();
                Ok(Value::defined(i64::from(ch)))
            }
            b'.' => self.symbol(),
            b if is_name_char(b) => self.symbol(),
            _ => Err(AsmError::syntax("Value expected.", span)),
        }
    }

    fn number(&mut self, radix: u32) -> Result<Value, AsmError> {
        self.digits(radix, 0, true)
    }

    fn digits(&mut self, radix: u32, mut acc: i64, need_one: bool) -> Result<Value, AsmError> {
        let span = self.input.span();
        let mut seen = false;
        while let Some(d) = char::from(self.input.got()).to_digit(radix) {
            acc = acc
                .checked_mul(i64::from(radix))
                .and_then(|a| a.checked_add(i64::from(d)))
                .ok_or_else(|| AsmError::syntax("Number out of range.", span))?;
            seen = true;
            self.input.next_byte();
        }
        if need_one && !seen {
            return Err(AsmError::syntax("Digit expected.", span));
        }
        if is_name_char(self.input.got()) {
            return Err(AsmError::syntax("Garbage after number.", self.input.span()));
        }
        Ok(Value::defined(acc))
    }

    fn symbol(&mut self) -> Result<Value, AsmError> {
        let name = self.input.read_symbol_name()?;
        Ok(
            match self.symbols.reference(self.zone, &name, self.count_usage) {
                Some(sym) if sym.defined => Value::defined(sym.value),
                _ => Value::undefined(),
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FileId;

    fn eval_with(src: &str, symbols: &mut SymbolTable) -> Result<Value, AsmError> {
        let mut input = Input::file(FileId(0), src.as_bytes());
        input.next_byte();
        ExprEval::new(&mut input, symbols, Zone::GLOBAL, true).eval()
    }

    fn eval(src: &str) -> i64 {
        let v = eval_with(src, &mut SymbolTable::new()).unwrap();
        assert!(v.defined, "{src} should be defined");
        v.val
    }

    // === literals ===

    #[test]
    fn literal_forms() {
        assert_eq!(eval("42"), 42);
        assert_eq!(eval("0"), 0);
        assert_eq!(eval("$ff"), 255);
        assert_eq!(eval("0x1F"), 31);
        assert_eq!(eval("%101"), 5);
        assert_eq!(eval("0b11"), 3);
        assert_eq!(eval("'A'"), 65);
    }

    #[test]
    fn literal_overflow_is_error() {
        assert!(eval_with("99999999999999999999", &mut SymbolTable::new()).is_err());
    }

    #[test]
    fn char_constant_cut_by_line_end() {
        assert!(matches!(
            eval_with("'\n'", &mut SymbolTable::new()),
            Err(AsmError::Syntax { .. })
        ));
        assert!(eval_with("'", &mut SymbolTable::new()).is_err());
        assert!(eval_with("''", &mut SymbolTable::new()).is_err());
        assert_eq!(eval("':'"), i64::from(b':'));
    }

    #[test]
    fn garbage_after_number() {
        assert!(eval_with("12ab", &mut SymbolTable::new()).is_err());
    }

    // === operators ===

    #[test]
    fn precedence() {
        assert_eq!(eval("2 + 3 * 4"), 14);
        assert_eq!(eval("(2 + 3) * 4"), 20);
        assert_eq!(eval("1 + 2 = 3"), 1);
        assert_eq!(eval("1 << 4 | 1"), 17);
        assert_eq!(eval("1 || 0 && 0"), 1);
        assert_eq!(eval("6 & 3 ^ 1"), 3);
    }

    #[test]
    fn comparisons() {
        assert_eq!(eval("3 < 4"), 1);
        assert_eq!(eval("3 > 4"), 0);
        assert_eq!(eval("4 <= 4"), 1);
        assert_eq!(eval("4 >= 5"), 0);
        assert_eq!(eval("4 == 4"), 1);
        assert_eq!(eval("4 != 4"), 0);
        assert_eq!(eval("4 <> 5"), 1);
    }

    #[test]
    fn unary_operators() {
        assert_eq!(eval("-5 + 2"), -3);
        assert_eq!(eval("!0"), 1);
        assert_eq!(eval("!7"), 0);
        assert_eq!(eval("~0"), -1);
        assert_eq!(eval("<$1234"), 0x34);
        assert_eq!(eval(">$1234"), 0x12);
    }

    #[test]
    fn division() {
        assert_eq!(eval("17 / 5"), 3);
        assert_eq!(eval("17 % 5"), 2);
        assert!(matches!(
            eval_with("1 / 0", &mut SymbolTable::new()),
            Err(AsmError::Syntax { .. })
        ));
    }

    #[test]
    fn stops_at_first_foreign_byte() {
        let mut symbols = SymbolTable::new();
        let mut input = Input::file(FileId(0), &b"1 + 2, 7"[..]);
        input.next_byte();
        let v = ExprEval::new(&mut input, &mut symbols, Zone::GLOBAL, false)
            .eval()
            .unwrap();
        assert_eq!(v.val, 3);
        assert_eq!(input.got(), b',');
    }

    #[test]
    fn unclosed_parenthesis() {
        assert!(eval_with("(1 + 2", &mut SymbolTable::new()).is_err());
    }

    // === symbols ===

    #[test]
    fn symbol_lookup() {
        let mut symbols = SymbolTable::new();
        let _ = symbols.set(Zone::GLOBAL, "width", 40, false);
        let v = eval_with("width * 2", &mut symbols).unwrap();
        assert_eq!(v, Value::defined(80));
    }

    #[test]
    fn undefined_symbol_poisons_result() {
        let mut symbols = SymbolTable::new();
        let v = eval_with("later + 1", &mut symbols).unwrap();
        assert!(!v.defined);
        assert_eq!(symbols.get(Zone::GLOBAL, "later").map(|s| s.usage), Some(1));
    }

    #[test]
    fn undefined_division_by_zero_is_deferred() {
        let v = eval_with("later / 0", &mut SymbolTable::new()).unwrap();
        assert!(!v.defined);
    }

    #[test]
    fn local_symbol_uses_zone() {
        let mut symbols = SymbolTable::new();
        let _ = symbols.set(Zone(2), ".n", 9, false);
        let mut input = Input::file(FileId(0), &b".n + 1"[..]);
        input.next_byte();
        let v = ExprEval::new(&mut input, &mut symbols, Zone(2), false)
            .eval()
            .unwrap();
        assert_eq!(v, Value::defined(10));
    }

    #[test]
    fn empty_expression_is_error() {
        assert!(eval_with("", &mut SymbolTable::new()).is_err());
    }
}
