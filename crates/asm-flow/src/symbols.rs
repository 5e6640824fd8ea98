//! Zoned symbol table.
//!
//! Names starting with `.` live in the zone that was current when they were
//! referenced; every other name lives in [`Zone::GLOBAL`].

use std::collections::BTreeMap;

/// A symbol visibility scope. Every macro call opens a fresh zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Zone(pub u32);

impl Zone {
    /// The zone of all non-local names.
    pub const GLOBAL: Zone = Zone(0);
}

/// A symbol table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Symbol {
    /// Current value; meaningless unless `defined`.
    pub value: i64,
    /// Whether `value` is known.
    pub defined: bool,
    /// Number of first-pass references.
    pub usage: u32,
}

/// Outcome of [`SymbolTable::set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum SetResult {
    /// The value was stored.
    Ok,
    /// The symbol already had a different defined value; nothing was stored.
    Redefined,
}

impl SetResult {
    /// Whether the store was refused.
    pub fn is_redefined(self) -> bool {
        self == SetResult::Redefined
    }
}

/// Whether `name` is zone-local.
#[inline]
pub fn is_local(name: &str) -> bool {
    name.starts_with('.')
}

/// Symbols keyed by `(zone, name)`.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    map: BTreeMap<(Zone, String), Symbol>,
}

impl SymbolTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    fn key(zone: Zone, name: &str) -> (Zone, String) {
        let zone = if is_local(name) { zone } else { Zone::GLOBAL };
        (zone, name.to_owned())
    }

    /// Look a symbol up without touching it.
    pub fn get(&self, zone: Zone, name: &str) -> Option<&Symbol> {
        self.map.get(&Self::key(zone, name))
    }

    /// Look a symbol up for modification.
    pub fn get_mut(&mut self, zone: Zone, name: &str) -> Option<&mut Symbol> {
        self.map.get_mut(&Self::key(zone, name))
    }

    /// Forget a symbol's value, creating the entry if needed.
    pub fn unset(&mut self, zone: Zone, name: &str) {
        self.map.entry(Self::key(zone, name)).or_default().defined = false;
    }

    /// Look a symbol up as an expression reference.
    ///
    /// With `count_usage`, the entry is created if missing and its usage
    /// counter incremented.
    pub fn reference(&mut self, zone: Zone, name: &str, count_usage: bool) -> Option<Symbol> {
        if !count_usage {
            return self.get(zone, name).copied();
        }
        let sym = self.map.entry(Self::key(zone, name)).or_default();
        sym.usage += 1;
        Some(*sym)
    }

    /// Whether the symbol exists and carries a defined value.
    pub fn is_defined(&self, zone: Zone, name: &str) -> bool {
        self.get(zone, name).is_some_and(|sym| sym.defined)
    }

    /// Store a defined value.
    ///
    /// Without `change_allowed`, a symbol that is already defined with a
    /// different value is left untouched and [`SetResult::Redefined`] is
    /// returned.
    pub fn set(&mut self, zone: Zone, name: &str, value: i64, change_allowed: bool) -> SetResult {
        let sym = self.map.entry(Self::key(zone, name)).or_default();
        if sym.defined && sym.value != value && !change_allowed {
            return SetResult::Redefined;
        }
        sym.value = value;
        sym.defined = true;
        SetResult::Ok
    }

    /// Defined global symbols in name order.
    pub fn globals(&self) -> impl Iterator<Item = (&str, &Symbol)> {
        self.map
            .iter()
            .filter(|((zone, _), sym)| *zone == Zone::GLOBAL && sym.defined)
            .map(|((_, name), sym)| (name.as_str(), sym))
    }

    /// Number of entries, referenced-only entries included.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globals_ignore_zone() {
        let mut table = SymbolTable::new();
        assert_eq!(table.set(Zone(3), "width", 40, false), SetResult::Ok);
        assert_eq!(table.get(Zone::GLOBAL, "width").map(|s| s.value), Some(40));
        assert!(table.is_defined(Zone(9), "width"));
    }

    #[test]
    fn locals_are_per_zone() {
        let mut table = SymbolTable::new();
        let _ = table.set(Zone(1), ".loop", 1, false);
        let _ = table.set(Zone(2), ".loop", 2, false);
        assert_eq!(table.get(Zone(1), ".loop").map(|s| s.value), Some(1));
        assert_eq!(table.get(Zone(2), ".loop").map(|s| s.value), Some(2));
        assert!(!table.is_defined(Zone::GLOBAL, ".loop"));
    }

    #[test]
    fn redefinition_rules() {
        let mut table = SymbolTable::new();
        assert_eq!(table.set(Zone::GLOBAL, "x", 1, false), SetResult::Ok);
        assert_eq!(table.set(Zone::GLOBAL, "x", 1, false), SetResult::Ok);
        assert_eq!(table.set(Zone::GLOBAL, "x", 2, false), SetResult::Redefined);
        assert_eq!(table.get(Zone::GLOBAL, "x").map(|s| s.value), Some(1));
        assert_eq!(table.set(Zone::GLOBAL, "x", 2, true), SetResult::Ok);
        assert_eq!(table.get(Zone::GLOBAL, "x").map(|s| s.value), Some(2));
    }

    #[test]
    fn change_allowed_never_reports_redefinition() {
        let mut table = SymbolTable::new();
        for value in [3, -7, 3, i64::MAX] {
            assert!(!table.set(Zone(5), ".i", value, true).is_redefined());
            assert_eq!(table.get(Zone(5), ".i").map(|s| s.value), Some(value));
        }
    }

    #[test]
    fn reference_counts_usage_only_when_asked() {
        let mut table = SymbolTable::new();
        assert_eq!(table.reference(Zone::GLOBAL, "later", false), None);
        let sym = table.reference(Zone::GLOBAL, "later", true).unwrap();
        assert!(!sym.defined);
        assert_eq!(sym.usage, 1);
        let _ = table.reference(Zone::GLOBAL, "later", true);
        let _ = table.reference(Zone::GLOBAL, "later", false);
        assert_eq!(table.get(Zone::GLOBAL, "later").map(|s| s.usage), Some(2));
        assert!(!table.is_defined(Zone::GLOBAL, "later"));
    }

    #[test]
    fn unset_keeps_usage() {
        let mut table = SymbolTable::new();
        let _ = table.reference(Zone(1), ".arg", true);
        let _ = table.set(Zone(1), ".arg", 5, false);
        table.unset(Zone(1), ".arg");
        let sym = table.get(Zone(1), ".arg").unwrap();
        assert!(!sym.defined);
        assert_eq!(sym.usage, 1);
        assert_eq!(table.set(Zone(1), ".arg", 6, false), SetResult::Ok);
    }

    #[test]
    fn globals_lists_defined_only() {
        let mut table = SymbolTable::new();
        let _ = table.set(Zone::GLOBAL, "b", 2, false);
        let _ = table.set(Zone::GLOBAL, "a", 1, false);
        let _ = table.set(Zone(4), ".hidden", 3, false);
        let _ = table.reference(Zone::GLOBAL, "pending", true);
        let names: Vec<_> = table.globals().map(|(name, _)| name).collect();
        assert_eq!(names, ["a", "b"]);
        assert_eq!(table.len(), 4);
    }
}
