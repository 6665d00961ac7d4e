//! A narrow stand-in for the external arena/string-intern service
//! (spec.md §2.1: "out of scope... bump allocators with thread-local
//! scratch, interned filepath/identifier strings").
//!
//! Spec.md is explicit that this service is a collaborator whose
//! internals we do not specify; what we need internally is just its
//! contract: two equal strings interned through the same [`Interner`]
//! compare equal by pointer (here, by `Arc` pointer equality), which is
//! what lets the diagnostic engine and source-location store do
//! pointer-identity comparisons on filepaths (spec.md §4.1 design
//! decision) instead of string comparisons on every lookup.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

/// An interned string. Two `Symbol`s produced by the same [`Interner`]
/// for equal text are guaranteed to point at the same allocation.
#[derive(Clone, Debug, Eq)]
pub struct Symbol(Arc<str>);

impl Symbol {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Pointer identity, not text equality — this is the fast path the
    /// diagnostic engine and source-location store rely on.
    pub fn ptr_eq(&self, other: &Symbol) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Symbol) -> bool {
        self.ptr_eq(other) || self.0 == other.0
    }
}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::ops::Deref for Symbol {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Deduplicating string interner, shared by all preprocessing jobs that
/// need pointer-identity-comparable filepaths or identifiers.
#[derive(Default)]
pub struct Interner {
    table: Mutex<HashMap<Arc<str>, Symbol>>,
}

impl Interner {
    pub fn new() -> Interner {
        Interner::default()
    }

    /// Interns `text`, deduplicating against prior calls with equal text.
    pub fn intern(&self, text: &str) -> Symbol {
        let mut table = self.table.lock();
        if let Some(existing) = table.get(text) {
            return existing.clone();
        }
        let arc: Arc<str> = Arc::from(text);
        let symbol = Symbol(arc.clone());
        table.insert(arc, symbol.clone());
        symbol
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_text_interns_to_the_same_allocation() {
        let interner = Interner::new();
        let a = interner.intern("foo.c");
        let b = interner.intern("foo.c");
        assert!(a.ptr_eq(&b));
    }

    #[test]
    fn distinct_text_interns_distinctly() {
        let interner = Interner::new();
        let a = interner.intern("foo.c");
        let b = interner.intern("bar.c");
        assert!(!a.ptr_eq(&b));
        assert_ne!(a, b);
    }
}
