//! Hash-consed symbol names.

use std::collections::HashSet;
use std::sync::Arc;

/// An interned dynamic symbol name.
///
/// Equal names share one allocation, which keeps the per-library symbol sets
/// cheap and makes membership tests operate on short pointer-tagged strings.
pub type Symbol = Arc<str>;

/// Hash-consing store for [`Symbol`]s.
///
/// Dynamic symbol tables across a partition repeat most of their strings
/// (`malloc`, `memcpy`, ...). The interner hands out a shared [`Symbol`] per
/// distinct name. It is owned by whoever drives parsing; there is no global
/// instance.
///
/// # Example
///
/// ```
/// use vndk_common::Interner;
///
/// let mut interner = Interner::new();
/// let a = interner.intern("dlopen");
/// let b = interner.intern("dlopen");
/// assert!(std::sync::Arc::ptr_eq(&a, &b));
/// ```
#[derive(Debug, Default)]
pub struct Interner {
    strings: HashSet<Symbol>,
}

impl Interner {
    /// Creates an empty interner.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the shared instance of `string`, allocating it on first sight.
    pub fn intern(&mut self, string: &str) -> Symbol {
        match self.strings.get(string) {
            Some(symbol) => Arc::clone(symbol),
            None => {
                let symbol: Symbol = Arc::from(string);
                self.strings.insert(Arc::clone(&symbol));
                symbol
            }
        }
    }

    /// Returns the number of distinct interned strings.
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    /// Returns `true` if nothing has been interned yet.
    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_shares_allocations() {
        let mut interner = Interner::new();

        let a = interner.intern("memcpy");
        let b = interner.intern("memcpy");
        let c = interner.intern("memmove");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(interner.len(), 2);
    }
}
