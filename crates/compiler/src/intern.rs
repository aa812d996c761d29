//! String interning
//!
//! Name lookups across the declaration tables key on interned ids, so a
//! lookup is an integer compare instead of a byte compare. Entries keep
//! their FNV-1a hash; two entries are the same name iff length, hash and
//! bytes all agree, which the backing map guarantees.

use std::collections::HashMap;

/// Identity of an interned string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrId(pub u32);

/// 32-bit FNV-1a over the raw bytes.
pub fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 2166136261;
    for &b in bytes {
        hash ^= u32::from(b);
        hash = hash.wrapping_mul(16777619);
    }
    hash
}

#[derive(Debug, Default)]
pub struct Interner {
    entries: Vec<(String, u32)>,
    map: HashMap<String, StrId>,
}

impl Interner {
    pub fn new() -> Self {
        Interner::default()
    }

    /// Intern `text`, returning the existing id when the same bytes were
    /// seen before.
    pub fn intern(&mut self, text: &str) -> StrId {
        if let Some(&id) = self.map.get(text) {
            return id;
        }
        let id = StrId(self.entries.len() as u32);
        self.entries.push((text.to_string(), fnv1a(text.as_bytes())));
        self.map.insert(text.to_string(), id);
        id
    }

    pub fn resolve(&self, id: StrId) -> &str {
        &self.entries[id.0 as usize].0
    }

    pub fn hash_of(&self, id: StrId) -> u32 {
        self.entries[id.0 as usize].1
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_bytes_same_id() {
        let mut interner = Interner::new();
        let a = interner.intern("counter");
        let b = interner.intern("counter");
        assert_eq!(a, b);
        assert_eq!(interner.len(), 1);
    }

    #[test]
    fn test_distinct_bytes_distinct_id() {
        let mut interner = Interner::new();
        let a = interner.intern("x");
        let b = interner.intern("y");
        assert_ne!(a, b);
        assert_eq!(interner.resolve(a), "x");
        assert_eq!(interner.resolve(b), "y");
    }

    #[test]
    fn test_fnv1a_reference_values() {
        // Reference vectors for 32-bit FNV-1a
        assert_eq!(fnv1a(b""), 2166136261);
        assert_eq!(fnv1a(b"a"), 0xe40c292c);
        assert_eq!(fnv1a(b"foobar"), 0xbf9cf968);
    }

    #[test]
    fn test_hash_stored_with_entry() {
        let mut interner = Interner::new();
        let id = interner.intern("memory-name");
        assert_eq!(interner.hash_of(id), fnv1a(b"memory-name"));
    }
}
