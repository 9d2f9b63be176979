//! Lookup table of resolved specializations.
//!
//! The external specializer produces one [`LookupEntry`] per specialization it performed and
//! embeds them, sorted, in the patched program. After specialization every request is matched
//! against that table by its [`IdentityKey`].
//!
//! # Ordering
//!
//! Identity keys are ordered first by function id, then by a lexicographic byte comparison of
//! the argument buffers over the shorter length, with the shorter buffer sorting first when
//! one is a prefix of the other. The table side and the search side must use exactly this
//! order; [`LookupTable::new`] rejects tables that do not follow it.
//!
//! # Examples
//!
//! ```rust
//! use specreq::{lookup::{IdentityKey, LookupEntry, LookupTable}, FuncRef};
//!
//! let func = FuncRef::new(0x40).unwrap();
//! let table = LookupTable::from_unsorted(vec![
//!     LookupEntry::new(2, vec![1, 2], func),
//!     LookupEntry::new(1, vec![9], func),
//!     LookupEntry::new(2, vec![1], func),
//! ])?;
//!
//! assert_eq!(table.entries()[0].func_id(), 1);
//! assert!(table.find(&IdentityKey::new(2, &[1])).is_some());
//! assert!(table.find(&IdentityKey::new(2, &[1, 3])).is_none());
//! # Ok::<(), specreq::Error>(())
//! ```

use std::cmp::Ordering;

use crate::{Error, FuncRef, Result};

/// The `(function id, argument bytes)` pair a request is matched by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct IdentityKey<'a> {
    func_id: u32,
    args: &'a [u8],
}

impl<'a> IdentityKey<'a> {
    /// Creates a key.
    #[must_use]
    pub fn new(func_id: u32, args: &'a [u8]) -> Self {
        IdentityKey { func_id, args }
    }

    /// The function id.
    #[must_use]
    pub fn func_id(&self) -> u32 {
        self.func_id
    }

    /// The encoded argument buffer.
    #[must_use]
    pub fn args(&self) -> &'a [u8] {
        self.args
    }
}

impl Ord for IdentityKey<'_> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Slice ordering compares the common prefix bytewise, then the shorter sorts first.
        self.func_id
            .cmp(&other.func_id)
            .then_with(|| self.args.cmp(other.args))
    }
}

impl PartialOrd for IdentityKey<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// One resolved specialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupEntry {
    func_id: u32,
    args: Vec<u8>,
    specialized: FuncRef,
}

impl LookupEntry {
    /// Creates an entry mapping `(func_id, args)` to `specialized`.
    #[must_use]
    pub fn new(func_id: u32, args: Vec<u8>, specialized: FuncRef) -> Self {
        LookupEntry {
            func_id,
            args,
            specialized,
        }
    }

    /// The function id.
    #[must_use]
    pub fn func_id(&self) -> u32 {
        self.func_id
    }

    /// The encoded argument buffer.
    #[must_use]
    pub fn args(&self) -> &[u8] {
        &self.args
    }

    /// The specialized function.
    #[must_use]
    pub fn specialized(&self) -> FuncRef {
        self.specialized
    }

    /// Identity key of the entry.
    #[must_use]
    pub fn key(&self) -> IdentityKey<'_> {
        IdentityKey::new(self.func_id, &self.args)
    }
}

/// Immutable table of resolved specializations, strictly sorted by [`IdentityKey`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupTable {
    entries: Vec<LookupEntry>,
}

impl LookupTable {
    /// An empty table. Every lookup misses.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wrap entries that are already strictly sorted.
    ///
    /// # Errors
    /// Returns [`Error::UnsortedTable`] at the first entry that does not sort strictly after
    /// its predecessor. Duplicate keys count as unsorted.
    pub fn new(entries: Vec<LookupEntry>) -> Result<Self> {
        let table = LookupTable { entries };
        table.validate()?;
        Ok(table)
    }

    /// Wrap entries without checking their order.
    ///
    /// Lookups on a table that is not strictly sorted may miss entries that are present.
    #[must_use]
    pub fn new_unchecked(entries: Vec<LookupEntry>) -> Self {
        LookupTable { entries }
    }

    /// Sort `entries` into a table.
    ///
    /// # Errors
    /// Returns [`Error::UnsortedTable`] if two entries share a key.
    pub fn from_unsorted(mut entries: Vec<LookupEntry>) -> Result<Self> {
        entries.sort_unstable_by(|a, b| a.key().cmp(&b.key()));
        Self::new(entries)
    }

    /// Verify strict ordering.
    ///
    /// # Errors
    /// See [`LookupTable::new`].
    pub fn validate(&self) -> Result<()> {
        match self
            .entries
            .windows(2)
            .position(|pair| pair[0].key() >= pair[1].key())
        {
            Some(index) => Err(Error::UnsortedTable { index: index + 1 }),
            None => Ok(()),
        }
    }

    /// Binary search for the entry whose key equals `key`.
    ///
    /// A miss is the normal outcome for arguments that were never specialized.
    #[must_use]
    pub fn find(&self, key: &IdentityKey<'_>) -> Option<&LookupEntry> {
        if self.entries.is_empty() {
            return None;
        }

        self.entries
            .binary_search_by(|entry| entry.key().cmp(key))
            .ok()
            .and_then(|index| self.entries.get(index))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries, in key order.
    #[must_use]
    pub fn entries(&self) -> &[LookupEntry] {
        &self.entries
    }

    /// Iterate entries in key order.
    pub fn iter(&self) -> std::slice::Iter<'_, LookupEntry> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a LookupTable {
    type Item = &'a LookupEntry;
    type IntoIter = std::slice::Iter<'a, LookupEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
