//! String interning.

use crate::error::{Component, DumpError, DumpResult, Reason};
use crate::types::StringId;
use std::collections::HashMap;

/// First identifier handed out by a fresh string table.
pub const FIRST_STRING_ID: u32 = 0x40_0000;

#[derive(Debug, Default)]
struct StringIndex {
    ids: HashMap<String, StringId>,
    entries: Vec<String>,
    written: usize,
}

/// Content-keyed string interning table.
///
/// Ids are allocated sequentially from [`FIRST_STRING_ID`].
#[derive(Debug, Default)]
pub struct StringTable {
    inner: Option<StringIndex>,
}

impl StringTable {
    /// Creates a table that must be started before use.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty index. Restarting discards all entries.
    pub fn startup(&mut self) {
        self.inner = Some(StringIndex::default());
    }

    /// Frees the index.
    pub fn shutdown(&mut self) {
        self.inner = None;
    }

    /// Returns `true` between startup and shutdown.
    pub fn is_initialized(&self) -> bool {
        self.inner.is_some()
    }

    fn index(&self) -> DumpResult<&StringIndex> {
        self.inner
            .as_ref()
            .ok_or_else(|| DumpError::misuse(Component::StringTable, Reason::TableUninitialized))
    }

    fn index_mut(&mut self) -> DumpResult<&mut StringIndex> {
        self.inner
            .as_mut()
            .ok_or_else(|| DumpError::misuse(Component::StringTable, Reason::TableUninitialized))
    }

    /// Returns the id of `content`, interning it if unseen.
    ///
    /// # Errors
    ///
    /// - `ProtocolMisuse(TableUninitialized)` if the table is not started
    /// - `AllocationFailure(TableInsert)` if the index cannot grow
    pub fn lookup_or_insert(&mut self, content: &str) -> DumpResult<StringId> {
        let index = self.index_mut()?;
        if let Some(&id) = index.ids.get(content) {
            return Ok(id);
        }

        let next = u32::try_from(index.entries.len())
            .ok()
            .and_then(|n| n.checked_add(FIRST_STRING_ID))
            .ok_or_else(|| DumpError::allocation(Component::StringTable, Reason::TableInsert))?;
        index
            .ids
            .try_reserve(1)
            .and_then(|()| index.entries.try_reserve(1))
            .map_err(|_| {
                DumpError::allocation(Component::StringTable, Reason::TableInsert)
                    .with_tag(format!("{} entries", index.entries.len()))
            })?;

        let id = StringId::new(next);
        index.ids.insert(content.to_owned(), id);
        index.entries.push(content.to_owned());
        Ok(id)
    }

    /// Returns the content of an interned string.
    ///
    /// # Errors
    ///
    /// `ProtocolMisuse(UnregisteredId)` if `id` was not handed out by this table.
    pub fn get(&self, id: StringId) -> DumpResult<&str> {
        let index = self.index()?;
        id.as_u32()
            .checked_sub(FIRST_STRING_ID)
            .and_then(|slot| index.entries.get(slot as usize))
            .map(String::as_str)
            .ok_or_else(|| {
                DumpError::misuse(Component::StringTable, Reason::UnregisteredId)
                    .with_tag(id.to_string())
            })
    }

    /// Number of interned strings; zero when not started.
    pub fn len(&self) -> usize {
        self.inner.as_ref().map_or(0, |i| i.entries.len())
    }

    /// Returns `true` if nothing is interned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of strings whose definition has not been written yet.
    pub fn pending(&self) -> usize {
        self.inner
            .as_ref()
            .map_or(0, |i| i.entries.len() - i.written)
    }

    /// Passes every pending string to `write`, in id order.
    ///
    /// A string is marked written only after `write` succeeds, so a failed
    /// call leaves it pending. Returns the number of strings written.
    pub fn drain_pending<F>(&mut self, mut write: F) -> DumpResult<usize>
    where
        F: FnMut(StringId, &str) -> DumpResult<()>,
    {
        let index = self.index_mut()?;
        let start = index.written;
        while index.written < index.entries.len() {
            let slot = index.written;
            #[allow(clippy::cast_possible_truncation)]
            let id = StringId::new(FIRST_STRING_ID + slot as u32);
            write(id, &index.entries[slot])?;
            index.written += 1;
        }
        Ok(index.written - start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn started() -> StringTable {
        let mut table = StringTable::new();
        table.startup();
        table
    }

    #[test]
    fn ids_are_sequential() {
        let mut table = started();
        assert_eq!(table.lookup_or_insert("a").unwrap(), StringId(FIRST_STRING_ID));
        assert_eq!(table.lookup_or_insert("b").unwrap(), StringId(FIRST_STRING_ID + 1));
        assert_eq!(table.lookup_or_insert("a").unwrap(), StringId(FIRST_STRING_ID));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn empty_string_is_interned() {
        let mut table = started();
        let id = table.lookup_or_insert("").unwrap();
        assert_eq!(table.get(id).unwrap(), "");
    }

    #[test]
    fn uninitialized_table_is_misuse() {
        let mut table = StringTable::new();
        let err = table.lookup_or_insert("x").unwrap_err();
        assert_eq!(err.site().component, Component::StringTable);
        assert_eq!(err.site().reason, Reason::TableUninitialized);

        table.startup();
        table.lookup_or_insert("x").unwrap();
        table.shutdown();
        assert!(table.get(StringId(FIRST_STRING_ID)).is_err());
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn unknown_id_is_misuse() {
        let table = started();
        let err = table.get(StringId(7)).unwrap_err();
        assert_eq!(err.site().reason, Reason::UnregisteredId);
    }

    #[test]
    fn drain_writes_each_string_once() {
        let mut table = started();
        table.lookup_or_insert("one").unwrap();
        table.lookup_or_insert("two").unwrap();

        let mut seen = Vec::new();
        let n = table
            .drain_pending(|id, s| {
                seen.push((id, s.to_string()));
                Ok(())
            })
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(table.pending(), 0);

        table.lookup_or_insert("one").unwrap();
        table.lookup_or_insert("three").unwrap();
        table
            .drain_pending(|id, s| {
                seen.push((id, s.to_string()));
                Ok(())
            })
            .unwrap();

        let names: Vec<_> = seen.iter().map(|(_, s)| s.as_str()).collect();
        assert_eq!(names, vec!["one", "two", "three"]);
        assert_eq!(seen[2].0, StringId(FIRST_STRING_ID + 2));
    }

    #[test]
    fn failed_write_stays_pending() {
        let mut table = started();
        table.lookup_or_insert("a").unwrap();
        table.lookup_or_insert("b").unwrap();

        let result = table.drain_pending(|id, _| {
            if id.as_u32() == FIRST_STRING_ID + 1 {
                Err(DumpError::misuse(Component::Context, Reason::PhaseOrder))
            } else {
                Ok(())
            }
        });
        assert!(result.is_err());
        assert_eq!(table.pending(), 1);
    }

    proptest! {
        #[test]
        fn interning_is_injective(strings in prop::collection::vec(".{0,12}", 1..64)) {
            let mut table = started();
            let ids: Vec<_> = strings
                .iter()
                .map(|s| table.lookup_or_insert(s).unwrap())
                .collect();
            for (i, a) in strings.iter().enumerate() {
                for (j, b) in strings.iter().enumerate() {
                    prop_assert_eq!(a == b, ids[i] == ids[j]);
                }
                prop_assert_eq!(table.get(ids[i]).unwrap(), a.as_str());
            }
        }
    }
}
