//! Layered record container
//!
//! Each identity holds at most a base value (from master files) and a
//! modified value (from plugins), plus the state that says which of them
//! is current. Entries keep their first-insertion position so iteration
//! follows load order.

use std::io::Write;

use esmweave_parsers::{EsmRecord, EsmWriter, Identified, ParseResult};
use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

/// Which layers of an entry are populated, and whether it is a tombstone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum RecordState {
    BaseOnly,
    ModifiedOnly,
    Modified,
    Deleted,
}

/// One of the two value slots of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Layer {
    Base,
    Modified,
}

/// A deletion named an identity no earlier file defined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("record not found; deletion ignored")]
pub struct NotFoundIgnored;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(bound(serialize = "T: Serialize, T::Id: Serialize"))]
pub struct Entry<T: Identified> {
    id: T::Id,
    base: Option<T>,
    modified: Option<T>,
    state: RecordState,
}

impl<T: Identified> Entry<T> {
    pub fn id(&self) -> &T::Id {
        &self.id
    }

    pub fn base(&self) -> Option<&T> {
        self.base.as_ref()
    }

    pub fn modified(&self) -> Option<&T> {
        self.modified.as_ref()
    }

    pub fn state(&self) -> RecordState {
        self.state
    }

    pub fn is_deleted(&self) -> bool {
        self.state == RecordState::Deleted
    }

    /// Resolved value; `None` for tombstones
    pub fn current(&self) -> Option<&T> {
        match self.state {
            RecordState::Deleted => None,
            RecordState::BaseOnly => self.base.as_ref(),
            RecordState::ModifiedOnly | RecordState::Modified => self.modified.as_ref(),
        }
    }

    /// Value a tombstone is written with: the last modification, else the base
    pub fn last_known(&self) -> Option<&T> {
        self.modified.as_ref().or(self.base.as_ref())
    }

    pub fn layer(&self, layer: Layer) -> Option<&T> {
        match layer {
            Layer::Base => self.base.as_ref(),
            Layer::Modified => self.modified.as_ref(),
        }
    }
}

/// Live/modified/deleted tallies of a container
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CollectionStats {
    pub base_only: usize,
    pub modified_only: usize,
    pub modified: usize,
    pub deleted: usize,
}

impl CollectionStats {
    pub fn live(&self) -> usize {
        self.base_only + self.modified_only + self.modified
    }
}

/// Overlay container for one record kind
#[derive(Debug, Clone)]
pub struct Collection<T: Identified> {
    entries: IndexMap<T::Id, Entry<T>>,
}

impl<T: Identified> Default for Collection<T> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<T: Identified + Clone> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows, tombstones included
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of a live entry
    pub fn search(&self, id: &T::Id) -> Option<usize> {
        self.entries
            .get_full(id)
            .filter(|(_, _, entry)| !entry.is_deleted())
            .map(|(index, _, _)| index)
    }

    /// Position of any entry, tombstones included
    pub fn search_any(&self, id: &T::Id) -> Option<usize> {
        self.entries.get_index_of(id)
    }

    pub fn get(&self, index: usize) -> Option<&Entry<T>> {
        self.entries.get_index(index).map(|(_, entry)| entry)
    }

    /// Entry by identity, tombstones included
    pub fn get_by_id(&self, id: &T::Id) -> Option<&Entry<T>> {
        self.entries.get(id)
    }

    /// Resolved value of a live entry
    pub fn find(&self, id: &T::Id) -> Option<&T> {
        self.entries.get(id).and_then(Entry::current)
    }

    pub fn has_identity(&self, id: &T::Id) -> bool {
        self.search(id).is_some()
    }

    /// Add a value from a master file
    pub fn load_from_base(&mut self, value: T) {
        let id = value.id();
        match self.entries.get_mut(&id) {
            None => {
                self.entries.insert(
                    id.clone(),
                    Entry {
                        id,
                        base: Some(value),
                        modified: None,
                        state: RecordState::BaseOnly,
                    },
                );
            }
            Some(entry) => match entry.state {
                RecordState::BaseOnly | RecordState::Deleted => entry.base = Some(value),
                RecordState::Modified | RecordState::ModifiedOnly => {
                    Self::merge_into(entry, value);
                }
            },
        }
    }

    /// Add a value from a plugin
    pub fn load_from_plugin(&mut self, value: T) {
        let id = value.id();
        match self.entries.get_mut(&id) {
            None => {
                self.entries.insert(
                    id.clone(),
                    Entry {
                        id,
                        base: None,
                        modified: Some(value),
                        state: RecordState::ModifiedOnly,
                    },
                );
            }
            Some(entry) => {
                entry.modified = Some(value);
                entry.state = if entry.base.is_some() {
                    RecordState::Modified
                } else {
                    RecordState::ModifiedOnly
                };
            }
        }
    }

    /// Add a value to the given layer
    pub fn load(&mut self, value: T, layer: Layer) {
        match layer {
            Layer::Base => self.load_from_base(value),
            Layer::Modified => self.load_from_plugin(value),
        }
    }

    /// Replace the base under an existing modification, keeping the
    /// modification as is. Inserts a base-only entry when `value` is new.
    pub fn merge_base_into_modified(&mut self, value: T) {
        let id = value.id();
        match self.entries.get_mut(&id) {
            Some(entry) => Self::merge_into(entry, value),
            None => self.load_from_base(value),
        }
    }

    fn merge_into(entry: &mut Entry<T>, value: T) {
        entry.base = Some(value);
        if entry.state == RecordState::ModifiedOnly {
            entry.state = RecordState::Modified;
        }
    }

    /// Delete an identity.
    ///
    /// A master-level deletion removes the row entirely; a plugin-level one
    /// leaves a tombstone that still carries the earlier values.
    pub fn mark_deleted(&mut self, id: &T::Id, from_base: bool) -> Result<(), NotFoundIgnored> {
        if from_base {
            return self
                .entries
                .shift_remove(id)
                .map(|_| ())
                .ok_or(NotFoundIgnored);
        }
        let entry = self.entries.get_mut(id).ok_or(NotFoundIgnored)?;
        entry.state = RecordState::Deleted;
        Ok(())
    }

    /// Identities in first-insertion order
    pub fn ids_in_order(&self, include_deleted: bool) -> Vec<&T::Id> {
        self.entries
            .values()
            .filter(|entry| include_deleted || !entry.is_deleted())
            .map(|entry| &entry.id)
            .collect()
    }

    /// Live identities sorted for display
    pub fn sorted_ids(&self) -> Vec<&T::Id> {
        let mut ids = self.ids_in_order(false);
        ids.sort();
        ids
    }

    /// Live entries in load order
    pub fn iter(&self) -> impl Iterator<Item = &Entry<T>> {
        self.entries.values().filter(|entry| !entry.is_deleted())
    }

    /// Every entry, tombstones included
    pub fn iter_all(&self) -> impl Iterator<Item = &Entry<T>> {
        self.entries.values()
    }

    /// Entries that differ from the masters: modified, added or deleted
    pub fn changed(&self) -> impl Iterator<Item = &Entry<T>> {
        self.entries
            .values()
            .filter(|entry| entry.state != RecordState::BaseOnly)
    }

    pub fn stats(&self) -> CollectionStats {
        let mut stats = CollectionStats::default();
        for entry in self.entries.values() {
            match entry.state {
                RecordState::BaseOnly => stats.base_only += 1,
                RecordState::ModifiedOnly => stats.modified_only += 1,
                RecordState::Modified => stats.modified += 1,
                RecordState::Deleted => stats.deleted += 1,
            }
        }
        stats
    }
}

impl<T: EsmRecord> Collection<T> {
    /// Write one layer of an entry as a complete record.
    ///
    /// Tombstones are written as their id plus a deletion marker, whichever
    /// layer is asked for. Returns `false` when there is nothing to write.
    pub fn write_entry<W: Write>(
        &self,
        id: &T::Id,
        layer: Layer,
        writer: &mut EsmWriter<W>,
    ) -> ParseResult<bool> {
        let Some(entry) = self.entries.get(id) else {
            return Ok(false);
        };
        if entry.is_deleted() {
            return match entry.last_known() {
                Some(value) => value.write_record(writer, true).map(|()| true),
                None => Ok(false),
            };
        }
        match entry.layer(layer) {
            Some(value) => value.write_record(writer, false).map(|()| true),
            None => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use esmweave_core::RecordId;
    use esmweave_parsers::{Creature, VarType};
    use esmweave_parsers::{EsmReader, Global};
    use std::io::Cursor;

    fn rat(health: i32) -> Creature {
        Creature::new("rat_01", health)
    }

    fn id(s: &str) -> RecordId {
        RecordId::from(s)
    }

    #[test]
    fn test_base_then_plugin() {
        let mut c = Collection::new();
        c.load_from_base(rat(10));
        assert_eq!(c.get_by_id(&id("rat_01")).unwrap().state(), RecordState::BaseOnly);

        c.load_from_plugin(rat(20));
        let entry = c.get_by_id(&id("rat_01")).unwrap();
        assert_eq!(entry.state(), RecordState::Modified);
        assert_eq!(entry.base().unwrap().stats.health, 10);
        assert_eq!(entry.modified().unwrap().stats.health, 20);
        assert_eq!(c.find(&id("RAT_01")).unwrap().stats.health, 20);
    }

    #[test]
    fn test_plugin_only() {
        let mut c = Collection::new();
        c.load_from_plugin(rat(5));
        assert_eq!(c.get(0).unwrap().state(), RecordState::ModifiedOnly);
        assert!(c.get(0).unwrap().base().is_none());
    }

    #[test]
    fn test_base_overwrites_base() {
        let mut c = Collection::new();
        c.load_from_base(rat(10));
        c.load_from_base(rat(11));
        assert_eq!(c.len(), 1);
        assert_eq!(c.find(&id("rat_01")).unwrap().stats.health, 11);
    }

    #[test]
    fn test_later_master_keeps_modification() {
        let mut c = Collection::new();
        c.load_from_base(rat(10));
        c.load_from_plugin(rat(20));
        c.load_from_base(rat(30));

        let entry = c.get_by_id(&id("rat_01")).unwrap();
        assert_eq!(entry.state(), RecordState::Modified);
        assert_eq!(entry.base().unwrap().stats.health, 30);
        assert_eq!(entry.current().unwrap().stats.health, 20);
    }

    #[test]
    fn test_merge_base_under_plugin_only() {
        let mut c = Collection::new();
        c.load_from_plugin(rat(20));
        c.merge_base_into_modified(rat(10));
        let entry = c.get_by_id(&id("rat_01")).unwrap();
        assert_eq!(entry.state(), RecordState::Modified);
        assert_eq!(entry.modified().unwrap().stats.health, 20);
    }

    #[test]
    fn test_master_delete_leaves_no_trace() {
        let mut c = Collection::new();
        c.load_from_base(rat(10));
        c.load_from_base(Creature::new("mudcrab", 8));
        c.mark_deleted(&id("rat_01"), true).unwrap();

        assert!(c.search_any(&id("rat_01")).is_none());
        assert_eq!(c.ids_in_order(true), vec![&id("mudcrab")]);
        assert_eq!(c.search(&id("mudcrab")), Some(0));
    }

    #[test]
    fn test_plugin_delete_is_tombstone() {
        let mut c = Collection::new();
        c.load_from_base(rat(10));
        c.load_from_plugin(rat(20));
        c.mark_deleted(&id("rat_01"), false).unwrap();

        assert!(c.search(&id("rat_01")).is_none());
        assert_eq!(c.search_any(&id("rat_01")), Some(0));
        assert!(c.find(&id("rat_01")).is_none());
        assert!(c.ids_in_order(false).is_empty());

        let entry = c.get_by_id(&id("rat_01")).unwrap();
        assert_eq!(entry.state(), RecordState::Deleted);
        assert_eq!(entry.base().unwrap().stats.health, 10);
        assert_eq!(entry.modified().unwrap().stats.health, 20);
    }

    #[test]
    fn test_undelete() {
        let mut c = Collection::new();
        c.load_from_base(rat(10));
        c.mark_deleted(&id("rat_01"), false).unwrap();
        c.load_from_plugin(rat(40));
        assert_eq!(c.get(0).unwrap().state(), RecordState::Modified);
        assert_eq!(c.search(&id("rat_01")), Some(0));

        let mut plugin_only = Collection::new();
        plugin_only.load_from_plugin(rat(1));
        plugin_only.mark_deleted(&id("rat_01"), false).unwrap();
        plugin_only.load_from_plugin(rat(2));
        assert_eq!(plugin_only.get(0).unwrap().state(), RecordState::ModifiedOnly);
    }

    #[test]
    fn test_base_under_tombstone_keeps_tombstone() {
        let mut c = Collection::new();
        c.load_from_base(rat(10));
        c.mark_deleted(&id("rat_01"), false).unwrap();
        c.load_from_base(rat(12));
        let entry = c.get_by_id(&id("rat_01")).unwrap();
        assert_eq!(entry.state(), RecordState::Deleted);
        assert_eq!(entry.base().unwrap().stats.health, 12);
    }

    #[test]
    fn test_unknown_delete_ignored() {
        let mut c: Collection<Creature> = Collection::new();
        assert_eq!(c.mark_deleted(&id("ghost"), false), Err(NotFoundIgnored));
        assert_eq!(c.mark_deleted(&id("ghost"), true), Err(NotFoundIgnored));
        assert!(c.is_empty());
    }

    #[test]
    fn test_case_insensitive_merge() {
        let mut c = Collection::new();
        c.load_from_base(Creature::new("Foobar", 1));
        c.load_from_plugin(Creature::new("foobar", 2));
        assert_eq!(c.len(), 1);
        assert_eq!(c.get(0).unwrap().state(), RecordState::Modified);
        // First spelling is kept as the key.
        assert_eq!(c.ids_in_order(false)[0].as_str(), "Foobar");
    }

    #[test]
    fn test_order_and_sorted_ids() {
        let mut c = Collection::new();
        for name in ["zeta", "Alpha", "mid"] {
            c.load_from_base(Creature::new(name, 1));
        }
        let order: Vec<_> = c.ids_in_order(false).into_iter().map(RecordId::as_str).collect();
        assert_eq!(order, ["zeta", "Alpha", "mid"]);
        let sorted: Vec<_> = c.sorted_ids().into_iter().map(RecordId::as_str).collect();
        assert_eq!(sorted, ["Alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_stats_and_changed() {
        let mut c = Collection::new();
        c.load_from_base(Creature::new("a", 1));
        c.load_from_base(Creature::new("b", 1));
        c.load_from_plugin(Creature::new("b", 2));
        c.load_from_plugin(Creature::new("c", 3));
        c.mark_deleted(&id("a"), false).unwrap();

        let stats = c.stats();
        assert_eq!(stats.live(), 2);
        assert_eq!(stats.deleted, 1);
        assert_eq!(c.changed().count(), 3);
        assert_eq!(c.iter().count(), 2);
    }

    #[test]
    fn test_snapshot_is_independent() {
        let mut c = Collection::new();
        c.load_from_base(rat(10));
        let snapshot = c.clone();
        c.load_from_plugin(rat(20));
        assert_eq!(snapshot.find(&id("rat_01")).unwrap().stats.health, 10);
    }

    #[test]
    fn test_write_entry_layers() {
        let mut c = Collection::new();
        c.load_from_base(Global::new("Gold", VarType::Long, 1.0));
        c.load_from_plugin(Global::new("Gold", VarType::Long, 2.0));

        let mut writer = EsmWriter::new(Vec::new());
        assert!(c.write_entry(&id("gold"), Layer::Modified, &mut writer).unwrap());
        assert!(c.write_entry(&id("gold"), Layer::Base, &mut writer).unwrap());
        assert!(!c.write_entry(&id("silver"), Layer::Base, &mut writer).unwrap());

        let mut reader = EsmReader::new(Cursor::new(writer.into_inner()), "out.esp").unwrap();
        reader.read_record_header().unwrap();
        assert_eq!(Global::load(&mut reader).unwrap().record.value, 2.0);
        reader.read_record_header().unwrap();
        assert_eq!(Global::load(&mut reader).unwrap().record.value, 1.0);
    }

    #[test]
    fn test_write_tombstone() {
        let mut c = Collection::new();
        c.load_from_base(Global::new("Gold", VarType::Long, 1.0));
        c.mark_deleted(&id("gold"), false).unwrap();

        let mut writer = EsmWriter::new(Vec::new());
        assert!(c.write_entry(&id("gold"), Layer::Modified, &mut writer).unwrap());

        let mut reader = EsmReader::new(Cursor::new(writer.into_inner()), "out.esp").unwrap();
        let header = reader.read_record_header().unwrap().unwrap();
        assert!(header.is_deleted());
        let loaded = Global::load(&mut reader).unwrap();
        assert!(loaded.deleted);
        assert_eq!(loaded.record.id, id("Gold"));
    }
}

#[cfg(test)]
mod proptest_tests {
    use super::*;
    use esmweave_core::RecordId;
    use esmweave_parsers::Creature;
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Touch {
        Define(i32),
        Delete,
    }

    fn touch() -> impl Strategy<Value = Touch> {
        prop_oneof![
            3 => (1..1000i32).prop_map(Touch::Define),
            1 => Just(Touch::Delete),
        ]
    }

    proptest! {
        /// The last non-delete contribution wins unless a later plugin
        /// deleted the record.
        #[test]
        fn test_overlay_precedence(
            master in 1..1000i32,
            touches in proptest::collection::vec(touch(), 0..8),
        ) {
            let mut c = Collection::new();
            c.load_from_base(Creature::new("rat_01", master));
            let mut expected = Some(master);
            for t in &touches {
                match t {
                    Touch::Define(health) => {
                        c.load_from_plugin(Creature::new("rat_01", *health));
                        expected = Some(*health);
                    }
                    Touch::Delete => {
                        c.mark_deleted(&RecordId::from("rat_01"), false).unwrap();
                        expected = None;
                    }
                }
            }
            let resolved = c.find(&RecordId::from("RAT_01")).map(|r| r.stats.health);
            prop_assert_eq!(resolved, expected);
            prop_assert_eq!(c.len(), 1);
            let base = c.get(0).and_then(Entry::base).map(|r| r.stats.health);
            prop_assert_eq!(base, Some(master));
        }
    }
}
