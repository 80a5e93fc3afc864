//! Per-cell reference lists
//!
//! Every cell that received references gets a summary listing their
//! reference numbers by role. Summaries are shared through `Arc` and never
//! mutated once stored: each contribution clones the previous summary,
//! edits the clone and stores it through the overlay container, so anyone
//! still holding the old `Arc` keeps a consistent view.

use std::sync::Arc;

use esmweave_core::{CellId, RefNum};
use esmweave_parsers::{Identified, ReferenceRole};
use serde::Serialize;

use crate::collection::{Collection, Entry, Layer};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellGroupSummary {
    pub cell: CellId,
    pub persistent: Vec<RefNum>,
    pub temporary: Vec<RefNum>,
    pub visible_distant: Vec<RefNum>,
}

impl CellGroupSummary {
    pub fn new(cell: CellId) -> Self {
        Self {
            cell,
            persistent: Vec::new(),
            temporary: Vec::new(),
            visible_distant: Vec::new(),
        }
    }

    pub fn list(&self, role: ReferenceRole) -> &[RefNum] {
        match role {
            ReferenceRole::Persistent => &self.persistent,
            ReferenceRole::Temporary => &self.temporary,
            ReferenceRole::VisibleDistant => &self.visible_distant,
        }
    }

    fn list_mut(&mut self, role: ReferenceRole) -> &mut Vec<RefNum> {
        match role {
            ReferenceRole::Persistent => &mut self.persistent,
            ReferenceRole::Temporary => &mut self.temporary,
            ReferenceRole::VisibleDistant => &mut self.visible_distant,
        }
    }

    /// Role a reference is currently listed under
    pub fn role_of(&self, refnum: RefNum) -> Option<ReferenceRole> {
        [
            ReferenceRole::Persistent,
            ReferenceRole::Temporary,
            ReferenceRole::VisibleDistant,
        ]
        .into_iter()
        .find(|&role| self.list(role).contains(&refnum))
    }

    pub fn len(&self) -> usize {
        self.persistent.len() + self.temporary.len() + self.visible_distant.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// List a reference under `role`, moving it if it was listed elsewhere
    pub fn add(&mut self, refnum: RefNum, role: ReferenceRole) {
        if self.role_of(refnum) == Some(role) {
            return;
        }
        self.remove(refnum);
        self.list_mut(role).push(refnum);
    }

    /// Drop a reference from whichever list holds it
    pub fn remove(&mut self, refnum: RefNum) -> bool {
        let mut found = false;
        for list in [&mut self.persistent, &mut self.temporary, &mut self.visible_distant] {
            let before = list.len();
            list.retain(|r| *r != refnum);
            found |= list.len() != before;
        }
        found
    }
}

impl Identified for CellGroupSummary {
    type Id = CellId;

    fn id(&self) -> CellId {
        self.cell.clone()
    }
}

/// Reference summaries for every cell, layered like any other record
#[derive(Debug, Clone, Default)]
pub struct CellGroups {
    groups: Collection<Arc<CellGroupSummary>>,
}

impl CellGroups {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one reference read under `cell`.
    ///
    /// A deleted reference is removed from the summary; deleting from a
    /// cell that has no summary yet is a no-op.
    pub fn add_reference(
        &mut self,
        cell: &CellId,
        refnum: RefNum,
        role: ReferenceRole,
        deleted: bool,
        layer: Layer,
    ) {
        let previous = self.groups.get_by_id(cell).and_then(|entry| match layer {
            Layer::Base => entry.base(),
            Layer::Modified => entry.modified().or_else(|| entry.base()),
        });

        let mut summary = match previous {
            Some(previous) => CellGroupSummary::clone(previous),
            None if deleted => return,
            None => CellGroupSummary::new(cell.clone()),
        };
        if deleted {
            summary.remove(refnum);
        } else {
            summary.add(refnum, role);
        }
        self.groups.load(Arc::new(summary), layer);
    }

    /// Current summary of a cell
    pub fn get(&self, cell: &CellId) -> Option<Arc<CellGroupSummary>> {
        self.groups.find(cell).cloned()
    }

    pub fn entry(&self, cell: &CellId) -> Option<&Entry<Arc<CellGroupSummary>>> {
        self.groups.get_by_id(cell)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Cells with references, in first-seen order
    pub fn cells(&self) -> Vec<&CellId> {
        self.groups.ids_in_order(false)
    }

    pub fn collection(&self) -> &Collection<Arc<CellGroupSummary>> {
        &self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seyda() -> CellId {
        CellId::Interior("Seyda Neen, Arrille's Tradehouse".into())
    }

    #[test]
    fn test_summary_created_lazily() {
        let mut groups = CellGroups::new();
        assert!(groups.get(&seyda()).is_none());

        groups.add_reference(&seyda(), RefNum::new(1, 0), ReferenceRole::Persistent, false, Layer::Base);
        groups.add_reference(&seyda(), RefNum::new(2, 0), ReferenceRole::Temporary, false, Layer::Base);

        let summary = groups.get(&seyda()).unwrap();
        assert_eq!(summary.persistent, [RefNum::new(1, 0)]);
        assert_eq!(summary.temporary, [RefNum::new(2, 0)]);
        assert_eq!(groups.cells(), vec![&seyda()]);
    }

    #[test]
    fn test_copy_on_write() {
        let mut groups = CellGroups::new();
        groups.add_reference(&seyda(), RefNum::new(1, 0), ReferenceRole::Temporary, false, Layer::Base);
        let held = groups.get(&seyda()).unwrap();

        groups.add_reference(&seyda(), RefNum::new(2, 1), ReferenceRole::Temporary, false, Layer::Modified);
        let newer = groups.get(&seyda()).unwrap();

        assert_eq!(held.temporary.len(), 1);
        assert_eq!(newer.temporary.len(), 2);
        assert!(!Arc::ptr_eq(&held, &newer));

        let entry = groups.entry(&seyda()).unwrap();
        assert_eq!(entry.base().unwrap().len(), 1);
        assert_eq!(entry.modified().unwrap().len(), 2);
    }

    #[test]
    fn test_deleted_reference_removed() {
        let mut groups = CellGroups::new();
        let r = RefNum::new(7, 0);
        groups.add_reference(&seyda(), r, ReferenceRole::Temporary, false, Layer::Base);
        groups.add_reference(&seyda(), r, ReferenceRole::Temporary, true, Layer::Modified);
        assert!(groups.get(&seyda()).unwrap().is_empty());

        // Removing again, or from an unknown cell, changes nothing.
        groups.add_reference(&seyda(), r, ReferenceRole::Temporary, true, Layer::Modified);
        groups.add_reference(&CellId::Exterior { x: 0, y: 0 }, r, ReferenceRole::Temporary, true, Layer::Modified);
        assert_eq!(groups.len(), 1);
    }

    #[test]
    fn test_role_change_moves_reference() {
        let mut summary = CellGroupSummary::new(seyda());
        let r = RefNum::new(3, 0);
        summary.add(r, ReferenceRole::Persistent);
        summary.add(r, ReferenceRole::VisibleDistant);
        assert_eq!(summary.role_of(r), Some(ReferenceRole::VisibleDistant));
        assert_eq!(summary.len(), 1);
    }

    #[test]
    fn test_base_contribution_builds_on_base() {
        let mut groups = CellGroups::new();
        groups.add_reference(&seyda(), RefNum::new(1, 0), ReferenceRole::Temporary, false, Layer::Base);
        groups.add_reference(&seyda(), RefNum::new(9, 1), ReferenceRole::Temporary, false, Layer::Modified);
        groups.add_reference(&seyda(), RefNum::new(2, 2), ReferenceRole::Temporary, false, Layer::Base);

        let entry = groups.entry(&seyda()).unwrap();
        assert_eq!(entry.base().unwrap().temporary, [RefNum::new(1, 0), RefNum::new(2, 2)]);
        assert_eq!(entry.modified().unwrap().temporary, [RefNum::new(1, 0), RefNum::new(9, 1)]);
    }
}
