//! Dialogue response ordering
//!
//! Responses in a topic form a chain through their declared previous and
//! next ids. While files are loading, each response is spliced into a
//! per-topic list next to whichever neighbour is already known. Once the
//! whole load order is in, [`InfoOrder::finalize`] drops deleted responses
//! and rebuilds every chain from the declared links alone, so the result
//! does not depend on which file delivered which response first.

use std::collections::{BTreeSet, HashMap};

use esmweave_core::RecordId;
use esmweave_parsers::DialogueInfo;
use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, warn};

/// Ordering-relevant part of a response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InfoLink {
    pub id: RecordId,
    pub prev: Option<RecordId>,
    pub next: Option<RecordId>,
}

impl InfoLink {
    pub fn new(id: impl Into<RecordId>, prev: Option<&str>, next: Option<&str>) -> Self {
        Self {
            id: id.into(),
            prev: prev.map(RecordId::from),
            next: next.map(RecordId::from),
        }
    }

    pub fn from_info(info: &DialogueInfo) -> Self {
        let non_empty = |id: &RecordId| (!id.is_empty()).then(|| id.clone());
        Self {
            id: info.info.clone(),
            prev: non_empty(&info.prev),
            next: non_empty(&info.next),
        }
    }
}

/// A response neither of whose neighbours could be found
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnlinkedInfo {
    pub topic: RecordId,
    pub id: RecordId,
    pub prev: Option<RecordId>,
    pub next: Option<RecordId>,
}

#[derive(Debug, Clone)]
struct Node {
    link: InfoLink,
    prev: Option<usize>,
    next: Option<usize>,
    linked: bool,
    removed: bool,
}

/// One topic's responses: an arena of nodes threaded into a list
#[derive(Debug, Clone, Default)]
struct Chain {
    nodes: Vec<Node>,
    index: HashMap<RecordId, usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl Chain {
    fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    fn linked_slot(&self, id: &RecordId) -> Option<usize> {
        self.index
            .get(id)
            .copied()
            .filter(|&slot| self.nodes[slot].linked)
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = (self.nodes[slot].prev, self.nodes[slot].next);
        match prev {
            Some(p) => self.nodes[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.nodes[n].prev = prev,
            None => self.tail = prev,
        }
        let node = &mut self.nodes[slot];
        node.prev = None;
        node.next = None;
        node.linked = false;
    }

    fn push_back(&mut self, slot: usize) {
        self.nodes[slot].prev = self.tail;
        match self.tail {
            Some(t) => self.nodes[t].next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        self.nodes[slot].linked = true;
    }

    fn push_front(&mut self, slot: usize) {
        self.nodes[slot].next = self.head;
        match self.head {
            Some(h) => self.nodes[h].prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
        self.nodes[slot].linked = true;
    }

    fn insert_after(&mut self, anchor: usize, slot: usize) {
        match self.nodes[anchor].next {
            Some(next) => self.insert_before(next, slot),
            None => self.push_back(slot),
        }
    }

    fn insert_before(&mut self, anchor: usize, slot: usize) {
        let prev = self.nodes[anchor].prev;
        self.nodes[slot].prev = prev;
        self.nodes[slot].next = Some(anchor);
        self.nodes[anchor].prev = Some(slot);
        match prev {
            Some(p) => self.nodes[p].next = Some(slot),
            None => self.head = Some(slot),
        }
        self.nodes[slot].linked = true;
    }

    /// Slots in list order, then unlinked slots in arrival order
    fn working_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            order.push(slot);
            cursor = self.nodes[slot].next;
        }
        order.extend((0..self.nodes.len()).filter(|&slot| !self.nodes[slot].linked));
        order
    }
}

/// Per-topic response chains
#[derive(Debug, Clone, Default)]
pub struct InfoOrder {
    chains: IndexMap<RecordId, Chain>,
    finalized: bool,
}

impl InfoOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Topics in first-seen order
    pub fn topics(&self) -> impl Iterator<Item = &RecordId> {
        self.chains.keys()
    }

    /// Splice a response into its topic's chain.
    ///
    /// Deleted responses take part in ordering until [`finalize`] purges
    /// them.
    ///
    /// [`finalize`]: InfoOrder::finalize
    pub fn insert(&mut self, topic: &RecordId, entry: InfoLink, deleted: bool) {
        self.finalized = false;
        let chain = self.chains.entry(topic.clone()).or_default();

        let slot = match chain.index.get(&entry.id).copied() {
            Some(slot) => {
                if chain.nodes[slot].linked {
                    chain.unlink(slot);
                }
                chain.nodes[slot].link = entry;
                chain.nodes[slot].removed = deleted;
                slot
            }
            None => {
                let slot = chain.nodes.len();
                chain.index.insert(entry.id.clone(), slot);
                chain.nodes.push(Node {
                    link: entry,
                    prev: None,
                    next: None,
                    linked: false,
                    removed: deleted,
                });
                slot
            }
        };

        let link = chain.nodes[slot].link.clone();
        if chain.is_empty() || link.next.is_none() {
            chain.push_back(slot);
        } else if link.prev.is_none() {
            chain.push_front(slot);
        } else if let Some(anchor) = link.prev.as_ref().and_then(|p| chain.linked_slot(p)) {
            chain.insert_after(anchor, slot);
        } else if let Some(anchor) = link.next.as_ref().and_then(|n| chain.linked_slot(n)) {
            chain.insert_before(anchor, slot);
        } else {
            warn!(
                topic = %topic,
                info = %link.id,
                prev = ?link.prev,
                next = ?link.next,
                "Neither neighbour of response is known yet"
            );
        }
    }

    /// Purge deleted responses and rebuild every chain from its declared
    /// links. Returns the responses that still have no known neighbour;
    /// they are left out of [`ordered`](InfoOrder::ordered).
    pub fn finalize(&mut self) -> Vec<UnlinkedInfo> {
        let mut unlinked = Vec::new();
        for (topic, chain) in &mut self.chains {
            let (rebuilt, orphans) = rebuild(chain);
            for link in orphans {
                warn!(topic = %topic, info = %link.id, "Response could not be placed in its topic");
                unlinked.push(UnlinkedInfo {
                    topic: topic.clone(),
                    id: link.id,
                    prev: link.prev,
                    next: link.next,
                });
            }
            *chain = rebuilt;
        }
        self.finalized = true;
        debug!(topics = self.chains.len(), unlinked = unlinked.len(), "Finalized response chains");
        unlinked
    }

    /// Response ids of a topic in chain order, deleted ones excluded
    pub fn ordered(&self, topic: &RecordId) -> Vec<&RecordId> {
        let Some(chain) = self.chains.get(topic) else {
            return Vec::new();
        };
        let mut out = Vec::new();
        let mut cursor = chain.head;
        while let Some(slot) = cursor {
            let node = &chain.nodes[slot];
            if !node.removed {
                out.push(&node.link.id);
            }
            cursor = node.next;
        }
        out
    }

    /// Declared links of one response
    pub fn link(&self, topic: &RecordId, id: &RecordId) -> Option<&InfoLink> {
        let chain = self.chains.get(topic)?;
        chain.index.get(id).map(|&slot| &chain.nodes[slot].link)
    }
}

/// Order the live nodes of `chain` by their declared links.
///
/// Each declared `next` and each declared `prev` that names a live response
/// becomes an edge. Nodes are emitted in topological order; a node's own
/// successor is preferred so linked runs stay together, and ties fall back
/// to the working order. Nodes that were never placed during loading and
/// have no edge at all are returned separately.
fn rebuild(chain: &Chain) -> (Chain, Vec<InfoLink>) {
    let live: Vec<usize> = chain
        .working_order()
        .into_iter()
        .filter(|&slot| !chain.nodes[slot].removed)
        .collect();
    let position: HashMap<&RecordId, usize> = live
        .iter()
        .enumerate()
        .map(|(pos, &slot)| (&chain.nodes[slot].link.id, pos))
        .collect();

    let n = live.len();
    let mut succ: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    let mut has_edge = vec![false; n];
    for (pos, &slot) in live.iter().enumerate() {
        let link = &chain.nodes[slot].link;
        if let Some(&after) = link.next.as_ref().and_then(|id| position.get(id)) {
            if after != pos {
                succ[pos].insert(after);
            }
        }
        if let Some(&before) = link.prev.as_ref().and_then(|id| position.get(id)) {
            if before != pos {
                succ[before].insert(pos);
            }
        }
    }
    let mut indegree = vec![0usize; n];
    for (pos, targets) in succ.iter().enumerate() {
        if !targets.is_empty() {
            has_edge[pos] = true;
        }
        for &t in targets {
            indegree[t] += 1;
            has_edge[t] = true;
        }
    }

    let mut orphans = Vec::new();
    let mut emitted = vec![false; n];
    for pos in 0..n {
        let node = &chain.nodes[live[pos]];
        let declares_neighbour = node.link.prev.is_some() || node.link.next.is_some();
        if !node.linked && !has_edge[pos] && declares_neighbour {
            orphans.push(node.link.clone());
            emitted[pos] = true;
        }
    }

    let mut ready: BTreeSet<usize> = (0..n)
        .filter(|&pos| !emitted[pos] && indegree[pos] == 0)
        .collect();
    let mut order = Vec::with_capacity(n);
    let mut last: Option<usize> = None;
    loop {
        let preferred = last.and_then(|l| succ[l].iter().copied().find(|s| ready.contains(s)));
        let next = match preferred.or_else(|| ready.first().copied()) {
            Some(pos) => pos,
            // Only cycles remain; break one at its earliest member.
            None => match (0..n).find(|&pos| !emitted[pos]) {
                Some(pos) => pos,
                None => break,
            },
        };
        ready.remove(&next);
        emitted[next] = true;
        order.push(next);
        for &t in &succ[next] {
            indegree[t] = indegree[t].saturating_sub(1);
            if indegree[t] == 0 && !emitted[t] {
                ready.insert(t);
            }
        }
        last = Some(next);
    }

    let mut rebuilt = Chain::default();
    for pos in order {
        let slot = rebuilt.nodes.len();
        let link = chain.nodes[live[pos]].link.clone();
        rebuilt.index.insert(link.id.clone(), slot);
        rebuilt.nodes.push(Node {
            link,
            prev: None,
            next: None,
            linked: false,
            removed: false,
        });
        rebuilt.push_back(slot);
    }
    (rebuilt, orphans)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topic() -> RecordId {
        RecordId::from("Background")
    }

    fn names(order: &InfoOrder) -> Vec<String> {
        order
            .ordered(&topic())
            .into_iter()
            .map(|id| id.as_str().to_string())
            .collect()
    }

    fn permutations(items: &[InfoLink]) -> Vec<Vec<InfoLink>> {
        if items.len() <= 1 {
            return vec![items.to_vec()];
        }
        let mut out = Vec::new();
        for i in 0..items.len() {
            let mut rest = items.to_vec();
            let head = rest.remove(i);
            for mut tail in permutations(&rest) {
                tail.insert(0, head.clone());
                out.push(tail);
            }
        }
        out
    }

    #[test]
    fn test_chain_in_any_file_order() {
        let links = [
            InfoLink::new("A", None, Some("B")),
            InfoLink::new("B", Some("A"), None),
            InfoLink::new("C", Some("B"), None),
        ];
        for perm in permutations(&links) {
            let mut order = InfoOrder::new();
            for link in perm.clone() {
                order.insert(&topic(), link, false);
            }
            assert!(order.finalize().is_empty());
            assert_eq!(names(&order), ["A", "B", "C"], "arrival order {perm:?}");
        }
    }

    #[test]
    fn test_insertion_rules_before_finalize() {
        let mut order = InfoOrder::new();
        order.insert(&topic(), InfoLink::new("B", Some("A"), None), false);
        // prev empty with a next: goes to the front
        order.insert(&topic(), InfoLink::new("A", None, Some("B")), false);
        // known prev: straight after it
        order.insert(&topic(), InfoLink::new("X", Some("A"), Some("B")), false);
        assert_eq!(names(&order), ["A", "X", "B"]);

        // known next only: straight before it
        order.insert(&topic(), InfoLink::new("W", Some("missing"), Some("X")), false);
        assert_eq!(names(&order), ["A", "W", "X", "B"]);
    }

    #[test]
    fn test_reinsert_moves_entry() {
        let mut order = InfoOrder::new();
        order.insert(&topic(), InfoLink::new("A", None, None), false);
        order.insert(&topic(), InfoLink::new("B", Some("A"), None), false);
        order.insert(&topic(), InfoLink::new("A", Some("B"), Some("C")), false);
        assert_eq!(names(&order), ["B", "A"]);
    }

    #[test]
    fn test_plugin_inserts_between() {
        let mut order = InfoOrder::new();
        order.insert(&topic(), InfoLink::new("A", None, Some("C")), false);
        order.insert(&topic(), InfoLink::new("C", Some("A"), None), false);
        order.insert(&topic(), InfoLink::new("B", Some("A"), Some("C")), false);
        order.finalize();
        assert_eq!(names(&order), ["A", "B", "C"]);
    }

    #[test]
    fn test_deleted_purged_on_finalize() {
        let mut order = InfoOrder::new();
        order.insert(&topic(), InfoLink::new("A", None, Some("B")), false);
        order.insert(&topic(), InfoLink::new("B", Some("A"), Some("C")), false);
        order.insert(&topic(), InfoLink::new("C", Some("B"), None), false);
        order.insert(&topic(), InfoLink::new("B", Some("A"), Some("C")), true);
        assert_eq!(names(&order), ["A", "C"]);

        assert!(order.finalize().is_empty());
        assert_eq!(names(&order), ["A", "C"]);
        assert!(order.link(&topic(), &"B".into()).is_none());
    }

    #[test]
    fn test_orphan_resolved_by_later_neighbour() {
        let mut order = InfoOrder::new();
        order.insert(&topic(), InfoLink::new("A", None, Some("B")), false);
        order.insert(&topic(), InfoLink::new("C", Some("B"), Some("D")), false);
        order.insert(&topic(), InfoLink::new("B", Some("A"), Some("C")), false);
        assert!(order.finalize().is_empty());
        assert_eq!(names(&order), ["A", "B", "C"]);
    }

    #[test]
    fn test_unresolved_orphan_reported() {
        let mut order = InfoOrder::new();
        order.insert(&topic(), InfoLink::new("A", None, None), false);
        order.insert(&topic(), InfoLink::new("Z", Some("gone"), Some("away")), false);
        let unlinked = order.finalize();
        assert_eq!(unlinked.len(), 1);
        assert_eq!(unlinked[0].id, RecordId::from("Z"));
        assert_eq!(names(&order), ["A"]);
    }

    #[test]
    fn test_topics_case_insensitive() {
        let mut order = InfoOrder::new();
        order.insert(&RecordId::from("background"), InfoLink::new("A", None, None), false);
        order.insert(&RecordId::from("BACKGROUND"), InfoLink::new("B", Some("A"), None), false);
        assert_eq!(order.topics().count(), 1);
        assert_eq!(names(&order), ["A", "B"]);
    }

    #[test]
    fn test_cycle_does_not_hang() {
        let mut order = InfoOrder::new();
        order.insert(&topic(), InfoLink::new("A", Some("B"), Some("B")), false);
        order.insert(&topic(), InfoLink::new("B", Some("A"), Some("A")), false);
        order.finalize();
        assert_eq!(order.ordered(&topic()).len(), 2);
    }
}
