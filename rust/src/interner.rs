//! Dense integer ids for graph traversal.
//!
//! Cycle search and topological ordering run over `Vec`-indexed state, so task
//! ids are mapped to `u32` once per call.

use rustc_hash::FxHashMap;

/// Interned task id.
pub type NodeId = u32;

/// Bidirectional task-id <-> `NodeId` table.
#[derive(Debug, Clone, Default)]
pub struct NodeInterner {
    to_node: FxHashMap<String, NodeId>,
    from_node: Vec<String>,
}

impl NodeInterner {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            to_node: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            from_node: Vec::with_capacity(capacity),
        }
    }

    /// Intern every id in order. Duplicates keep their first id.
    pub fn from_ids<'s>(ids: impl IntoIterator<Item = &'s str>) -> Self {
        let ids = ids.into_iter();
        let mut interner = Self::with_capacity(ids.size_hint().0);
        for id in ids {
            interner.intern(id);
        }
        interner
    }

    /// Returns the existing id when `s` was seen before.
    pub fn intern(&mut self, s: &str) -> NodeId {
        if let Some(&id) = self.to_node.get(s) {
            return id;
        }
        let id = self.from_node.len() as NodeId;
        self.from_node.push(s.to_string());
        self.to_node.insert(s.to_string(), id);
        id
    }

    #[inline]
    pub fn get(&self, s: &str) -> Option<NodeId> {
        self.to_node.get(s).copied()
    }

    #[inline]
    pub fn resolve(&self, id: NodeId) -> &str {
        self.from_node
            .get(id as usize)
            .map(|s| s.as_str())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.from_node.len()
    }

    pub fn is_empty(&self) -> bool {
        self.from_node.is_empty()
    }
}
