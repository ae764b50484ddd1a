//! Segment nodes of the path trie.

use std::collections::BTreeMap;

use crate::types::IndexedEntry;

/// One path segment. A node carries an entry when a full indexed path ends here.
#[derive(Debug, Default)]
pub struct TrieNode {
    pub children: BTreeMap<Box<str>, TrieNode>,
    pub entry: Option<IndexedEntry>,
}

impl TrieNode {
    /// True when the node holds nothing and can be pruned.
    pub fn is_vacant(&self) -> bool {
        self.entry.is_none() && self.children.is_empty()
    }

    /// Node at `segments`, if the path exists in the tree.
    pub fn find(&self, segments: &[&str]) -> Option<&TrieNode> {
        let mut node = self;
        for segment in segments {
            node = node.children.get(*segment)?;
        }
        Some(node)
    }

    pub fn find_mut(&mut self, segments: &[&str]) -> Option<&mut TrieNode> {
        let mut node = self;
        for segment in segments {
            node = node.children.get_mut(*segment)?;
        }
        Some(node)
    }

    /// Walks or creates the chain for `segments` and stores `entry` at its end.
    /// Returns the entry previously stored at that path.
    pub fn insert(&mut self, segments: &[&str], entry: IndexedEntry) -> Option<IndexedEntry> {
        let mut node = self;
        for segment in segments {
            node = node.children.entry((*segment).into()).or_default();
        }
        node.entry.replace(entry)
    }

    /// Removes the entry at `segments`, pruning ancestors left vacant.
    pub fn remove(&mut self, segments: &[&str]) -> Option<IndexedEntry> {
        let Some((first, rest)) = segments.split_first() else {
            return self.entry.take();
        };
        let child = self.children.get_mut(*first)?;
        let removed = child.remove(rest);
        if child.is_vacant() {
            self.children.remove(*first);
        }
        removed
    }

    /// Unlinks the subtree rooted at `segments`, pruning ancestors left vacant.
    pub fn detach(&mut self, segments: &[&str]) -> Option<TrieNode> {
        let (first, rest) = segments.split_first()?;
        if rest.is_empty() {
            return self.children.remove(*first);
        }
        let child = self.children.get_mut(*first)?;
        let detached = child.detach(rest);
        if child.is_vacant() {
            self.children.remove(*first);
        }
        detached
    }

    /// Consumes the subtree and returns every entry in it.
    pub fn into_entries(self) -> Vec<IndexedEntry> {
        let mut entries = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let Some(entry) = node.entry {
                entries.push(entry);
            }
            stack.extend(node.children.into_values());
        }
        entries
    }

    /// Borrows every entry in the subtree.
    pub fn entries(&self) -> Vec<&IndexedEntry> {
        let mut entries = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let Some(entry) = node.entry.as_ref() {
                entries.push(entry);
            }
            stack.extend(node.children.values());
        }
        entries
    }
}
