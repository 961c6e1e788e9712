//! Parent/children bookkeeping for one root pull

use std::collections::HashMap;
use std::hash::Hash;

use super::tree::NodeId;

/// Children of one join pair, keyed by their parent element
pub type JoinMapping<T> = HashMap<T, Vec<T>>;

/// Raw result of walking the join tree for one root element
///
/// Maps a parent element (tagged with its tree node) to its joined children in
/// arrival order. Built fresh for every root pull and discarded once the
/// callback has consumed the derived [`Joins`].
#[derive(Debug, Clone)]
pub struct ParentChildrenMap<T> {
    entries: HashMap<(NodeId, T), Vec<(NodeId, T)>>,
    children: usize,
}

impl<T> Default for ParentChildrenMap<T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
            children: 0,
        }
    }
}

impl<T: Clone + Eq + Hash> ParentChildrenMap<T> {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a child element to its parent
    pub fn attach(&mut self, parent_node: NodeId, parent: &T, child_node: NodeId, child: T) {
        self.entries
            .entry((parent_node, parent.clone()))
            .or_default()
            .push((child_node, child));
        self.children += 1;
    }

    /// Children attached to a parent, in arrival order
    pub fn children(&self, parent_node: NodeId, parent: &T) -> &[(NodeId, T)] {
        self.entries
            .get(&(parent_node, parent.clone()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Iterate over `(parent node, parent, children)` entries
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &T, &[(NodeId, T)])> {
        self.entries
            .iter()
            .map(|((node, parent), children)| (*node, parent, children.as_slice()))
    }

    /// Number of attached children
    pub fn len(&self) -> usize {
        self.children
    }

    /// Returns true when no child has been attached
    pub fn is_empty(&self) -> bool {
        self.children == 0
    }
}

/// Per-pair join mappings handed to the processing callback
///
/// One slot per declared join pair, in declaration order. Slots are addressable
/// by pair name or by position.
#[derive(Debug, Clone)]
pub struct Joins<T> {
    slots: Vec<(String, JoinMapping<T>)>,
}

impl<T> Default for Joins<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T: Eq + Hash> Joins<T> {
    /// Create joins from named slots
    pub fn new(slots: Vec<(String, JoinMapping<T>)>) -> Self {
        Self { slots }
    }

    /// Joins without any slot, used for mills without join pairs
    pub fn empty() -> Self {
        Self::default()
    }

    /// Mapping of the pair with the given name
    pub fn get(&self, name: &str) -> Option<&JoinMapping<T>> {
        self.slots
            .iter()
            .find(|(slot, _)| slot == name)
            .map(|(_, mapping)| mapping)
    }

    /// Mapping of the pair at the given position
    pub fn by_index(&self, index: usize) -> Option<&JoinMapping<T>> {
        self.slots.get(index).map(|(_, mapping)| mapping)
    }

    /// Children joined to `parent` through the named pair
    pub fn children_of(&self, name: &str, parent: &T) -> &[T] {
        self.get(name)
            .and_then(|mapping| mapping.get(parent))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Names of the slots, in declaration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.iter().map(|(name, _)| name.as_str())
    }

    /// Iterate over `(name, mapping)` slots
    pub fn iter(&self) -> impl Iterator<Item = (&str, &JoinMapping<T>)> {
        self.slots.iter().map(|(name, mapping)| (name.as_str(), mapping))
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true when there are no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Consume into the underlying slots
    pub fn into_inner(self) -> Vec<(String, JoinMapping<T>)> {
        self.slots
    }

    /// Merge another round of mappings into this one, slot by slot
    ///
    /// Entries of `other` replace entries for the same parent.
    pub fn merge(&mut self, other: Joins<T>) {
        if self.slots.is_empty() {
            *self = other;
            return;
        }

        debug_assert_eq!(self.slots.len(), other.slots.len());
        for ((_, mapping), (_, update)) in self.slots.iter_mut().zip(other.slots) {
            mapping.extend(update);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn joins(entries: Vec<(&str, u32, Vec<u32>)>) -> Joins<u32> {
        let mut slots: Vec<(String, JoinMapping<u32>)> = Vec::new();
        for (name, parent, children) in entries {
            match slots.iter_mut().find(|(slot, _)| slot == name) {
                Some((_, mapping)) => {
                    mapping.insert(parent, children);
                }
                None => {
                    let mut mapping = JoinMapping::new();
                    mapping.insert(parent, children);
                    slots.push((name.to_string(), mapping));
                }
            }
        }
        Joins::new(slots)
    }

    #[test]
    fn test_parent_children_map_preserves_arrival_order() {
        let mut map = ParentChildrenMap::new();
        map.attach(0, &1u32, 1, 10);
        map.attach(0, &1u32, 1, 11);
        map.attach(1, &10u32, 2, 100);

        assert_eq!(map.len(), 3);
        assert_eq!(map.children(0, &1), &[(1, 10), (1, 11)]);
        assert_eq!(map.children(1, &10), &[(2, 100)]);
        assert!(map.children(0, &2).is_empty());
    }

    #[test]
    fn test_parent_children_map_distinguishes_nodes() {
        let mut map = ParentChildrenMap::new();
        map.attach(0, &7u32, 1, 1);
        map.attach(1, &7u32, 2, 2);

        assert_eq!(map.children(0, &7), &[(1, 1)]);
        assert_eq!(map.children(1, &7), &[(2, 2)]);
    }

    #[test]
    fn test_joins_lookup() {
        let joins = joins(vec![("payments", 1, vec![10, 11]), ("shipments", 1, vec![20])]);

        assert_eq!(joins.len(), 2);
        assert_eq!(joins.children_of("payments", &1), &[10, 11]);
        assert_eq!(joins.children_of("shipments", &1), &[20]);
        assert!(joins.children_of("payments", &2).is_empty());
        assert!(joins.get("refunds").is_none());
        assert_eq!(joins.names().collect::<Vec<_>>(), vec!["payments", "shipments"]);
        assert!(joins.by_index(1).unwrap().contains_key(&1));
    }

    #[test]
    fn test_joins_merge_into_empty_takes_other() {
        let mut merged = Joins::empty();
        merged.merge(joins(vec![("payments", 1, vec![10])]));
        assert_eq!(merged.children_of("payments", &1), &[10]);
    }

    #[test]
    fn test_joins_merge_last_write_wins() {
        let mut merged = joins(vec![("payments", 1, vec![10]), ("payments", 2, vec![20])]);
        merged.merge(joins(vec![("payments", 2, vec![21]), ("payments", 3, vec![30])]));

        assert_eq!(merged.children_of("payments", &1), &[10]);
        assert_eq!(merged.children_of("payments", &2), &[21]);
        assert_eq!(merged.children_of("payments", &3), &[30]);
    }
}
