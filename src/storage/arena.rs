use super::node::{InternalNode, Node, NodeId};
use bincode::{Decode, Encode};
use std::collections::HashSet;
use std::ops::{Index, IndexMut};

/// Slot storage for tree nodes.
///
/// Nodes refer to each other by slot index, so the parent back-reference is a plain id kept
/// in sync by the operations below rather than an owning pointer. Freed slots are recycled.
///
/// Operations that span more than one node (split, borrow, merge) live here: they are the ones
/// that must keep `parent` ids consistent when children change owner.
#[derive(Encode, Decode, Debug, Clone, PartialEq)]
pub struct NodeArena<K, V> {
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<NodeId>,
}

impl<K, V> Default for NodeArena<K, V> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
        }
    }
}

impl<K, V> NodeArena<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a node and returns its id, reusing a freed slot when one is available.
    pub fn alloc(&mut self, node: Node<K, V>) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(node);
                id
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    /// Removes a node from the arena, returning it if the slot was live.
    pub fn release(&mut self, id: NodeId) -> Option<Node<K, V>> {
        let node = self.slots.get_mut(id)?.take()?;
        self.free.push(id);
        Some(node)
    }

    pub fn get(&self, id: NodeId) -> Option<&Node<K, V>> {
        self.slots.get(id)?.as_ref()
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut Node<K, V>> {
        self.slots.get_mut(id)?.as_mut()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Number of live nodes.
    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Checks that the free list names every empty slot exactly once and nothing else.
    ///
    /// Returns the first offending id: a listed slot that is out of range, live, or listed
    /// twice, or an empty slot the list misses.
    pub fn check_free_list(&self) -> Result<(), NodeId> {
        let mut listed = HashSet::new();
        for &id in &self.free {
            if !matches!(self.slots.get(id), Some(None)) || !listed.insert(id) {
                return Err(id);
            }
        }
        match self
            .slots
            .iter()
            .enumerate()
            .find(|(id, slot)| slot.is_none() && !listed.contains(id))
        {
            Some((id, _)) => Err(id),
            None => Ok(()),
        }
    }

    /// Iterates over live nodes in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Node<K, V>)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(id, slot)| slot.as_ref().map(|node| (id, node)))
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
    }

    /// Borrows two distinct live nodes mutably at once.
    fn pair_mut(&mut self, a: NodeId, b: NodeId) -> (&mut Node<K, V>, &mut Node<K, V>) {
        assert_ne!(a, b, "node {} cannot be paired with itself", a);
        let (first, second) = if a < b {
            let (lo, hi) = self.slots.split_at_mut(b);
            (&mut lo[a], &mut hi[0])
        } else {
            let (lo, hi) = self.slots.split_at_mut(a);
            (&mut hi[0], &mut lo[b])
        };
        match (first.as_mut(), second.as_mut()) {
            (Some(x), Some(y)) => (x, y),
            _ => panic!("dangling node id in pair ({}, {})", a, b),
        }
    }
}

impl<K, V> Index<NodeId> for NodeArena<K, V> {
    type Output = Node<K, V>;

    fn index(&self, id: NodeId) -> &Self::Output {
        match self.get(id) {
            Some(node) => node,
            None => panic!("dangling node id {}", id),
        }
    }
}

impl<K, V> IndexMut<NodeId> for NodeArena<K, V> {
    fn index_mut(&mut self, id: NodeId) -> &mut Self::Output {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("dangling node id {}", id),
        }
    }
}

impl<K: Ord + Clone, V> NodeArena<K, V> {
    /// Splits an overfull node into itself and a new right sibling.
    ///
    /// Returns the separator for the parent and the sibling id. Leaves are relinked
    /// (`left -> sibling -> old next`); children moved to an internal sibling are reparented.
    /// The sibling starts with the same parent as the split node.
    pub fn split(&mut self, id: NodeId, order: usize) -> (K, NodeId) {
        let (separator, sibling) = match &mut self[id] {
            Node::Leaf(leaf) => {
                let (separator, right) = leaf.split_off(order);
                (separator, Node::Leaf(right))
            }
            Node::Internal(internal) => {
                let (separator, right) = internal.split_off(order);
                (separator, Node::Internal(right))
            }
        };
        let sibling_id = self.alloc(sibling);
        if let Node::Leaf(leaf) = &mut self[id] {
            leaf.next = Some(sibling_id);
        }
        self.adopt_children(sibling_id);
        (separator, sibling_id)
    }

    /// Installs a new root above `left` and `right`.
    pub fn grow_root(&mut self, left: NodeId, separator: K, right: NodeId) -> NodeId {
        let root = self.alloc(Node::Internal(InternalNode::new(
            vec![separator],
            vec![left, right],
            None,
        )));
        self[left].set_parent(Some(root));
        self[right].set_parent(Some(root));
        root
    }

    /// Inserts `separator` into `parent` with `child` to its right and points `child` at it.
    pub fn insert_child(&mut self, parent: NodeId, separator: K, child: NodeId) {
        if let Some(internal) = self[parent].as_internal_mut() {
            internal.insert_child(separator, child);
        }
        self[child].set_parent(Some(parent));
    }

    /// Moves one key from the left sibling of `parent.children[index]` into it.
    ///
    /// The donor must have a surplus. Returns false if nothing could move.
    pub fn borrow_from_left(&mut self, parent: NodeId, index: usize) -> bool {
        let Some(separator_index) = index.checked_sub(1) else {
            return false;
        };
        let Some((left, node, separator)) = self.siblings(parent, separator_index) else {
            return false;
        };
        let moved = match self.pair_mut(left, node) {
            (Node::Leaf(donor), Node::Leaf(target)) => {
                target.borrow_from_left(donor).map(|key| (key, None))
            }
            (Node::Internal(donor), Node::Internal(target)) => target
                .borrow_from_left(donor, separator)
                .map(|(key, child)| (key, Some(child))),
            _ => unreachable!("siblings {} and {} sit at different depths", left, node),
        };
        self.finish_borrow(parent, separator_index, node, moved)
    }

    /// Moves one key from the right sibling of `parent.children[index]` into it.
    pub fn borrow_from_right(&mut self, parent: NodeId, index: usize) -> bool {
        let Some((node, right, separator)) = self.siblings(parent, index) else {
            return false;
        };
        let moved = match self.pair_mut(node, right) {
            (Node::Leaf(target), Node::Leaf(donor)) => {
                target.borrow_from_right(donor).map(|key| (key, None))
            }
            (Node::Internal(target), Node::Internal(donor)) => target
                .borrow_from_right(donor, separator)
                .map(|(key, child)| (key, Some(child))),
            _ => unreachable!("siblings {} and {} sit at different depths", node, right),
        };
        self.finish_borrow(parent, index, node, moved)
    }

    /// Merges `parent.children[separator + 1]` into `parent.children[separator]`.
    ///
    /// The separator and the right child are removed from the parent and the right slot is
    /// freed. Returns `(survivor, absorbed)` ids.
    pub fn merge(&mut self, parent: NodeId, separator: usize) -> Option<(NodeId, NodeId)> {
        let (left_id, right_id, _) = self.siblings(parent, separator)?;
        let right = self.release(right_id)?;
        let key = match self[parent].as_internal_mut() {
            Some(internal) => internal.remove_child(separator).0,
            None => unreachable!("parent {} was internal a moment ago", parent),
        };

        let absorbed = match (&mut self[left_id], right) {
            (Node::Leaf(left), Node::Leaf(right)) => {
                left.merge_with_right(right);
                Vec::new()
            }
            (Node::Internal(left), Node::Internal(right)) => left.merge_with_right(right, key),
            _ => unreachable!("siblings {} and {} sit at different depths", left_id, right_id),
        };
        for child in absorbed {
            self[child].set_parent(Some(left_id));
        }
        Some((left_id, right_id))
    }

    /// Ids of `parent.children[separator]` and `parent.children[separator + 1]` and a copy of
    /// the separator key between them.
    fn siblings(&self, parent: NodeId, separator: usize) -> Option<(NodeId, NodeId, K)> {
        let internal = self.get(parent)?.as_internal()?;
        let left = *internal.children.get(separator)?;
        let right = *internal.children.get(separator + 1)?;
        let key = internal.keys.get(separator)?.clone();
        Some((left, right, key))
    }

    fn finish_borrow(
        &mut self,
        parent: NodeId,
        separator: usize,
        receiver: NodeId,
        moved: Option<(K, Option<NodeId>)>,
    ) -> bool {
        let Some((key, child)) = moved else {
            return false;
        };
        if let Some(child) = child {
            self[child].set_parent(Some(receiver));
        }
        if let Some(internal) = self[parent].as_internal_mut() {
            internal.keys[separator] = key;
        }
        true
    }

    /// Points every child of `id` back at `id`.
    fn adopt_children(&mut self, id: NodeId) {
        let children = match self[id].as_internal() {
            Some(internal) => internal.children.clone(),
            None => return,
        };
        for child in children {
            self[child].set_parent(Some(id));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::node::LeafNode;
    use crate::storage::BPlusTree;

    fn leaf(keys: &[i64], parent: Option<NodeId>) -> Node<i64, i64> {
        Node::Leaf(LeafNode {
            keys: keys.to_vec(),
            values: keys.iter().map(|k| k * 100).collect(),
            next: None,
            parent,
        })
    }

    /// Builds `root{[sep]} -> left, right` with linked leaves.
    fn two_leaves(left: &[i64], right: &[i64], sep: i64) -> (NodeArena<i64, i64>, NodeId) {
        let mut arena = NodeArena::new();
        let l = arena.alloc(leaf(left, None));
        let r = arena.alloc(leaf(right, None));
        if let Node::Leaf(node) = &mut arena[l] {
            node.next = Some(r);
        }
        let root = arena.grow_root(l, sep, r);
        (arena, root)
    }

    #[test]
    fn test_alloc_reuses_released_slots() {
        let mut arena: NodeArena<i64, i64> = NodeArena::new();
        let a = arena.alloc(leaf(&[1], None));
        let b = arena.alloc(leaf(&[2], None));
        assert_eq!(arena.live_count(), 2);

        assert!(arena.release(a).is_some());
        assert!(arena.release(a).is_none());
        assert!(!arena.contains(a));

        let c = arena.alloc(leaf(&[3], None));
        assert_eq!(c, a);
        assert_eq!(arena[b].keys(), &[2]);
        assert_eq!(arena.live_count(), 2);
    }

    #[test]
    fn test_split_leaf_links_sibling() {
        let mut arena = NodeArena::new();
        let id = arena.alloc(leaf(&[1, 2, 3, 4, 5], None));
        let (separator, sibling) = arena.split(id, 4);
        assert_eq!(separator, 4);
        assert_eq!(arena[id].keys(), &[1, 2, 3]);
        assert_eq!(arena[sibling].keys(), &[4, 5]);
        assert_eq!(arena[id].as_leaf().and_then(|l| l.next), Some(sibling));

        let root = arena.grow_root(id, separator, sibling);
        assert_eq!(arena[id].parent(), Some(root));
        assert_eq!(arena[sibling].parent(), Some(root));
    }

    #[test]
    fn test_split_internal_reparents_moved_children() {
        let mut arena: NodeArena<i64, i64> = NodeArena::new();
        let children: Vec<NodeId> = (0..6).map(|i| arena.alloc(leaf(&[i * 10], None))).collect();
        let id = arena.alloc(Node::Internal(InternalNode::new(
            vec![10, 20, 30, 40, 50],
            children.clone(),
            None,
        )));
        for &child in &children {
            arena[child].set_parent(Some(id));
        }

        let (separator, sibling) = arena.split(id, 4);
        assert_eq!(separator, 30);
        for &child in &children[..3] {
            assert_eq!(arena[child].parent(), Some(id));
        }
        for &child in &children[3..] {
            assert_eq!(arena[child].parent(), Some(sibling));
        }
    }

    #[test]
    fn test_borrow_updates_parent_separator() {
        let (mut arena, root) = two_leaves(&[1, 2, 3], &[10], 10);
        assert!(arena.borrow_from_left(root, 1));
        let parent = arena[root].as_internal().unwrap();
        assert_eq!(parent.keys, vec![3]);
        assert_eq!(arena[parent.children[1]].keys(), &[3, 10]);

        let (mut arena, root) = two_leaves(&[1], &[10, 11, 12], 10);
        assert!(arena.borrow_from_right(root, 0));
        let parent = arena[root].as_internal().unwrap();
        assert_eq!(parent.keys, vec![11]);
        assert_eq!(arena[parent.children[0]].keys(), &[1, 10]);
    }

    #[test]
    fn test_merge_frees_right_slot() {
        let (mut arena, root) = two_leaves(&[1, 2], &[10], 10);
        let (survivor, absorbed) = arena.merge(root, 0).unwrap();
        assert!(!arena.contains(absorbed));
        assert_eq!(arena[survivor].keys(), &[1, 2, 10]);
        assert_eq!(arena[survivor].as_leaf().and_then(|l| l.next), None);

        let parent = arena[root].as_internal().unwrap();
        assert!(parent.keys.is_empty());
        assert_eq!(parent.children, vec![survivor]);
    }

    #[test]
    fn test_merge_with_missing_sibling_leaves_parent_intact() {
        let (mut arena, root) = two_leaves(&[1, 2], &[10], 10);
        let right = arena[root].as_internal().unwrap().children[1];
        arena.release(right);

        assert!(arena.merge(root, 0).is_none());
        let parent = arena[root].as_internal().unwrap();
        assert_eq!(parent.keys, vec![10]);
        assert_eq!(parent.children.len(), 2);
    }

    #[test]
    fn test_free_list_check() {
        let (mut arena, root) = two_leaves(&[1, 2], &[10], 10);
        assert_eq!(arena.check_free_list(), Ok(()));

        arena.free.push(root);
        assert_eq!(arena.check_free_list(), Err(root));

        let (mut arena, _) = two_leaves(&[1, 2], &[10], 10);
        arena.free.push(99);
        assert_eq!(arena.check_free_list(), Err(99));

        let (mut arena, _) = two_leaves(&[1, 2], &[10], 10);
        let spare = arena.alloc(leaf(&[50], None));
        arena.release(spare);
        assert_eq!(arena.check_free_list(), Ok(()));
        arena.free.push(spare);
        assert_eq!(arena.check_free_list(), Err(spare));

        let (mut arena, _) = two_leaves(&[1, 2], &[10], 10);
        let spare = arena.alloc(leaf(&[50], None));
        arena.release(spare);
        arena.free.clear();
        assert_eq!(arena.check_free_list(), Err(spare));
    }

    #[test]
    fn test_snapshot_with_live_slot_on_free_list_is_rejected() {
        let mut tree = BPlusTree::<i64, i64>::new(4).unwrap();
        for key in 1..=10 {
            tree.insert(key, key * 100);
        }
        let mut snapshot = tree.snapshot();
        snapshot.arena.free.push(snapshot.root);

        let err = BPlusTree::from_snapshot(snapshot, None).unwrap_err();
        assert_eq!(err.code(), 2000);
    }

    #[test]
    fn test_merge_out_of_range_is_noop() {
        let (mut arena, root) = two_leaves(&[1, 2], &[10], 10);
        assert!(arena.merge(root, 1).is_none());
        assert_eq!(arena.live_count(), 3);
    }
}
