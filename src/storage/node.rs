//! Nodes of the B+ tree.
//!
//! A node is either a leaf, holding keys paired with values plus a link to the next leaf,
//! or an internal node, holding separator keys and the ids of its children. Nodes live in a
//! [`NodeArena`](super::arena::NodeArena) and refer to each other by [`NodeId`]: children are
//! owned by their parent's slot, while `parent` and `next` are plain back/forward references.
//!
//! | **Property**            | **Internal Node**                  | **Leaf Node**              |
//! |-------------------------|------------------------------------|----------------------------|
//! | **Stores**              | Separator keys and child ids       | Keys and values            |
//! | **Number of keys**      | `min_keys..=order`                 | `min_keys..=order`         |
//! | **Number of children**  | Number of keys + 1                 | None                       |
//! | **Key purpose**         | Used for routing                   | Paired with value          |
//! | **Sibling link**        | None                               | `next` leaf                |
//!
//! Everything in this module is local to one node or to a pair of adjacent siblings. A node
//! never touches its parent; operations that change a boundary return the new separator key
//! and the caller installs it.
use bincode::{Decode, Encode};

/// Index of a node slot in the arena.
pub type NodeId = usize;

/// Minimum number of keys a non-root node must keep: `ceil((order + 1) / 2) - 1`.
pub fn min_keys(order: usize) -> usize {
    (order + 2) / 2 - 1
}

/// First key index moved to the right sibling when a leaf splits: `ceil((order + 1) / 2)`.
pub fn leaf_split_index(order: usize) -> usize {
    (order + 2) / 2
}

/// Index of the key promoted out of an overfull internal node: `floor((order + 1) / 2)`.
///
/// Equal to [`leaf_split_index`] for odd orders. For even orders the ceiling would leave the
/// right internal sibling one key short of [`min_keys`].
pub fn internal_split_index(order: usize) -> usize {
    (order + 1) / 2
}

#[derive(Encode, Decode, Debug, Clone, PartialEq)]
pub enum Node<K, V> {
    Leaf(LeafNode<K, V>),
    Internal(InternalNode<K>),
}

/// Leaf node: sorted keys, their values, and the next leaf in ascending key order.
#[derive(Encode, Decode, Debug, Clone, PartialEq)]
pub struct LeafNode<K, V> {
    pub keys: Vec<K>,
    pub values: Vec<V>,
    pub next: Option<NodeId>,
    pub parent: Option<NodeId>,
}

/// Internal node: `k` separator keys and `k + 1` children.
///
/// Child `i` holds keys `< keys[i]` (and `>= keys[i - 1]` when `i > 0`); the last child holds
/// keys `>= keys[k - 1]`.
#[derive(Encode, Decode, Debug, Clone, PartialEq)]
pub struct InternalNode<K> {
    pub keys: Vec<K>,
    pub children: Vec<NodeId>,
    pub parent: Option<NodeId>,
}

impl<K, V> Node<K, V> {
    pub fn is_leaf(&self) -> bool {
        matches!(self, Node::Leaf(_))
    }

    pub fn keys(&self) -> &[K] {
        match self {
            Node::Leaf(leaf) => &leaf.keys,
            Node::Internal(internal) => &internal.keys,
        }
    }

    pub fn key_count(&self) -> usize {
        self.keys().len()
    }

    pub fn parent(&self) -> Option<NodeId> {
        match self {
            Node::Leaf(leaf) => leaf.parent,
            Node::Internal(internal) => internal.parent,
        }
    }

    pub fn set_parent(&mut self, parent: Option<NodeId>) {
        match self {
            Node::Leaf(leaf) => leaf.parent = parent,
            Node::Internal(internal) => internal.parent = parent,
        }
    }

    /// True once the node holds more than `order` keys and must split.
    pub fn is_full(&self, order: usize) -> bool {
        self.key_count() > order
    }

    /// True when the node holds fewer than [`min_keys`]. Meaningless for the root.
    pub fn is_underflow(&self, order: usize) -> bool {
        self.key_count() < min_keys(order)
    }

    /// True when the node can give one key away and stay valid.
    pub fn has_surplus(&self, order: usize) -> bool {
        self.key_count() > min_keys(order)
    }

    pub fn as_leaf(&self) -> Option<&LeafNode<K, V>> {
        match self {
            Node::Leaf(leaf) => Some(leaf),
            Node::Internal(_) => None,
        }
    }

    pub fn as_internal(&self) -> Option<&InternalNode<K>> {
        match self {
            Node::Internal(internal) => Some(internal),
            Node::Leaf(_) => None,
        }
    }

    pub fn as_internal_mut(&mut self) -> Option<&mut InternalNode<K>> {
        match self {
            Node::Internal(internal) => Some(internal),
            Node::Leaf(_) => None,
        }
    }
}

impl<K: Ord + Clone, V> LeafNode<K, V> {
    pub fn new(parent: Option<NodeId>) -> Self {
        Self {
            keys: Vec::new(),
            values: Vec::new(),
            next: None,
            parent,
        }
    }

    /// Inserts a pair keeping keys sorted.
    ///
    /// If the key is already present its value is overwritten and the previous value returned;
    /// the caller must not count the pair twice.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        match self.keys.binary_search(&key) {
            Ok(index) => Some(std::mem::replace(&mut self.values[index], value)),
            Err(index) => {
                self.keys.insert(index, key);
                self.values.insert(index, value);
                None
            }
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.keys
            .binary_search(key)
            .ok()
            .map(|index| &self.values[index])
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let index = self.keys.binary_search(key).ok()?;
        self.keys.remove(index);
        Some(self.values.remove(index))
    }

    /// Moves keys `[leaf_split_index(order)..]` into a new right sibling.
    ///
    /// Returns a copy of the right sibling's first key as separator. The sibling inherits this
    /// leaf's `next` and parent; linking this leaf to the sibling is up to the caller, which is
    /// the one that knows the sibling's id.
    pub fn split_off(&mut self, order: usize) -> (K, LeafNode<K, V>) {
        let mid = leaf_split_index(order).min(self.keys.len());
        let right = LeafNode {
            keys: self.keys.split_off(mid),
            values: self.values.split_off(mid),
            next: self.next,
            parent: self.parent,
        };
        let separator = right.keys[0].clone();
        (separator, right)
    }

    /// Takes the last pair of `left` and puts it in front of this leaf.
    ///
    /// Returns the new separator between `left` and this leaf.
    pub fn borrow_from_left(&mut self, left: &mut LeafNode<K, V>) -> Option<K> {
        let key = left.keys.pop()?;
        let value = left.values.pop()?;
        self.keys.insert(0, key);
        self.values.insert(0, value);
        Some(self.keys[0].clone())
    }

    /// Takes the first pair of `right` and appends it to this leaf.
    ///
    /// Returns the new separator between this leaf and `right`.
    pub fn borrow_from_right(&mut self, right: &mut LeafNode<K, V>) -> Option<K> {
        if right.keys.is_empty() {
            return None;
        }
        self.keys.push(right.keys.remove(0));
        self.values.push(right.values.remove(0));
        right.keys.first().cloned()
    }

    /// Absorbs every pair of `right` and takes over its `next` link.
    pub fn merge_with_right(&mut self, right: LeafNode<K, V>) {
        self.keys.extend(right.keys);
        self.values.extend(right.values);
        self.next = right.next;
    }
}

impl<K: Ord + Clone> InternalNode<K> {
    pub fn new(keys: Vec<K>, children: Vec<NodeId>, parent: Option<NodeId>) -> Self {
        Self {
            keys,
            children,
            parent,
        }
    }

    /// Index of the child whose range contains `key`: the first `i` with `key < keys[i]`,
    /// otherwise the last child.
    pub fn child_index(&self, key: &K) -> usize {
        self.keys.partition_point(|k| k <= key)
    }

    pub fn child_for(&self, key: &K) -> NodeId {
        self.children[self.child_index(key)]
    }

    /// Position of `child` among this node's children.
    pub fn position_of(&self, child: NodeId) -> Option<usize> {
        self.children.iter().position(|&c| c == child)
    }

    /// Inserts a separator and installs `right_child` immediately after it.
    pub fn insert_child(&mut self, key: K, right_child: NodeId) {
        let index = self.keys.partition_point(|k| k < &key);
        self.keys.insert(index, key);
        self.children.insert(index + 1, right_child);
    }

    /// Removes the separator at `index` together with the child to its right.
    pub fn remove_child(&mut self, index: usize) -> (K, NodeId) {
        let key = self.keys.remove(index);
        let child = self.children.remove(index + 1);
        (key, child)
    }

    /// Promotes the middle key and moves everything right of it into a new sibling.
    ///
    /// The promoted key is removed from both halves. The sibling's children still name this
    /// node as parent until the caller reparents them.
    pub fn split_off(&mut self, order: usize) -> (K, InternalNode<K>) {
        let mid = internal_split_index(order).min(self.keys.len().saturating_sub(1));
        let right_keys = self.keys.split_off(mid + 1);
        let right_children = self.children.split_off(mid + 1);
        let separator = self.keys.remove(mid);
        (
            separator,
            InternalNode::new(right_keys, right_children, self.parent),
        )
    }

    /// Rotates the last key of `left` through the parent into this node.
    ///
    /// `separator` is the parent's key between `left` and this node. Returns the replacement
    /// separator and the child that moved over.
    pub fn borrow_from_left(
        &mut self,
        left: &mut InternalNode<K>,
        separator: K,
    ) -> Option<(K, NodeId)> {
        let new_separator = left.keys.pop()?;
        let child = left.children.pop()?;
        self.keys.insert(0, separator);
        self.children.insert(0, child);
        Some((new_separator, child))
    }

    /// Rotates the first key of `right` through the parent into this node.
    ///
    /// `separator` is the parent's key between this node and `right`.
    pub fn borrow_from_right(
        &mut self,
        right: &mut InternalNode<K>,
        separator: K,
    ) -> Option<(K, NodeId)> {
        if right.keys.is_empty() || right.children.is_empty() {
            return None;
        }
        let new_separator = right.keys.remove(0);
        let child = right.children.remove(0);
        self.keys.push(separator);
        self.children.push(child);
        Some((new_separator, child))
    }

    /// Absorbs `right` with the parent's separator reinserted between the two key lists.
    ///
    /// Returns the absorbed children, which still need their parent updated.
    pub fn merge_with_right(&mut self, right: InternalNode<K>, separator: K) -> Vec<NodeId> {
        self.keys.push(separator);
        self.keys.extend(right.keys);
        self.children.extend(right.children.iter().copied());
        right.children
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(keys: &[i64]) -> LeafNode<i64, String> {
        LeafNode {
            keys: keys.to_vec(),
            values: keys.iter().map(|k| format!("v{}", k)).collect(),
            next: None,
            parent: None,
        }
    }

    #[test]
    fn test_fill_formulas() {
        assert_eq!(min_keys(3), 1);
        assert_eq!(min_keys(4), 2);
        assert_eq!(min_keys(5), 2);
        assert_eq!(leaf_split_index(4), 3);
        assert_eq!(leaf_split_index(5), 3);
        assert_eq!(internal_split_index(4), 2);
        assert_eq!(internal_split_index(5), 3);
    }

    #[test]
    fn test_insert_in_leaf_keeps_order_and_overwrites() {
        let mut node = LeafNode::new(None);
        for k in [20, 5, 10] {
            assert!(node.insert(k, format!("v{}", k)).is_none());
        }
        assert_eq!(node.keys, vec![5, 10, 20]);

        let old = node.insert(10, "ten".to_string());
        assert_eq!(old.as_deref(), Some("v10"));
        assert_eq!(node.keys.len(), 3);
        assert_eq!(node.get(&10).map(String::as_str), Some("ten"));
    }

    #[test]
    fn test_full_and_underflow() {
        let node: Node<i64, String> = Node::Leaf(leaf(&[1, 2, 3, 4, 5]));
        assert!(node.is_full(4));
        assert!(!node.is_full(5));

        let node: Node<i64, String> = Node::Leaf(leaf(&[1]));
        assert!(node.is_underflow(4));
        assert!(!node.is_underflow(3));
    }

    #[test]
    fn test_leaf_split_copies_separator() {
        let mut left = leaf(&[1, 2, 3, 4, 5]);
        left.next = Some(9);
        let (separator, right) = left.split_off(4);
        assert_eq!(separator, 4);
        assert_eq!(left.keys, vec![1, 2, 3]);
        assert_eq!(right.keys, vec![4, 5]);
        assert_eq!(right.values, vec!["v4".to_string(), "v5".to_string()]);
        assert_eq!(right.next, Some(9));
    }

    #[test]
    fn test_internal_split_promotes_middle_key() {
        let mut node = InternalNode::new(vec![10, 20, 30, 40, 50], vec![0, 1, 2, 3, 4, 5], None);
        let (separator, right) = node.split_off(4);
        assert_eq!(separator, 30);
        assert_eq!(node.keys, vec![10, 20]);
        assert_eq!(node.children, vec![0, 1, 2]);
        assert_eq!(right.keys, vec![40, 50]);
        assert_eq!(right.children, vec![3, 4, 5]);
    }

    #[test]
    fn test_child_index_routes_equal_keys_right() {
        let node = InternalNode::new(vec![10, 20], vec![0, 1, 2], None);
        assert_eq!(node.child_for(&5), 0);
        assert_eq!(node.child_for(&10), 1);
        assert_eq!(node.child_for(&19), 1);
        assert_eq!(node.child_for(&20), 2);
        assert_eq!(node.child_for(&99), 2);
    }

    #[test]
    fn test_insert_and_remove_child() {
        let mut node = InternalNode::new(vec![10, 30], vec![0, 1, 2], None);
        node.insert_child(20, 7);
        assert_eq!(node.keys, vec![10, 20, 30]);
        assert_eq!(node.children, vec![0, 1, 7, 2]);

        let (key, child) = node.remove_child(1);
        assert_eq!((key, child), (20, 7));
        assert_eq!(node.children, vec![0, 1, 2]);
    }

    #[test]
    fn test_leaf_borrow_and_merge() {
        let mut left = leaf(&[1, 2, 3]);
        let mut node = leaf(&[5]);
        assert_eq!(node.borrow_from_left(&mut left), Some(3));
        assert_eq!(node.keys, vec![3, 5]);

        let mut right = leaf(&[8, 9, 10]);
        assert_eq!(node.borrow_from_right(&mut right), Some(9));
        assert_eq!(node.keys, vec![3, 5, 8]);

        right.next = Some(42);
        node.merge_with_right(right);
        assert_eq!(node.keys, vec![3, 5, 8, 9, 10]);
        assert_eq!(node.next, Some(42));
    }

    #[test]
    fn test_internal_borrow_rotates_through_parent() {
        let mut left = InternalNode::new(vec![2, 4], vec![0, 1, 2], None);
        let mut node = InternalNode::new(vec![8], vec![3, 4], None);
        let (separator, moved) = node.borrow_from_left(&mut left, 6).unwrap();
        assert_eq!((separator, moved), (4, 2));
        assert_eq!(node.keys, vec![6, 8]);
        assert_eq!(node.children, vec![2, 3, 4]);

        let mut right = InternalNode::new(vec![12, 14], vec![5, 6, 7], None);
        let (separator, moved) = node.borrow_from_right(&mut right, 10).unwrap();
        assert_eq!((separator, moved), (12, 5));
        assert_eq!(node.keys, vec![6, 8, 10]);
        assert_eq!(right.keys, vec![14]);
    }

    #[test]
    fn test_internal_merge_reinserts_separator() {
        let mut left = InternalNode::new(vec![2], vec![0, 1], None);
        let right = InternalNode::new(vec![6], vec![2, 3], None);
        let absorbed = left.merge_with_right(right, 4);
        assert_eq!(left.keys, vec![2, 4, 6]);
        assert_eq!(left.children, vec![0, 1, 2, 3]);
        assert_eq!(absorbed, vec![2, 3]);
    }
}
