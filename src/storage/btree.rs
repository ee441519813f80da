//! The B+ tree is the ordered index underneath the database.
//!
//! Why is a tree a good data structure for a key-value store?
//! - Searching for a particular key is fast (logarithmic time)
//! - Inserting / deleting a key you've already found is fast (constant-ish time to rebalance)
//! - Traversing a range of keys is fast (unlike a hash map)
//!
//! In a B+ tree only leaves carry values. Internal nodes hold separator keys that route a
//! search to the right child, and every leaf links to the next one so a range scan walks
//! sideways instead of descending again for each key.
//!
//! Each node holds at most `order` keys and, unless it is the root, at least
//! `ceil((order + 1) / 2) - 1`. Inserting into a full leaf splits it and pushes a separator up;
//! the push may split the parent too, up to the root, which then grows a new level. Deleting
//! from a leaf at the minimum borrows a key from a sibling or merges with it, which may in turn
//! leave the parent short; when the root ends up with no keys its only child takes its place.
//! Height only ever changes at the root, so all leaves stay at the same depth.
//!
//! |                   | Sorted Vec      | Hash map   | B+ tree     |
//! |-------------------|-----------------|------------|-------------|
//! | **Insertion**     | O(n)            | O(1)       | O(log(n))   |
//! | **Deletion**      | O(n)            | O(1)       | O(log(n))   |
//! | **Lookup by key** | O(log(n))       | O(1)       | O(log(n))   |
//! | **Range scan**    | O(log(n) + k)   | O(n)       | O(log(n)+k) |
//!
use super::arena::NodeArena;
use super::node::{LeafNode, Node, NodeId};
use super::observer::{TreeEvent, TreeObserver};
use super::validate::{check_tree, ValidationError};
use crate::errors::Error;
use bincode::{Decode, Encode};
use serde::Serialize;
use std::collections::VecDeque;
use std::fmt;

/// Smallest order a tree accepts.
pub const MIN_ORDER: usize = 3;

/// Whole-structure image of a tree: the arena slots as they are, plus the root id.
///
/// The observer is not part of the image; it is supplied again on restore.
#[derive(Encode, Decode, Debug, Clone, PartialEq)]
pub struct TreeSnapshot<K, V> {
    pub order: usize,
    pub size: usize,
    pub root: NodeId,
    pub arena: NodeArena<K, V>,
}

/// Counters describing the shape of a tree.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStatistics {
    pub size: usize,
    pub order: usize,
    pub height: usize,
    pub leaf_nodes: usize,
    pub internal_nodes: usize,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Leaf,
    Internal,
}

/// Nested description of a node and its subtree, for visualisation.
///
/// Serializes as `{"level": 0, "type": "internal", "keys": [...], "children": [...]}`;
/// leaves omit `children`.
#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct NodeView<K> {
    pub level: usize,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    pub keys: Vec<K>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeView<K>>,
}

/// In-memory B+ tree mapping ordered keys to values.
pub struct BPlusTree<K, V> {
    arena: NodeArena<K, V>,
    root: NodeId,
    order: usize,
    size: usize,
    observer: Option<Box<dyn TreeObserver<K>>>,
}

impl<K: Ord + Clone, V> BPlusTree<K, V> {
    /// Creates an empty tree: a single empty leaf.
    ///
    /// # Errors
    /// Returns `Error::InvalidOperation` if `order` is below 3.
    ///
    /// # Examples
    /// ```
    /// use kvtree::storage::BPlusTree;
    /// let mut tree = BPlusTree::new(4).unwrap();
    /// tree.insert(10, "ten");
    /// assert_eq!(tree.search(&10), Some(&"ten"));
    /// assert!(BPlusTree::<i64, &str>::new(2).is_err());
    /// ```
    pub fn new(order: usize) -> Result<Self, Error> {
        if order < MIN_ORDER {
            return Err(err!(
                InvalidOperation,
                "Order must be at least {}, got {}",
                MIN_ORDER,
                order
            ));
        }
        let mut arena = NodeArena::new();
        let root = arena.alloc(Node::Leaf(LeafNode::new(None)));
        Ok(Self {
            arena,
            root,
            order,
            size: 0,
            observer: None,
        })
    }

    /// Creates an empty tree reporting structural events to `observer`.
    pub fn with_observer(
        order: usize,
        observer: impl TreeObserver<K> + 'static,
    ) -> Result<Self, Error> {
        let mut tree = Self::new(order)?;
        tree.observer = Some(Box::new(observer));
        Ok(tree)
    }

    pub fn set_observer(&mut self, observer: Option<Box<dyn TreeObserver<K>>>) {
        self.observer = observer;
    }

    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of key-value pairs.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn search(&self, key: &K) -> Option<&V> {
        self.leaf_for(key).1.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.search(key).is_some()
    }

    /// Inserts a pair, overwriting the value of an existing key.
    ///
    /// Returns the previous value on overwrite, in which case the size is unchanged.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        let (leaf_id, _) = self.leaf_for(&key);
        let previous = self.leaf_mut(leaf_id).insert(key.clone(), value);
        self.emit(TreeEvent::Insert {
            key: &key,
            replaced: previous.is_some(),
        });
        if previous.is_none() {
            self.size += 1;
            self.split_upward(leaf_id);
        }
        previous
    }

    /// Removes `key`, returning whether it was present. An absent key changes nothing.
    pub fn delete(&mut self, key: &K) -> bool {
        self.remove(key).is_some()
    }

    /// Removes `key` and returns its value.
    pub fn remove(&mut self, key: &K) -> Option<V> {
        let (leaf_id, _) = self.leaf_for(key);
        let value = self.leaf_mut(leaf_id).remove(key)?;
        self.size -= 1;
        self.emit(TreeEvent::Delete { key });
        self.rebalance(leaf_id);
        Some(value)
    }

    /// Iterates over all pairs in ascending key order by walking the leaf chain.
    pub fn iter(&self) -> Iter<'_, K, V> {
        let mut id = self.root;
        while let Node::Internal(internal) = &self.arena[id] {
            id = internal.children[0];
        }
        Iter {
            arena: &self.arena,
            leaf: Some(id),
            index: 0,
        }
    }

    /// Iterates from the first key `>= start` to the end of the tree.
    pub fn iter_from(&self, start: &K) -> Iter<'_, K, V> {
        let (id, leaf) = self.leaf_for(start);
        Iter {
            arena: &self.arena,
            leaf: Some(id),
            index: leaf.keys.partition_point(|k| k < start),
        }
    }

    /// Discards every node and starts over from a single empty leaf.
    pub fn clear(&mut self) {
        self.arena.clear();
        self.root = self.arena.alloc(Node::Leaf(LeafNode::new(None)));
        self.size = 0;
        self.emit(TreeEvent::Clear);
    }

    /// Number of levels, counted along the leftmost path. An empty tree has height 1.
    pub fn height(&self) -> usize {
        let mut height = 1;
        let mut id = self.root;
        while let Node::Internal(internal) = &self.arena[id] {
            id = internal.children[0];
            height += 1;
        }
        height
    }

    pub fn validate(&self) -> bool {
        self.check().is_ok()
    }

    /// Checks every structural invariant and reports the first one that fails.
    pub fn check(&self) -> Result<(), ValidationError> {
        check_tree(&self.arena, self.root, self.order, self.size)
    }

    pub fn statistics(&self) -> TreeStatistics {
        let (leaf_nodes, internal_nodes) =
            self.arena
                .iter()
                .fold((0, 0), |(leaves, internals), (_, node)| {
                    if node.is_leaf() {
                        (leaves + 1, internals)
                    } else {
                        (leaves, internals + 1)
                    }
                });
        TreeStatistics {
            size: self.size,
            order: self.order,
            height: self.height(),
            leaf_nodes,
            internal_nodes,
        }
    }

    /// Nested view of the whole tree, root first.
    pub fn structure(&self) -> NodeView<K> {
        self.view(self.root, 0)
    }

    fn view(&self, id: NodeId, level: usize) -> NodeView<K> {
        match &self.arena[id] {
            Node::Leaf(leaf) => NodeView {
                level,
                kind: NodeKind::Leaf,
                keys: leaf.keys.clone(),
                children: Vec::new(),
            },
            Node::Internal(internal) => NodeView {
                level,
                kind: NodeKind::Internal,
                keys: internal.keys.clone(),
                children: internal
                    .children
                    .iter()
                    .map(|&child| self.view(child, level + 1))
                    .collect(),
            },
        }
    }

    /// Keys of every node, grouped by level from the root down, left to right.
    pub fn levels(&self) -> Vec<Vec<&[K]>> {
        let mut levels = Vec::new();
        let mut current = VecDeque::from([self.root]);
        while !current.is_empty() {
            let mut next = VecDeque::new();
            let mut level = Vec::with_capacity(current.len());
            for id in current {
                let node = &self.arena[id];
                level.push(node.keys());
                if let Node::Internal(internal) = node {
                    next.extend(internal.children.iter().copied());
                }
            }
            levels.push(level);
            current = next;
        }
        levels
    }

    /// Rebuilds a tree from a snapshot and validates it.
    ///
    /// # Errors
    /// Returns `Error::InvalidOperation` for an order below 3 and `Error::Db` when the image
    /// does not describe a valid tree.
    pub fn from_snapshot(
        snapshot: TreeSnapshot<K, V>,
        observer: Option<Box<dyn TreeObserver<K>>>,
    ) -> Result<Self, Error> {
        if snapshot.order < MIN_ORDER {
            return Err(err!(
                InvalidOperation,
                "Order must be at least {}, got {}",
                MIN_ORDER,
                snapshot.order
            ));
        }
        let tree = Self {
            arena: snapshot.arena,
            root: snapshot.root,
            order: snapshot.order,
            size: snapshot.size,
            observer,
        };
        tree.check()
            .map_err(|e| err!(Db, "Snapshot is not a valid tree. {}", e))?;
        Ok(tree)
    }

    /// Descends from the root to the leaf whose range contains `key`.
    fn leaf_for(&self, key: &K) -> (NodeId, &LeafNode<K, V>) {
        let mut id = self.root;
        loop {
            match &self.arena[id] {
                Node::Leaf(leaf) => return (id, leaf),
                Node::Internal(internal) => id = internal.child_for(key),
            }
        }
    }

    fn leaf_mut(&mut self, id: NodeId) -> &mut LeafNode<K, V> {
        match &mut self.arena[id] {
            Node::Leaf(leaf) => leaf,
            Node::Internal(_) => unreachable!("node {} is not a leaf", id),
        }
    }

    /// Splits `id` while it is overfull, carrying each separator up to the parent.
    fn split_upward(&mut self, mut id: NodeId) {
        while self.arena[id].is_full(self.order) {
            let (separator, sibling) = self.arena.split(id, self.order);
            self.emit(TreeEvent::Split {
                node: id,
                sibling,
                separator: &separator,
            });
            match self.arena[id].parent() {
                Some(parent) => {
                    self.arena.insert_child(parent, separator, sibling);
                    id = parent;
                }
                None => {
                    self.root = self.arena.grow_root(id, separator, sibling);
                    self.emit(TreeEvent::RootGrow {
                        root: self.root,
                        height: self.height(),
                    });
                    break;
                }
            }
        }
    }

    /// Repairs underflow from `id` toward the root, then collapses an empty root.
    ///
    /// Prefers borrowing from the left sibling, then from the right, then merging into the
    /// left sibling, and only then merging the right sibling in.
    fn rebalance(&mut self, mut id: NodeId) {
        while id != self.root && self.arena[id].is_underflow(self.order) {
            let Some(parent) = self.arena[id].parent() else {
                break;
            };
            let Some((index, child_count)) = self.arena[parent]
                .as_internal()
                .and_then(|p| p.position_of(id).map(|i| (i, p.children.len())))
            else {
                break;
            };
            let left = index
                .checked_sub(1)
                .and_then(|i| self.sibling(parent, i));
            let right = self.sibling(parent, index + 1);

            if let Some(left) = left.filter(|&l| self.arena[l].has_surplus(self.order)) {
                if self.arena.borrow_from_left(parent, index) {
                    self.emit(TreeEvent::Borrow {
                        node: id,
                        donor: left,
                    });
                    break;
                }
            }
            if let Some(right) = right.filter(|&r| self.arena[r].has_surplus(self.order)) {
                if self.arena.borrow_from_right(parent, index) {
                    self.emit(TreeEvent::Borrow {
                        node: id,
                        donor: right,
                    });
                    break;
                }
            }

            let merged = if index > 0 {
                self.arena.merge(parent, index - 1)
            } else if index + 1 < child_count {
                self.arena.merge(parent, index)
            } else {
                None
            };
            let Some((survivor, absorbed)) = merged else {
                break;
            };
            self.emit(TreeEvent::Merge {
                survivor,
                absorbed,
            });
            id = parent;
        }
        self.collapse_root();
    }

    /// Replaces an internal root without keys by its only child, as often as needed.
    fn collapse_root(&mut self) {
        loop {
            let child = match &self.arena[self.root] {
                Node::Internal(internal) if internal.keys.is_empty() => internal.children[0],
                _ => break,
            };
            self.arena.release(self.root);
            self.arena[child].set_parent(None);
            self.root = child;
            self.emit(TreeEvent::RootCollapse {
                root: child,
                height: self.height(),
            });
        }
    }

    fn sibling(&self, parent: NodeId, index: usize) -> Option<NodeId> {
        self.arena[parent]
            .as_internal()
            .and_then(|p| p.children.get(index).copied())
    }

    fn emit(&self, event: TreeEvent<'_, K>) {
        if let Some(observer) = &self.observer {
            observer.on_event(&event);
        }
    }
}

impl<K: Ord + Clone, V: Clone> BPlusTree<K, V> {
    /// Pairs with `lo <= key <= hi` in ascending order; empty when `lo > hi`.
    pub fn range_query(&self, lo: &K, hi: &K) -> Vec<(K, V)> {
        if lo > hi {
            return Vec::new();
        }
        self.iter_from(lo)
            .take_while(|(key, _)| *key <= hi)
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    /// Every pair in ascending key order.
    pub fn get_all(&self) -> Vec<(K, V)> {
        self.iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn snapshot(&self) -> TreeSnapshot<K, V> {
        TreeSnapshot {
            order: self.order,
            size: self.size,
            root: self.root,
            arena: self.arena.clone(),
        }
    }
}

impl<K, V> fmt::Debug for BPlusTree<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BPlusTree")
            .field("order", &self.order)
            .field("size", &self.size)
            .field("root", &self.root)
            .field("nodes", &self.arena.live_count())
            .field("observed", &self.observer.is_some())
            .finish()
    }
}

/// Ascending iterator over the pairs of a tree.
pub struct Iter<'a, K, V> {
    arena: &'a NodeArena<K, V>,
    leaf: Option<NodeId>,
    index: usize,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let leaf = self.arena.get(self.leaf?)?.as_leaf()?;
            if self.index < leaf.keys.len() {
                let i = self.index;
                self.index += 1;
                return Some((&leaf.keys[i], &leaf.values[i]));
            }
            self.leaf = leaf.next;
            self.index = 0;
        }
    }
}

impl<'a, K: Ord + Clone, V> IntoIterator for &'a BPlusTree<K, V> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
