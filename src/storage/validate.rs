//! Structural invariant checks.
//!
//! A failure here means the tree was corrupted by a bug, never by caller input. The checker
//! reports the first violation it finds and does not try to repair anything.
use super::arena::NodeArena;
use super::node::{min_keys, Node, NodeId};
use std::collections::HashSet;
use std::fmt;

/// Describes which invariant a tree violates and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A referenced node is missing, reachable twice, or a live node is unreachable.
    DanglingNode { node: NodeId },
    /// A leaf sits at a different depth than the first leaf found.
    UnbalancedLeaves {
        node: NodeId,
        expected: usize,
        found: usize,
    },
    /// Keys within a node are not strictly increasing.
    UnsortedKeys { node: NodeId },
    /// A node holds fewer than `min` or more than `max` keys.
    FillBounds {
        node: NodeId,
        keys: usize,
        min: usize,
        max: usize,
    },
    /// A key falls outside the range its ancestors' separators allow.
    KeyOutOfRange { node: NodeId },
    /// A node's parent id does not name the node that owns it.
    ParentMismatch {
        node: NodeId,
        expected: Option<NodeId>,
        found: Option<NodeId>,
    },
    /// An internal node does not have exactly one more child than keys.
    ChildCount {
        node: NodeId,
        keys: usize,
        children: usize,
    },
    /// The `next` chain does not visit the leaves in key order and then stop.
    LeafChain { node: NodeId },
    /// The stored size differs from the number of pairs in the leaves.
    SizeMismatch { expected: usize, found: usize },
    /// The arena's free list names a live, missing or repeated slot, or misses an empty one.
    FreeList { node: NodeId },
    /// A leaf does not hold exactly one value per key.
    ValueCount {
        node: NodeId,
        keys: usize,
        values: usize,
    },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::DanglingNode { node } => {
                write!(f, "Node {} is dangling or unreachable", node)
            }
            ValidationError::UnbalancedLeaves {
                node,
                expected,
                found,
            } => write!(
                f,
                "Leaf {} is at depth {}, expected {}",
                node, found, expected
            ),
            ValidationError::UnsortedKeys { node } => {
                write!(f, "Keys of node {} are not strictly increasing", node)
            }
            ValidationError::FillBounds {
                node,
                keys,
                min,
                max,
            } => write!(
                f,
                "Node {} holds {} keys, allowed {}..={}",
                node, keys, min, max
            ),
            ValidationError::KeyOutOfRange { node } => {
                write!(f, "Node {} holds a key outside its separator range", node)
            }
            ValidationError::ParentMismatch {
                node,
                expected,
                found,
            } => write!(
                f,
                "Node {} names parent {:?}, owned by {:?}",
                node, found, expected
            ),
            ValidationError::ChildCount {
                node,
                keys,
                children,
            } => write!(
                f,
                "Internal node {} has {} keys and {} children",
                node, keys, children
            ),
            ValidationError::LeafChain { node } => {
                write!(f, "Leaf chain is broken at node {}", node)
            }
            ValidationError::SizeMismatch { expected, found } => write!(
                f,
                "Tree size is {} but the leaves hold {} pairs",
                expected, found
            ),
            ValidationError::FreeList { node } => {
                write!(f, "Free list entry for slot {} is inconsistent", node)
            }
            ValidationError::ValueCount { node, keys, values } => write!(
                f,
                "Leaf {} has {} keys and {} values",
                node, keys, values
            ),
        }
    }
}

impl std::error::Error for ValidationError {}

struct Frame<'a, K> {
    id: NodeId,
    parent: Option<NodeId>,
    depth: usize,
    lower: Option<&'a K>,
    upper: Option<&'a K>,
}

/// Walks the tree from `root` and checks every invariant.
///
/// Keys of a subtree must satisfy `lower <= key < upper` for the separators bounding it.
pub fn check_tree<K: Ord, V>(
    arena: &NodeArena<K, V>,
    root: NodeId,
    order: usize,
    size: usize,
) -> Result<(), ValidationError> {
    arena
        .check_free_list()
        .map_err(|node| ValidationError::FreeList { node })?;

    let mut visited = HashSet::new();
    let mut leaves = Vec::new();
    let mut leaf_depth = None;
    let mut stack = vec![Frame {
        id: root,
        parent: None,
        depth: 0,
        lower: None,
        upper: None,
    }];

    while let Some(frame) = stack.pop() {
        let Some(node) = arena.get(frame.id) else {
            return Err(ValidationError::DanglingNode { node: frame.id });
        };
        if !visited.insert(frame.id) {
            return Err(ValidationError::DanglingNode { node: frame.id });
        }
        if node.parent() != frame.parent {
            return Err(ValidationError::ParentMismatch {
                node: frame.id,
                expected: frame.parent,
                found: node.parent(),
            });
        }

        let keys = node.keys();
        if keys.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err(ValidationError::UnsortedKeys { node: frame.id });
        }
        let min = if frame.id == root { 0 } else { min_keys(order) };
        if keys.len() < min || keys.len() > order {
            return Err(ValidationError::FillBounds {
                node: frame.id,
                keys: keys.len(),
                min,
                max: order,
            });
        }
        let below = |key: &K| frame.lower.is_some_and(|lower| key < lower);
        let above = |key: &K| frame.upper.is_some_and(|upper| key >= upper);
        if keys.iter().any(|key| below(key) || above(key)) {
            return Err(ValidationError::KeyOutOfRange { node: frame.id });
        }

        match node {
            Node::Leaf(leaf) => {
                if leaf.values.len() != leaf.keys.len() {
                    return Err(ValidationError::ValueCount {
                        node: frame.id,
                        keys: leaf.keys.len(),
                        values: leaf.values.len(),
                    });
                }
                let expected = *leaf_depth.get_or_insert(frame.depth);
                if expected != frame.depth {
                    return Err(ValidationError::UnbalancedLeaves {
                        node: frame.id,
                        expected,
                        found: frame.depth,
                    });
                }
                leaves.push(frame.id);
            }
            Node::Internal(internal) => {
                if internal.children.len() != internal.keys.len() + 1 {
                    return Err(ValidationError::ChildCount {
                        node: frame.id,
                        keys: internal.keys.len(),
                        children: internal.children.len(),
                    });
                }
                // pushed right to left so leaves are collected in key order
                for (i, &child) in internal.children.iter().enumerate().rev() {
                    stack.push(Frame {
                        id: child,
                        parent: Some(frame.id),
                        depth: frame.depth + 1,
                        lower: if i == 0 {
                            frame.lower
                        } else {
                            internal.keys.get(i - 1)
                        },
                        upper: internal.keys.get(i).or(frame.upper),
                    });
                }
            }
        }
    }

    if let Some((id, _)) = arena.iter().find(|(id, _)| !visited.contains(id)) {
        return Err(ValidationError::DanglingNode { node: id });
    }

    check_leaf_chain(arena, &leaves)?;

    let found: usize = leaves.iter().map(|&id| arena[id].key_count()).sum();
    if found != size {
        return Err(ValidationError::SizeMismatch {
            expected: size,
            found,
        });
    }
    Ok(())
}

/// The chain must start at the leftmost leaf, visit `leaves` in order and end there.
fn check_leaf_chain<K: Ord, V>(
    arena: &NodeArena<K, V>,
    leaves: &[NodeId],
) -> Result<(), ValidationError> {
    let mut last_key: Option<&K> = None;
    for (i, &id) in leaves.iter().enumerate() {
        let Some(leaf) = arena.get(id).and_then(Node::as_leaf) else {
            return Err(ValidationError::LeafChain { node: id });
        };
        if leaf.next != leaves.get(i + 1).copied() {
            return Err(ValidationError::LeafChain { node: id });
        }
        if let (Some(last), Some(first)) = (last_key, leaf.keys.first()) {
            if last >= first {
                return Err(ValidationError::LeafChain { node: id });
            }
        }
        if let Some(key) = leaf.keys.last() {
            last_key = Some(key);
        }
    }
    Ok(())
}
