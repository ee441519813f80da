use super::node::NodeId;
use std::fmt::Debug;
use tracing::{debug, trace};

/// Structural event reported by a tree to its observer.
#[derive(Debug, Clone, PartialEq)]
pub enum TreeEvent<'a, K> {
    Insert { key: &'a K, replaced: bool },
    Delete { key: &'a K },
    Split { node: NodeId, sibling: NodeId, separator: &'a K },
    Borrow { node: NodeId, donor: NodeId },
    Merge { survivor: NodeId, absorbed: NodeId },
    RootGrow { root: NodeId, height: usize },
    RootCollapse { root: NodeId, height: usize },
    Clear,
}

/// Sink for tree events, handed to the tree at construction.
///
/// The tree calls it synchronously at the point each event happens. Implementations must not
/// assume the structure is valid at that moment: a split is reported before the separator has
/// reached the parent.
pub trait TreeObserver<K>: Send + Sync {
    fn on_event(&self, event: &TreeEvent<'_, K>);
}

/// Observer that forwards every event to `tracing`.
///
/// Key-level events go out at `trace`, structural ones at `debug`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl<K: Debug> TreeObserver<K> for TracingObserver {
    fn on_event(&self, event: &TreeEvent<'_, K>) {
        match event {
            TreeEvent::Insert { key, replaced } => trace!(?key, replaced, "Key inserted"),
            TreeEvent::Delete { key } => trace!(?key, "Key deleted"),
            TreeEvent::Split {
                node,
                sibling,
                separator,
            } => debug!(node, sibling, ?separator, "Node split"),
            TreeEvent::Borrow { node, donor } => debug!(node, donor, "Key borrowed from sibling"),
            TreeEvent::Merge { survivor, absorbed } => {
                debug!(survivor, absorbed, "Nodes merged")
            }
            TreeEvent::RootGrow { root, height } => debug!(root, height, "Root grown"),
            TreeEvent::RootCollapse { root, height } => debug!(root, height, "Root collapsed"),
            TreeEvent::Clear => debug!("Tree cleared"),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Observer that records a short label per event, for assertions in tree tests.
    #[derive(Clone, Default)]
    pub struct RecordingObserver {
        pub events: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingObserver {
        pub fn labels(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl<K: Debug> TreeObserver<K> for RecordingObserver {
        fn on_event(&self, event: &TreeEvent<'_, K>) {
            let label = match event {
                TreeEvent::Insert { replaced: true, .. } => "replace",
                TreeEvent::Insert { .. } => "insert",
                TreeEvent::Delete { .. } => "delete",
                TreeEvent::Split { .. } => "split",
                TreeEvent::Borrow { .. } => "borrow",
                TreeEvent::Merge { .. } => "merge",
                TreeEvent::RootGrow { .. } => "grow",
                TreeEvent::RootCollapse { .. } => "collapse",
                TreeEvent::Clear => "clear",
            };
            self.events.lock().unwrap().push(label.to_string());
        }
    }

    #[test]
    fn test_tracing_observer_accepts_every_event() {
        let observer = TracingObserver;
        let key = 7i64;
        let events = [
            TreeEvent::Insert {
                key: &key,
                replaced: false,
            },
            TreeEvent::Delete { key: &key },
            TreeEvent::Split {
                node: 0,
                sibling: 1,
                separator: &key,
            },
            TreeEvent::Borrow { node: 0, donor: 1 },
            TreeEvent::Merge {
                survivor: 0,
                absorbed: 1,
            },
            TreeEvent::RootGrow { root: 2, height: 2 },
            TreeEvent::RootCollapse { root: 0, height: 1 },
            TreeEvent::Clear,
        ];
        for event in &events {
            observer.on_event(event);
        }
    }

    #[test]
    fn test_recording_observer_labels() {
        let observer = RecordingObserver::default();
        let key = 1i64;
        observer.on_event(&TreeEvent::Insert {
            key: &key,
            replaced: true,
        });
        observer.on_event(&TreeEvent::<i64>::Clear);
        assert_eq!(observer.labels(), vec!["replace", "clear"]);
    }
}
