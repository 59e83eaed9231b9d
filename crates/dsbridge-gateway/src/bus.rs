//! Host bus sink and delta batches.
//!
//! The gateway does not talk to the host bus directly; it emits batches
//! of (path, value) updates and (path, metadata) declarations into an
//! mpsc channel owned by the embedding application. A [`Delta`] collects
//! additions and commits them as one atomic batch, so every channel
//! update derived from a single status report travels together.

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

/// One state update for a bus path.
#[derive(Debug, Clone, PartialEq)]
pub struct PathValue {
    pub path: String,
    pub value: Value,
}

/// One metadata declaration for a bus path.
#[derive(Debug, Clone, PartialEq)]
pub struct PathMeta {
    pub path: String,
    pub meta: Value,
}

/// Batch forwarded to the host bus.
#[derive(Debug, Clone, PartialEq)]
pub enum BusMessage {
    /// Atomic batch of state updates.
    Delta(Vec<PathValue>),
    /// Batch of metadata declarations.
    Meta(Vec<PathMeta>),
}

/// Sending side of the host bus channel.
pub type BusSink = mpsc::UnboundedSender<BusMessage>;

/// Accumulator for one atomic bus batch.
///
/// Values and metadata added since the last commit are sent together and
/// the builder is cleared, ready for reuse.
#[derive(Debug, Default)]
pub struct Delta {
    values: Vec<PathValue>,
    metas: Vec<PathMeta>,
}

impl Delta {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a state update to the pending batch.
    pub fn add_value(&mut self, path: impl Into<String>, value: Value) -> &mut Self {
        self.values.push(PathValue {
            path: path.into(),
            value,
        });
        self
    }

    /// Add a metadata declaration to the pending batch.
    pub fn add_meta(&mut self, path: impl Into<String>, meta: Value) -> &mut Self {
        self.metas.push(PathMeta {
            path: path.into(),
            meta,
        });
        self
    }

    /// True if nothing has been added since the last commit.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.metas.is_empty()
    }

    /// Send everything added since the last commit and clear the builder.
    ///
    /// A closed sink is logged and otherwise ignored: losing the bus
    /// consumer must not take the gateway down.
    pub fn commit(&mut self, sink: &BusSink) {
        if !self.metas.is_empty() {
            let metas = std::mem::take(&mut self.metas);
            if sink.send(BusMessage::Meta(metas)).is_err() {
                warn!("host bus sink is closed, metadata batch dropped");
            }
        }
        if !self.values.is_empty() {
            let values = std::mem::take(&mut self.values);
            if sink.send(BusMessage::Delta(values)).is_err() {
                warn!("host bus sink is closed, delta batch dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn commit_sends_one_batch_and_clears() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut delta = Delta::new();
        delta
            .add_value("a.b.1R.state", json!(true))
            .add_value("a.b.2R.state", json!(false));
        delta.commit(&tx);

        match rx.try_recv().unwrap() {
            BusMessage::Delta(values) => {
                assert_eq!(values.len(), 2);
                assert_eq!(values[0].path, "a.b.1R.state");
                assert_eq!(values[0].value, json!(true));
            }
            other => panic!("expected delta batch, got {other:?}"),
        }
        assert!(rx.try_recv().is_err());
        assert!(delta.is_empty());
    }

    #[test]
    fn metadata_and_values_travel_in_separate_batches() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut delta = Delta::new();
        delta.add_meta("a.b", json!({ "description": "bank" }));
        delta.add_value("a.b.1R.state", json!(true));
        delta.commit(&tx);

        assert!(matches!(rx.try_recv().unwrap(), BusMessage::Meta(_)));
        assert!(matches!(rx.try_recv().unwrap(), BusMessage::Delta(_)));
    }

    #[test]
    fn empty_commit_sends_nothing() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        Delta::new().commit(&tx);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn commit_to_closed_sink_does_not_panic() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let mut delta = Delta::new();
        delta.add_value("a", json!(1));
        delta.commit(&tx);
    }
}
