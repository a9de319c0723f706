//! Consumer dependency graph
//!
//! Nodes are stored in registration order and may only depend on nodes that
//! were registered before them, so the graph is acyclic by construction and
//! registration order is a valid topological order.

use crate::disruptor::{ConsumerInfo, DisruptorError, Result, Sequence};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

static NEXT_REPOSITORY: AtomicU64 = AtomicU64::new(0);

/// Identifier of a registered consumer
///
/// Only valid for the repository that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId {
    repository: u64,
    index: usize,
}

impl ConsumerId {
    /// Position in registration order
    pub fn index(self) -> usize {
        self.index
    }
}

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.index)
    }
}

struct ConsumerNode {
    info: Arc<dyn ConsumerInfo>,
    upstream: Vec<ConsumerId>,
}

/// Node table plus upstream adjacency
pub struct ConsumerRepository {
    token: u64,
    nodes: Vec<ConsumerNode>,
    by_sequence: HashMap<usize, ConsumerId>,
}

/// Sequences are identified by address, not by value
fn sequence_key(sequence: &Arc<Sequence>) -> usize {
    Arc::as_ptr(sequence) as usize
}

impl ConsumerRepository {
    pub fn new() -> Self {
        Self {
            token: NEXT_REPOSITORY.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            by_sequence: HashMap::new(),
        }
    }

    fn id(&self, index: usize) -> ConsumerId {
        ConsumerId {
            repository: self.token,
            index,
        }
    }

    /// The node behind `id`, if this repository issued it
    fn node(&self, id: ConsumerId) -> Option<&ConsumerNode> {
        if id.repository != self.token {
            return None;
        }
        self.nodes.get(id.index)
    }

    /// Register `info` downstream of `upstream`
    ///
    /// Every upstream node is marked as used in a barrier, which removes it
    /// from the producer's gating set.
    ///
    /// # Errors
    /// Returns [`DisruptorError::UnknownConsumer`] if an upstream id has not
    /// been registered here yet, including ids issued by another repository.
    /// Nothing is registered in that case.
    pub fn register(
        &mut self,
        info: Arc<dyn ConsumerInfo>,
        upstream: &[ConsumerId],
    ) -> Result<ConsumerId> {
        if let Some(unknown) = upstream.iter().find(|id| self.node(**id).is_none()) {
            return Err(DisruptorError::UnknownConsumer(unknown.index));
        }

        let id = self.id(self.nodes.len());
        for sequence in info.sequences() {
            self.by_sequence.insert(sequence_key(&sequence), id);
        }

        for upstream_id in upstream {
            self.nodes[upstream_id.index].info.mark_as_used_in_barrier();
        }

        self.nodes.push(ConsumerNode {
            info,
            upstream: upstream.to_vec(),
        });

        debug!(consumer = id.index, upstream = ?upstream, "registered consumer");
        Ok(id)
    }

    pub fn get(&self, id: ConsumerId) -> Option<&Arc<dyn ConsumerInfo>> {
        self.node(id).map(|node| &node.info)
    }

    /// Ids the consumer was registered after
    pub fn upstream_of(&self, id: ConsumerId) -> Result<&[ConsumerId]> {
        self.node(id)
            .map(|node| node.upstream.as_slice())
            .ok_or(DisruptorError::UnknownConsumer(id.index))
    }

    /// Ids of the consumers that directly depend on `id`
    pub fn dependents_of(&self, id: ConsumerId) -> Vec<ConsumerId> {
        self.iter_nodes()
            .filter(|(_, node)| node.upstream.contains(&id))
            .map(|(dependent, _)| dependent)
            .collect()
    }

    /// All sequences of the given consumers, for building a barrier on them
    pub fn sequences_for(&self, ids: &[ConsumerId]) -> Result<Vec<Arc<Sequence>>> {
        let mut sequences = Vec::new();
        for id in ids {
            let info = self.get(*id).ok_or(DisruptorError::UnknownConsumer(id.index))?;
            sequences.extend(info.sequences());
        }
        Ok(sequences)
    }

    /// The consumer owning `sequence`
    pub fn id_for_sequence(&self, sequence: &Arc<Sequence>) -> Option<ConsumerId> {
        self.by_sequence.get(&sequence_key(sequence)).copied()
    }

    /// Sequences of every end-of-chain consumer
    pub fn end_of_chain_sequences(&self) -> Vec<Arc<Sequence>> {
        self.nodes
            .iter()
            .filter(|node| node.info.is_end_of_chain())
            .flat_map(|node| node.info.sequences())
            .collect()
    }

    /// Whether any end-of-chain consumer is behind `cursor`
    pub fn has_backlog(&self, cursor: i64) -> bool {
        self.nodes
            .iter()
            .filter(|node| node.info.is_end_of_chain())
            .any(|node| node.info.progress() < cursor)
    }

    /// End-of-chain consumers that stopped while behind `cursor`
    ///
    /// Producers gate on these nodes, so the backlog can never drain.
    ///
    /// # Returns
    /// Each such consumer with its progress, in registration order
    pub fn halted_with_backlog(&self, cursor: i64) -> Vec<(ConsumerId, i64)> {
        self.iter_nodes()
            .filter(|(_, node)| node.info.is_end_of_chain() && !node.info.is_running())
            .map(|(id, node)| (id, node.info.progress()))
            .filter(|(_, progress)| *progress < cursor)
            .collect()
    }

    /// Halted consumers that still have running dependents
    ///
    /// The dependents of such a node can never make progress again.
    pub fn stalled_dependents(&self) -> Vec<(ConsumerId, Vec<ConsumerId>)> {
        self.iter_nodes()
            .filter(|(_, node)| !node.info.is_running())
            .filter_map(|(id, _)| {
                let running: Vec<_> = self
                    .dependents_of(id)
                    .into_iter()
                    .filter(|dependent| self.nodes[dependent.index].info.is_running())
                    .collect();
                (!running.is_empty()).then_some((id, running))
            })
            .collect()
    }

    /// Every consumer downstream of `id`, in registration order
    pub fn downstream_of(&self, id: ConsumerId) -> Vec<ConsumerId> {
        let mut downstream = Vec::new();
        if self.node(id).is_none() {
            return downstream;
        }

        let mut reached = vec![false; self.nodes.len()];
        reached[id.index] = true;
        for (candidate, node) in self.iter_nodes().skip(id.index + 1) {
            if node.upstream.iter().any(|upstream| reached[upstream.index]) {
                reached[candidate.index] = true;
                downstream.push(candidate);
            }
        }
        downstream
    }

    /// Consumers in registration order
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (ConsumerId, &Arc<dyn ConsumerInfo>)> {
        self.nodes
            .iter()
            .enumerate()
            .map(move |(index, node)| (self.id(index), &node.info))
    }

    fn iter_nodes(&self) -> impl Iterator<Item = (ConsumerId, &ConsumerNode)> {
        self.nodes
            .iter()
            .enumerate()
            .map(move |(index, node)| (self.id(index), node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl Default for ConsumerRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConsumerRepository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.nodes.iter().enumerate().map(|(index, node)| {
                (
                    index,
                    &node.upstream,
                    node.info.is_end_of_chain(),
                    node.info.is_running(),
                )
            }))
            .finish()
    }
}
