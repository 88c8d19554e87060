use std::{
    collections::{BTreeSet, HashMap},
    mem,
};

use crate::{
    pool::RowBuffer,
    tables::{NodeSide, TableKind},
};

/// The id of one vocabulary term's row.
pub type NodeId = usize;

/// One scheduled batch of training work.
///
/// Holds the nodes the batch touches and, once its parameters were requested,
/// the buffer holding each node's row for every matrix table. There's at most
/// one buffer per `(TableKind, NodeId)` at any time.
#[derive(Debug, Default)]
pub struct DataBlock {
    input_nodes: BTreeSet<NodeId>,
    output_nodes: BTreeSet<NodeId>,
    rows: HashMap<(TableKind, NodeId), RowBuffer>,
}

impl DataBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new `DataBlock` out of its input and output nodes, duplicates are merged.
    pub fn with_nodes<I, O>(input_nodes: I, output_nodes: O) -> Self
    where
        I: IntoIterator<Item = NodeId>,
        O: IntoIterator<Item = NodeId>,
    {
        Self {
            input_nodes: input_nodes.into_iter().collect(),
            output_nodes: output_nodes.into_iter().collect(),
            rows: HashMap::new(),
        }
    }

    pub fn add_input_node(&mut self, node: NodeId) {
        self.input_nodes.insert(node);
    }

    pub fn add_output_node(&mut self, node: NodeId) {
        self.output_nodes.insert(node);
    }

    pub fn input_nodes(&self) -> &BTreeSet<NodeId> {
        &self.input_nodes
    }

    pub fn output_nodes(&self) -> &BTreeSet<NodeId> {
        &self.output_nodes
    }

    /// Returns the nodes of one side of the block.
    pub fn nodes(&self, side: NodeSide) -> &BTreeSet<NodeId> {
        match side {
            NodeSide::Input => &self.input_nodes,
            NodeSide::Output => &self.output_nodes,
        }
    }

    /// Returns the row of `node` in the `kind` table, if it was requested.
    pub fn row(&self, kind: TableKind, node: NodeId) -> Option<&[f32]> {
        self.rows.get(&(kind, node)).map(|buf| &**buf)
    }

    /// Returns a mutable view of the row of `node` in the `kind` table.
    ///
    /// The training logic writes the updated row values through here before
    /// pushing the block's delta back.
    pub fn row_mut(&mut self, kind: TableKind, node: NodeId) -> Option<&mut [f32]> {
        self.rows.get_mut(&(kind, node)).map(|buf| &mut **buf)
    }

    /// Returns the amount of buffers currently attached.
    pub fn attached(&self) -> usize {
        self.rows.len()
    }

    /// Attaches `buf` as the row of `node` in the `kind` table.
    ///
    /// # Returns
    /// The buffer previously attached under the same key, which the caller now owns.
    pub(crate) fn attach(&mut self, kind: TableKind, node: NodeId, buf: RowBuffer) -> Option<RowBuffer> {
        self.rows.insert((kind, node), buf)
    }

    /// Takes the buffer of `node` in the `kind` table out of the block.
    pub fn detach(&mut self, kind: TableKind, node: NodeId) -> Option<RowBuffer> {
        self.rows.remove(&(kind, node))
    }

    /// Detaches every buffer of the `kind` table.
    pub(crate) fn detach_kind(&mut self, kind: TableKind) -> Vec<RowBuffer> {
        let (taken, kept): (HashMap<_, _>, HashMap<_, _>) = mem::take(&mut self.rows)
            .into_iter()
            .partition(|((k, _), _)| *k == kind);

        self.rows = kept;
        taken.into_values().collect()
    }

    /// Detaches every buffer of every table.
    pub(crate) fn detach_all(&mut self) -> Vec<RowBuffer> {
        mem::take(&mut self.rows).into_values().collect()
    }
}
