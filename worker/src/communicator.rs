use std::time::Instant;

use log::{debug, info, warn};

use crate::{
    block::{DataBlock, NodeId},
    config::CommunicatorConfig,
    error::{Result, WorkerErr},
    pool::{BufferPool, RowBuffer},
    tables::{TableKind, TableSet},
};

/// The bridge between the training threads of one process and the shared tables.
///
/// It's meant to be shared by reference across every training thread, all of
/// them drawing their scratch rows from the same `BufferPool`.
pub struct Communicator {
    config: CommunicatorConfig,
    rank: usize,
    tables: TableSet,
    pool: BufferPool,
}

impl Communicator {
    /// Creates a new `Communicator` without any table.
    ///
    /// # Arguments
    /// * `config` - The communicator's settings.
    /// * `rank` - This process' rank in the cluster.
    ///
    /// # Returns
    /// A new `Communicator` instance, tables are built with `prepare_parameter_tables`.
    pub fn new(config: CommunicatorConfig, rank: usize) -> Self {
        Self::with_tables(config, rank, TableSet::empty())
    }

    /// Creates a new `Communicator` over an already built set of tables.
    pub fn with_tables(config: CommunicatorConfig, rank: usize, tables: TableSet) -> Self {
        let pool = BufferPool::new(config.embedding_size().get());

        Self {
            config,
            rank,
            tables,
            pool,
        }
    }

    /// Builds every table this communicator's configuration asks for.
    pub fn prepare_parameter_tables(&mut self) -> Result<()> {
        self.tables = TableSet::prepare(
            self.config.row_count(),
            self.config.embedding_size(),
            self.config.shard_rows(),
            self.config.use_adagrad(),
            self.config.seed(),
        )?;

        Ok(())
    }

    /// Drops every table handle.
    pub fn clear_parameter_tables(&mut self) {
        self.tables.clear();
    }

    /// The matrix tables synchronized for every block.
    fn active_kinds(&self) -> impl Iterator<Item = TableKind> {
        let accumulators: &'static [TableKind] = if self.config.use_adagrad() {
            &TableKind::ACCUMULATORS
        } else {
            &[]
        };

        TableKind::EMBEDDINGS
            .into_iter()
            .chain(accumulators.iter().copied())
    }

    /// Returns the nodes `kind`'s rows are indexed by in `block`.
    fn nodes_of(block: &DataBlock, kind: TableKind) -> Vec<NodeId> {
        match kind.side() {
            Some(side) => block.nodes(side).iter().copied().collect(),
            None => Vec::new(),
        }
    }

    /// Fetches the current rows of every node in `block` and attaches them.
    ///
    /// On success every node has one populated buffer per active table and the
    /// block owns them. On failure nothing is attached and every buffer taken
    /// by this call is back in the pool.
    ///
    /// # Arguments
    /// * `block` - The data block to populate.
    pub fn request_parameter(&self, block: &mut DataBlock) -> Result<()> {
        let start = Instant::now();
        let mut fetched: Vec<(TableKind, Vec<NodeId>, Vec<RowBuffer>)> = Vec::new();

        for kind in self.active_kinds() {
            let nodes = Self::nodes_of(block, kind);
            let mut bufs = self.pool.acquire(nodes.len());

            if let Err(e) = self.tables.get(kind, &nodes, &mut bufs) {
                self.pool.release(bufs);
                self.pool
                    .release(fetched.into_iter().flat_map(|(_, _, bufs)| bufs));
                return Err(e);
            }

            fetched.push((kind, nodes, bufs));
        }

        for (kind, nodes, bufs) in fetched {
            let replaced: Vec<_> = nodes
                .into_iter()
                .zip(bufs)
                .filter_map(|(node, buf)| block.attach(kind, node, buf))
                .collect();

            self.pool.release(replaced);
        }

        info!(
            rank = self.rank,
            secs = start.elapsed().as_secs_f64();
            "requested parameters"
        );

        Ok(())
    }

    /// Pushes the averaged difference between the block's rows and the shared
    /// rows back to the tables, then recycles the block's buffers.
    ///
    /// For every node the shared row is fetched again right before the update,
    /// and `(new - current) / thread_count` is added to it.
    ///
    /// # Arguments
    /// * `block` - The data block holding the updated rows, `None` is a no-op.
    ///
    /// # Returns
    /// A table error if occurred. The buffers of the tables already pushed are
    /// recycled, the rest stay attached to the block for `release_block`.
    pub fn add_delta_parameter(&self, block: Option<&mut DataBlock>) -> Result<()> {
        let Some(block) = block else {
            warn!(rank = self.rank; "add_delta_parameter called without a data block");
            return Ok(());
        };

        let start = Instant::now();
        let mut recycle = Vec::new();
        let ret = self.push_deltas(block, &mut recycle);
        self.pool.release(recycle);
        ret?;

        info!(
            rank = self.rank,
            secs = start.elapsed().as_secs_f64();
            "added delta parameters"
        );

        Ok(())
    }

    fn push_deltas(&self, block: &mut DataBlock, recycle: &mut Vec<RowBuffer>) -> Result<()> {
        let divisor = self.config.thread_count() as f32;

        for kind in self.active_kinds() {
            let nodes = Self::nodes_of(block, kind);
            let mut scratch = self.pool.acquire(nodes.len());
            let ret = self.push_delta(kind, block, &nodes, &mut scratch, divisor);
            recycle.append(&mut scratch);
            ret?;

            recycle.extend(block.detach_kind(kind));
        }

        Ok(())
    }

    /// Computes the delta of one table in `scratch` and adds it.
    fn push_delta(
        &self,
        kind: TableKind,
        block: &DataBlock,
        nodes: &[NodeId],
        scratch: &mut [RowBuffer],
        divisor: f32,
    ) -> Result<()> {
        self.tables.get(kind, nodes, scratch)?;

        for (&node, delta) in nodes.iter().zip(scratch.iter_mut()) {
            let new = block
                .row(kind, node)
                .ok_or(WorkerErr::MissingRow { kind, node })?;

            delta
                .iter_mut()
                .zip(new)
                .for_each(|(d, &n)| *d = (n - *d) / divisor);
        }

        self.tables.add(kind, nodes, scratch)?;
        debug!(rank = self.rank, rows = nodes.len(); "pushed {kind:?} delta");
        Ok(())
    }

    /// Adds `amount` processed words to the global word count.
    pub fn add_word_count(&self, amount: i64) -> Result<()> {
        self.tables.add_word_count(amount)
    }

    /// Returns the global amount of processed words.
    pub fn get_word_count(&self) -> Result<i64> {
        self.tables.get_word_count()
    }

    /// Reads the current input embedding rows of `nodes` into `bufs`.
    pub fn get_worker_table_rows(&self, nodes: &[NodeId], bufs: &mut [RowBuffer]) -> Result<()> {
        self.tables.get(TableKind::InputEmbedding, nodes, bufs)
    }

    /// Takes `count` scratch buffers out of the shared pool.
    pub fn acquire_buffers(&self, count: usize) -> Vec<RowBuffer> {
        self.pool.acquire(count)
    }

    /// Hands scratch buffers back to the shared pool.
    pub fn release_buffers<I>(&self, bufs: I)
    where
        I: IntoIterator<Item = RowBuffer>,
    {
        self.pool.release(bufs);
    }

    /// Recycles every buffer still attached to `block`.
    pub fn release_block(&self, block: &mut DataBlock) {
        self.pool.release(block.detach_all());
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn tables(&self) -> &TableSet {
        &self.tables
    }
}
