use std::{collections::HashMap, num::NonZeroUsize, sync::Arc};

use log::info;
use parameter_server::{
    initialization::{ConstParamGen, RandParamGen},
    storage::{BlockingKv, BlockingTable, KvTable, Table},
};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    error::{Result, WorkerErr},
    pool::RowBuffer,
};

/// The key of the global processed word counter inside the word count table.
pub const WORD_COUNT_KEY: u32 = 0;

/// Which node set of a `DataBlock` a table's rows belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeSide {
    Input,
    Output,
}

/// Every table the training job shares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    InputEmbedding,
    OutputEmbedding,
    InputGradientAccumulator,
    OutputGradientAccumulator,
    WordCount,
}

impl TableKind {
    /// The matrix tables that always exist.
    pub const EMBEDDINGS: [TableKind; 2] = [TableKind::InputEmbedding, TableKind::OutputEmbedding];

    /// The matrix tables that only exist in AdaGrad mode.
    pub const ACCUMULATORS: [TableKind; 2] = [
        TableKind::InputGradientAccumulator,
        TableKind::OutputGradientAccumulator,
    ];

    /// Every matrix table, in the order the communicator visits them.
    pub const MATRICES: [TableKind; 4] = [
        TableKind::InputEmbedding,
        TableKind::OutputEmbedding,
        TableKind::InputGradientAccumulator,
        TableKind::OutputGradientAccumulator,
    ];

    /// Returns the node set this table is indexed by, `None` for the word count.
    pub fn side(self) -> Option<NodeSide> {
        match self {
            TableKind::InputEmbedding | TableKind::InputGradientAccumulator => Some(NodeSide::Input),
            TableKind::OutputEmbedding | TableKind::OutputGradientAccumulator => {
                Some(NodeSide::Output)
            }
            TableKind::WordCount => None,
        }
    }

    pub fn is_matrix(self) -> bool {
        self.side().is_some()
    }
}

/// Typed handles to the shared parameter store, one per `TableKind`.
#[derive(Default, Clone)]
pub struct TableSet {
    matrices: HashMap<TableKind, Arc<dyn Table>>,
    word_count: Option<Arc<dyn KvTable>>,
}

impl TableSet {
    /// Creates a set without any table, tables are plugged in with `insert`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds every table in process.
    ///
    /// The input embedding is filled from `[-0.5 / column_size, 0.5 / column_size)`,
    /// every other table starts zero filled. The gradient accumulators are only
    /// built when `use_adagrad` is set.
    ///
    /// # Arguments
    /// * `row_count` - The amount of rows per matrix table.
    /// * `column_size` - The length of every row.
    /// * `shard_rows` - The amount of rows behind one lock.
    /// * `use_adagrad` - Whether to build the accumulator tables.
    /// * `seed` - Seed of the input embedding initializer, random if `None`.
    ///
    /// # Returns
    /// The prepared set or an error if the initializer can't be built.
    pub fn prepare(
        row_count: usize,
        column_size: NonZeroUsize,
        shard_rows: NonZeroUsize,
        use_adagrad: bool,
        seed: Option<u64>,
    ) -> Result<Self> {
        let limit = row_count * column_size.get();
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let mut set = Self::empty();

        let filler = RandParamGen::embedding(rng, limit, column_size.get())?;
        let input = BlockingTable::new(row_count, column_size, shard_rows, filler)?;
        set.insert(TableKind::InputEmbedding, Arc::new(input))?;

        let kinds = if use_adagrad {
            &TableKind::MATRICES[1..]
        } else {
            &TableKind::MATRICES[1..2]
        };

        for &kind in kinds {
            let zeros = ConstParamGen::zeros(limit);
            let table = BlockingTable::new(row_count, column_size, shard_rows, zeros)?;
            set.insert(kind, Arc::new(table))?;
        }

        set.set_word_count(Arc::new(BlockingKv::new()));

        info!(
            rows = row_count,
            cols = column_size.get(),
            adagrad = use_adagrad;
            "prepared parameter tables"
        );

        Ok(set)
    }

    /// Plugs a matrix table in, replacing any previous table of the same kind.
    ///
    /// # Returns
    /// `WorkerErr::Config` if `kind` isn't a matrix kind.
    pub fn insert(&mut self, kind: TableKind, table: Arc<dyn Table>) -> Result<()> {
        if !kind.is_matrix() {
            return Err(WorkerErr::Config(format!("{kind:?} is not a matrix table")));
        }

        self.matrices.insert(kind, table);
        Ok(())
    }

    /// Plugs the word count table in.
    pub fn set_word_count(&mut self, table: Arc<dyn KvTable>) {
        self.word_count = Some(table);
    }

    /// Drops every handle.
    pub fn clear(&mut self) {
        self.matrices.clear();
        self.word_count = None;
    }

    pub fn contains(&self, kind: TableKind) -> bool {
        match kind {
            TableKind::WordCount => self.word_count.is_some(),
            kind => self.matrices.contains_key(&kind),
        }
    }

    fn matrix(&self, kind: TableKind) -> Result<&Arc<dyn Table>> {
        self.matrices
            .get(&kind)
            .ok_or(WorkerErr::MissingTable(kind))
    }

    fn counter(&self) -> Result<&Arc<dyn KvTable>> {
        self.word_count
            .as_ref()
            .ok_or(WorkerErr::MissingTable(TableKind::WordCount))
    }

    /// Reads the current shared rows of `nodes` into `bufs`.
    ///
    /// # Arguments
    /// * `kind` - The matrix table to read from.
    /// * `nodes` - The row ids, duplicates get independent copies.
    /// * `bufs` - One destination buffer per node.
    pub fn get(&self, kind: TableKind, nodes: &[usize], bufs: &mut [RowBuffer]) -> Result<()> {
        let table = self.matrix(kind)?;
        check_len(nodes.len(), bufs.len())?;

        let mut out: Vec<&mut [f32]> = bufs.iter_mut().map(|buf| &mut **buf).collect();
        table.get_rows(nodes, &mut out)?;
        Ok(())
    }

    /// Adds each delta buffer to the shared row of its paired node.
    ///
    /// # Arguments
    /// * `kind` - The matrix table to update.
    /// * `nodes` - The row ids.
    /// * `deltas` - One delta buffer per node.
    pub fn add(&self, kind: TableKind, nodes: &[usize], deltas: &[RowBuffer]) -> Result<()> {
        let table = self.matrix(kind)?;
        check_len(nodes.len(), deltas.len())?;

        let deltas: Vec<&[f32]> = deltas.iter().map(|delta| &**delta).collect();
        table.add_rows(nodes, &deltas)?;
        Ok(())
    }

    /// Returns the global processed word count.
    pub fn get_word_count(&self) -> Result<i64> {
        Ok(self.counter()?.get(WORD_COUNT_KEY)?)
    }

    /// Adds `amount` to the global processed word count.
    pub fn add_word_count(&self, amount: i64) -> Result<()> {
        Ok(self.counter()?.add(WORD_COUNT_KEY, amount)?)
    }
}

fn check_len(expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(WorkerErr::LengthMismatch { expected, got });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::BufferPool;

    const DIM: usize = 4;
    const ROWS: usize = 10;

    fn prepare(use_adagrad: bool) -> TableSet {
        let dim = NonZeroUsize::new(DIM).unwrap();
        let shard_rows = NonZeroUsize::new(3).unwrap();
        TableSet::prepare(ROWS, dim, shard_rows, use_adagrad, Some(1)).unwrap()
    }

    #[test]
    fn accumulators_only_with_adagrad() {
        let plain = prepare(false);
        assert!(TableKind::EMBEDDINGS.iter().all(|&k| plain.contains(k)));
        assert!(TableKind::ACCUMULATORS.iter().all(|&k| !plain.contains(k)));
        assert!(plain.contains(TableKind::WordCount));

        let adagrad = prepare(true);
        assert!(TableKind::MATRICES.iter().all(|&k| adagrad.contains(k)));
    }

    #[test]
    fn missing_accumulator_is_an_error() {
        let tables = prepare(false);
        let pool = BufferPool::new(DIM);
        let mut bufs = pool.acquire(1);

        let err = tables
            .get(TableKind::InputGradientAccumulator, &[0], &mut bufs)
            .unwrap_err();

        assert!(matches!(
            err,
            WorkerErr::MissingTable(TableKind::InputGradientAccumulator)
        ));
    }

    #[test]
    fn input_embedding_is_small_uniform_others_zero() {
        let tables = prepare(true);
        let pool = BufferPool::new(DIM);
        let nodes: Vec<usize> = (0..ROWS).collect();
        let bound = 0.5 / DIM as f32;

        let mut bufs = pool.acquire(ROWS);
        tables.get(TableKind::InputEmbedding, &nodes, &mut bufs).unwrap();
        assert!(bufs.iter().flat_map(|b| b.iter()).all(|&v| (-bound..bound).contains(&v)));
        assert!(bufs.iter().flat_map(|b| b.iter()).any(|&v| v != 0.));

        for kind in &TableKind::MATRICES[1..] {
            tables.get(*kind, &nodes, &mut bufs).unwrap();
            assert!(bufs.iter().flat_map(|b| b.iter()).all(|&v| v == 0.));
        }
    }

    #[test]
    fn add_then_get() {
        let tables = prepare(false);
        let pool = BufferPool::new(DIM);

        let mut deltas = pool.acquire(2);
        deltas[0].fill(1.);
        deltas[1].fill(2.);
        tables.add(TableKind::OutputEmbedding, &[3, 3], &deltas).unwrap();

        let mut bufs = pool.acquire(1);
        tables.get(TableKind::OutputEmbedding, &[3], &mut bufs).unwrap();
        assert_eq!(*bufs[0], [3.; DIM]);
    }

    #[test]
    fn length_mismatch() {
        let tables = prepare(false);
        let pool = BufferPool::new(DIM);
        let mut bufs = pool.acquire(1);

        let err = tables
            .get(TableKind::OutputEmbedding, &[0, 1], &mut bufs)
            .unwrap_err();
        assert!(matches!(
            err,
            WorkerErr::LengthMismatch {
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn word_count() {
        let tables = prepare(false);

        tables.add_word_count(10).unwrap();
        tables.add_word_count(5).unwrap();
        assert_eq!(tables.get_word_count().unwrap(), 15);
    }

    #[test]
    fn cleared_set_has_no_tables() {
        let mut tables = prepare(false);
        tables.clear();

        assert!(!tables.contains(TableKind::InputEmbedding));
        assert!(matches!(
            tables.get_word_count(),
            Err(WorkerErr::MissingTable(TableKind::WordCount))
        ));
    }

    #[test]
    fn word_count_is_not_a_matrix() {
        let mut tables = TableSet::empty();
        let table = prepare(false).matrix(TableKind::InputEmbedding).unwrap().clone();

        assert!(tables.insert(TableKind::WordCount, table).is_err());
    }
}
