use std::{num::NonZeroUsize, sync::Arc};

use log::debug;
use rayon::prelude::*;

use super::BlockingShard;
use crate::{
    initialization::ParamGen,
    storage::{Result, StoreErr, Table},
};

/// Partitions a matrix's rows in shards and leverages
/// parallelization to read and write rows as fast as possible.
#[derive(Debug, Clone)]
pub struct BlockingTable {
    rows: usize,
    cols: usize,
    shard_rows: NonZeroUsize,
    shards: Arc<[BlockingShard]>,
}

impl BlockingTable {
    /// Creates a new `BlockingTable` matrix table.
    ///
    /// # Arguments
    /// * `rows` - The amount of rows in the table.
    /// * `cols` - The length of every row.
    /// * `shard_rows` - The maximum amount of rows per shard.
    /// * `param_gen` - The generator of the initial values, consumed row after row.
    ///
    /// # Returns
    /// A new `BlockingTable` instance or `StoreErr::Exhausted` if `param_gen`
    /// can't fill every row.
    pub fn new<PG>(
        rows: usize,
        cols: NonZeroUsize,
        shard_rows: NonZeroUsize,
        mut param_gen: PG,
    ) -> Result<Self>
    where
        PG: ParamGen,
    {
        let cols = cols.get();
        let mut shards = Vec::with_capacity(rows.div_ceil(shard_rows.get()));
        let mut filled = 0;

        while filled < rows {
            let nrows = shard_rows.get().min(rows - filled);
            let expected = nrows * cols;
            let params = param_gen.sample(expected).unwrap_or_default();

            if params.len() != expected {
                return Err(StoreErr::Exhausted {
                    expected,
                    got: params.len(),
                });
            }

            shards.push(BlockingShard::new(params, cols));
            filled += nrows;
        }

        debug!(rows = rows, cols = cols, shards = shards.len(); "table initialized");

        Ok(Self {
            rows,
            cols,
            shard_rows,
            shards: Arc::from(shards),
        })
    }

    /// Validates a whole batch before touching any row.
    fn check_batch<I>(&self, rows: &[usize], lens: I) -> Result<()>
    where
        I: ExactSizeIterator<Item = usize>,
    {
        if rows.len() != lens.len() {
            return Err(StoreErr::SizeMismatch {
                expected: rows.len(),
                got: lens.len(),
            });
        }

        if let Some(&row) = rows.iter().find(|&&row| row >= self.rows) {
            return Err(StoreErr::RowOutOfRange {
                row,
                rows: self.rows,
            });
        }

        match lens.into_iter().find(|&len| len != self.cols) {
            Some(got) => Err(StoreErr::SizeMismatch {
                expected: self.cols,
                got,
            }),
            None => Ok(()),
        }
    }

    fn locate(&self, row: usize) -> (&BlockingShard, usize) {
        let shard_rows = self.shard_rows.get();
        (&self.shards[row / shard_rows], row % shard_rows)
    }
}

impl Table for BlockingTable {
    fn rows(&self) -> usize {
        self.rows
    }

    fn cols(&self) -> usize {
        self.cols
    }

    fn get_rows(&self, rows: &[usize], out: &mut [&mut [f32]]) -> Result<()> {
        self.check_batch(rows, out.iter().map(|buf| buf.len()))?;

        rows.par_iter()
            .zip(out.par_iter_mut())
            .for_each(|(&row, buf)| {
                let (shard, local) = self.locate(row);
                shard.get_row(local, buf);
            });

        Ok(())
    }

    fn add_rows(&self, rows: &[usize], deltas: &[&[f32]]) -> Result<()> {
        self.check_batch(rows, deltas.iter().map(|delta| delta.len()))?;

        rows.par_iter().zip(deltas.par_iter()).for_each(|(&row, delta)| {
            let (shard, local) = self.locate(row);
            shard.add_row(local, delta);
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;
    use crate::initialization::ConstParamGen;

    const DIM: usize = 3;

    fn create_test_table(rows: usize, shard_rows: usize) -> BlockingTable {
        let cols = NonZeroUsize::new(DIM).unwrap();
        let shard_rows = NonZeroUsize::new(shard_rows).unwrap();
        let param_gen = ConstParamGen::zeros(rows * DIM);
        BlockingTable::new(rows, cols, shard_rows, param_gen).unwrap()
    }

    fn get(table: &BlockingTable, row: usize) -> [f32; DIM] {
        let mut out = [0.; DIM];
        table.get_rows(&[row], &mut [&mut out]).unwrap();
        out
    }

    #[test]
    fn add_then_get_across_ragged_shards() {
        let table = create_test_table(7, 3);

        table
            .add_rows(&[0, 3, 6], &[&[1., 1., 1.], &[2., 2., 2.], &[3., 3., 3.]])
            .unwrap();

        assert_eq!(get(&table, 0), [1.; DIM]);
        assert_eq!(get(&table, 1), [0.; DIM]);
        assert_eq!(get(&table, 3), [2.; DIM]);
        assert_eq!(get(&table, 6), [3.; DIM]);
    }

    #[test]
    fn duplicate_ids_get_independent_copies() {
        let table = create_test_table(2, 1);
        table.add_rows(&[1], &[&[1., 2., 3.]]).unwrap();

        let mut a = [0.; DIM];
        let mut b = [0.; DIM];
        table.get_rows(&[1, 1], &mut [&mut a, &mut b]).unwrap();

        assert_eq!(a, [1., 2., 3.]);
        assert_eq!(a, b);
    }

    #[test]
    fn duplicate_ids_add_twice() {
        let table = create_test_table(1, 1);
        table.add_rows(&[0, 0], &[&[1.; DIM], &[1.; DIM]]).unwrap();
        assert_eq!(get(&table, 0), [2.; DIM]);
    }

    #[test]
    fn out_of_range_row_is_rejected_untouched() {
        let table = create_test_table(4, 2);

        let err = table
            .add_rows(&[0, 4], &[&[1.; DIM], &[1.; DIM]])
            .unwrap_err();

        assert_eq!(err, StoreErr::RowOutOfRange { row: 4, rows: 4 });
        assert_eq!(get(&table, 0), [0.; DIM]);
    }

    #[test]
    fn size_mismatches() {
        let table = create_test_table(4, 2);

        let mut short = [0.; DIM - 1];
        let err = table.get_rows(&[0], &mut [&mut short]).unwrap_err();
        assert_eq!(
            err,
            StoreErr::SizeMismatch {
                expected: DIM,
                got: DIM - 1
            }
        );

        let err = table.add_rows(&[0, 1], &[&[0.; DIM]]).unwrap_err();
        assert_eq!(err, StoreErr::SizeMismatch { expected: 2, got: 1 });
    }

    #[test]
    fn exhausted_generator() {
        let cols = NonZeroUsize::new(DIM).unwrap();
        let shard_rows = NonZeroUsize::new(2).unwrap();
        let param_gen = ConstParamGen::zeros(DIM * 3);

        let err = BlockingTable::new(4, cols, shard_rows, param_gen).unwrap_err();
        assert_eq!(
            err,
            StoreErr::Exhausted {
                expected: DIM * 2,
                got: DIM
            }
        );
    }

    #[test]
    fn concurrent_adds_are_not_lost() {
        const THREADS: usize = 8;
        const ADDS: usize = 100;

        let table = create_test_table(2, 1);

        thread::scope(|s| {
            for _ in 0..THREADS {
                s.spawn(|| {
                    for _ in 0..ADDS {
                        table.add_rows(&[1], &[&[1.; DIM]]).unwrap();
                    }
                });
            }
        });

        assert_eq!(get(&table, 1), [(THREADS * ADDS) as f32; DIM]);
        assert_eq!(get(&table, 0), [0.; DIM]);
    }
}
