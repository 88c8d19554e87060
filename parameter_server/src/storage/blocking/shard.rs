use parking_lot::RwLock;

/// A contiguous run of rows guarded by a single lock.
///
/// Readers copy whole rows under the read lock and writers add whole rows under
/// the write lock, so a row is never observed half updated.
#[derive(Debug)]
pub struct BlockingShard {
    cols: usize,
    params: RwLock<Box<[f32]>>,
}

impl BlockingShard {
    /// Creates a new `BlockingShard` row shard.
    ///
    /// # Arguments
    /// * `params` - The initial state of the rows, laid out row after row.
    /// * `cols` - The length of every row.
    ///
    /// # Returns
    /// A new `BlockingShard` instance.
    pub fn new(params: Vec<f32>, cols: usize) -> Self {
        Self {
            cols,
            params: RwLock::new(params.into_boxed_slice()),
        }
    }

    /// Copies the row at `local` into `out`.
    ///
    /// The caller must have checked that `local` is inside the shard and that
    /// `out` is exactly one row long.
    pub fn get_row(&self, local: usize, out: &mut [f32]) {
        let start = local * self.cols;
        let params = self.params.read();
        out.copy_from_slice(&params[start..start + self.cols]);
    }

    /// Adds `delta` to the row at `local`.
    ///
    /// Same preconditions as `get_row`.
    pub fn add_row(&self, local: usize, delta: &[f32]) {
        let start = local * self.cols;
        let mut params = self.params.write();

        params[start..start + self.cols]
            .iter_mut()
            .zip(delta)
            .for_each(|(p, d)| *p += d);
    }
}
