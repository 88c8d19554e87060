use super::Result;

/// A distributed matrix of fixed length rows.
///
/// Both operations are batched over an ordered sequence of row ids that pairs
/// one to one with the given buffers. Every row is read and updated atomically
/// with respect to other calls touching the same row, there are no guarantees
/// across rows.
pub trait Table: Send + Sync {
    /// Returns the amount of rows in the table.
    fn rows(&self) -> usize;

    /// Returns the length of every row.
    fn cols(&self) -> usize;

    /// Copies the current value of each row into the paired buffer.
    ///
    /// # Arguments
    /// * `rows` - The row ids to read, duplicates are allowed.
    /// * `out` - One destination buffer per row id.
    ///
    /// # Returns
    /// A `StoreErr` if a row is out of range or a buffer has the wrong size.
    fn get_rows(&self, rows: &[usize], out: &mut [&mut [f32]]) -> Result<()>;

    /// Adds each delta to its paired row.
    ///
    /// # Arguments
    /// * `rows` - The row ids to update.
    /// * `deltas` - One delta buffer per row id.
    ///
    /// # Returns
    /// A `StoreErr` if a row is out of range or a buffer has the wrong size.
    fn add_rows(&self, rows: &[usize], deltas: &[&[f32]]) -> Result<()>;
}

/// A distributed table of integer counters.
pub trait KvTable: Send + Sync {
    /// Returns the current value of `key`, zero if it was never added to.
    fn get(&self, key: u32) -> Result<i64>;

    /// Adds `delta` to the value of `key`.
    fn add(&self, key: u32, delta: i64) -> Result<()>;
}
