use std::collections::HashMap;

use parking_lot::RwLock;

use crate::storage::{KvTable, Result};

/// An in process table of integer counters.
#[derive(Debug, Default)]
pub struct BlockingKv {
    values: RwLock<HashMap<u32, i64>>,
}

impl BlockingKv {
    /// Creates a new empty `BlockingKv`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvTable for BlockingKv {
    fn get(&self, key: u32) -> Result<i64> {
        Ok(self.values.read().get(&key).copied().unwrap_or_default())
    }

    fn add(&self, key: u32, delta: i64) -> Result<()> {
        *self.values.write().entry(key).or_default() += delta;
        Ok(())
    }
}
