mod blocking;
mod error;
mod table;

pub use blocking::{BlockingKv, BlockingTable};
pub use error::{Result, StoreErr};
pub use table::{KvTable, Table};
