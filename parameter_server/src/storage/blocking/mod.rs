mod kv;
mod shard;
mod table;

pub use kv::BlockingKv;
use shard::BlockingShard;
pub use table::BlockingTable;
