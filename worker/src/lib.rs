//! The worker side of the parameter synchronization layer.
//!
//! A worker first discovers its peers through `ClusterRendezvous`, then every
//! training thread moves rows between its `DataBlock`s and the shared tables
//! through one shared `Communicator`.

pub mod block;
pub mod communicator;
pub mod config;
pub mod error;
pub mod pool;
pub mod rendezvous;
pub mod tables;

pub use block::{DataBlock, NodeId};
pub use communicator::Communicator;
pub use config::{CommunicatorConfig, RendezvousConfig};
pub use error::{Result, WorkerErr};
pub use pool::{BufferPool, RowBuffer};
pub use rendezvous::{Cluster, ClusterRendezvous, PeerEndpoint};
pub use tables::{NodeSide, TableKind, TableSet, WORD_COUNT_KEY};
