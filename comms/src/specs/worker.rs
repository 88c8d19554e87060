use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};

/// Bootstrap specification for a worker process.
///
/// This is read from the worker's configuration file before joining the cluster.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSpec {
    pub rendezvous: RendezvousSpec,
    pub communicator: CommunicatorSpec,
}

/// How to reach the brokers and what to register with them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendezvousSpec {
    /// Broker endpoints as `host:port`.
    pub brokers: Vec<String>,
    pub clients_size: NonZeroUsize,
    pub identity: String,
    pub port: u16,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub read_timeout_secs: Option<u64>,
    #[serde(default)]
    pub connect_retries: Option<usize>,
    #[serde(default)]
    pub retry_backoff_ms: Option<u64>,
    #[serde(default)]
    pub reply_capacity: Option<NonZeroUsize>,
}

/// Shape of the shared tables and the local update averaging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommunicatorSpec {
    pub embedding_size: NonZeroUsize,
    /// The amount of rows of every matrix table, i.e. the vocabulary size.
    pub row_count: NonZeroUsize,
    /// The amount of local threads sharing one communicator.
    pub thread_count: NonZeroUsize,
    #[serde(default)]
    pub use_adagrad: bool,
    #[serde(default)]
    pub shard_rows: Option<NonZeroUsize>,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_fields_default() {
        let json = r#"{
            "rendezvous": {
                "brokers": ["127.0.0.1:7000"],
                "clients_size": 1,
                "identity": "wk-0",
                "port": 9000
            },
            "communicator": {
                "embedding_size": 8,
                "row_count": 100,
                "thread_count": 4
            }
        }"#;

        let spec: WorkerSpec = serde_json::from_str(json).unwrap();

        assert_eq!(spec.rendezvous.brokers, ["127.0.0.1:7000"]);
        assert!(spec.rendezvous.read_timeout_secs.is_none());
        assert!(spec.rendezvous.reply_capacity.is_none());
        assert!(!spec.communicator.use_adagrad);
        assert_eq!(spec.communicator.thread_count.get(), 4);
    }

    #[test]
    fn zero_threads_rejected() {
        let json = r#"{"embedding_size": 8, "row_count": 10, "thread_count": 0}"#;
        assert!(serde_json::from_str::<CommunicatorSpec>(json).is_err());
    }
}
