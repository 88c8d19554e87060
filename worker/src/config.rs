use std::{num::NonZeroUsize, time::Duration};

use comms::specs::worker::{CommunicatorSpec, RendezvousSpec};

use crate::error::{Result, WorkerErr};

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30 * 60);
const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(3);
const DEFAULT_SHARD_ROWS: usize = 1024;

/// Immutable settings of the rendezvous with the brokers.
#[derive(Debug, Clone)]
pub struct RendezvousConfig {
    brokers: Vec<String>,
    clients_size: NonZeroUsize,
    identity: String,
    port: u16,
    connect_timeout: Duration,
    read_timeout: Duration,
    connect_retries: usize,
    retry_backoff: Duration,
    reply_capacity: NonZeroUsize,
}

impl RendezvousConfig {
    /// Creates a new rendezvous configuration with the default timeouts.
    ///
    /// # Args
    /// * `brokers` - Broker endpoints as `host:port`.
    /// * `clients_size` - How many workers this registrant contributes.
    /// * `identity` - A human readable tag for this worker.
    /// * `port` - The local port used for peer to peer traffic.
    ///
    /// # Returns
    /// A `RendezvousConfig` instance.
    pub fn new(brokers: Vec<String>, clients_size: NonZeroUsize, identity: String, port: u16) -> Self {
        Self {
            brokers,
            clients_size,
            identity,
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
            connect_retries: 0,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            reply_capacity: NonZeroUsize::new(comms::DEFAULT_CAPACITY).unwrap_or(NonZeroUsize::MIN),
        }
    }

    /// Builds the configuration out of the bootstrap specification.
    ///
    /// # Args
    /// * `spec` - The rendezvous section of the worker spec.
    ///
    /// # Returns
    /// The configuration or `WorkerErr::Config` if the spec has no usable brokers.
    pub fn from_spec(spec: &RendezvousSpec) -> Result<Self> {
        if let Some(broker) = spec.brokers.iter().find(|b| !b.contains(':')) {
            return Err(WorkerErr::Config(format!(
                "broker `{broker}` must be given as host:port"
            )));
        }

        let mut cfg = Self::new(
            spec.brokers.clone(),
            spec.clients_size,
            spec.identity.clone(),
            spec.port,
        );

        if let Some(secs) = spec.connect_timeout_secs {
            cfg.connect_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = spec.read_timeout_secs {
            cfg.read_timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = spec.connect_retries {
            cfg.connect_retries = retries;
        }
        if let Some(ms) = spec.retry_backoff_ms {
            cfg.retry_backoff = Duration::from_millis(ms);
        }
        if let Some(capacity) = spec.reply_capacity {
            cfg.reply_capacity = capacity;
        }

        Ok(cfg)
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Allows `retries` extra connection attempts per broker, `backoff` apart.
    pub fn with_connect_retries(mut self, retries: usize, backoff: Duration) -> Self {
        self.connect_retries = retries;
        self.retry_backoff = backoff;
        self
    }

    pub fn brokers(&self) -> &[String] {
        &self.brokers
    }

    pub fn clients_size(&self) -> usize {
        self.clients_size.get()
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
    }

    pub fn connect_retries(&self) -> usize {
        self.connect_retries
    }

    pub fn retry_backoff(&self) -> Duration {
        self.retry_backoff
    }

    pub fn reply_capacity(&self) -> usize {
        self.reply_capacity.get()
    }
}

/// Immutable settings of a `Communicator` and the tables it prepares.
#[derive(Debug, Clone)]
pub struct CommunicatorConfig {
    embedding_size: NonZeroUsize,
    row_count: NonZeroUsize,
    thread_count: NonZeroUsize,
    use_adagrad: bool,
    shard_rows: NonZeroUsize,
    seed: Option<u64>,
}

impl CommunicatorConfig {
    /// Creates a new communicator configuration.
    ///
    /// # Args
    /// * `embedding_size` - The length of every row.
    /// * `row_count` - The amount of rows per table.
    /// * `thread_count` - The amount of local threads averaging their updates.
    ///
    /// # Returns
    /// A `CommunicatorConfig` instance with AdaGrad disabled.
    pub fn new(embedding_size: NonZeroUsize, row_count: NonZeroUsize, thread_count: NonZeroUsize) -> Self {
        Self {
            embedding_size,
            row_count,
            thread_count,
            use_adagrad: false,
            shard_rows: NonZeroUsize::new(DEFAULT_SHARD_ROWS).unwrap_or(NonZeroUsize::MIN),
            seed: None,
        }
    }

    /// Builds the configuration out of the bootstrap specification.
    pub fn from_spec(spec: &CommunicatorSpec) -> Self {
        let mut cfg = Self::new(spec.embedding_size, spec.row_count, spec.thread_count)
            .with_adagrad(spec.use_adagrad);

        cfg.seed = spec.seed;
        if let Some(shard_rows) = spec.shard_rows {
            cfg.shard_rows = shard_rows;
        }

        cfg
    }

    pub fn with_adagrad(mut self, use_adagrad: bool) -> Self {
        self.use_adagrad = use_adagrad;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_shard_rows(mut self, shard_rows: NonZeroUsize) -> Self {
        self.shard_rows = shard_rows;
        self
    }

    pub fn embedding_size(&self) -> NonZeroUsize {
        self.embedding_size
    }

    pub fn row_count(&self) -> usize {
        self.row_count.get()
    }

    pub fn thread_count(&self) -> usize {
        self.thread_count.get()
    }

    pub fn use_adagrad(&self) -> bool {
        self.use_adagrad
    }

    pub fn shard_rows(&self) -> NonZeroUsize {
        self.shard_rows
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}
