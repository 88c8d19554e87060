use std::{collections::HashSet, io, net::SocketAddr, sync::Arc};

use comms::msg::{LinkInfos, Membership, Registration};
use log::{debug, info, warn};
use tokio::{
    net::{self, TcpStream},
    task::JoinSet,
    time,
};

use crate::{
    config::RendezvousConfig,
    error::{Result, WorkerErr},
};

/// One worker of the cluster and its rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerEndpoint {
    rank: usize,
    host: String,
    port: u16,
}

impl PeerEndpoint {
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Returns the `host:port` string identifying this peer.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// The ranked peer set of a training job, `peers()[i]` has rank `i`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cluster {
    peers: Vec<PeerEndpoint>,
}

impl Cluster {
    pub fn peers(&self) -> &[PeerEndpoint] {
        &self.peers
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    pub fn get(&self, rank: usize) -> Option<&PeerEndpoint> {
        self.peers.get(rank)
    }

    /// Returns the rank of the peer listening at `host:port`.
    pub fn rank_of(&self, host: &str, port: u16) -> Option<usize> {
        self.peers
            .iter()
            .find(|peer| peer.host == host && peer.port == port)
            .map(|peer| peer.rank)
    }
}

/// Discovers every worker of the training job through the brokers.
///
/// Each broker gets one registration and answers with the whole membership
/// once the fleet is complete, the replies are then folded into one `Cluster`.
pub struct ClusterRendezvous {
    config: RendezvousConfig,
    replies: Vec<Membership>,
}

impl ClusterRendezvous {
    /// Creates a new `ClusterRendezvous`.
    ///
    /// # Arguments
    /// * `config` - The brokers to register with and the timeouts to honor.
    ///
    /// # Returns
    /// A new `ClusterRendezvous` instance.
    pub fn new(config: RendezvousConfig) -> Self {
        Self {
            config,
            replies: Vec::new(),
        }
    }

    /// Builds the registration message sent to every broker.
    pub fn make_registration(&self) -> Registration {
        Registration {
            clients_size: self.config.clients_size(),
            identity: self.config.identity().to_string(),
            port: self.config.port(),
        }
    }

    /// Runs the whole protocol against every broker, one task per broker.
    ///
    /// # Returns
    /// The ranked cluster, or the first error of any broker. There's no partial
    /// result, every broker must reply.
    pub async fn start(&mut self) -> Result<Cluster> {
        let registration = Arc::new(self.make_registration());
        let config = Arc::new(self.config.clone());
        let brokers = config.brokers().len();
        info!(brokers = brokers, port = registration.port; "registering with brokers");

        let mut tasks = JoinSet::new();
        for (i, broker) in config.brokers().iter().enumerate() {
            let (config, registration) = (config.clone(), registration.clone());
            let broker = broker.clone();
            tasks.spawn(async move { (i, exchange(&config, &broker, &registration).await) });
        }

        let mut replies = vec![None; brokers];
        while let Some(joined) = tasks.join_next().await {
            let (i, reply) = joined.map_err(io::Error::from)?;
            replies[i] = Some(reply?);
        }

        self.replies = replies.into_iter().flatten().collect();

        let cluster = Self::parse_replies(&self.replies)?;
        info!(replies = self.replies.len(), peers = cluster.len(); "rendezvous complete");
        Ok(cluster)
    }

    /// Returns the amount of broker replies collected.
    pub fn result_size(&self) -> usize {
        self.replies.len()
    }

    /// Folds the broker replies into a ranked cluster.
    ///
    /// Endpoints are deduplicated by their literal `ip:port` string and ranked
    /// in order of first appearance, across replies in the given order.
    ///
    /// # Arguments
    /// * `replies` - One membership per broker.
    ///
    /// # Returns
    /// The cluster or `WorkerErr::MalformedReply` if a reply's lists aren't parallel.
    pub fn parse_replies(replies: &[Membership]) -> Result<Cluster> {
        let mut seen = HashSet::new();
        let mut peers = Vec::new();

        for (i, reply) in replies.iter().enumerate() {
            let LinkInfos {
                client_ips,
                client_ports,
            } = &reply.linkinfos;

            if client_ips.len() != client_ports.len() {
                return Err(WorkerErr::MalformedReply {
                    reply: i,
                    reason: format!(
                        "{} client ips but {} client ports",
                        client_ips.len(),
                        client_ports.len()
                    ),
                });
            }

            for (host, &port) in client_ips.iter().zip(client_ports) {
                if seen.insert(format!("{host}:{port}")) {
                    peers.push(PeerEndpoint {
                        rank: peers.len(),
                        host: host.clone(),
                        port,
                    });
                }
            }
        }

        Ok(Cluster { peers })
    }
}

/// Registers with one broker and waits for its membership reply.
async fn exchange(
    config: &RendezvousConfig,
    broker: &str,
    registration: &Registration,
) -> Result<Membership> {
    let stream = connect(config, broker).await?;
    let (rx, tx) = stream.into_split();
    let (mut rx, mut tx) = comms::channel(rx, tx, config.reply_capacity());
    let read_timeout = config.read_timeout();

    time::timeout(read_timeout, tx.send(registration))
        .await
        .map_err(|_| timed_out(broker, "send"))?
        .map_err(|source| WorkerErr::Send {
            broker: broker.to_string(),
            source,
        })?;

    debug!(broker = broker; "registration sent, waiting for the fleet");

    let membership: Membership = time::timeout(read_timeout, rx.recv())
        .await
        .map_err(|_| timed_out(broker, "receive"))?
        .map_err(|source| WorkerErr::Recv {
            broker: broker.to_string(),
            source,
        })?;

    debug!(broker = broker, entries = membership.linkinfos.client_ips.len(); "membership received");
    Ok(membership)
}

/// Connects to `broker`, retrying as many times as configured.
async fn connect(config: &RendezvousConfig, broker: &str) -> Result<TcpStream> {
    let addrs = resolve(broker).await?;
    let mut attempt = 0;

    loop {
        let connect = TcpStream::connect(&addrs[..]);

        let err = match time::timeout(config.connect_timeout(), connect).await {
            Ok(Ok(stream)) => return Ok(stream),
            Ok(Err(source)) => WorkerErr::Connect {
                broker: broker.to_string(),
                source,
            },
            Err(_) => timed_out(broker, "connect"),
        };

        if attempt == config.connect_retries() {
            return Err(err);
        }

        attempt += 1;
        warn!(broker = broker, attempt = attempt; "{err}, retrying");
        time::sleep(config.retry_backoff()).await;
    }
}

async fn resolve(broker: &str) -> Result<Vec<SocketAddr>> {
    let resolve_err = |source: io::Error| WorkerErr::Resolve {
        broker: broker.to_string(),
        source,
    };

    let addrs: Vec<_> = net::lookup_host(broker).await.map_err(resolve_err)?.collect();
    if addrs.is_empty() {
        let source = io::Error::new(io::ErrorKind::NotFound, "no address found");
        return Err(resolve_err(source));
    }

    Ok(addrs)
}

fn timed_out(broker: &str, stage: &'static str) -> WorkerErr {
    WorkerErr::Timeout {
        broker: broker.to_string(),
        stage,
    }
}
