use std::{env, fs, io};

use comms::specs::worker::WorkerSpec;
use log::{error, info};
use tokio::signal;

use worker::{ClusterRendezvous, Communicator, CommunicatorConfig, RendezvousConfig, WorkerErr};

const DEFAULT_HOST: &str = "127.0.0.1";

#[tokio::main]
async fn main() -> io::Result<()> {
    env_logger::init();

    let path = env::var("CONFIG").map_err(io::Error::other)?;
    let mut spec: WorkerSpec = serde_json::from_str(&fs::read_to_string(&path)?)?;

    if let Ok(port) = env::var("PORT") {
        spec.rendezvous.port = port.parse().map_err(io::Error::other)?;
    }

    let host = env::var("HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
    let port = spec.rendezvous.port;

    let mut rendezvous = ClusterRendezvous::new(RendezvousConfig::from_spec(&spec.rendezvous)?);
    let cluster = match rendezvous.start().await {
        Ok(cluster) => cluster,
        Err(e) => {
            error!("rendezvous failed: {e}");
            return Err(e.into());
        }
    };

    for peer in cluster.peers() {
        let endpoint = peer.endpoint();
        info!(rank = peer.rank(), endpoint = endpoint.as_str(); "peer");
    }

    let rank = cluster.rank_of(&host, port).ok_or_else(|| {
        WorkerErr::Config(format!("{host}:{port} is not part of the cluster"))
    })?;

    let config = CommunicatorConfig::from_spec(&spec.communicator);
    let mut communicator = Communicator::new(config, rank);
    communicator.prepare_parameter_tables()?;
    info!(rank = rank, peers = cluster.len(); "worker ready");

    signal::ctrl_c().await?;
    let words = communicator.get_word_count()?;
    info!(rank = rank, words = words; "received SIGTERM, wrapping up");
    communicator.clear_parameter_tables();

    Ok(())
}
