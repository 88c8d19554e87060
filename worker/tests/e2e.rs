use std::{io, num::NonZeroUsize, thread, time::Duration};

use comms::msg::{Membership, Registration};
use tokio::net::TcpListener;

use worker::{
    ClusterRendezvous, Communicator, CommunicatorConfig, DataBlock, RendezvousConfig, TableKind,
};

/// Waits for the whole fleet to register, then answers everyone with the same membership.
async fn run_broker(listener: TcpListener, fleet: usize) -> io::Result<()> {
    let mut conns = Vec::with_capacity(fleet);
    let mut reply = Membership::default();

    while conns.len() < fleet {
        let (stream, addr) = listener.accept().await?;
        let (rx, tx) = stream.into_split();
        let (mut rx, tx) = comms::channel(rx, tx, comms::DEFAULT_CAPACITY);

        let registration: Registration = rx.recv().await?;
        reply.linkinfos.client_ips.push(addr.ip().to_string());
        reply.linkinfos.client_ports.push(registration.port);
        conns.push((rx, tx));
    }

    for (_rx, mut tx) in conns {
        tx.send(&reply).await?;
    }

    Ok(())
}

fn rendezvous(broker: &str, port: u16) -> ClusterRendezvous {
    let config = RendezvousConfig::new(
        vec![broker.to_string()],
        NonZeroUsize::MIN,
        format!("wk-{port}"),
        port,
    )
    .with_read_timeout(Duration::from_secs(5));

    ClusterRendezvous::new(config)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fleet_discovers_itself() -> io::Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let broker_addr = listener.local_addr()?.to_string();
    let broker = tokio::spawn(run_broker(listener, 2));

    let mut a = rendezvous(&broker_addr, 9001);
    let mut b = rendezvous(&broker_addr, 9002);
    let (cluster_a, cluster_b) = tokio::join!(a.start(), b.start());
    let (cluster_a, cluster_b) = (cluster_a?, cluster_b?);
    broker.await??;

    assert_eq!(cluster_a, cluster_b);
    assert_eq!(cluster_a.len(), 2);
    assert_eq!(a.result_size(), 1);

    let rank_a = cluster_a.rank_of("127.0.0.1", 9001).unwrap();
    let rank_b = cluster_a.rank_of("127.0.0.1", 9002).unwrap();
    assert_ne!(rank_a, rank_b);
    assert_eq!(cluster_a.get(rank_b).unwrap().endpoint(), "127.0.0.1:9002");

    Ok(())
}

#[test]
fn threads_average_their_updates() {
    const DIM: usize = 8;
    const THREADS: usize = 4;
    const ROUNDS: usize = 20;
    const K: f32 = 0.5;

    let config = CommunicatorConfig::new(
        NonZeroUsize::new(DIM).unwrap(),
        NonZeroUsize::new(64).unwrap(),
        NonZeroUsize::new(THREADS).unwrap(),
    )
    .with_seed(11);

    let mut comm = Communicator::new(config, 0);
    comm.prepare_parameter_tables().unwrap();

    let mut before = comm.acquire_buffers(THREADS);
    let nodes: Vec<usize> = (0..THREADS).collect();
    comm.get_worker_table_rows(&nodes, &mut before).unwrap();

    thread::scope(|s| {
        for t in 0..THREADS {
            let comm = &comm;
            s.spawn(move || {
                for _ in 0..ROUNDS {
                    let mut block = DataBlock::with_nodes([t], [t, 32 + t]);
                    comm.request_parameter(&mut block).unwrap();

                    let row = block.row_mut(TableKind::InputEmbedding, t).unwrap();
                    row.iter_mut().for_each(|v| *v += K);

                    comm.add_delta_parameter(Some(&mut block)).unwrap();
                    comm.add_word_count(10).unwrap();
                }
            });
        }
    });

    let mut after = comm.acquire_buffers(THREADS);
    comm.get_worker_table_rows(&nodes, &mut after).unwrap();

    let expected = ROUNDS as f32 * K / THREADS as f32;
    for (old, new) in before.iter().zip(&after) {
        for (o, n) in old.iter().zip(new.iter()) {
            assert!((n - o - expected).abs() < 1e-4, "{n} - {o} != {expected}");
        }
    }

    assert_eq!(comm.get_word_count().unwrap(), (THREADS * ROUNDS * 10) as i64);

    comm.release_buffers(before);
    comm.release_buffers(after);
    assert_eq!(comm.pool().in_flight(), 0);
}
