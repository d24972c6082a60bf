//! Integration tests for the Go-Back-N endpoints.
//!
//! Most tests run a sender and a receiver inside one process, connected by
//! in-memory links, on a paused tokio clock so timeouts elapse instantly and
//! deterministically.  The loopback tests exercise the same endpoints over
//! real UDP sockets.

use std::sync::Arc;
use std::time::Duration;

use gbn_arq::{
    config::{ArqConfig, ChannelConfig},
    endpoint::{ReceiverEndpoint, Simulation},
    frame::Frame,
    link::{Inlet, Outlet},
    sender::ArqError,
    socket::Socket,
    source::payload_for,
};
use tokio::sync::watch;

/// Bind a socket to an OS-assigned port on loopback.
async fn ephemeral() -> Socket {
    let addr = "127.0.0.1:0".parse().unwrap();
    Socket::bind(addr).await.expect("bind failed")
}

fn generated(count: u64) -> Vec<Vec<u8>> {
    (0..count).map(payload_for).collect()
}

/// Instant generation over a channel that neither drops nor delays.
fn instant_config(window_size: u32, seq_modulo: u32, total_packets: u64) -> ArqConfig {
    ArqConfig {
        window_size,
        seq_modulo,
        total_packets,
        min_gen_interval: Duration::ZERO,
        max_gen_interval: Duration::ZERO,
        seed: Some(1),
        channel: ChannelConfig::perfect(),
        ..Default::default()
    }
}

// ---------------------------------------------------------------------------
// Test 1: lossless run, W=3, MOD=4
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_gbn_lossless_small_window() {
    let outcome = Simulation::in_memory(instant_config(3, 4, 5))
        .unwrap()
        .run()
        .await
        .expect("simulation");

    assert_eq!(outcome.delivered, generated(5));
    assert_eq!(outcome.report.packets_sent, 5);
    assert_eq!(outcome.report.base, 5);
    assert_eq!(outcome.report.stats.total_packets, 5);
    assert_eq!(outcome.report.stats.total_retransmissions, 0);
    assert_eq!(outcome.report.channel.offered, 5);
}

// ---------------------------------------------------------------------------
// Test 2: first frame lost once, whole window goes back
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_gbn_first_frame_lost_once() {
    const WINDOW: u32 = 7;

    let config = ArqConfig {
        timeout: Duration::from_secs(2),
        ..instant_config(WINDOW, 8, 10)
    };
    let simulation = Simulation::in_memory(config).unwrap();
    simulation
        .sender()
        .channel()
        .drop_once(Frame::data(0, payload_for(0)));

    let start = tokio::time::Instant::now();
    let outcome = simulation.run().await.expect("simulation");

    assert_eq!(outcome.delivered, generated(10), "in order, no duplicates");
    assert_eq!(outcome.report.stats.total_retransmissions, u64::from(WINDOW));
    assert_eq!(outcome.report.packets_sent, 10);
    assert_eq!(outcome.report.channel.dropped, 1);
    assert!(start.elapsed() >= Duration::from_secs(2), "recovery waits one timeout");
}

// ---------------------------------------------------------------------------
// Test 3: random loss on both paths still yields the generation order
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_gbn_lossy_channel_preserves_order() {
    for seed in [3, 17, 99] {
        let config = ArqConfig {
            total_packets: 40,
            min_gen_interval: Duration::from_millis(10),
            max_gen_interval: Duration::from_millis(30),
            timeout: Duration::from_millis(500),
            max_retries: Some(50),
            seed: Some(seed),
            channel: ChannelConfig {
                drop_probability: 0.25,
                seed: Some(seed),
                ..ChannelConfig::perfect()
            },
            ..Default::default()
        };
        let outcome = Simulation::in_memory(config).unwrap().run().await.expect("simulation");

        assert_eq!(outcome.delivered, generated(40), "seed {seed}");
        assert_eq!(outcome.report.packets_sent, 40);
        let stats = &outcome.report.stats;
        assert!(stats.total_retransmissions > 0, "seed {seed}: 25% loss must cost something");
        assert_eq!(stats.delay_samples, 40);
        assert!(stats.min_delay <= stats.max_delay);
    }
}

#[tokio::test(start_paused = true)]
async fn test_gbn_delayed_channel_delays_cover_round_trip() {
    let config = ArqConfig {
        total_packets: 15,
        seed: Some(21),
        channel: ChannelConfig {
            drop_probability: 0.0,
            seed: Some(21),
            ..ChannelConfig::default()
        },
        ..Default::default()
    };
    let simulation = Simulation::in_memory(config).unwrap();
    let collector = Arc::clone(simulation.sender().stats());
    let outcome = simulation.run().await.expect("simulation");

    assert_eq!(outcome.delivered, generated(15));
    let stats = &outcome.report.stats;
    assert_eq!(stats.delay_samples, 15);
    let min = stats.min_delay.expect("delays recorded");
    assert!(stats.average_delay >= min);
    for delay in collector.delay_samples() {
        assert!(delay >= Duration::from_millis(100), "one data hop plus one ACK hop, got {delay:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_gbn_full_window_over_delaying_channel() {
    const PACKETS: u64 = 30;

    for drop_probability in [0.0, 0.2] {
        for seed in 0..20 {
            let config = ArqConfig {
                max_retries: Some(50),
                channel: ChannelConfig {
                    drop_probability,
                    min_delay: Duration::from_millis(10),
                    max_delay: Duration::from_millis(100),
                    seed: Some(seed),
                },
                ..instant_config(3, 4, PACKETS)
            };
            let outcome = Simulation::in_memory(config)
                .unwrap()
                .run()
                .await
                .unwrap_or_else(|e| panic!("drop {drop_probability} seed {seed}: {e}"));

            assert_eq!(
                outcome.delivered,
                generated(PACKETS),
                "drop {drop_probability} seed {seed}"
            );
            assert_eq!(outcome.report.base, PACKETS);
            if drop_probability == 0.0 {
                assert_eq!(outcome.report.stats.total_retransmissions, 0, "seed {seed}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Test 4: sender gives up when nothing gets through
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_gbn_retry_cap() {
    let mut config = instant_config(4, 5, 6);
    config.max_retries = Some(3);
    config.channel.drop_probability = 1.0;

    let err = Simulation::in_memory(config)
        .unwrap()
        .run()
        .await
        .expect_err("a dead channel cannot complete");

    match err {
        ArqError::RetriesExhausted { base, attempts } => {
            assert_eq!(base, 0);
            assert_eq!(attempts, 3);
        }
        other => panic!("unexpected error: {other}"),
    }
}

// ---------------------------------------------------------------------------
// Test 5: full run over loopback UDP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_gbn_over_loopback_udp() {
    let config = ArqConfig {
        total_packets: 20,
        min_gen_interval: Duration::from_millis(1),
        max_gen_interval: Duration::from_millis(5),
        timeout: Duration::from_millis(200),
        seed: Some(5),
        channel: ChannelConfig::perfect(),
        ..Default::default()
    };
    let outcome = Simulation::over_udp(config).await.unwrap().run().await.expect("simulation");

    assert_eq!(outcome.delivered, generated(20));
    assert_eq!(outcome.report.packets_sent, 20);
}

#[tokio::test]
async fn test_gbn_over_loopback_udp_with_loss() {
    let config = ArqConfig {
        total_packets: 15,
        min_gen_interval: Duration::from_millis(1),
        max_gen_interval: Duration::from_millis(3),
        timeout: Duration::from_millis(100),
        max_retries: None,
        seed: Some(8),
        channel: ChannelConfig {
            drop_probability: 0.2,
            seed: Some(8),
            ..ChannelConfig::perfect()
        },
        ..Default::default()
    };
    let outcome = Simulation::over_udp(config).await.unwrap().run().await.expect("simulation");

    assert_eq!(outcome.delivered, generated(15));
    assert!(outcome.report.channel.dropped > 0 || outcome.ack_channel.dropped > 0);
}

// ---------------------------------------------------------------------------
// Test 6: receiver survives garbage and acknowledges cumulatively
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_gbn_receiver_tolerates_malformed_datagrams() {
    let peer = ephemeral().await;
    let receiver_sock = Arc::new(ephemeral().await);
    let receiver_addr = receiver_sock.local_addr;

    let endpoint = ReceiverEndpoint::new(
        8,
        ChannelConfig::perfect(),
        Outlet::udp(Arc::clone(&receiver_sock), peer.local_addr),
        Inlet::udp(receiver_sock, peer.local_addr),
    )
    .expect("receiver endpoint");
    let (stop_tx, stop_rx) = watch::channel(false);
    let receiver = tokio::spawn(endpoint.run(stop_rx));

    peer.send_bytes(b"SEQ:zero,DATA:x", receiver_addr).await.unwrap();
    peer.send_bytes(&[0xff, 0xfe], receiver_addr).await.unwrap();
    peer.send_to(&Frame::data(1, "early"), receiver_addr).await.unwrap();
    peer.send_to(&Frame::data(0, payload_for(0)), receiver_addr).await.unwrap();
    peer.send_to(&Frame::data(1, payload_for(1)), receiver_addr).await.unwrap();

    let mut acks = Vec::new();
    for _ in 0..3 {
        let (frame, from) = peer.recv_from().await.expect("ack");
        assert_eq!(from, receiver_addr);
        acks.push(frame);
    }
    assert_eq!(acks, vec![Frame::ack(7), Frame::ack(0), Frame::ack(1)]);

    stop_tx.send_replace(true);
    let delivered = receiver.await.unwrap().unwrap();
    assert_eq!(delivered, generated(2));
}
