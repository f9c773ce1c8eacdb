//! End-to-end tests against a running emulator on 127.0.0.1

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use emu7k::protocol::constants::NF_BYTES;
use emu7k::protocol::message::{subscribe_request, SubscribeAck};
use emu7k::protocol::{DataRecordFrame, NetworkFrame, SevenKTime};
use emu7k::{Emu7kServer, ServerConfig};

const T0: f64 = 1_600_000_000.0;

fn record(record_type: u32, t: f64, fill: u8) -> Bytes {
    let time = SevenKTime::from_unix_seconds(t).unwrap();
    DataRecordFrame::new(record_type, time, 24).build(&[fill; 24])
}

fn log_file(records: &[Bytes]) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    for r in records {
        file.write_all(r).unwrap();
    }
    file.flush().unwrap();
    file
}

fn base_config() -> ServerConfig {
    ServerConfig::default()
        .idle_interval(Duration::from_millis(20))
        .poll_interval(Duration::from_millis(50))
        .request_timeout(Duration::from_secs(1))
}

struct Running {
    server: Arc<Emu7kServer>,
    addr: SocketAddr,
    handle: JoinHandle<emu7k::Result<()>>,
}

async fn start(config: ServerConfig) -> Running {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = Arc::new(Emu7kServer::new(config).unwrap());

    let handle = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.run_on(listener, std::future::pending()).await })
    };
    Running {
        server,
        addr,
        handle,
    }
}

async fn subscribe(addr: SocketAddr, types: &[i32]) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(&subscribe_request(types, 1)).await.unwrap();

    let mut ack = vec![0u8; NF_BYTES + 88];
    tokio::time::timeout(Duration::from_secs(2), stream.read_exact(&mut ack))
        .await
        .unwrap()
        .unwrap();
    let ack = SubscribeAck::parse(&ack).unwrap();
    assert_eq!(&ack.tracking_number, b"ABCDEF0123456789");
    stream
}

/// Next network frame, or `None` once the server closes the connection
async fn next_frame(stream: &mut TcpStream) -> Option<(NetworkFrame, Vec<u8>)> {
    let mut nf = [0u8; NF_BYTES];
    let read = tokio::time::timeout(Duration::from_secs(10), stream.read_exact(&mut nf))
        .await
        .unwrap();
    if read.is_err() {
        return None;
    }

    let header = NetworkFrame::parse(&nf).unwrap();
    let mut drf = vec![0u8; header.total_size as usize];
    stream.read_exact(&mut drf).await.unwrap();
    Some((header, drf))
}

fn record_type(drf: &[u8]) -> u32 {
    DataRecordFrame::parse(drf).unwrap().record_type_id
}

async fn control(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();
    let mut reply = Vec::new();
    let _ = tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut reply)).await;
    reply
}

async fn wait_for<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn subscriber_receives_only_its_types() {
    let mut records = Vec::new();
    for i in 0..4 {
        let t = T0 + i as f64 * 0.01;
        records.push(record(1003, t, 1));
        records.push(record(1012, t, 2));
        records.push(record(7000, t, 3));
    }
    let file = log_file(&records);

    let running = start(
        base_config()
            .source(file.path())
            .restart(false)
            .max_delay(Duration::from_millis(20)),
    )
    .await;
    let mut stream = subscribe(running.addr, &[1003, 1012]).await;

    let mut types = Vec::new();
    while let Some((_, drf)) = next_frame(&mut stream).await {
        types.push(record_type(&drf));
    }

    assert_eq!(types.len(), 8);
    assert_eq!(types.iter().filter(|&&t| t == 1003).count(), 4);
    assert_eq!(types.iter().filter(|&&t| t == 1012).count(), 4);
    assert!(!types.contains(&7000));

    running.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn single_matching_record_is_delivered_intact() {
    let wanted = record(7, T0, 0x77);
    let other = record(10, T0 + 0.01, 0x10);
    let file = log_file(&[wanted.clone(), other]);

    let running = start(base_config().source(file.path()).restart(false)).await;
    let mut stream = subscribe(running.addr, &[7]).await;

    let (nf, drf) = next_frame(&mut stream).await.unwrap();
    assert_eq!(drf, wanted.to_vec());
    assert_eq!(nf.total_size as usize, wanted.len());
    assert_eq!(nf.packet_size as usize, NF_BYTES + wanted.len());
    assert_eq!(nf.seq_number, 0);

    assert!(next_frame(&mut stream).await.is_none());
    running.handle.await.unwrap().unwrap();
}

async fn arrival_gaps(max_delay: Duration) -> Vec<f64> {
    let file = log_file(&[
        record(1, T0, 0),
        record(1, T0 + 0.5, 0),
        record(1, T0 + 2.5, 0),
    ]);
    let running = start(
        base_config()
            .source(file.path())
            .restart(false)
            .max_delay(max_delay),
    )
    .await;
    let mut stream = subscribe(running.addr, &[1]).await;

    let mut arrivals = Vec::new();
    while next_frame(&mut stream).await.is_some() {
        arrivals.push(Instant::now());
    }
    running.handle.await.unwrap().unwrap();

    assert_eq!(arrivals.len(), 3);
    arrivals
        .windows(2)
        .map(|w| (w[1] - w[0]).as_secs_f64())
        .collect()
}

#[tokio::test]
async fn pacing_follows_recorded_gaps() {
    let gaps = arrival_gaps(Duration::from_secs(3)).await;

    assert!((gaps[0] - 0.5).abs() < 0.25, "first gap {}", gaps[0]);
    assert!((gaps[1] - 2.0).abs() < 0.25, "second gap {}", gaps[1]);
}

#[tokio::test]
async fn pacing_clamps_to_max_delay() {
    let gaps = arrival_gaps(Duration::from_secs(1)).await;

    assert!((gaps[0] - 0.5).abs() < 0.25, "first gap {}", gaps[0]);
    assert!((gaps[1] - 1.0).abs() < 0.25, "second gap {}", gaps[1]);
}

#[tokio::test]
async fn restart_counts_one_cycle_per_pass() {
    let first = log_file(&[record(1, T0, 1)]);
    let second = log_file(&[record(2, T0, 2)]);

    let running = start(
        base_config()
            .sources([first.path(), second.path()])
            .restart(true)
            .min_delay(Duration::from_millis(300)),
    )
    .await;
    let mut stream = subscribe(running.addr, &[1, 2]).await;

    let mut types = Vec::new();
    for _ in 0..5 {
        let (_, drf) = next_frame(&mut stream).await.unwrap();
        types.push(record_type(&drf));
    }
    assert_eq!(types, vec![1, 2, 1, 2, 1]);

    // The fifth record opened the third pass; two passes are complete
    let stats = running.server.context().registry().stats_snapshot().await;
    assert_eq!(stats.cyc_total, 2);

    assert_eq!(control(running.addr, b"STOP").await, b"ACK");
    running.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn closed_client_is_dropped_once() {
    let records: Vec<Bytes> = (0..20).map(|i| record(5, T0 + i as f64, 5)).collect();
    let file = log_file(&records);

    let running = start(
        base_config()
            .source(file.path())
            .restart(true)
            .min_delay(Duration::from_millis(20))
            .max_delay(Duration::from_millis(20)),
    )
    .await;
    let registry = Arc::clone(running.server.context().registry());

    let mut keeper = subscribe(running.addr, &[5]).await;
    let leaver = subscribe(running.addr, &[5]).await;
    assert!(
        wait_for(|| {
            let registry = Arc::clone(&registry);
            async move { registry.client_count().await == 2 }
        })
        .await
    );
    assert_eq!(registry.stats_snapshot().await.con_active, 2);

    drop(leaver);

    assert!(
        wait_for(|| {
            let registry = Arc::clone(&registry);
            async move { registry.stats_snapshot().await.disconnects >= 1 }
        })
        .await
    );
    let stats = registry.stats_snapshot().await;
    assert_eq!(stats.disconnects, 1);
    assert_eq!(stats.con_active, 1);
    assert_eq!(stats.con_total, 2);
    assert_eq!(registry.client_count().await, 1);

    // The remaining client is unaffected
    assert!(next_frame(&mut keeper).await.is_some());

    assert_eq!(control(running.addr, b"STOP").await, b"ACK");
    running.handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn ping_and_stop() {
    let file = log_file(&[record(1, T0, 0)]);
    let running = start(base_config().source(file.path())).await;

    assert_eq!(control(running.addr, b"REQ").await, b"ACK");
    assert!(!running.server.context().is_stopped());

    assert_eq!(control(running.addr, b"STOP").await, b"ACK");
    tokio::time::timeout(Duration::from_secs(3), running.handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    let stats = running.server.context().registry().stats_snapshot().await;
    assert_eq!(stats.con_total, 2);
    assert_eq!(stats.con_active, 0);
}
