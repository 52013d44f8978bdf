//! End-to-end streaming over real TCP connections

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use mjpeg_rs::capture::ChannelSource;
use mjpeg_rs::server::multipart::{part_header, response_header};
use mjpeg_rs::{Broadcaster, Frame, Result, ServerConfig, StreamServer};

const WAIT: Duration = Duration::from_secs(2);

struct TestServer {
    addr: SocketAddr,
    server: Arc<StreamServer>,
    feed: mpsc::Sender<Frame>,
    _broadcaster: Broadcaster,
    _serving: JoinHandle<Result<()>>,
}

async fn start_server(workers: usize) -> TestServer {
    let broadcaster = Broadcaster::new(Default::default());
    let (feed, source) = ChannelSource::new(16);
    broadcaster.start(source).await.unwrap();

    let config = ServerConfig::with_addr("127.0.0.1:0".parse().unwrap()).workers(workers);
    let server = Arc::new(StreamServer::new(config, Arc::clone(broadcaster.registry())));
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();

    let serving = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.serve(&listener).await })
    };

    TestServer {
        addr,
        server,
        feed,
        _broadcaster: broadcaster,
        _serving: serving,
    }
}

async fn request(addr: SocketAddr, path: &str) -> TcpStream {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    let head = format!("GET {} HTTP/1.1\r\nHost: test\r\n\r\n", path);
    stream.write_all(head.as_bytes()).await.unwrap();
    stream
}

async fn expect_bytes(stream: &mut TcpStream, expected: &[u8]) {
    let mut buf = vec![0u8; expected.len()];
    tokio::time::timeout(WAIT, stream.read_exact(&mut buf))
        .await
        .expect("timed out reading from server")
        .unwrap();
    assert_eq!(buf, expected);
}

async fn expect_part(stream: &mut TcpStream, payload: &[u8]) {
    expect_bytes(stream, &part_header(payload.len())).await;
    expect_bytes(stream, payload).await;
}

async fn expect_eof(stream: &mut TcpStream) {
    let mut rest = Vec::new();
    tokio::time::timeout(WAIT, stream.read_to_end(&mut rest))
        .await
        .expect("timed out waiting for close")
        .unwrap();
    assert!(rest.is_empty(), "unexpected trailing bytes: {:?}", rest);
}

async fn wait_until(condition: impl Fn() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached");
}

#[tokio::test]
async fn test_stream_until_source_ends() {
    let t = start_server(4).await;
    let registry = Arc::clone(t.server.registry());

    let mut client = request(t.addr, "/?cache=1").await;
    wait_until(|| registry.len() == 1).await;
    expect_bytes(&mut client, &response_header()).await;

    t.feed.send(Frame::from(&b"\xFF\xD8one\xFF\xD9"[..])).await.unwrap();
    expect_part(&mut client, b"\xFF\xD8one\xFF\xD9").await;

    drop(t.feed);
    expect_eof(&mut client).await;
    wait_until(|| registry.is_empty()).await;
}

#[tokio::test]
async fn test_late_joiner_gets_suffix() {
    let t = start_server(4).await;
    let registry = Arc::clone(t.server.registry());

    let mut early = request(t.addr, "/").await;
    wait_until(|| registry.len() == 1).await;

    t.feed.send(Frame::from(&b"A"[..])).await.unwrap();
    t.feed.send(Frame::from(&b"B"[..])).await.unwrap();

    expect_bytes(&mut early, &response_header()).await;
    expect_part(&mut early, b"A").await;
    expect_part(&mut early, b"B").await;

    let mut late = request(t.addr, "/").await;
    wait_until(|| registry.len() == 2).await;
    expect_bytes(&mut late, &response_header()).await;

    t.feed.send(Frame::from(&b"C"[..])).await.unwrap();
    drop(t.feed);

    expect_part(&mut early, b"C").await;
    expect_eof(&mut early).await;

    expect_part(&mut late, b"C").await;
    expect_eof(&mut late).await;
}

#[tokio::test]
async fn test_admission_bound_queues_excess_clients() {
    let t = start_server(2).await;
    let registry = Arc::clone(t.server.registry());

    let first = request(t.addr, "/").await;
    let mut second = request(t.addr, "/").await;
    wait_until(|| registry.len() == 2).await;

    // Connects through the listen backlog but is not served yet
    let mut third = request(t.addr, "/").await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(registry.len(), 2);
    assert_eq!(t.server.pool().active(), 2);

    let mut byte = [0u8; 1];
    assert!(
        tokio::time::timeout(Duration::from_millis(100), third.read(&mut byte))
            .await
            .is_err(),
        "third client was served beyond capacity"
    );

    // A departed client is noticed when a write to it fails
    drop(first);
    let ticker = {
        let feed = t.feed.clone();
        tokio::spawn(async move {
            loop {
                let _ = feed.try_send(Frame::from(&b"tick"[..]));
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
    };

    expect_bytes(&mut third, &response_header()).await;
    wait_until(|| registry.len() == 2).await;
    assert_eq!(t.server.pool().active(), 2);

    expect_bytes(&mut second, &response_header()).await;
    ticker.abort();
}

#[tokio::test]
async fn test_source_end_drains_every_viewer() {
    for _ in 0..20 {
        let broadcaster = Broadcaster::new(Default::default());
        let registry = Arc::clone(broadcaster.registry());
        let (feed, source) = ChannelSource::new(4);
        let capture_task = broadcaster.start(source).await.unwrap();

        let config = ServerConfig::with_addr("127.0.0.1:0".parse().unwrap()).workers(4);
        let server = Arc::new(StreamServer::new(config, Arc::clone(&registry)));
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let serving = {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                let source_ended = async {
                    let _ = capture_task.await;
                };
                server
                    .serve_until_drained(&listener, source_ended, std::future::pending())
                    .await
            })
        };

        let mut viewers = vec![request(addr, "/").await, request(addr, "/").await];
        wait_until(|| registry.len() == 2).await;

        for payload in [&b"A"[..], &b"B"[..], &b"C"[..]] {
            feed.send(Frame::from(payload)).await.unwrap();
        }
        drop(feed);

        for viewer in &mut viewers {
            expect_bytes(viewer, &response_header()).await;
            expect_part(viewer, b"A").await;
            expect_part(viewer, b"B").await;
            expect_part(viewer, b"C").await;
            expect_eof(viewer).await;
        }

        tokio::time::timeout(WAIT, serving)
            .await
            .expect("server should stop once viewers drained")
            .unwrap()
            .unwrap();
        assert_eq!(server.pool().active(), 0);
    }
}

#[tokio::test]
async fn test_half_closed_viewer_keeps_receiving() {
    let t = start_server(4).await;
    let registry = Arc::clone(t.server.registry());

    let mut client = request(t.addr, "/").await;
    client.shutdown().await.unwrap();
    wait_until(|| registry.len() == 1).await;
    expect_bytes(&mut client, &response_header()).await;

    t.feed.send(Frame::from(&b"A"[..])).await.unwrap();
    expect_part(&mut client, b"A").await;
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn test_unknown_path_gets_404() {
    let t = start_server(4).await;

    let mut client = request(t.addr, "/snapshot.jpg").await;
    let mut response = Vec::new();
    tokio::time::timeout(WAIT, client.read_to_end(&mut response))
        .await
        .unwrap()
        .unwrap();

    assert!(response.starts_with(b"HTTP/1.0 404 Not Found\r\n"));
    assert!(t.server.registry().is_empty());
}

#[tokio::test]
async fn test_graceful_shutdown_closes_sessions() {
    let broadcaster = Broadcaster::new(Default::default());
    let (_feed, source) = ChannelSource::new(1);
    broadcaster.start(source).await.unwrap();

    let config = ServerConfig::with_addr("127.0.0.1:0".parse().unwrap());
    let server = Arc::new(StreamServer::new(config, Arc::clone(broadcaster.registry())));
    let listener = server.bind().await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let serving = {
        let server = Arc::clone(&server);
        tokio::spawn(async move {
            server
                .serve_until(&listener, async {
                    let _ = stop_rx.await;
                })
                .await
        })
    };

    let mut client = request(addr, "/").await;
    expect_bytes(&mut client, &response_header()).await;

    stop_tx.send(()).unwrap();
    tokio::time::timeout(WAIT, serving)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    expect_eof(&mut client).await;
    wait_until(|| broadcaster.registry().is_empty()).await;
}
