//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use stream_relay::{HttpServer, ServerConfig, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpListener;
use tokio::sync::Notify;

/// What a mock upstream observed.
#[derive(Debug, Default)]
pub struct UpstreamProbe {
    requests: AtomicUsize,
    sent: AtomicUsize,
    closed: AtomicBool,
    notify: Notify,
}

impl UpstreamProbe {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Body chunks written to the proxy so far.
    pub fn sent(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Wait until the proxy hangs up on the upstream connection.
    pub async fn wait_closed(&self, within: Duration) -> bool {
        tokio::time::timeout(within, async {
            loop {
                let notified = self.notify.notified();
                if self.is_closed() {
                    return;
                }
                notified.await;
            }
        })
        .await
        .is_ok()
    }

    /// Wait until the proxy has issued its request.
    pub async fn wait_request(&self, within: Duration) -> bool {
        tokio::time::timeout(within, async {
            while self.requests() == 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .is_ok()
    }
}

/// How a chunked mock upstream ends its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finish {
    /// Terminating zero-length chunk.
    Clean,
    /// Connection closed mid-body.
    Truncate,
}

async fn read_request_head(reader: &mut OwnedReadHalf) -> bool {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => return false,
            Ok(n) => {
                head.extend_from_slice(&buf[..n]);
                if head.windows(4).any(|w| w == b"\r\n\r\n") {
                    return true;
                }
            }
        }
    }
}

fn watch_for_hangup(mut reader: OwnedReadHalf, probe: Arc<UpstreamProbe>) {
    tokio::spawn(async move {
        let mut buf = [0u8; 256];
        loop {
            match reader.read(&mut buf).await {
                Ok(0) | Err(_) => {
                    probe.mark_closed();
                    break;
                }
                Ok(_) => {}
            }
        }
    });
}

/// Start a mock upstream that answers with a chunked body, one chunk per
/// `gap`, and stops writing once the proxy hangs up.
pub async fn start_chunked_upstream(
    chunks: Vec<&'static str>,
    gap: Duration,
    finish: Finish,
) -> (SocketAddr, Arc<UpstreamProbe>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let probe = Arc::new(UpstreamProbe::default());
    let p = probe.clone();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let probe = p.clone();
            let chunks = chunks.clone();
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.into_split();
                if !read_request_head(&mut reader).await {
                    return;
                }
                probe.requests.fetch_add(1, Ordering::SeqCst);
                watch_for_hangup(reader, probe.clone());

                let head = "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nTransfer-Encoding: chunked\r\n\r\n";
                if writer.write_all(head.as_bytes()).await.is_err() {
                    return;
                }

                for chunk in chunks {
                    if probe.is_closed() {
                        return;
                    }
                    let frame = format!("{:x}\r\n{}\r\n", chunk.len(), chunk);
                    if writer.write_all(frame.as_bytes()).await.is_err() {
                        probe.mark_closed();
                        return;
                    }
                    probe.sent.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(gap).await;
                }

                match finish {
                    Finish::Clean => {
                        let _ = writer.write_all(b"0\r\n\r\n").await;
                    }
                    Finish::Truncate => {
                        let _ = writer.shutdown().await;
                    }
                }
            });
        }
    });

    (addr, probe)
}

/// Start a mock upstream that answers every request with a fixed status.
pub async fn start_status_upstream(status_line: &'static str, body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = socket.into_split();
                if !read_request_head(&mut reader).await {
                    return;
                }
                let response = format!(
                    "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                    status_line,
                    body.len(),
                    body
                );
                let _ = writer.write_all(response.as_bytes()).await;
                let _ = writer.shutdown().await;
            });
        }
    });

    addr
}

/// Start a mock upstream that reads the request and never answers.
pub async fn start_stalled_upstream() -> (SocketAddr, Arc<UpstreamProbe>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let probe = Arc::new(UpstreamProbe::default());
    let p = probe.clone();

    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            let probe = p.clone();
            tokio::spawn(async move {
                let (mut reader, writer) = socket.into_split();
                if !read_request_head(&mut reader).await {
                    return;
                }
                probe.requests.fetch_add(1, Ordering::SeqCst);
                watch_for_hangup(reader, probe.clone());

                // Hold the write half open until the proxy gives up.
                probe.wait_closed(Duration::from_secs(30)).await;
                drop(writer);
            });
        }
    });

    (addr, probe)
}

/// An address nothing listens on.
pub async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

/// Config pointing at `upstream`, with short generator timings.
pub fn test_config(upstream: SocketAddr) -> ServerConfig {
    let mut config = ServerConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.generator.tick_interval_ms = 50;
    config.generator.safety_deadline_ms = 250;
    config.upstream.url = format!("http://{}/stream", upstream);
    config.upstream.connect_timeout_ms = 1_000;
    config
}

/// Start the server on an ephemeral port.
pub async fn start_server(config: ServerConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = HttpServer::new(config).unwrap();
    let shutdown = server.shutdown_handle();

    tokio::spawn(async move {
        let _ = server.run(listener).await;
    });

    (addr, shutdown)
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Sessions the server has not closed yet, as reported by `/health`.
pub async fn active_sessions(server: SocketAddr) -> u64 {
    let body: serde_json::Value = client()
        .get(format!("http://{}/health", server))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    body["active_sessions"].as_u64().unwrap()
}

/// Wait until every session on the server has closed.
pub async fn wait_sessions_closed(server: SocketAddr, within: Duration) -> bool {
    tokio::time::timeout(within, async {
        while active_sessions(server).await > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .is_ok()
}
