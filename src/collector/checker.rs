//! TCP reachability probing
//!
//! Probes are plain timed TCP connects, no protocol handshake. They run under
//! a fixed concurrency ceiling so a large candidate set cannot exhaust
//! sockets.

use futures::stream::{self, StreamExt};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

/// Probes candidate endpoints for TCP reachability
pub struct ConnectivityChecker {
    timeout: Duration,
    concurrency: usize,
}

impl ConnectivityChecker {
    pub fn new(timeout: Duration, concurrency: usize) -> Self {
        Self {
            timeout,
            concurrency: concurrency.max(1),
        }
    }

    /// Time a single TCP connect. `None` on refusal, timeout or any other
    /// connect failure.
    pub async fn measure(&self, host: &str, port: u16) -> Option<u64> {
        let start = Instant::now();
        match tokio::time::timeout(self.timeout, TcpStream::connect((host, port))).await {
            Ok(Ok(_stream)) => Some(start.elapsed().as_millis() as u64),
            _ => None,
        }
    }

    /// Probe every `(index, host, port)` target and return `(index, ping)`
    /// pairs in completion order
    pub async fn probe_all(&self, targets: Vec<(usize, String, u16)>) -> Vec<(usize, Option<u64>)> {
        stream::iter(targets)
            .map(|(index, host, port)| async move { (index, self.measure(&host, port).await) })
            .buffer_unordered(self.concurrency)
            .collect()
            .await
    }
}
