//! TCP readiness probe.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

/// Upper bound on a single connection attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Decides whether a newly started worker can accept requests.
#[async_trait]
pub trait Readiness: Send + Sync {
    async fn wait_ready(&self, address: &str, port: u16) -> bool;
}

/// Probe `address:port` until a TCP connection succeeds.
///
/// Makes up to `retries` attempts, sleeping `delay` after each failure.
/// Returns whether the port became reachable. Zero retries still makes
/// one attempt.
pub async fn probe(address: &str, port: u16, retries: u32, delay: Duration) -> bool {
    let target = format!("{address}:{port}");
    let attempts = retries.max(1);
    debug!(%target, attempts, "probing readiness");

    for attempt in 1..=attempts {
        match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&target)).await {
            Ok(Ok(_stream)) => {
                debug!(%target, attempt, "port reachable");
                return true;
            }
            Ok(Err(e)) => {
                debug!(%target, attempt, error = %e, "probe connection failed");
            }
            Err(_) => {
                debug!(%target, attempt, "probe connection timed out");
            }
        }
        if attempt < attempts {
            tokio::time::sleep(delay).await;
        }
    }

    warn!(%target, attempts, "port never became reachable");
    false
}

/// `Readiness` backed by [`probe`].
#[derive(Debug, Clone)]
pub struct TcpReadiness {
    pub retries: u32,
    pub delay: Duration,
}

impl TcpReadiness {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }
}

#[async_trait]
impl Readiness for TcpReadiness {
    async fn wait_ready(&self, address: &str, port: u16) -> bool {
        let ready = probe(address, port, self.retries, self.delay).await;
        if ready {
            info!(%address, port, "worker ready");
        }
        ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn listening_port_is_ready() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        assert!(probe("127.0.0.1", port, 3, Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn closed_port_exhausts_retries() {
        // Bind then drop to get a port nothing listens on.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let started = std::time::Instant::now();
        assert!(!probe("127.0.0.1", port, 3, Duration::from_millis(20)).await);
        // Two sleeps between three attempts.
        assert!(started.elapsed() >= Duration::from_millis(40));
    }

    #[tokio::test]
    async fn port_that_opens_late_becomes_ready() {
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let opener = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            let listener = TcpListener::bind(("127.0.0.1", port)).await.unwrap();
            tokio::time::sleep(Duration::from_millis(500)).await;
            drop(listener);
        });

        let readiness = TcpReadiness::new(20, Duration::from_millis(20));
        assert!(readiness.wait_ready("127.0.0.1", port).await);
        opener.abort();
    }
}
