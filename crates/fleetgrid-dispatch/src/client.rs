//! Worker HTTP client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use tracing::debug;

use crate::error::{DispatchError, DispatchResult};
use crate::task::TaskRequest;

/// Delivers one task to one worker.
#[async_trait]
pub trait TaskClient: Send + Sync {
    async fn submit(&self, address: &str, task: &TaskRequest) -> DispatchResult<()>;
}

/// Posts tasks as JSON to `http://{address}:{port}{path}` over HTTP/1.1.
#[derive(Debug, Clone)]
pub struct HttpTaskClient {
    port: u16,
    path: String,
    timeout: Duration,
}

impl HttpTaskClient {
    pub fn new(port: u16, path: impl Into<String>, timeout: Duration) -> Self {
        let mut path = path.into();
        if !path.starts_with('/') {
            path.insert(0, '/');
        }
        Self { port, path, timeout }
    }

    pub fn url(&self, address: &str) -> String {
        format!("http://{address}:{}{}", self.port, self.path)
    }

    async fn post(&self, address: &str, body: Vec<u8>) -> DispatchResult<()> {
        let authority = format!("{address}:{}", self.port);
        let uri = self.url(address);
        let transport = |reason: String| DispatchError::Transport {
            address: authority.clone(),
            reason,
        };

        let stream = tokio::net::TcpStream::connect(&authority)
            .await
            .map_err(|e| transport(e.to_string()))?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| transport(e.to_string()))?;

        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method(http::Method::POST)
            .uri(self.path.as_str())
            .header(http::header::HOST, &authority)
            .header(http::header::CONTENT_TYPE, "application/json")
            .header(http::header::USER_AGENT, "fleetgrid-dispatch/0.1")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| transport(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| transport(e.to_string()))?;

        let status = resp.status();
        // Read the body so the worker sees the exchange complete.
        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| transport(e.to_string()))?
            .to_bytes();

        if status.is_success() {
            debug!(%uri, %status, bytes = body.len(), "worker accepted task");
            Ok(())
        } else {
            debug!(%uri, %status, body = %String::from_utf8_lossy(&body), "worker rejected task");
            Err(DispatchError::WorkerStatus {
                address: authority,
                status: status.as_u16(),
            })
        }
    }
}

#[async_trait]
impl TaskClient for HttpTaskClient {
    async fn submit(&self, address: &str, task: &TaskRequest) -> DispatchResult<()> {
        let body = serde_json::to_vec(task).map_err(|e| DispatchError::InvalidInput(e.to_string()))?;
        match tokio::time::timeout(self.timeout, self.post(address, body)).await {
            Ok(result) => result,
            Err(_) => Err(DispatchError::Timeout {
                address: format!("{address}:{}", self.port),
            }),
        }
    }
}
