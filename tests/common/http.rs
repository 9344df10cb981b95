//! A loopback HTTP/1.1 server standing in for the platform's REST API.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;

/// The parts of a request the tests look at.
#[derive(Debug, Clone)]
pub struct Request {
    pub path: String,
    pub authorization: Option<String>,
}

/// How the stub answers one request.
pub struct Reply {
    pub status: u16,
    pub body: String,
    /// When set, the answer is held back until the gate is notified.
    pub gate: Option<Arc<Notify>>,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            gate: None,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: format!(r#"{{"message":"status {status}"}}"#),
            gate: None,
        }
    }

    pub fn held(self, gate: &Arc<Notify>) -> Self {
        Self {
            gate: Some(Arc::clone(gate)),
            ..self
        }
    }
}

/// Serves every connection with `handler` and records what was asked.
pub struct StubApi {
    pub url: String,
    requests: mpsc::UnboundedReceiver<Request>,
    handle: JoinHandle<()>,
}

impl StubApi {
    pub async fn serve<F>(handler: F) -> Self
    where
        F: Fn(&Request) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind stub API");
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handler = Arc::new(handler);
        let (tx, requests) = mpsc::unbounded_channel();

        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = Arc::clone(&handler);
                let tx = tx.clone();
                tokio::spawn(async move {
                    let _ = answer(stream, handler.as_ref(), &tx).await;
                });
            }
        });

        Self {
            url,
            requests,
            handle,
        }
    }

    /// The next request the stub received.
    pub async fn next_request(&mut self) -> Request {
        tokio::time::timeout(Duration::from_secs(10), self.requests.recv())
            .await
            .expect("no request reached the stub API")
            .expect("stub API stopped")
    }
}

impl Drop for StubApi {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn answer<F>(
    mut stream: TcpStream,
    handler: &F,
    tx: &mpsc::UnboundedSender<Request>,
) -> std::io::Result<()>
where
    F: Fn(&Request) -> Reply,
{
    let mut raw = Vec::new();
    let mut buf = [0u8; 1024];
    while !raw.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        raw.extend_from_slice(&buf[..n]);
    }

    let head = String::from_utf8_lossy(&raw);
    let mut lines = head.split("\r\n");
    let path = lines
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .unwrap_or_default()
        .to_string();
    let authorization = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("authorization"))
        .map(|(_, value)| value.trim().to_string());

    let request = Request {
        path,
        authorization,
    };
    let reply = handler(&request);
    let _ = tx.send(request);

    if let Some(gate) = &reply.gate {
        gate.notified().await;
    }

    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.status,
        reason(reply.status),
        reply.body.len(),
        reply.body
    );
    stream.write_all(response.as_bytes()).await?;
    stream.shutdown().await
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        _ => "Error",
    }
}
