//! Fixtures and a scripted transformer for unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub use removd_core::fixtures::{jpeg_fixture, jpeg_with_orientation, png_fixture, png_with_text_chunk};

use crate::config::ApiKey;
use crate::error::{Error, Result};
use crate::transformer::{
    Account, ApiAllowance, Credits, RemoteImage, RemoteResult, TransformPayload, Transformer,
};

/// Transformer that answers with a transparent PNG at a scripted size.
pub struct FakeTransformer {
    /// Output dimensions; `None` echoes the request's fit target.
    pub output: Option<(u32, u32)>,
    /// Source ids whose call fails.
    pub fail_on: Vec<String>,
    pub calls: AtomicUsize,
    pub sizes: Mutex<Vec<String>>,
}

impl FakeTransformer {
    pub fn new() -> Self {
        Self {
            output: None,
            fail_on: Vec::new(),
            calls: AtomicUsize::new(0),
            sizes: Mutex::new(Vec::new()),
        }
    }

    pub fn with_output(width: u32, height: u32) -> Self {
        Self {
            output: Some((width, height)),
            ..Self::new()
        }
    }
}

#[async_trait]
impl Transformer for FakeTransformer {
    async fn transform(&self, _key: &ApiKey, payload: TransformPayload<'_>) -> Result<RemoteResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.sizes.lock().unwrap().push(payload.size.to_string());

        if self.fail_on.iter().any(|f| f == payload.source) {
            return Err(Error::remote("Could not identify foreground in image"));
        }
        if let RemoteImage::Bytes(bytes) = payload.image {
            assert!(!bytes.is_empty(), "empty upload payload");
        }

        let (width, height) = self.output.unwrap_or((payload.target.width, payload.target.height));
        Ok(RemoteResult {
            bytes: Bytes::from(png_fixture(width, height, true)),
            content_type: Some("image/png".to_string()),
            credits_charged: Some(1.0),
            width: Some(width),
            height: Some(height),
            detected: Some("product".to_string()),
        })
    }

    async fn account(&self, _key: &ApiKey) -> Result<Account> {
        Ok(Account {
            credits: Credits {
                total: 200.0,
                subscription: 150.0,
                payg: 50.0,
            },
            api: ApiAllowance {
                free_calls: 50,
                sizes: "all".to_string(),
            },
        })
    }
}

/// A raw HTTP/1.1 response with `Content-Length` and `Connection: close`.
pub fn http_response(status: &str, headers: &[(&str, &str)], body: &[u8]) -> Vec<u8> {
    let mut head = format!("HTTP/1.1 {status}\r\n");
    for (name, value) in headers {
        head.push_str(&format!("{name}: {value}\r\n"));
    }
    head.push_str(&format!(
        "content-length: {}\r\nconnection: close\r\n\r\n",
        body.len()
    ));
    [head.as_bytes(), body].concat()
}

/// Answer a single request on a local port with `response`.
///
/// Returns the base URL and a handle resolving to the request text.
pub async fn serve_once(response: Vec<u8>) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 8192];
        loop {
            let n = socket.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            request.extend_from_slice(&buf[..n]);
            if request_complete(&request) {
                break;
            }
        }
        socket.write_all(&response).await.unwrap();
        socket.shutdown().await.ok();
        String::from_utf8_lossy(&request).into_owned()
    });

    (format!("http://{addr}"), handle)
}

fn request_complete(request: &[u8]) -> bool {
    let Some(end) = request.windows(4).position(|w| w == b"\r\n\r\n") else {
        return false;
    };
    let head = String::from_utf8_lossy(&request[..end]).to_ascii_lowercase();
    let body_len = head
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);
    request.len() >= end + 4 + body_len
}
