//! The remote transform seam.
//!
//! [`Transformer`] is what the pipeline calls once per item. The bundled
//! [`HttpTransformer`] posts a JSON body to a remove.bg style endpoint; any
//! other service can be plugged in by implementing the trait.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use bytes::Bytes;
use removd_core::probe::unwrap_payload;
use removd_core::BoundingBox;
use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::ApiKey;
use crate::error::{Error, Result};

/// Image part of a transform request.
#[derive(Debug, Clone, Copy)]
pub enum RemoteImage<'a> {
    Bytes(&'a [u8]),
    /// Let the service fetch the image itself.
    Url(&'a str),
}

/// One transform request.
#[derive(Debug, Clone, Copy)]
pub struct TransformPayload<'a> {
    pub source: &'a str,
    pub image: RemoteImage<'a>,
    /// Size tier name.
    pub size: &'a str,
    /// Dimensions the result is expected to have.
    pub target: BoundingBox,
}

/// Result bytes plus what the service reported about them.
#[derive(Debug, Clone, Default)]
pub struct RemoteResult {
    pub bytes: Bytes,
    pub content_type: Option<String>,
    pub credits_charged: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Foreground type detected by the service.
    pub detected: Option<String>,
}

impl RemoteResult {
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.width.zip(self.height)
    }
}

/// Credit balance of an account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Credits {
    pub total: f64,
    pub subscription: f64,
    pub payg: f64,
}

/// Free API allowance of an account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiAllowance {
    pub free_calls: u32,
    /// Size tiers the key may request, e.g. `all`.
    pub sizes: String,
}

/// Account attributes reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub credits: Credits,
    pub api: ApiAllowance,
}

#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(&self, key: &ApiKey, payload: TransformPayload<'_>) -> Result<RemoteResult>;

    /// Balance and allowance for `key`.
    async fn account(&self, key: &ApiKey) -> Result<Account>;
}

/// JSON-over-HTTP transformer.
#[derive(Debug, Clone)]
pub struct HttpTransformer {
    client: Client,
    endpoint: String,
}

impl HttpTransformer {
    pub fn new(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// The account resource sits next to the transform resource.
    fn account_url(&self) -> Result<reqwest::Url> {
        reqwest::Url::parse(&self.endpoint)
            .and_then(|url| url.join("account"))
            .map_err(|e| Error::config(format!("invalid endpoint {}: {e}", self.endpoint)))
    }
}

fn request_body(payload: &TransformPayload<'_>) -> Value {
    match payload.image {
        RemoteImage::Bytes(bytes) => json!({
            "image_file_b64": STANDARD.encode(bytes),
            "size": payload.size,
        }),
        RemoteImage::Url(url) => json!({
            "image_url": url,
            "size": payload.size,
        }),
    }
}

#[derive(Debug, Deserialize)]
struct AccountBody {
    data: AccountData,
}

#[derive(Debug, Deserialize)]
struct AccountData {
    attributes: Account,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    title: String,
}

/// First error title of a JSON error body, else the status text.
fn error_message(status: StatusCode, body: &[u8]) -> String {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|b| b.errors.into_iter().next())
        .map(|e| e.title)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .map(str::to_string)
                .unwrap_or_else(|| status.to_string())
        })
}

fn header<T: std::str::FromStr>(headers: &HeaderMap, name: &str) -> Option<T> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

#[async_trait]
impl Transformer for HttpTransformer {
    async fn transform(&self, key: &ApiKey, payload: TransformPayload<'_>) -> Result<RemoteResult> {
        tracing::debug!(source = payload.source, size = payload.size, "sending transform request");

        let response = self
            .client
            .post(&self.endpoint)
            .header("X-Api-Key", key.expose())
            .json(&request_body(&payload))
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?;

        if !status.is_success() {
            return Err(Error::remote(error_message(status, &body)));
        }

        // Some gateways hand back a hex or base64 text body.
        let decoded = match unwrap_payload(&body) {
            Ok(unwrapped) if unwrapped.encoding.is_text() => Some(unwrapped.bytes.into_owned()),
            _ => None,
        };
        let bytes = decoded.map(Bytes::from).unwrap_or(body);

        Ok(RemoteResult {
            bytes,
            content_type: headers
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string),
            credits_charged: header(&headers, "x-credits-charged"),
            width: header(&headers, "x-width"),
            height: header(&headers, "x-height"),
            detected: header(&headers, "x-type"),
        })
    }

    async fn account(&self, key: &ApiKey) -> Result<Account> {
        let response = self
            .client
            .get(self.account_url()?)
            .header("X-Api-Key", key.expose())
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if !status.is_success() {
            return Err(Error::remote(error_message(status, &body)));
        }

        let account: AccountBody = serde_json::from_slice(&body)?;
        Ok(account.data.attributes)
    }
}
