// Ledger fullnode REST client: view calls, account resources, transactions.

pub mod balance;

use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::{BridgeError, BridgeResult};

pub use balance::{to_display, BalanceQuery, BalanceReport, DecimalsCache};

/// Per-request bound used when no timeout is configured.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin async client over the fullnode REST API.
///
/// 404s come back as [`BridgeError::NotFound`] so callers can decide whether
/// "missing" is an error for them.
#[derive(Clone, Debug)]
pub struct LedgerClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct ViewRequest<'a> {
    function: &'a str,
    type_arguments: &'a [String],
    arguments: &'a [Value],
}

#[derive(Deserialize)]
struct ResourceEnvelope {
    data: Value,
}

/// Indexed transaction as returned by `/transactions/by_hash/{hash}`
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecord {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default)]
    pub success: Option<bool>,
    #[serde(default)]
    pub vm_status: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl TransactionRecord {
    /// Pending records are not terminal; executed ones are.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.kind.as_str(),
            "user_transaction" | "state_checkpoint_transaction"
        )
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    pub sequence_number: String,
    pub authentication_key: String,
}

impl LedgerClient {
    pub fn new(base_url: impl Into<String>) -> BridgeResult<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Every request (connect, send and body) must finish within `timeout`.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> BridgeResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, client))
    }

    pub fn with_client(base_url: impl Into<String>, client: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }

    /// `POST /view`. Returns the result array.
    pub async fn view(
        &self,
        function: &str,
        type_arguments: &[String],
        arguments: &[Value],
    ) -> BridgeResult<Vec<Value>> {
        let url = self.endpoint(&["view"])?;
        tracing::debug!("view {} {:?}", function, type_arguments);

        let resp = self
            .client
            .post(url.clone())
            .json(&ViewRequest {
                function,
                type_arguments,
                arguments,
            })
            .send()
            .await?;

        let resp = check_status(resp, &url)?;
        let body: Value = resp.json().await?;

        match body {
            Value::Array(values) => Ok(values),
            other => Err(BridgeError::MalformedResponse(format!(
                "view {} returned non-array: {}",
                function, other
            ))),
        }
    }

    /// `GET /accounts/{addr}/resource/{type}`. Returns the resource `data`.
    pub async fn resource(&self, account: &str, resource_type: &str) -> BridgeResult<Value> {
        let url = self.endpoint(&["accounts", account, "resource", resource_type])?;
        tracing::debug!("resource {} at {}", resource_type, account);

        let resp = self.client.get(url.clone()).send().await?;
        let resp = check_status(resp, &url)?;
        let envelope: ResourceEnvelope = resp.json().await?;

        Ok(envelope.data)
    }

    /// `GET /transactions/by_hash/{hash}`. 404 while the transaction is not
    /// indexed yet.
    pub async fn transaction_by_hash(&self, hash: &str) -> BridgeResult<TransactionRecord> {
        let url = self.endpoint(&["transactions", "by_hash", hash])?;

        let resp = self.client.get(url.clone()).send().await?;
        let resp = check_status(resp, &url)?;

        Ok(resp.json().await?)
    }

    /// `GET /accounts/{addr}`
    pub async fn account(&self, address: &str) -> BridgeResult<AccountInfo> {
        let url = self.endpoint(&["accounts", address])?;

        let resp = self.client.get(url.clone()).send().await?;
        let resp = check_status(resp, &url)?;

        Ok(resp.json().await?)
    }

    /// Appends percent-encoded path segments to the base URL.
    fn endpoint(&self, segments: &[&str]) -> BridgeResult<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            BridgeError::Network(format!("invalid RPC url {}: {}", self.base_url, e))
        })?;

        url.path_segments_mut()
            .map_err(|_| BridgeError::Network(format!("RPC url cannot be a base: {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);

        Ok(url)
    }
}

fn check_status(resp: reqwest::Response, url: &Url) -> BridgeResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(BridgeError::NotFound(url.to_string()));
    }
    Err(BridgeError::HttpStatus {
        status: status.as_u16(),
        url: url.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, method, path, path_regex},
        Mock, MockServer, ResponseTemplate,
    };

    #[tokio::test]
    async fn test_view_posts_function_and_returns_array() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/view"))
            .and(body_json(json!({
                "function": "0x1::coin::balance",
                "type_arguments": ["0xA::green_points::GreenPoints"],
                "arguments": ["0xB"],
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["42"])))
            .mount(&server)
            .await;

        let client = LedgerClient::new(format!("{}/v1", server.uri())).unwrap();
        let out = client
            .view(
                "0x1::coin::balance",
                &["0xA::green_points::GreenPoints".to_string()],
                &[json!("0xB")],
            )
            .await
            .unwrap();
        assert_eq!(out, vec![json!("42")]);
    }

    #[tokio::test]
    async fn test_view_non_array_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/view"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"oops": 1})))
            .mount(&server)
            .await;

        let client = LedgerClient::new(server.uri()).unwrap();
        let err = client.view("0x1::coin::balance", &[], &[]).await.unwrap_err();
        assert!(matches!(err, BridgeError::MalformedResponse(_)));
    }

    #[tokio::test]
    async fn test_resource_type_is_encoded_as_one_segment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/accounts/0xB/resource/0x1::coin::CoinStore%3C.*GreenPoints%3E$"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"coin": {"value": "7"}}})),
            )
            .mount(&server)
            .await;

        let client = LedgerClient::new(server.uri()).unwrap();
        let data = client
            .resource("0xB", "0x1::coin::CoinStore<0xA::green_points::GreenPoints>")
            .await
            .unwrap();
        assert_eq!(data["coin"]["value"], "7");
    }

    #[tokio::test]
    async fn test_resource_404_and_500() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/accounts/0xmissing/"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/accounts/0xbroken/"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = LedgerClient::new(server.uri()).unwrap();
        let missing = client.resource("0xmissing", "0x1::coin::CoinInfo<X>").await;
        assert!(missing.unwrap_err().is_not_found());

        let broken = client.resource("0xbroken", "0x1::coin::CoinInfo<X>").await;
        assert!(matches!(
            broken.unwrap_err(),
            BridgeError::HttpStatus { status: 500, .. }
        ));
    }

    #[tokio::test]
    async fn test_transaction_by_hash_parses_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transactions/by_hash/0xabc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "user_transaction",
                "hash": "0xabc",
                "success": false,
                "vm_status": "Move abort in 0xA::green_points: E_NOT_ADMIN",
                "version": "123"
            })))
            .mount(&server)
            .await;

        let client = LedgerClient::new(server.uri()).unwrap();
        let tx = client.transaction_by_hash("0xabc").await.unwrap();
        assert!(tx.is_terminal());
        assert_eq!(tx.success, Some(false));
        assert_eq!(tx.version.as_deref(), Some("123"));
    }

    #[tokio::test]
    async fn test_account_info() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/accounts/0xA"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "sequence_number": "3",
                "authentication_key": "0xauth"
            })))
            .mount(&server)
            .await;

        let client = LedgerClient::new(server.uri()).unwrap();
        let info = client.account("0xA").await.unwrap();
        assert_eq!(info.sequence_number, "3");
    }

    #[tokio::test]
    async fn test_stalled_node_hits_request_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/accounts/0xA"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"sequence_number": "0", "authentication_key": "0x0"}))
                    .set_delay(Duration::from_secs(3)),
            )
            .mount(&server)
            .await;

        let client = LedgerClient::with_timeout(server.uri(), Duration::from_millis(100)).unwrap();
        let started = std::time::Instant::now();
        let err = client.account("0xA").await.unwrap_err();
        assert!(matches!(err, BridgeError::Network(_)));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_connection_refused_is_network_error() {
        let client = LedgerClient::new("http://127.0.0.1:1").unwrap();
        let err = client.account("0xA").await.unwrap_err();
        assert!(matches!(err, BridgeError::Network(_)));
    }
}
