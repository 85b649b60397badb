// GreenPoints balance resolution: view call first, CoinStore resource second,
// decimals through a lazily filled cache.

use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::LedgerClient;
use crate::config::CoinConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::Response;

/// Coin type → decimal precision. Append-only for the process lifetime:
/// the first value stored for a key wins and is never replaced.
#[derive(Clone, Debug, Default)]
pub struct DecimalsCache {
    entries: Arc<RwLock<HashMap<String, u8>>>,
}

impl DecimalsCache {
    pub fn get(&self, coin_type: &str) -> Option<u8> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(coin_type)
            .copied()
    }

    /// Stores `decimals` unless the key is already present. Returns the value
    /// that ends up cached.
    pub fn insert(&self, coin_type: &str, decimals: u8) -> u8 {
        *self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(coin_type.to_string())
            .or_insert(decimals)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BalanceReport {
    pub balance: f64,
    pub raw: u128,
    pub decimals: u8,
    /// `Some(false)` means the account never registered a CoinStore.
    pub has_store: Option<bool>,
}

impl From<BalanceReport> for Response {
    fn from(report: BalanceReport) -> Self {
        Response {
            balance: Some(report.balance),
            raw: Some(report.raw.to_string()),
            decimals: Some(report.decimals),
            has_store: report.has_store,
            ..Response::ok()
        }
    }
}

/// Converts a raw integer amount to a display value.
///
/// Whole and fractional parts are split with integer arithmetic and only then
/// combined as `f64`, so the result is exact while it fits in 53 bits of
/// mantissa and lossy beyond that.
pub fn to_display(raw: u128, decimals: u8) -> f64 {
    match 10u128.checked_pow(u32::from(decimals)) {
        Some(divisor) => {
            let whole = raw / divisor;
            let frac = raw % divisor;
            whole as f64 + frac as f64 / divisor as f64
        }
        None => raw as f64 / 10f64.powi(i32::from(decimals)),
    }
}

/// RPC Query Adapter for GreenPoints balances.
#[derive(Clone, Debug)]
pub struct BalanceQuery {
    ledger: LedgerClient,
    coin: CoinConfig,
    decimals: DecimalsCache,
}

impl BalanceQuery {
    pub fn new(ledger: LedgerClient, coin: CoinConfig, decimals: DecimalsCache) -> Self {
        Self {
            ledger,
            coin,
            decimals,
        }
    }

    pub fn cache(&self) -> &DecimalsCache {
        &self.decimals
    }

    /// Balance of `subject` in the coin deployed at `admin`. Never fails:
    /// errors come back as `success: false`.
    pub async fn get_balance(&self, admin: &str, subject: &str) -> Response {
        tracing::info!("Checking balance for {}", subject);
        match self.balance_report(admin, subject).await {
            Ok(report) => {
                tracing::info!("Balance found: {} (raw {})", report.balance, report.raw);
                report.into()
            }
            Err(e) => {
                tracing::error!("Balance error for {}: {}", subject, e);
                Response::from_error(&e)
            }
        }
    }

    pub async fn balance_report(&self, admin: &str, subject: &str) -> BridgeResult<BalanceReport> {
        match self.view_balance(admin, subject).await {
            Ok(raw) => {
                let decimals = self.coin_decimals(admin).await;
                return Ok(BalanceReport {
                    balance: to_display(raw, decimals),
                    raw,
                    decimals,
                    has_store: None,
                });
            }
            Err(e) => {
                tracing::warn!("View balance failed, falling back to CoinStore: {}", e);
            }
        }

        let store = match self.coin_store(admin, subject).await {
            Ok(data) => data,
            Err(e) if e.is_not_found() => {
                tracing::info!("No CoinStore for {}, user not registered", subject);
                let decimals = self.coin_decimals(admin).await;
                return Ok(BalanceReport {
                    balance: 0.0,
                    raw: 0,
                    decimals,
                    has_store: Some(false),
                });
            }
            Err(e) => return Err(e),
        };

        let raw = store
            .get("coin")
            .and_then(|coin| coin.get("value"))
            .and_then(parse_u128)
            .ok_or_else(|| {
                BridgeError::MalformedResponse(format!("CoinStore without coin.value: {}", store))
            })?;

        let decimals = self.coin_decimals(admin).await;
        Ok(BalanceReport {
            balance: to_display(raw, decimals),
            raw,
            decimals,
            has_store: Some(true),
        })
    }

    /// Whether `user` has a CoinStore for the admin's coin.
    pub async fn is_registered(&self, admin: &str, user: &str) -> bool {
        self.coin_store(admin, user).await.is_ok()
    }

    /// Decimals of the admin's coin. View call, then CoinInfo resource, then
    /// the configured default. Cached after the first resolution.
    pub async fn coin_decimals(&self, admin: &str) -> u8 {
        let coin_type = self.coin.coin_type(admin);
        if let Some(decimals) = self.decimals.get(&coin_type) {
            return decimals;
        }

        let resolved = match self.view_decimals(&coin_type).await {
            Ok(decimals) => decimals,
            Err(view_err) => match self.coin_info_decimals(admin, &coin_type).await {
                Ok(decimals) => decimals,
                Err(info_err) => {
                    tracing::warn!(
                        "Failed to get decimals for {}, defaulting to {}: {}; {}",
                        coin_type,
                        self.coin.default_decimals,
                        view_err,
                        info_err
                    );
                    self.coin.default_decimals
                }
            },
        };

        self.decimals.insert(&coin_type, resolved)
    }

    async fn view_balance(&self, admin: &str, subject: &str) -> BridgeResult<u128> {
        let out = self
            .ledger
            .view(
                "0x1::coin::balance",
                &[self.coin.coin_type(admin)],
                &[json!(subject)],
            )
            .await?;

        let first = out
            .first()
            .ok_or_else(|| BridgeError::MalformedResponse("empty view response".to_string()))?;

        parse_u128(first).ok_or_else(|| {
            BridgeError::MalformedResponse(format!("balance is not an integer: {}", first))
        })
    }

    async fn coin_store(&self, admin: &str, subject: &str) -> BridgeResult<Value> {
        let resource_type = format!("0x1::coin::CoinStore<{}>", self.coin.coin_type(admin));
        self.ledger.resource(subject, &resource_type).await
    }

    async fn view_decimals(&self, coin_type: &str) -> BridgeResult<u8> {
        let out = self
            .ledger
            .view("0x1::coin::decimals", &[coin_type.to_string()], &[])
            .await?;

        match out.first() {
            None => Ok(self.coin.default_decimals),
            Some(value) => parse_u8(value).ok_or_else(|| {
                BridgeError::MalformedResponse(format!("decimals out of range: {}", value))
            }),
        }
    }

    async fn coin_info_decimals(&self, admin: &str, coin_type: &str) -> BridgeResult<u8> {
        let resource_type = format!("0x1::coin::CoinInfo<{}>", coin_type);
        let data = self.ledger.resource(admin, &resource_type).await?;

        match data.get("decimals") {
            None | Some(Value::Null) => Ok(self.coin.default_decimals),
            Some(value) => parse_u8(value).ok_or_else(|| {
                BridgeError::MalformedResponse(format!("decimals out of range: {}", value))
            }),
        }
    }
}

/// Ledger integers arrive as decimal strings (u64 and wider) or plain numbers.
fn parse_u128(value: &Value) -> Option<u128> {
    match value {
        Value::String(s) => s.parse().ok(),
        Value::Number(n) => n.as_u64().map(u128::from),
        _ => None,
    }
}

fn parse_u8(value: &Value) -> Option<u8> {
    parse_u128(value).and_then(|v| u8::try_from(v).ok())
}
