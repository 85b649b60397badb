// Wallet Action Invoker: wraps the page-injected wallet provider, submits
// GreenPoints entry functions and waits for their confirmation.

mod confirm;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

use crate::config::{CoinConfig, PollSettings, WalletConfig};
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::Response;
use crate::rpc::LedgerClient;

pub use confirm::{wait_for_transaction, TransactionOutcome};

/// Provider codes meaning "the user said no". Petra uses 4100, EIP-1193
/// wallets use 4001.
pub const USER_REJECTED_CODES: [i64; 2] = [4100, 4001];

/// `signAndSubmitTransaction` payload
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EntryFunctionPayload {
    #[serde(rename = "type")]
    pub payload_type: String,
    pub function: String,
    pub type_arguments: Vec<String>,
    pub arguments: Vec<Value>,
}

impl EntryFunctionPayload {
    pub fn new(function: String, arguments: Vec<Value>) -> Self {
        Self {
            payload_type: "entry_function_payload".to_string(),
            function,
            type_arguments: Vec::new(),
            arguments,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct PendingTransaction {
    pub hash: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ConnectedAccount {
    pub address: String,
    #[serde(default, rename = "publicKey")]
    pub public_key: Option<String>,
}

/// Error thrown by the provider, with its numeric code when it has one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub code: Option<i64>,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: Option<i64>, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code
            .map(|code| USER_REJECTED_CODES.contains(&code))
            .unwrap_or(false)
    }
}

/// The wallet API a page exposes (`window.aptos` for Petra).
#[async_trait]
pub trait WalletProvider: Send + Sync {
    async fn connect(&self) -> Result<ConnectedAccount, ProviderError>;

    async fn network(&self) -> Result<String, ProviderError>;

    async fn sign_and_submit_transaction(
        &self,
        payload: &EntryFunctionPayload,
    ) -> Result<PendingTransaction, ProviderError>;
}

/// Page-global provider handle. Starts empty and gets filled whenever the
/// wallet extension finishes injecting itself.
#[derive(Clone, Default)]
pub struct ProviderSlot {
    inner: Arc<RwLock<Option<Arc<dyn WalletProvider>>>>,
}

impl ProviderSlot {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_provider(provider: Arc<dyn WalletProvider>) -> Self {
        let slot = Self::default();
        slot.install(provider);
        slot
    }

    pub fn install(&self, provider: Arc<dyn WalletProvider>) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(provider);
    }

    pub fn current(&self) -> Option<Arc<dyn WalletProvider>> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl fmt::Debug for ProviderSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderSlot")
            .field("installed", &self.current().is_some())
            .finish()
    }
}

/// A mutating GreenPoints entry function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletAction {
    Award { subject: String, amount: u64 },
    Redeem { subject: String, amount: u64 },
    Register,
    SetMerchant { merchant: String, approved: bool },
}

impl WalletAction {
    pub fn entry(&self) -> &'static str {
        match self {
            WalletAction::Award { .. } => "award",
            WalletAction::Redeem { .. } => "redeem_from",
            WalletAction::Register => "register",
            WalletAction::SetMerchant { .. } => "set_merchant",
        }
    }

    /// Positional arguments follow the Move entry signatures. Amounts are
    /// passed as strings (u64 over JSON).
    pub fn payload(&self, coin: &CoinConfig, admin: &str) -> EntryFunctionPayload {
        let arguments = match self {
            WalletAction::Award { subject, amount } => {
                vec![json!(subject), json!(amount.to_string())]
            }
            WalletAction::Redeem { subject, amount } => {
                vec![json!(admin), json!(subject), json!(amount.to_string())]
            }
            WalletAction::Register => Vec::new(),
            WalletAction::SetMerchant { merchant, approved } => {
                vec![json!(merchant), json!(approved)]
            }
        };

        EntryFunctionPayload::new(coin.entry_function(admin, self.entry()), arguments)
    }
}

#[derive(Clone, Debug)]
pub struct WalletInvoker {
    slot: ProviderSlot,
    ledger: LedgerClient,
    coin: CoinConfig,
    discovery: PollSettings,
    confirmation: PollSettings,
}

impl WalletInvoker {
    pub fn new(slot: ProviderSlot, ledger: LedgerClient, coin: CoinConfig, config: &WalletConfig) -> Self {
        Self {
            slot,
            ledger,
            coin,
            discovery: config.discovery(),
            confirmation: config.confirmation(),
        }
    }

    /// Checks the slot immediately, then once per discovery interval until
    /// the window closes.
    pub async fn locate_provider(&self) -> BridgeResult<Arc<dyn WalletProvider>> {
        let attempts = self.discovery.attempts();
        for attempt in 1..=attempts {
            if let Some(provider) = self.slot.current() {
                tracing::debug!("Wallet provider found after {} check(s)", attempt);
                return Ok(provider);
            }
            if attempt < attempts {
                tokio::time::sleep(self.discovery.interval).await;
            }
        }

        tracing::warn!("Wallet provider not found after {:?}", self.discovery.timeout);
        Err(BridgeError::WalletUnavailable)
    }

    pub async fn connect(&self) -> Response {
        match self.try_connect().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::error!("Connect error: {}", e);
                Response::from_error(&e)
            }
        }
    }

    async fn try_connect(&self) -> BridgeResult<Response> {
        let provider = self.locate_provider().await?;

        let account = provider.connect().await.map_err(connect_error)?;
        let network = provider.network().await.map_err(connect_error)?;

        tracing::info!("Connected {} on {}", account.address, network);
        Ok(Response::connected(account.address, &network))
    }

    pub async fn invoke(&self, admin: &str, action: WalletAction) -> Response {
        tracing::info!("Submitting {} for admin {}", action.entry(), admin);
        match self.submit_and_confirm(admin, &action).await {
            Ok(hash) => {
                tracing::info!("{} confirmed: {}", action.entry(), hash);
                Response::confirmed(hash)
            }
            Err(e) => {
                tracing::error!("{} error: {}", action.entry(), e);
                Response::from_error(&e)
            }
        }
    }

    async fn submit_and_confirm(&self, admin: &str, action: &WalletAction) -> BridgeResult<String> {
        let provider = self.locate_provider().await?;
        let payload = action.payload(&self.coin, admin);

        let pending = provider
            .sign_and_submit_transaction(&payload)
            .await
            .map_err(|e| BridgeError::Submission(e.message))?;

        tracing::debug!("Submitted {} as {}", payload.function, pending.hash);

        wait_for_transaction(&self.ledger, &pending.hash, self.confirmation)
            .await
            .into_result(&pending.hash)?;

        Ok(pending.hash)
    }
}

fn connect_error(err: ProviderError) -> BridgeError {
    if err.is_user_rejection() {
        BridgeError::WalletRejected
    } else {
        BridgeError::Submission(err.message)
    }
}
