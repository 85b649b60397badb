//! GreenPoints extension bridge.
//!
//! Popup intents travel popup → content script → page script, where the
//! injected wallet signs GreenPoints transactions and the ledger answers
//! balance queries. The [`dispatcher`] decides per request whether to relay
//! or query the ledger directly.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod protocol;
pub mod relay;
pub mod rpc;
pub mod settings;
pub mod tab;
pub mod wallet;

pub use config::BridgeConfig;
pub use dispatcher::{Dispatcher, PageCompatibility};
pub use error::{BridgeError, BridgeResult};
pub use protocol::{Envelope, Request, RequestKind, Response};
pub use rpc::{BalanceQuery, DecimalsCache, LedgerClient};
pub use settings::AddressBook;
pub use tab::{LocalTab, PageRuntime, TabHost, TabInfo};
pub use wallet::{ProviderSlot, WalletInvoker, WalletProvider};

/// Everything the popup needs, wired from one config.
pub fn build_local(
    config: &BridgeConfig,
    tab: TabInfo,
    provider: ProviderSlot,
) -> BridgeResult<Dispatcher<LocalTab>> {
    let ledger = LedgerClient::with_timeout(
        config.ledger.rpc_url.clone(),
        config.ledger.request_timeout(),
    )?;
    let decimals = DecimalsCache::default();
    let query = BalanceQuery::new(ledger.clone(), config.coin.clone(), decimals);

    let runtime = PageRuntime {
        invoker: WalletInvoker::new(provider, ledger, config.coin.clone(), &config.wallet),
        query: query.clone(),
    };

    let tab = LocalTab::new(tab, runtime, config.relay.timeout());
    Ok(Dispatcher::new(tab, query))
}
