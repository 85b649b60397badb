// Browser-side seam: which tab is active, how to message its content
// receiver, how to inject receivers when they are missing.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{Request, Response};
use crate::relay::{ContentScript, MessageBus, PageAgent};
use crate::rpc::BalanceQuery;
use crate::wallet::WalletInvoker;

/// URL schemes where extensions may not inject scripts.
pub const RESTRICTED_SCHEMES: [&str; 4] = ["chrome://", "chrome-extension://", "edge://", "about:"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub id: u32,
    pub url: String,
}

impl TabInfo {
    pub fn new(id: u32, url: impl Into<String>) -> Self {
        Self { id, url: url.into() }
    }

    /// Pages on restricted schemes cannot host the content receiver.
    pub fn allows_injection(&self) -> bool {
        !RESTRICTED_SCHEMES
            .iter()
            .any(|scheme| self.url.starts_with(scheme))
    }
}

#[async_trait]
pub trait TabHost: Send + Sync {
    async fn active_tab(&self) -> Option<TabInfo>;

    /// Delivers `request` to the tab's content receiver.
    /// Fails with [`BridgeError::ReceiverMissing`] when nothing is listening.
    async fn send_message(&self, tab: &TabInfo, request: &Request) -> BridgeResult<Response>;

    /// Injects the content receiver and the page script into `tab`.
    async fn inject_receivers(&self, tab: &TabInfo) -> BridgeResult<()>;
}

/// What the page script needs to serve requests.
#[derive(Clone, Debug)]
pub struct PageRuntime {
    pub invoker: WalletInvoker,
    pub query: BalanceQuery,
}

/// A single in-process tab: one page window, optionally with receivers.
#[derive(Debug)]
pub struct LocalTab {
    info: TabInfo,
    bus: MessageBus,
    runtime: PageRuntime,
    relay_timeout: Duration,
    content: RwLock<Option<ContentScript>>,
    injection_blocked: AtomicBool,
}

impl LocalTab {
    /// A freshly opened page with no receivers.
    pub fn new(info: TabInfo, runtime: PageRuntime, relay_timeout: Duration) -> Self {
        Self {
            info,
            bus: MessageBus::new(),
            runtime,
            relay_timeout,
            content: RwLock::new(None),
            injection_blocked: AtomicBool::new(false),
        }
    }

    /// A page where the manifest content script already ran.
    pub fn with_receivers(info: TabInfo, runtime: PageRuntime, relay_timeout: Duration) -> Self {
        let tab = Self::new(info, runtime, relay_timeout);
        tab.install_receivers();
        tab
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn has_content_receiver(&self) -> bool {
        self.content
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Simulates a page that refuses script injection (CSP, navigation...).
    pub fn block_injection(&self, blocked: bool) {
        self.injection_blocked.store(blocked, Ordering::Release);
    }

    /// Drops the content receiver, as an extension reload does.
    pub fn unload_content_receiver(&self) {
        *self.content.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn install_receivers(&self) {
        *self.content.write().unwrap_or_else(PoisonError::into_inner) =
            Some(ContentScript::new(self.bus.clone(), self.relay_timeout));

        let agent = PageAgent::new(self.runtime.invoker.clone(), self.runtime.query.clone());
        agent.install(&self.bus);
    }
}

#[async_trait]
impl TabHost for LocalTab {
    async fn active_tab(&self) -> Option<TabInfo> {
        Some(self.info.clone())
    }

    async fn send_message(&self, tab: &TabInfo, request: &Request) -> BridgeResult<Response> {
        if tab.id != self.info.id {
            return Err(BridgeError::ReceiverMissing);
        }

        let content = self
            .content
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        match content {
            Some(content) => Ok(content.handle(request).await),
            None => Err(BridgeError::ReceiverMissing),
        }
    }

    async fn inject_receivers(&self, tab: &TabInfo) -> BridgeResult<()> {
        if tab.id != self.info.id {
            return Err(BridgeError::InjectionFailed(format!("no tab with id {}", tab.id)));
        }
        if !tab.allows_injection() {
            return Err(BridgeError::InjectionFailed(format!(
                "cannot access contents of {}",
                tab.url
            )));
        }
        if self.injection_blocked.load(Ordering::Acquire) {
            return Err(BridgeError::InjectionFailed(
                "script injection blocked by the page".to_string(),
            ));
        }

        self.install_receivers();
        tracing::debug!("Injected receivers into tab {}", tab.id);
        Ok(())
    }
}
