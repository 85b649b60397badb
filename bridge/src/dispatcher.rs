// Request Dispatcher: popup-side routing between the content relay and a
// direct ledger query, with one re-injection retry and a busy guard.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::BridgeError;
use crate::protocol::{Request, Response};
use crate::rpc::BalanceQuery;
use crate::tab::{TabHost, TabInfo};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageCompatibility {
    /// Receivers can run on the active page
    Compatible,
    /// Restricted page: balance reads only
    Limited,
    NoTab,
}

pub struct Dispatcher<H> {
    host: H,
    query: BalanceQuery,
    busy: AtomicBool,
    injected_this_open: AtomicBool,
}

/// Held while a request is in flight; clears the busy flag on every exit.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| BusyGuard(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<H: TabHost> Dispatcher<H> {
    pub fn new(host: H, query: BalanceQuery) -> Self {
        Self {
            host,
            query,
            busy: AtomicBool::new(false),
            injected_this_open: AtomicBool::new(false),
        }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Classifies the active page and, the first time a compatible page is
    /// seen, injects receivers ahead of any request.
    pub async fn prepare(&self) -> PageCompatibility {
        let Some(tab) = self.host.active_tab().await else {
            return PageCompatibility::NoTab;
        };

        if !tab.allows_injection() {
            tracing::info!("Limited features on {}", tab.url);
            return PageCompatibility::Limited;
        }

        if self
            .injected_this_open
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            if let Err(e) = self.host.inject_receivers(&tab).await {
                tracing::warn!("Pre-injection failed: {}", e);
            }
        }

        PageCompatibility::Compatible
    }

    /// Re-injects receivers into the active page, replacing a content
    /// receiver that went stale. Subject to the busy guard like any request.
    pub async fn reload(&self) -> Response {
        let Some(_guard) = BusyGuard::acquire(&self.busy) else {
            return Response::from_error(&BridgeError::Busy);
        };

        let Some(tab) = self.host.active_tab().await else {
            return Response::from_error(&BridgeError::NoActiveTab);
        };
        if !tab.allows_injection() {
            return Response::from_error(&BridgeError::UnsupportedContext);
        }

        match self.host.inject_receivers(&tab).await {
            Ok(()) => {
                tracing::info!("Reloaded receivers in tab {}", tab.id);
                Response::ok()
            }
            Err(e) => {
                tracing::error!("Reload failed: {}", e);
                Response::from_error(&e)
            }
        }
    }

    /// Serves one request. A request arriving while another is in flight is
    /// rejected with `Busy`, not queued.
    pub async fn dispatch(&self, request: Request) -> Response {
        let Some(_guard) = BusyGuard::acquire(&self.busy) else {
            tracing::warn!(
                "Please wait for the current operation to finish ({} rejected)",
                request.kind()
            );
            return Response::from_error(&BridgeError::Busy);
        };

        tracing::debug!("Dispatching {}", request.kind());
        self.route(&request).await
    }

    async fn route(&self, request: &Request) -> Response {
        let Some(tab) = self.host.active_tab().await else {
            return Response::from_error(&BridgeError::NoActiveTab);
        };

        if !tab.allows_injection() {
            if let Some((admin, subject)) = request.balance_target() {
                tracing::info!("Restricted page {}, checking balance directly", tab.url);
                return self.query.get_balance(admin, subject).await;
            }
            tracing::warn!("Extension cannot run on {}", tab.url);
            return Response::from_error(&BridgeError::UnsupportedContext);
        }

        match self.host.send_message(&tab, request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!("Runtime error messaging tab {}: {}", tab.id, e);
                if let Some((admin, subject)) = request.balance_target() {
                    tracing::info!("Falling back to direct balance check");
                    return self.query.get_balance(admin, subject).await;
                }
                self.inject_and_retry(&tab, request).await
            }
        }
    }

    async fn inject_and_retry(&self, tab: &TabInfo, request: &Request) -> Response {
        if let Err(e) = self.host.inject_receivers(tab).await {
            tracing::error!("Injection failed: {}", e);
            return Response::from_error(&e);
        }

        tracing::info!("Injected receivers dynamically, retrying {}", request.kind());
        match self.host.send_message(tab, request).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Retry failed: {}", e);
                Response::from_error(&BridgeError::ReceiverMissing)
            }
        }
    }
}
