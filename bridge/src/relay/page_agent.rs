use serde_json::Value;
use tokio::task::JoinHandle;

use super::bus::{MessageBus, Subscription};
use crate::protocol::{Envelope, Request, Response};
use crate::rpc::BalanceQuery;
use crate::wallet::{WalletAction, WalletInvoker};

/// Page-context script. Owns the wallet side of the bridge and answers
/// `EXTENSION_MESSAGE` posts with `PAGE_RESPONSE` posts.
#[derive(Clone, Debug)]
pub struct PageAgent {
    invoker: WalletInvoker,
    query: BalanceQuery,
}

impl PageAgent {
    pub fn new(invoker: WalletInvoker, query: BalanceQuery) -> Self {
        Self { invoker, query }
    }

    /// Starts listening on `bus`. A window gets at most one agent no matter
    /// how many times the script is injected; later calls return `None`.
    pub fn install(self, bus: &MessageBus) -> Option<JoinHandle<()>> {
        if !bus.mark_client_ready() {
            tracing::info!("Page client already initialized");
            return None;
        }

        let subscription = bus.subscribe();
        let bus = bus.clone();
        tracing::info!("Page client message listener ready");

        Some(tokio::spawn(async move {
            self.run(bus, subscription).await;
        }))
    }

    async fn run(self, bus: MessageBus, mut subscription: Subscription) {
        while let Some(msg) = subscription.recv().await {
            if msg.source != bus.origin() {
                continue;
            }
            if msg.data.get("type").and_then(Value::as_str) != Some("EXTENSION_MESSAGE") {
                continue;
            }

            // Each request gets its own task so a slow wallet action does not
            // hold up the requests behind it.
            let agent = self.clone();
            let bus = bus.clone();
            tokio::spawn(async move {
                agent.answer(&bus, msg.data).await;
            });
        }
    }

    async fn answer(&self, bus: &MessageBus, data: Value) {
        let request_id = data.get("requestId").and_then(Value::as_u64);

        let response = match serde_json::from_value::<Envelope>(data) {
            Ok(Envelope::ExtensionMessage { data, .. }) => self.handle(data).await,
            Ok(Envelope::PageResponse { .. }) => return,
            Err(e) => {
                tracing::warn!("Unknown message type: {}", e);
                Response::failure("Unknown message type")
            }
        };

        match serde_json::to_value(Envelope::PageResponse {
            request_id,
            response,
        }) {
            Ok(reply) => bus.post(reply),
            Err(e) => tracing::error!("Failed to encode page response: {}", e),
        }
    }

    pub async fn handle(&self, request: Request) -> Response {
        tracing::info!("Processing {}", request.kind());

        match request {
            Request::Connect => self.invoker.connect().await,
            Request::GetBalance { admin, subject } => self.query.get_balance(&admin, &subject).await,
            Request::Award {
                admin,
                subject,
                amount,
            } => {
                self.invoker
                    .invoke(&admin, WalletAction::Award { subject, amount })
                    .await
            }
            Request::Redeem {
                admin,
                subject,
                amount,
            } => {
                self.invoker
                    .invoke(&admin, WalletAction::Redeem { subject, amount })
                    .await
            }
            Request::Register { admin } => self.invoker.invoke(&admin, WalletAction::Register).await,
            Request::SetMerchant {
                admin,
                merchant,
                approved,
            } => {
                self.invoker
                    .invoke(&admin, WalletAction::SetMerchant { merchant, approved })
                    .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CoinConfig;
    use crate::relay::relay;
    use crate::rpc::{DecimalsCache, LedgerClient};
    use crate::wallet::tests::{fast_wallet_config, MockWallet};
    use crate::wallet::ProviderSlot;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    fn agent(rpc: &str, slot: ProviderSlot) -> PageAgent {
        let ledger = LedgerClient::new(rpc).unwrap();
        PageAgent::new(
            WalletInvoker::new(slot, ledger.clone(), CoinConfig::default(), &fast_wallet_config()),
            BalanceQuery::new(ledger, CoinConfig::default(), DecimalsCache::default()),
        )
    }

    #[tokio::test]
    async fn test_installs_once_per_window() {
        let bus = MessageBus::new();
        let first = agent("http://127.0.0.1:1", ProviderSlot::empty()).install(&bus);
        let second = agent("http://127.0.0.1:1", ProviderSlot::empty()).install(&bus);

        assert!(first.is_some());
        assert!(second.is_none());
        assert_eq!(bus.listener_count(), 1);
    }

    #[tokio::test]
    async fn test_balance_through_relay() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/view"))
            .and(body_partial_json(json!({"function": "0x1::coin::balance"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(["500000000"])))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/view"))
            .and(body_partial_json(json!({"function": "0x1::coin::decimals"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([8])))
            .mount(&server)
            .await;

        let bus = MessageBus::new();
        agent(&server.uri(), ProviderSlot::empty()).install(&bus);

        let resp = relay(
            &bus,
            &Request::GetBalance {
                admin: "0xA".to_string(),
                subject: "0xB".to_string(),
            },
            Duration::from_secs(5),
        )
        .await;

        assert!(resp.success);
        assert_eq!(resp.balance, Some(5.0));
        assert_eq!(resp.raw.as_deref(), Some("500000000"));
        assert_eq!(resp.decimals, Some(8));
    }

    #[tokio::test]
    async fn test_wallet_action_through_relay() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transactions/by_hash/0xreg"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "type": "user_transaction",
                "success": true,
                "vm_status": "Executed successfully"
            })))
            .mount(&server)
            .await;

        let wallet = Arc::new(MockWallet::returning("0xreg"));
        let bus = MessageBus::new();
        agent(&server.uri(), ProviderSlot::with_provider(wallet.clone())).install(&bus);

        let resp = relay(
            &bus,
            &Request::Register {
                admin: "0xA".to_string(),
            },
            Duration::from_secs(5),
        )
        .await;

        assert_eq!(resp, Response::confirmed("0xreg"));
        assert_eq!(wallet.submitted()[0].function, "0xA::green_points::register");
    }

    #[tokio::test]
    async fn test_unknown_message_type_gets_an_answer() {
        let bus = MessageBus::new();
        agent("http://127.0.0.1:1", ProviderSlot::empty()).install(&bus);

        let mut sub = bus.subscribe();
        bus.post(json!({
            "type": "EXTENSION_MESSAGE",
            "requestId": 41,
            "data": {"type": "MINT_EVERYTHING"}
        }));

        loop {
            let msg = sub.recv().await.unwrap();
            if msg.data["type"] == "PAGE_RESPONSE" {
                assert_eq!(msg.data["requestId"], 41);
                assert_eq!(msg.data["response"]["success"], false);
                assert_eq!(msg.data["response"]["error"], "Unknown message type");
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_late_wallet_reply_does_not_answer_next_request() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/transactions/by_hash/0xslow"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "type": "user_transaction",
                        "success": true,
                        "vm_status": "Executed successfully"
                    }))
                    .set_delay(Duration::from_millis(200)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/view"))
            .and(body_partial_json(json!({"function": "0x1::coin::balance"})))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!(["300000000"]))
                    .set_delay(Duration::from_millis(400)),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/view"))
            .and(body_partial_json(json!({"function": "0x1::coin::decimals"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([8])))
            .mount(&server)
            .await;

        let wallet = Arc::new(MockWallet::returning("0xslow"));
        let bus = MessageBus::new();
        agent(&server.uri(), ProviderSlot::with_provider(wallet)).install(&bus);

        // relay gives up before the confirmation poll answers
        let first = relay(
            &bus,
            &Request::Register {
                admin: "0xA".to_string(),
            },
            Duration::from_millis(100),
        )
        .await;
        assert_eq!(first.error.as_deref(), Some("Timeout waiting for response"));

        // the register reply lands while this one is still waiting
        let second = relay(
            &bus,
            &Request::GetBalance {
                admin: "0xA".to_string(),
                subject: "0xB".to_string(),
            },
            Duration::from_secs(5),
        )
        .await;
        assert!(second.success);
        assert_eq!(second.balance, Some(3.0));
        assert!(second.hash.is_none());
        assert_eq!(bus.listener_count(), 1);
    }
}
