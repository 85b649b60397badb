// Message Relay: carries a request from the content context into the page
// context over the window's post-message channel and waits for the answer.

mod bus;
mod page_agent;

use std::time::Duration;

use crate::error::BridgeError;
use crate::protocol::{Envelope, Request, Response};

pub use bus::{MessageBus, PostedMessage, SourceId, Subscription};
pub use page_agent::PageAgent;

/// Posts `request` as an `EXTENSION_MESSAGE` and resolves with the
/// same-window `PAGE_RESPONSE` carrying its request id, or a timeout failure.
///
/// Replies for other ids (including late answers to relays that already
/// timed out) are ignored. Only one relay may be in flight per bus; a
/// concurrent call is refused with [`BridgeError::Busy`].
pub async fn relay(bus: &MessageBus, request: &Request, timeout: Duration) -> Response {
    let Some(_slot) = bus.claim_relay_slot() else {
        tracing::warn!(
            "Relay already in flight on this page, refusing {}",
            request.kind()
        );
        return Response::from_error(&BridgeError::Busy);
    };

    let request_id = bus.next_request_id();
    let outgoing = match serde_json::to_value(Envelope::ExtensionMessage {
        request_id: Some(request_id),
        data: request.clone(),
    }) {
        Ok(value) => value,
        Err(e) => return Response::failure(format!("Failed to encode request: {}", e)),
    };

    // Listen before posting so a fast reply cannot slip past.
    let mut subscription = bus.subscribe();
    bus.post(outgoing);
    tracing::debug!("Relayed {} to page as #{}", request.kind(), request_id);

    let origin = bus.origin();
    let waited = tokio::time::timeout(timeout, async {
        while let Some(msg) = subscription.recv().await {
            if msg.source != origin {
                continue;
            }
            match serde_json::from_value::<Envelope>(msg.data) {
                Ok(Envelope::PageResponse {
                    request_id: Some(id),
                    response,
                }) if id == request_id => return Some(response),
                Ok(Envelope::PageResponse {
                    request_id: stale, ..
                }) => {
                    tracing::debug!("Ignoring page response {:?}, waiting for #{}", stale, request_id);
                }
                _ => {}
            }
        }
        None
    })
    .await;
    drop(subscription);

    match waited {
        Ok(Some(response)) => {
            tracing::debug!("Received page response for {}", request.kind());
            response
        }
        Ok(None) | Err(_) => {
            tracing::warn!("Message timeout for {} after {:?}", request.kind(), timeout);
            Response::from_error(&BridgeError::RelayTimeout)
        }
    }
}

/// Content-context receiver: the popup talks to this, it talks to the page.
#[derive(Clone, Debug)]
pub struct ContentScript {
    bus: MessageBus,
    timeout: Duration,
}

impl ContentScript {
    pub fn new(bus: MessageBus, timeout: Duration) -> Self {
        Self { bus, timeout }
    }

    pub async fn handle(&self, request: &Request) -> Response {
        tracing::debug!("Content script received {}", request.kind());
        relay(&self.bus, request, self.timeout).await
    }
}
