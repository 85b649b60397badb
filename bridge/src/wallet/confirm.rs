use tokio::time::Instant;

use crate::config::PollSettings;
use crate::error::{BridgeError, BridgeResult};
use crate::rpc::LedgerClient;

/// What the ledger said about a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionOutcome {
    pub confirmed: bool,
    pub success: bool,
    pub vm_status: String,
    pub version: Option<String>,
}

impl TransactionOutcome {
    fn timed_out() -> Self {
        Self {
            confirmed: false,
            success: false,
            vm_status: "timeout waiting for transaction".to_string(),
            version: None,
        }
    }

    /// Maps the outcome onto the error taxonomy for transaction `hash`.
    pub fn into_result(self, hash: &str) -> BridgeResult<()> {
        if !self.confirmed {
            return Err(BridgeError::ConfirmationTimeout {
                hash: hash.to_string(),
            });
        }
        if !self.success {
            return Err(BridgeError::ExecutionFailure {
                vm_status: self.vm_status,
                hash: hash.to_string(),
            });
        }
        Ok(())
    }
}

/// Polls `/transactions/by_hash` until a terminal record shows up or the
/// deadline passes. 404s, pending records and transport errors all mean
/// "ask again". A request still in flight at the deadline is abandoned.
pub async fn wait_for_transaction(
    ledger: &LedgerClient,
    hash: &str,
    poll: PollSettings,
) -> TransactionOutcome {
    let deadline = Instant::now() + poll.timeout;

    while Instant::now() < deadline {
        let fetched = match tokio::time::timeout_at(deadline, ledger.transaction_by_hash(hash)).await {
            Ok(fetched) => fetched,
            Err(_) => break,
        };

        match fetched {
            Ok(tx) if tx.is_terminal() => {
                tracing::debug!(
                    "Transaction {} confirmed at version {:?}: {:?}",
                    hash,
                    tx.version,
                    tx.vm_status
                );
                return TransactionOutcome {
                    confirmed: true,
                    success: tx.success.unwrap_or(false),
                    vm_status: tx.vm_status.unwrap_or_default(),
                    version: tx.version,
                };
            }
            Ok(tx) => tracing::debug!("Transaction {} is still {}", hash, tx.kind),
            Err(e) if e.is_not_found() => tracing::debug!("Transaction {} not indexed yet", hash),
            Err(e) => tracing::debug!("Polling transaction {} failed: {}", hash, e),
        }

        tokio::time::sleep_until((Instant::now() + poll.interval).min(deadline)).await;
    }

    tracing::warn!("Transaction {} not confirmed within {:?}", hash, poll.timeout);
    TransactionOutcome::timed_out()
}
