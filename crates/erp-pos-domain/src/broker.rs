use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::LedgerPostClient;
use crate::PosError;
use crate::PosStore;

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const MAX_ATTEMPTS: u32 = 8;

#[derive(Debug, Clone)]
struct SaleMessage {
    sale_number: String,
    bearer_token: String,
    attempt: u32,
}

/// In-process, single-consumer, at-least-once broker standing in for the
/// baseline's `threading.Queue` worker: a durable `pending`/`failed` scan at
/// boot plus FIFO-per-sale retry replaces the non-durable in-memory queue.
pub struct SaleBroker {
    tx: mpsc::UnboundedSender<SaleMessage>,
}

impl SaleBroker {
    /// Spawns the worker task and, separately, re-enqueues every sale the
    /// store reports as `pending` or `failed` from a prior process.
    pub fn spawn(store: Arc<dyn PosStore>, ledger: Arc<dyn LedgerPostClient>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Self::run(rx, tx.clone(), store, ledger));
        Self { tx }
    }

    pub fn publish(&self, sale_number: String, bearer_token: String) {
        let _ = self.tx.send(SaleMessage {
            sale_number,
            bearer_token,
            attempt: 0,
        });
    }

    pub async fn recover_pending(&self, store: &dyn PosStore, bearer_token: &str) {
        let Ok(unsynced) = store.pending_and_failed().await else {
            return;
        };
        for sale in unsynced {
            tracing::warn!(sale_number = %sale.sale_number, "re-enqueuing unsynced sale found at boot");
            self.publish(sale.sale_number, bearer_token.to_string());
        }
    }

    async fn run(
        mut rx: mpsc::UnboundedReceiver<SaleMessage>,
        tx: mpsc::UnboundedSender<SaleMessage>,
        store: Arc<dyn PosStore>,
        ledger: Arc<dyn LedgerPostClient>,
    ) {
        while let Some(message) = rx.recv().await {
            let sale = match store.get_by_number(&message.sale_number).await {
                Ok(sale) => sale,
                Err(error) => {
                    tracing::error!(sale_number = %message.sale_number, %error, "sale vanished from store");
                    continue;
                }
            };

            match ledger.post_sale_transaction(&sale, &message.bearer_token).await {
                Ok(ledger_entry_id) => {
                    if let Err(error) = store.mark_synced(&message.sale_number, ledger_entry_id).await {
                        tracing::error!(sale_number = %message.sale_number, %error, "failed to record synced status");
                    }
                }
                // The ledger's own (source, reference) uniqueness index rejected a
                // second post for this sale: the transaction it wanted already
                // exists, so this counts as success rather than a retry target.
                Err(PosError::StateConflict(detail)) => {
                    tracing::info!(sale_number = %message.sale_number, %detail, "ledger already has this sale's transaction; treating as synced");
                    if let Err(error) = store.mark_synced(&message.sale_number, format!("reference:{}", sale.sale_number)).await {
                        tracing::error!(sale_number = %message.sale_number, %error, "failed to record synced status");
                    }
                }
                Err(error) => {
                    tracing::warn!(sale_number = %message.sale_number, %error, attempt = message.attempt, "ledger post failed, will retry");
                    let _ = store.mark_failed(&message.sale_number).await;

                    if message.attempt + 1 >= MAX_ATTEMPTS {
                        tracing::error!(sale_number = %message.sale_number, "giving up after max retries; sale stays failed for operator reconciliation");
                        continue;
                    }

                    let backoff = std::cmp::min(INITIAL_BACKOFF * 2u32.pow(message.attempt), MAX_BACKOFF);
                    let retry_tx = tx.clone();
                    let mut retried = message;
                    retried.attempt += 1;
                    tokio::spawn(async move {
                        sleep(backoff).await;
                        let _ = retry_tx.send(retried);
                    });
                }
            }
        }
    }
}
