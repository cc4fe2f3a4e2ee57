use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use erp_money::Money;
use serde::Serialize;

use crate::PosError;
use crate::Sale;

const INVENTORY_ADJUST_TIMEOUT: Duration = Duration::from_secs(10);
const LEDGER_POST_TIMEOUT: Duration = Duration::from_secs(10);

/// The stock side of the sale pipeline; a trait so the pipeline can be
/// exercised against a fake in tests without a live Inventory service.
#[async_trait]
pub trait InventoryAdjustClient: Send + Sync {
    async fn adjust_stock(
        &self,
        product_id: &str,
        size: &str,
        quantity_change: i64,
        reference_id: &str,
        bearer_token: &str,
    ) -> Result<(), PosError>;
}

/// The ledger side of the sale pipeline; returns the created transaction's
/// id on success.
#[async_trait]
pub trait LedgerPostClient: Send + Sync {
    async fn post_sale_transaction(&self, sale: &Sale, bearer_token: &str) -> Result<String, PosError>;

    /// Posts the mirror-image entry used by void/refund: debit Revenue,
    /// credit Cash for `amount`.
    async fn post_compensating_transaction(
        &self,
        reference: &str,
        description: &str,
        amount: Money,
        bearer_token: &str,
    ) -> Result<String, PosError>;
}

pub struct HttpInventoryClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpInventoryClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(INVENTORY_ADJUST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl InventoryAdjustClient for HttpInventoryClient {
    async fn adjust_stock(
        &self,
        product_id: &str,
        size: &str,
        quantity_change: i64,
        reference_id: &str,
        bearer_token: &str,
    ) -> Result<(), PosError> {
        let url = format!("{}/api/v1/stock/{product_id}/{size}/adjust", self.base_url);
        let response = self
            .http
            .put(url)
            .query(&[
                ("quantity_change", quantity_change.to_string()),
                ("reference_id", reference_id.to_string()),
            ])
            .bearer_auth(bearer_token)
            .send()
            .await
            .map_err(|e| PosError::InventoryUnavailable(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(PosError::InventoryUnavailable(format!(
                "stock adjust for {product_id}/{size} returned {}",
                response.status()
            )))
        }
    }
}

#[derive(Serialize)]
struct TransactionLinePayload {
    account_name: String,
    line_type: &'static str,
    amount: Money,
}

#[derive(Serialize)]
struct PostTransactionPayload {
    date: DateTime<Utc>,
    description: String,
    source: &'static str,
    reference: String,
    created_by: Option<String>,
    lines: Vec<TransactionLinePayload>,
}

#[derive(serde::Deserialize)]
struct PostTransactionResponse {
    id: String,
}

pub struct HttpLedgerClient {
    http: reqwest::Client,
    base_url: String,
    cash_account_name: String,
    revenue_account_name: String,
}

impl HttpLedgerClient {
    #[must_use]
    pub fn new(base_url: impl Into<String>, cash_account_name: impl Into<String>, revenue_account_name: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(LEDGER_POST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.into(),
            cash_account_name: cash_account_name.into(),
            revenue_account_name: revenue_account_name.into(),
        }
    }
}

impl HttpLedgerClient {
    async fn post(&self, payload: PostTransactionPayload, bearer_token: &str) -> Result<String, PosError> {
        let response = self
            .http
            .post(format!("{}/api/v1/transactions", self.base_url))
            .bearer_auth(bearer_token)
            .json(&payload)
            .send()
            .await
            .map_err(|e| PosError::Internal(format!("ledger post failed: {e}")))?;

        if response.status() == reqwest::StatusCode::CONFLICT {
            return Err(PosError::StateConflict(format!(
                "ledger already has a transaction for reference '{}'",
                payload.reference
            )));
        }
        if !response.status().is_success() {
            return Err(PosError::Internal(format!(
                "ledger transaction rejected with status {}",
                response.status()
            )));
        }

        let body: PostTransactionResponse = response
            .json()
            .await
            .map_err(|e| PosError::Internal(format!("ledger response malformed: {e}")))?;
        Ok(body.id)
    }
}

#[async_trait]
impl LedgerPostClient for HttpLedgerClient {
    async fn post_sale_transaction(&self, sale: &Sale, bearer_token: &str) -> Result<String, PosError> {
        let payload = PostTransactionPayload {
            date: sale.created_at,
            description: format!("POS Sale {}", sale.sale_number),
            source: "pos",
            reference: sale.sale_number.clone(),
            created_by: Some(sale.cashier_name.clone()),
            lines: vec![
                TransactionLinePayload {
                    account_name: self.cash_account_name.clone(),
                    line_type: "debit",
                    amount: sale.total,
                },
                TransactionLinePayload {
                    account_name: self.revenue_account_name.clone(),
                    line_type: "credit",
                    amount: sale.total,
                },
            ],
        };
        self.post(payload, bearer_token).await
    }

    async fn post_compensating_transaction(
        &self,
        reference: &str,
        description: &str,
        amount: Money,
        bearer_token: &str,
    ) -> Result<String, PosError> {
        let payload = PostTransactionPayload {
            date: Utc::now(),
            description: description.to_string(),
            source: "pos",
            reference: reference.to_string(),
            created_by: None,
            lines: vec![
                TransactionLinePayload {
                    account_name: self.revenue_account_name.clone(),
                    line_type: "debit",
                    amount,
                },
                TransactionLinePayload {
                    account_name: self.cash_account_name.clone(),
                    line_type: "credit",
                    amount,
                },
            ],
        };
        self.post(payload, bearer_token).await
    }
}
