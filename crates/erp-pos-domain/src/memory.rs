use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::PosError;
use crate::PosResult;
use crate::PosStore;
use crate::Sale;
use crate::SaleRefundRecord;
use crate::SaleStatus;
use crate::SaleVoidRecord;

#[derive(Default)]
struct State {
    sales: HashMap<String, Sale>,
    voids: Vec<SaleVoidRecord>,
    refunds: Vec<SaleRefundRecord>,
}

#[derive(Default)]
pub struct InMemoryPosStore {
    state: Mutex<State>,
}

#[async_trait]
impl PosStore for InMemoryPosStore {
    async fn insert_pending(&self, sale: Sale) -> PosResult<Sale> {
        let mut state = self.state.lock().await;
        if state.sales.contains_key(&sale.sale_number) {
            return Err(PosError::StateConflict(format!(
                "sale '{}' already exists",
                sale.sale_number
            )));
        }
        state.sales.insert(sale.sale_number.clone(), sale.clone());
        Ok(sale)
    }

    async fn get_by_number(&self, sale_number: &str) -> PosResult<Sale> {
        let state = self.state.lock().await;
        state
            .sales
            .get(sale_number)
            .cloned()
            .ok_or_else(|| PosError::NotFound(format!("sale '{sale_number}'")))
    }

    async fn list(&self) -> PosResult<Vec<Sale>> {
        let state = self.state.lock().await;
        let mut sales: Vec<Sale> = state.sales.values().cloned().collect();
        sales.sort_by_key(|sale| sale.created_at);
        Ok(sales)
    }

    async fn mark_synced(&self, sale_number: &str, ledger_entry_id: String) -> PosResult<Sale> {
        let mut state = self.state.lock().await;
        let sale = state
            .sales
            .get_mut(sale_number)
            .ok_or_else(|| PosError::NotFound(format!("sale '{sale_number}'")))?;
        sale.status = SaleStatus::Synced;
        sale.ledger_entry_id = Some(ledger_entry_id);
        Ok(sale.clone())
    }

    async fn mark_failed(&self, sale_number: &str) -> PosResult<Sale> {
        let mut state = self.state.lock().await;
        let sale = state
            .sales
            .get_mut(sale_number)
            .ok_or_else(|| PosError::NotFound(format!("sale '{sale_number}'")))?;
        sale.status = SaleStatus::Failed;
        Ok(sale.clone())
    }

    async fn pending_and_failed(&self) -> PosResult<Vec<Sale>> {
        let state = self.state.lock().await;
        Ok(state
            .sales
            .values()
            .filter(|sale| matches!(sale.status, SaleStatus::Pending | SaleStatus::Failed))
            .cloned()
            .collect())
    }

    async fn insert_void(&self, record: SaleVoidRecord) -> PosResult<SaleVoidRecord> {
        let mut state = self.state.lock().await;
        state.voids.push(record.clone());
        Ok(record)
    }

    async fn insert_refund(&self, record: SaleRefundRecord) -> PosResult<SaleRefundRecord> {
        let mut state = self.state.lock().await;
        state.refunds.push(record.clone());
        Ok(record)
    }
}
