use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::Account;
use crate::AccountId;
use crate::CreateAccountRequest;
use crate::CreatePeriodRequest;
use crate::LedgerError;
use crate::LedgerResult;
use crate::LedgerService;
use crate::LedgerSnapshot;
use crate::Period;
use crate::PeriodId;
use crate::PeriodStatus;
use crate::PostTransactionRequest;
use crate::Transaction;
use crate::TransactionFilter;
use crate::TransactionId;
use crate::TransactionLine;

/// In-memory `LedgerService` backing both the HTTP layer and the contract
/// tests. A single `tokio::sync::Mutex` guards all state; every operation
/// is short enough that this is not a contention concern.
#[derive(Default)]
pub struct InMemoryLedgerService {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    account_seq: u64,
    transaction_seq: u64,
    line_seq: u64,
    period_seq: u64,
    accounts: HashMap<AccountId, Account>,
    transactions: HashMap<TransactionId, Transaction>,
    periods: HashMap<PeriodId, Period>,
}

impl State {
    fn account_by_name(&self, name: &str) -> Option<&Account> {
        self.accounts.values().find(|account| account.name == name)
    }

    fn covering_period(&self, date: chrono::DateTime<Utc>) -> Option<&Period> {
        self.periods.values().find(|period| period.covers(date))
    }

    fn reference_already_posted(&self, source: crate::TransactionSource, reference: &str) -> bool {
        self.transactions
            .values()
            .any(|txn| txn.source == source && txn.reference.as_deref() == Some(reference))
    }
}

impl InMemoryLedgerService {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerService for InMemoryLedgerService {
    async fn create_account(&self, request: CreateAccountRequest) -> LedgerResult<Account> {
        let request = request.normalize()?;
        let mut state = self.state.lock().await;

        if state.accounts.values().any(|a| a.code == request.code) {
            return Err(LedgerError::StateConflict(format!(
                "account code {} already exists",
                request.code
            )));
        }
        if state.accounts.values().any(|a| a.name == request.name) {
            return Err(LedgerError::StateConflict(format!(
                "account name {} already exists",
                request.name
            )));
        }

        state.account_seq += 1;
        let account = Account {
            id: format!("acc-{}", state.account_seq),
            code: request.code,
            name: request.name,
            account_type: request.account_type,
            description: request.description,
            is_active: request.is_active,
        };
        state.accounts.insert(account.id.clone(), account.clone());
        Ok(account)
    }

    async fn list_accounts(&self) -> LedgerResult<Vec<Account>> {
        let state = self.state.lock().await;
        let mut accounts: Vec<Account> = state.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.code.cmp(&b.code));
        Ok(accounts)
    }

    async fn get_account(&self, id: &AccountId) -> LedgerResult<Account> {
        let state = self.state.lock().await;
        state
            .accounts
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("account {id}")))
    }

    async fn post_transaction(&self, request: PostTransactionRequest) -> LedgerResult<Transaction> {
        request.validate_shape()?;

        let mut state = self.state.lock().await;

        if let Some(reference) = &request.reference
            && state.reference_already_posted(request.source, reference)
        {
            return Err(LedgerError::StateConflict(format!(
                "duplicate transaction reference {reference}"
            )));
        }

        let mut resolved_lines = Vec::with_capacity(request.lines.len());
        for (index, new_line) in request.lines.iter().enumerate() {
            let account = state.account_by_name(&new_line.account_name).ok_or_else(|| {
                LedgerError::Validation(format!(
                    "line {index}: unknown account {}",
                    new_line.account_name
                ))
            })?;
            if !account.is_active {
                return Err(LedgerError::Validation(format!(
                    "line {index}: account {} is inactive",
                    new_line.account_name
                )));
            }

            state.line_seq += 1;
            resolved_lines.push(TransactionLine {
                id: format!("ln-{}", state.line_seq),
                account_id: account.id.clone(),
                line_type: new_line.line_type,
                amount: new_line.amount,
            });
        }

        if let Some(period) = state.covering_period(request.date)
            && period.status != PeriodStatus::Open
        {
            return Err(LedgerError::StateConflict(format!(
                "period is {:?}",
                period.status
            )));
        }

        state.transaction_seq += 1;
        let transaction = Transaction {
            id: format!("txn-{}", state.transaction_seq),
            date: request.date,
            description: request.description,
            source: request.source,
            reference: request.reference,
            created_at: Utc::now(),
            created_by: request.created_by,
            lines: resolved_lines,
        };

        if !transaction.is_balanced() {
            return Err(LedgerError::Validation(format!(
                "transaction not balanced: debits ({}) != credits ({})",
                transaction.total_debits(),
                transaction.total_credits()
            )));
        }

        state
            .transactions
            .insert(transaction.id.clone(), transaction.clone());
        Ok(transaction)
    }

    async fn get_transaction(&self, id: &TransactionId) -> LedgerResult<Transaction> {
        let state = self.state.lock().await;
        state
            .transactions
            .get(id)
            .cloned()
            .ok_or_else(|| LedgerError::NotFound(format!("transaction {id}")))
    }

    async fn list_transactions(&self, filter: TransactionFilter) -> LedgerResult<Vec<Transaction>> {
        let state = self.state.lock().await;
        let mut transactions: Vec<Transaction> = state
            .transactions
            .values()
            .filter(|txn| filter.source.is_none_or(|source| source == txn.source))
            .filter(|txn| filter.date_from.is_none_or(|from| txn.date >= from))
            .filter(|txn| filter.date_to.is_none_or(|to| txn.date <= to))
            .cloned()
            .collect();
        transactions.sort_by_key(|txn| txn.date);
        Ok(transactions)
    }

    async fn create_period(&self, request: CreatePeriodRequest) -> LedgerResult<Period> {
        request.validate_shape()?;
        let mut state = self.state.lock().await;

        if state
            .periods
            .values()
            .any(|period| period.overlaps(request.period_start, request.period_end))
        {
            return Err(LedgerError::StateConflict(
                "period overlaps an existing period".into(),
            ));
        }

        state.period_seq += 1;
        let period = Period {
            id: format!("per-{}", state.period_seq),
            period_start: request.period_start,
            period_end: request.period_end,
            fiscal_year: request.fiscal_year,
            status: PeriodStatus::Open,
            closed_by: None,
            closed_at: None,
            name: request.name,
        };
        state.periods.insert(period.id.clone(), period.clone());
        Ok(period)
    }

    async fn list_periods(&self) -> LedgerResult<Vec<Period>> {
        let state = self.state.lock().await;
        let mut periods: Vec<Period> = state.periods.values().cloned().collect();
        periods.sort_by_key(|period| period.period_start);
        Ok(periods)
    }

    async fn close_period(&self, id: &PeriodId, actor: String) -> LedgerResult<Period> {
        let mut state = self.state.lock().await;
        let period = state
            .periods
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotFound(format!("period {id}")))?;
        period.close(actor)?;
        Ok(period.clone())
    }

    async fn lock_period(&self, id: &PeriodId, actor: String) -> LedgerResult<Period> {
        let mut state = self.state.lock().await;
        let period = state
            .periods
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotFound(format!("period {id}")))?;
        period.lock(actor)?;
        Ok(period.clone())
    }

    async fn reopen_period(&self, id: &PeriodId, _actor: String) -> LedgerResult<Period> {
        let mut state = self.state.lock().await;
        let period = state
            .periods
            .get_mut(id)
            .ok_or_else(|| LedgerError::NotFound(format!("period {id}")))?;
        period.reopen()?;
        Ok(period.clone())
    }

    async fn snapshot(&self) -> LedgerResult<LedgerSnapshot> {
        let state = self.state.lock().await;
        Ok(LedgerSnapshot {
            accounts: state.accounts.values().cloned().collect(),
            transactions: state.transactions.values().cloned().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AccountType;
    use crate::NewTransactionLine;
    use crate::TransactionLineType;
    use crate::TransactionSource;
    use erp_money::Money;

    async fn seed_accounts(service: &InMemoryLedgerService) {
        service
            .create_account(CreateAccountRequest {
                code: "1000".into(),
                name: "Cash".into(),
                account_type: AccountType::Asset,
                description: None,
                is_active: true,
            })
            .await
            .expect("create cash account");

        service
            .create_account(CreateAccountRequest {
                code: "4000".into(),
                name: "Sales Revenue".into(),
                account_type: AccountType::Income,
                description: None,
                is_active: true,
            })
            .await
            .expect("create revenue account");
    }

    fn balanced_request() -> PostTransactionRequest {
        PostTransactionRequest {
            date: Utc::now(),
            description: "cash sale".into(),
            source: TransactionSource::Pos,
            reference: Some("SALE-1".into()),
            created_by: Some("cashier".into()),
            lines: vec![
                NewTransactionLine {
                    account_name: "Cash".into(),
                    line_type: TransactionLineType::Debit,
                    amount: Money::round2(114.0).expect("valid amount"),
                },
                NewTransactionLine {
                    account_name: "Sales Revenue".into(),
                    line_type: TransactionLineType::Credit,
                    amount: Money::round2(114.0).expect("valid amount"),
                },
            ],
        }
    }

    #[tokio::test]
    async fn posts_a_balanced_transaction() {
        let service = InMemoryLedgerService::new();
        seed_accounts(&service).await;

        let transaction = service
            .post_transaction(balanced_request())
            .await
            .expect("post transaction");

        assert_eq!(transaction.lines.len(), 2);
        assert!(transaction.is_balanced());
    }

    #[tokio::test]
    async fn rejects_unbalanced_transaction() {
        let service = InMemoryLedgerService::new();
        seed_accounts(&service).await;

        let mut request = balanced_request();
        request.lines[1].amount = Money::round2(100.0).expect("valid amount");

        let err = service.post_transaction(request).await.unwrap_err();
        assert!(matches!(err, LedgerError::Validation(_)));
    }

    #[tokio::test]
    async fn rejects_duplicate_reference() {
        let service = InMemoryLedgerService::new();
        seed_accounts(&service).await;

        service
            .post_transaction(balanced_request())
            .await
            .expect("first post succeeds");

        let err = service
            .post_transaction(balanced_request())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::StateConflict(_)));
    }

    #[tokio::test]
    async fn rejects_posting_into_closed_period() {
        let service = InMemoryLedgerService::new();
        seed_accounts(&service).await;

        let period = service
            .create_period(CreatePeriodRequest {
                period_start: Utc::now() - chrono::Duration::days(1),
                period_end: Utc::now() + chrono::Duration::days(1),
                fiscal_year: 2025,
                name: Some("2025-01".into()),
            })
            .await
            .expect("create period");

        service
            .close_period(&period.id, "controller".into())
            .await
            .expect("close period");

        let err = service
            .post_transaction(balanced_request())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::StateConflict(_)));
    }

    #[tokio::test]
    async fn close_then_reopen_restores_open_status() {
        let service = InMemoryLedgerService::new();

        let period = service
            .create_period(CreatePeriodRequest {
                period_start: Utc::now() - chrono::Duration::days(1),
                period_end: Utc::now() + chrono::Duration::days(1),
                fiscal_year: 2025,
                name: None,
            })
            .await
            .expect("create period");

        service
            .close_period(&period.id, "controller".into())
            .await
            .expect("close period");

        let reopened = service
            .reopen_period(&period.id, "controller".into())
            .await
            .expect("reopen period");

        assert_eq!(reopened.status, PeriodStatus::Open);
        assert!(reopened.closed_by.is_none());
        assert!(reopened.closed_at.is_none());
    }

    #[tokio::test]
    async fn locked_period_cannot_reopen() {
        let service = InMemoryLedgerService::new();

        let period = service
            .create_period(CreatePeriodRequest {
                period_start: Utc::now() - chrono::Duration::days(1),
                period_end: Utc::now() + chrono::Duration::days(1),
                fiscal_year: 2025,
                name: None,
            })
            .await
            .expect("create period");

        service
            .lock_period(&period.id, "controller".into())
            .await
            .expect("lock period");

        let err = service
            .reopen_period(&period.id, "controller".into())
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::StateConflict(_)));
    }
}
