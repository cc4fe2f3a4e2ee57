#![deny(clippy::print_stdout, clippy::print_stderr)]

use async_trait::async_trait;
use chrono::DateTime;
use chrono::Utc;
use erp_money::Money;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

mod memory;

pub use memory::InMemoryLedgerService;

pub type AccountId = String;
pub type TransactionId = String;
pub type TransactionLineId = String;
pub type PeriodId = String;

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("resource not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("state conflict: {0}")]
    StateConflict(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Asset,
    Liability,
    Equity,
    Income,
    Expense,
}

impl AccountType {
    /// Assets and expenses carry a natural debit balance; the others carry a
    /// natural credit balance.
    #[must_use]
    pub fn is_debit_normal(self) -> bool {
        matches!(self, AccountType::Asset | AccountType::Expense)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub description: Option<String>,
    pub is_active: bool,
}

impl Account {
    /// Signed balance: debits minus credits for debit-normal types, the
    /// reverse otherwise, so a healthy account always reports a
    /// non-negative natural balance.
    #[must_use]
    pub fn natural_balance(&self, debits: Money, credits: Money) -> Money {
        if self.account_type.is_debit_normal() {
            debits - credits
        } else {
            credits - debits
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreateAccountRequest {
    pub code: String,
    pub name: String,
    pub account_type: AccountType,
    pub description: Option<String>,
    pub is_active: bool,
}

impl CreateAccountRequest {
    pub fn normalize(mut self) -> LedgerResult<Self> {
        self.code = self.code.trim().to_string();
        self.name = self.name.trim().to_string();
        if self.code.is_empty() {
            return Err(LedgerError::Validation("account code cannot be empty".into()));
        }
        if self.name.is_empty() {
            return Err(LedgerError::Validation("account name cannot be empty".into()));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionLineType {
    Debit,
    Credit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionSource {
    Pos,
    Api,
    Import,
    Manual,
    Web,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionLine {
    pub id: TransactionLineId,
    pub account_id: AccountId,
    pub line_type: TransactionLineType,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransactionLine {
    pub account_name: String,
    pub line_type: TransactionLineType,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub date: DateTime<Utc>,
    pub description: String,
    pub source: TransactionSource,
    pub reference: Option<String>,
    pub created_at: DateTime<Utc>,
    pub created_by: Option<String>,
    pub lines: Vec<TransactionLine>,
}

impl Transaction {
    #[must_use]
    pub fn total_debits(&self) -> Money {
        self.lines
            .iter()
            .filter(|line| line.line_type == TransactionLineType::Debit)
            .map(|line| line.amount)
            .sum()
    }

    #[must_use]
    pub fn total_credits(&self) -> Money {
        self.lines
            .iter()
            .filter(|line| line.line_type == TransactionLineType::Credit)
            .map(|line| line.amount)
            .sum()
    }

    #[must_use]
    pub fn is_balanced(&self) -> bool {
        self.total_debits().approx_eq(self.total_credits())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PostTransactionRequest {
    pub date: DateTime<Utc>,
    pub description: String,
    pub source: TransactionSource,
    pub reference: Option<String>,
    pub created_by: Option<String>,
    pub lines: Vec<NewTransactionLine>,
}

impl PostTransactionRequest {
    pub fn validate_shape(&self) -> LedgerResult<()> {
        if self.description.trim().is_empty() {
            return Err(LedgerError::Validation(
                "transaction description cannot be empty".into(),
            ));
        }
        if self.lines.len() < 2 {
            return Err(LedgerError::Validation(
                "transaction must contain at least two lines".into(),
            ));
        }
        for (index, line) in self.lines.iter().enumerate() {
            if !line.amount.is_positive() {
                return Err(LedgerError::Validation(format!(
                    "line {index}: amount must be greater than zero"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionFilter {
    #[serde(default)]
    pub source: Option<TransactionSource>,
    #[serde(default)]
    pub date_from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub date_to: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodStatus {
    Open,
    Closed,
    Locked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Period {
    pub id: PeriodId,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub fiscal_year: i32,
    pub status: PeriodStatus,
    pub closed_by: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
    pub name: Option<String>,
}

impl Period {
    #[must_use]
    pub fn covers(&self, date: DateTime<Utc>) -> bool {
        self.period_start <= date && date < self.period_end
    }

    #[must_use]
    pub fn overlaps(&self, other_start: DateTime<Utc>, other_end: DateTime<Utc>) -> bool {
        self.period_start < other_end && other_start < self.period_end
    }

    /// `CLOSED` can reopen to `OPEN`; `LOCKED` is terminal and never reopens.
    pub fn reopen(&mut self) -> LedgerResult<()> {
        match self.status {
            PeriodStatus::Closed => {
                self.status = PeriodStatus::Open;
                self.closed_by = None;
                self.closed_at = None;
                Ok(())
            }
            PeriodStatus::Open => Err(LedgerError::StateConflict(
                "period is already open".into(),
            )),
            PeriodStatus::Locked => Err(LedgerError::StateConflict(
                "locked periods cannot be reopened".into(),
            )),
        }
    }

    pub fn close(&mut self, actor: String) -> LedgerResult<()> {
        match self.status {
            PeriodStatus::Open => {
                self.status = PeriodStatus::Closed;
                self.closed_by = Some(actor);
                self.closed_at = Some(Utc::now());
                Ok(())
            }
            PeriodStatus::Closed => Err(LedgerError::StateConflict(
                "period is already closed".into(),
            )),
            PeriodStatus::Locked => Err(LedgerError::StateConflict(
                "locked periods cannot be closed again".into(),
            )),
        }
    }

    pub fn lock(&mut self, actor: String) -> LedgerResult<()> {
        match self.status {
            PeriodStatus::Open | PeriodStatus::Closed => {
                self.status = PeriodStatus::Locked;
                if self.closed_by.is_none() {
                    self.closed_by = Some(actor);
                    self.closed_at = Some(Utc::now());
                }
                Ok(())
            }
            PeriodStatus::Locked => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatePeriodRequest {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub fiscal_year: i32,
    pub name: Option<String>,
}

impl CreatePeriodRequest {
    pub fn validate_shape(&self) -> LedgerResult<()> {
        if self.period_end <= self.period_start {
            return Err(LedgerError::Validation(
                "period_end must be after period_start".into(),
            ));
        }
        Ok(())
    }
}

/// A point-in-time read of the whole journal, sufficient to derive every
/// report without any denormalized state.
#[derive(Debug, Clone, Default)]
pub struct LedgerSnapshot {
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
}

#[async_trait]
pub trait LedgerService: Send + Sync {
    async fn create_account(&self, request: CreateAccountRequest) -> LedgerResult<Account>;
    async fn list_accounts(&self) -> LedgerResult<Vec<Account>>;
    async fn get_account(&self, id: &AccountId) -> LedgerResult<Account>;

    async fn post_transaction(&self, request: PostTransactionRequest) -> LedgerResult<Transaction>;
    async fn get_transaction(&self, id: &TransactionId) -> LedgerResult<Transaction>;
    async fn list_transactions(&self, filter: TransactionFilter) -> LedgerResult<Vec<Transaction>>;

    async fn create_period(&self, request: CreatePeriodRequest) -> LedgerResult<Period>;
    async fn list_periods(&self) -> LedgerResult<Vec<Period>>;
    async fn close_period(&self, id: &PeriodId, actor: String) -> LedgerResult<Period>;
    async fn lock_period(&self, id: &PeriodId, actor: String) -> LedgerResult<Period>;
    async fn reopen_period(&self, id: &PeriodId, actor: String) -> LedgerResult<Period>;

    async fn snapshot(&self) -> LedgerResult<LedgerSnapshot>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(line_type: TransactionLineType, minor: i64) -> TransactionLine {
        TransactionLine {
            id: "ln-1".into(),
            account_id: "acc-1".into(),
            line_type,
            amount: Money::from_minor(minor),
        }
    }

    fn transaction(lines: Vec<TransactionLine>) -> Transaction {
        Transaction {
            id: "txn-1".into(),
            date: Utc::now(),
            description: "test".into(),
            source: TransactionSource::Manual,
            reference: None,
            created_at: Utc::now(),
            created_by: None,
            lines,
        }
    }

    #[test]
    fn balanced_transaction_passes() {
        let txn = transaction(vec![
            line(TransactionLineType::Debit, 10_000),
            line(TransactionLineType::Credit, 10_000),
        ]);
        assert!(txn.is_balanced());
    }

    #[test]
    fn unbalanced_transaction_fails() {
        let txn = transaction(vec![
            line(TransactionLineType::Debit, 10_000),
            line(TransactionLineType::Credit, 9_999),
        ]);
        assert!(!txn.is_balanced());
    }

    #[test]
    fn period_state_machine_rejects_bad_transitions() {
        let mut period = Period {
            id: "per-1".into(),
            period_start: Utc::now(),
            period_end: Utc::now(),
            fiscal_year: 2025,
            status: PeriodStatus::Open,
            closed_by: None,
            closed_at: None,
            name: None,
        };

        period.close("alice".into()).expect("open closes");
        assert_eq!(period.status, PeriodStatus::Closed);
        assert!(period.closed_by.is_some());

        period.reopen().expect("closed reopens");
        assert_eq!(period.status, PeriodStatus::Open);
        assert!(period.closed_by.is_none());

        period.lock("bob".into()).expect("open locks");
        assert_eq!(period.status, PeriodStatus::Locked);
        assert!(period.reopen().is_err());
    }

    #[test]
    fn account_natural_balance_flips_sign_by_type() {
        let asset = Account {
            id: "acc-1".into(),
            code: "1000".into(),
            name: "Cash".into(),
            account_type: AccountType::Asset,
            description: None,
            is_active: true,
        };
        let income = Account {
            account_type: AccountType::Income,
            ..asset.clone()
        };

        let debits = Money::from_minor(10_000);
        let credits = Money::from_minor(4_000);

        assert_eq!(asset.natural_balance(debits, credits), Money::from_minor(6_000));
        assert_eq!(income.natural_balance(debits, credits), Money::from_minor(-6_000));
    }
}
