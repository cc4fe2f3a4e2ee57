#![deny(clippy::print_stdout, clippy::print_stderr)]

use std::collections::HashMap;

use chrono::DateTime;
use chrono::Utc;
use erp_ledger_domain::Account;
use erp_ledger_domain::AccountId;
use erp_ledger_domain::AccountType;
use erp_ledger_domain::LedgerSnapshot;
use erp_ledger_domain::Transaction;
use erp_ledger_domain::TransactionLineType;
use erp_money::Money;
use serde::Serialize;
use thiserror::Error;

pub type ReportResult<T> = Result<T, ReportError>;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("invalid date range: {0}")]
    InvalidRange(String),
}

fn accounts_by_id(snapshot: &LedgerSnapshot) -> HashMap<&AccountId, &Account> {
    snapshot.accounts.iter().map(|account| (&account.id, account)).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialBalanceRow {
    pub account_id: AccountId,
    pub account_code: String,
    pub account_name: String,
    pub debit_total: Money,
    pub credit_total: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrialBalance {
    pub as_of: DateTime<Utc>,
    pub rows: Vec<TrialBalanceRow>,
    pub total_debits: Money,
    pub total_credits: Money,
    pub balanced: bool,
}

/// Per account, debit/credit totals of lines whose transaction date is on
/// or before `as_of`. Computed purely from the journal; nothing is cached.
#[must_use]
pub fn trial_balance(snapshot: &LedgerSnapshot, as_of: DateTime<Utc>) -> TrialBalance {
    let accounts = accounts_by_id(snapshot);
    let mut totals: HashMap<&AccountId, (Money, Money)> = HashMap::new();

    for transaction in snapshot.transactions.iter().filter(|t| t.date <= as_of) {
        for line in &transaction.lines {
            let entry = totals.entry(&line.account_id).or_insert((Money::ZERO, Money::ZERO));
            match line.line_type {
                TransactionLineType::Debit => entry.0 = entry.0 + line.amount,
                TransactionLineType::Credit => entry.1 = entry.1 + line.amount,
            }
        }
    }

    let mut rows: Vec<TrialBalanceRow> = totals
        .into_iter()
        .filter_map(|(account_id, (debit_total, credit_total))| {
            accounts.get(account_id).map(|account| TrialBalanceRow {
                account_id: account_id.clone(),
                account_code: account.code.clone(),
                account_name: account.name.clone(),
                debit_total,
                credit_total,
            })
        })
        .collect();
    rows.sort_by(|a, b| a.account_code.cmp(&b.account_code));

    let total_debits: Money = rows.iter().map(|row| row.debit_total).sum();
    let total_credits: Money = rows.iter().map(|row| row.credit_total).sum();

    TrialBalance {
        as_of,
        balanced: total_debits.approx_eq(total_credits),
        rows,
        total_debits,
        total_credits,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BalanceSheet {
    pub as_of: DateTime<Utc>,
    pub total_assets: Money,
    pub total_liabilities: Money,
    pub total_equity: Money,
    pub retained_earnings: Money,
    pub balanced: bool,
}

/// Groups accounts by type into Assets, Liabilities, Equity; Retained
/// Earnings is income minus expense up to `as_of`, folded into equity.
#[must_use]
pub fn balance_sheet(snapshot: &LedgerSnapshot, as_of: DateTime<Utc>) -> BalanceSheet {
    let trial = trial_balance(snapshot, as_of);
    let accounts = accounts_by_id(snapshot);

    let mut total_assets = Money::ZERO;
    let mut total_liabilities = Money::ZERO;
    let mut total_equity = Money::ZERO;
    let mut retained_earnings = Money::ZERO;

    for row in &trial.rows {
        let Some(account) = accounts.get(&row.account_id) else {
            continue;
        };
        let balance = account.natural_balance(row.debit_total, row.credit_total);
        match account.account_type {
            AccountType::Asset => total_assets = total_assets + balance,
            AccountType::Liability => total_liabilities = total_liabilities + balance,
            AccountType::Equity => total_equity = total_equity + balance,
            AccountType::Income => retained_earnings = retained_earnings + balance,
            AccountType::Expense => retained_earnings = retained_earnings - balance,
        }
    }

    total_equity = total_equity + retained_earnings;

    BalanceSheet {
        as_of,
        balanced: total_assets.approx_eq(total_liabilities + total_equity),
        total_assets,
        total_liabilities,
        total_equity,
        retained_earnings,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IncomeStatement {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub total_income: Money,
    pub total_expense: Money,
    pub net_income: Money,
}

#[must_use]
pub fn income_statement(
    snapshot: &LedgerSnapshot,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> IncomeStatement {
    let accounts = accounts_by_id(snapshot);
    let mut total_income = Money::ZERO;
    let mut total_expense = Money::ZERO;

    for transaction in snapshot
        .transactions
        .iter()
        .filter(|t| t.date >= from && t.date <= to)
    {
        for line in &transaction.lines {
            let Some(account) = accounts.get(&line.account_id) else {
                continue;
            };
            let signed = match line.line_type {
                TransactionLineType::Debit => line.amount,
                TransactionLineType::Credit => -line.amount,
            };
            match account.account_type {
                AccountType::Income => total_income = total_income - signed,
                AccountType::Expense => total_expense = total_expense + signed,
                _ => {}
            }
        }
    }

    IncomeStatement {
        from,
        to,
        total_income,
        total_expense,
        net_income: total_income - total_expense,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneralLedgerRow {
    pub transaction_id: String,
    pub date: DateTime<Utc>,
    pub description: String,
    pub debit: Money,
    pub credit: Money,
    pub running_balance: Money,
}

/// Per-account ordered transactions with a running balance, applying the
/// account's natural debit/credit sign at each step.
#[must_use]
pub fn general_ledger(
    snapshot: &LedgerSnapshot,
    account_id: &AccountId,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Vec<GeneralLedgerRow> {
    let Some(account) = snapshot.accounts.iter().find(|a| &a.id == account_id) else {
        return Vec::new();
    };

    let mut transactions: Vec<&Transaction> = snapshot
        .transactions
        .iter()
        .filter(|t| from.is_none_or(|from| t.date >= from))
        .filter(|t| to.is_none_or(|to| t.date <= to))
        .filter(|t| t.lines.iter().any(|line| &line.account_id == account_id))
        .collect();
    transactions.sort_by_key(|t| t.date);

    let mut running = Money::ZERO;
    let mut rows = Vec::new();
    for transaction in transactions {
        for line in transaction.lines.iter().filter(|l| &l.account_id == account_id) {
            let (debit, credit) = match line.line_type {
                TransactionLineType::Debit => (line.amount, Money::ZERO),
                TransactionLineType::Credit => (Money::ZERO, line.amount),
            };
            running = running + account.natural_balance(debit, credit);
            rows.push(GeneralLedgerRow {
                transaction_id: transaction.id.clone(),
                date: transaction.date,
                description: transaction.description.clone(),
                debit,
                credit,
                running_balance: running,
            });
        }
    }
    rows
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CashDirection {
    Inflow,
    Outflow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CashMovement {
    pub transaction_id: String,
    pub date: DateTime<Utc>,
    pub direction: CashDirection,
    pub amount: Money,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CashFlowStatement {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub movements: Vec<CashMovement>,
    pub total_inflow: Money,
    pub total_outflow: Money,
    pub net: Money,
}

/// Walks lines touching any account whose name contains "Cash" (the
/// documented convention); each debit is an inflow, each credit an outflow.
#[must_use]
pub fn cash_flow(snapshot: &LedgerSnapshot, from: DateTime<Utc>, to: DateTime<Utc>) -> CashFlowStatement {
    let cash_account_ids: Vec<&AccountId> = snapshot
        .accounts
        .iter()
        .filter(|account| account.name.to_ascii_lowercase().contains("cash"))
        .map(|account| &account.id)
        .collect();

    let mut movements = Vec::new();
    let mut transactions: Vec<&Transaction> = snapshot
        .transactions
        .iter()
        .filter(|t| t.date >= from && t.date <= to)
        .collect();
    transactions.sort_by_key(|t| t.date);

    for transaction in transactions {
        for line in &transaction.lines {
            if !cash_account_ids.contains(&&line.account_id) {
                continue;
            }
            let direction = match line.line_type {
                TransactionLineType::Debit => CashDirection::Inflow,
                TransactionLineType::Credit => CashDirection::Outflow,
            };
            movements.push(CashMovement {
                transaction_id: transaction.id.clone(),
                date: transaction.date,
                direction,
                amount: line.amount,
            });
        }
    }

    let total_inflow: Money = movements
        .iter()
        .filter(|m| m.direction == CashDirection::Inflow)
        .map(|m| m.amount)
        .sum();
    let total_outflow: Money = movements
        .iter()
        .filter(|m| m.direction == CashDirection::Outflow)
        .map(|m| m.amount)
        .sum();

    CashFlowStatement {
        from,
        to,
        movements,
        total_inflow,
        total_outflow,
        net: total_inflow - total_outflow,
    }
}
