//! Contract-style tests for the async `LedgerService` surface: account
//! creation, double-entry posting, and the period lifecycle.

use chrono::Duration;
use chrono::Utc;
use erp_ledger_domain::*;
use erp_money::Money;

fn asset_account() -> CreateAccountRequest {
    CreateAccountRequest {
        code: "1000".into(),
        name: "Cash".into(),
        account_type: AccountType::Asset,
        description: None,
        is_active: true,
    }
}

fn income_account() -> CreateAccountRequest {
    CreateAccountRequest {
        code: "4000".into(),
        name: "Sales Revenue".into(),
        account_type: AccountType::Income,
        description: None,
        is_active: true,
    }
}

async fn seed(service: &InMemoryLedgerService) {
    service.create_account(asset_account()).await.expect("cash");
    service.create_account(income_account()).await.expect("revenue");
}

#[tokio::test]
async fn create_account_then_list_shows_it_exactly_once() {
    let service = InMemoryLedgerService::new();
    let created = service.create_account(asset_account()).await.expect("create");

    let accounts = service.list_accounts().await.expect("list");
    let matches = accounts.iter().filter(|a| a.id == created.id).count();
    assert_eq!(matches, 1);
}

#[tokio::test]
async fn duplicate_account_code_is_rejected() {
    let service = InMemoryLedgerService::new();
    service.create_account(asset_account()).await.expect("first");

    let mut second = asset_account();
    second.name = "Petty Cash".into();
    let err = service.create_account(second).await.unwrap_err();
    assert!(matches!(err, LedgerError::StateConflict(_)));
}

#[tokio::test]
async fn two_balanced_lines_are_accepted() {
    let service = InMemoryLedgerService::new();
    seed(&service).await;

    let request = PostTransactionRequest {
        date: Utc::now(),
        description: "cash sale".into(),
        source: TransactionSource::Pos,
        reference: Some("SALE-1".into()),
        created_by: Some("cashier-1".into()),
        lines: vec![
            NewTransactionLine {
                account_name: "Cash".into(),
                line_type: TransactionLineType::Debit,
                amount: Money::round2(114.0).unwrap(),
            },
            NewTransactionLine {
                account_name: "Sales Revenue".into(),
                line_type: TransactionLineType::Credit,
                amount: Money::round2(114.0).unwrap(),
            },
        ],
    };

    let posted = service.post_transaction(request).await.expect("post");
    assert_eq!(posted.lines.len(), 2);
    assert!(posted.is_balanced());
}

#[tokio::test]
async fn rounded_mismatch_is_rejected() {
    let service = InMemoryLedgerService::new();
    seed(&service).await;

    let request = PostTransactionRequest {
        date: Utc::now(),
        description: "rounding edge case".into(),
        source: TransactionSource::Manual,
        reference: None,
        created_by: None,
        lines: vec![
            NewTransactionLine {
                account_name: "Cash".into(),
                line_type: TransactionLineType::Debit,
                amount: Money::round2(100.005).unwrap(),
            },
            NewTransactionLine {
                account_name: "Sales Revenue".into(),
                line_type: TransactionLineType::Credit,
                amount: Money::round2(100.004).unwrap(),
            },
        ],
    };

    let err = service.post_transaction(request).await.unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[tokio::test]
async fn posting_to_inactive_account_is_rejected() {
    let service = InMemoryLedgerService::new();
    seed(&service).await;

    let inactive = CreateAccountRequest {
        code: "1900".into(),
        name: "Old Cash".into(),
        account_type: AccountType::Asset,
        description: None,
        is_active: false,
    };
    service.create_account(inactive).await.expect("create inactive");

    let request = PostTransactionRequest {
        date: Utc::now(),
        description: "touches inactive account".into(),
        source: TransactionSource::Manual,
        reference: None,
        created_by: None,
        lines: vec![
            NewTransactionLine {
                account_name: "Old Cash".into(),
                line_type: TransactionLineType::Debit,
                amount: Money::round2(10.0).unwrap(),
            },
            NewTransactionLine {
                account_name: "Sales Revenue".into(),
                line_type: TransactionLineType::Credit,
                amount: Money::round2(10.0).unwrap(),
            },
        ],
    };

    let err = service.post_transaction(request).await.unwrap_err();
    assert!(matches!(err, LedgerError::Validation(_)));
}

#[tokio::test]
async fn posting_into_locked_period_is_rejected() {
    let service = InMemoryLedgerService::new();
    seed(&service).await;

    let period = service
        .create_period(CreatePeriodRequest {
            period_start: Utc::now() - Duration::days(15),
            period_end: Utc::now() + Duration::days(15),
            fiscal_year: 2025,
            name: Some("current".into()),
        })
        .await
        .expect("create period");

    service
        .lock_period(&period.id, "controller".into())
        .await
        .expect("lock");

    let request = PostTransactionRequest {
        date: Utc::now(),
        description: "blocked by lock".into(),
        source: TransactionSource::Manual,
        reference: None,
        created_by: None,
        lines: vec![
            NewTransactionLine {
                account_name: "Cash".into(),
                line_type: TransactionLineType::Debit,
                amount: Money::round2(10.0).unwrap(),
            },
            NewTransactionLine {
                account_name: "Sales Revenue".into(),
                line_type: TransactionLineType::Credit,
                amount: Money::round2(10.0).unwrap(),
            },
        ],
    };

    let err = service.post_transaction(request).await.unwrap_err();
    assert!(matches!(err, LedgerError::StateConflict(_)));
}

#[tokio::test]
async fn overlapping_periods_are_rejected() {
    let service = InMemoryLedgerService::new();

    service
        .create_period(CreatePeriodRequest {
            period_start: Utc::now(),
            period_end: Utc::now() + Duration::days(30),
            fiscal_year: 2025,
            name: Some("jan".into()),
        })
        .await
        .expect("first period");

    let err = service
        .create_period(CreatePeriodRequest {
            period_start: Utc::now() + Duration::days(15),
            period_end: Utc::now() + Duration::days(45),
            fiscal_year: 2025,
            name: Some("overlap".into()),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, LedgerError::StateConflict(_)));
}
