// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use creditunion::application::LedgerService;
use creditunion::domain::{Account, AccountType, NewAccount, NewTransaction, Pence, Transaction};
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(LedgerService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let service = LedgerService::init(db_path(&temp_dir).as_str()).await?;
    Ok((service, temp_dir))
}

/// Path of the database file inside a test directory
pub fn db_path(temp_dir: &TempDir) -> String {
    temp_dir.path().join("test.db").to_string_lossy().into_owned()
}

/// Helper to parse a date string into DateTime<Utc>
pub fn parse_date(date_str: &str) -> DateTime<Utc> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
}

/// Test fixture: a small community bank
pub struct StandardAccounts {
    /// Current account, £100.00, round-up on
    pub alice: Account,
    /// Current account, £50.00, round-up off
    pub bob: Account,
    /// Savings account, £200.00
    pub savings: Account,
    /// Business account of "Corner Shop", starts empty
    pub shop: Account,
}

impl StandardAccounts {
    pub async fn create(service: &LedgerService) -> Result<Self> {
        service.create_business("Corner Shop", "groceries").await?;

        let alice = service
            .create_account(NewAccount::new("Alice", AccountType::Current, 10_000).round_up(true))
            .await?;
        let bob = service
            .create_account(NewAccount::new("Bob", AccountType::Current, 5_000))
            .await?;
        let savings = service
            .create_account(NewAccount::new("Rainy Day", AccountType::Savings, 20_000))
            .await?;
        let shop = service
            .create_account(
                NewAccount::new("Corner Shop Till", AccountType::Business, 0).business("Corner Shop"),
            )
            .await?;

        Ok(Self {
            alice,
            bob,
            savings,
            shop,
        })
    }
}

/// Post a payment from one account to another
pub async fn pay(
    service: &LedgerService,
    from: &Account,
    to: &Account,
    amount: Pence,
) -> Result<Transaction> {
    Ok(service
        .post_transaction(NewTransaction::payment(from.id, amount).destination(to.id))
        .await?)
}

/// Current spendable balance of an account
pub async fn balance_of(service: &LedgerService, account: &Account) -> Result<Pence> {
    Ok(service
        .current_balance(&account.id.to_string())
        .await?
        .current_balance)
}

/// Current round-up pot of an account
pub async fn pot_of(service: &LedgerService, account: &Account) -> Result<Pence> {
    Ok(service
        .current_balance(&account.id.to_string())
        .await?
        .round_up_pot)
}
