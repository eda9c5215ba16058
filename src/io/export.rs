use std::io::Write;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::application::{BalanceEntry, LedgerService, TransactionFilter};
use crate::domain::{Business, Transaction, format_pence};

/// Everything in the ledger, for a JSON dump.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub accounts: Vec<BalanceEntry>,
    pub businesses: Vec<Business>,
    pub transactions: Vec<Transaction>,
}

/// Writes ledger data as CSV or JSON.
pub struct Exporter<'a> {
    service: &'a LedgerService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a LedgerService) -> Self {
        Self { service }
    }

    /// One row per transaction, account references shown by name.
    pub async fn export_transactions_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let transactions = self
            .service
            .list_transactions(TransactionFilter::default())
            .await?;
        let names = self.service.account_names().await?;
        let name_of = |id: Option<uuid::Uuid>| {
            id.map(|id| names.get(&id).cloned().unwrap_or_else(|| id.to_string()))
                .unwrap_or_default()
        };

        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record([
            "id",
            "sequence",
            "timestamp",
            "transaction_type",
            "amount",
            "from_account",
            "to_account",
            "round_up",
            "description",
        ])?;

        for tx in &transactions {
            csv_writer.write_record([
                tx.id().to_string(),
                tx.sequence().to_string(),
                tx.timestamp().to_rfc3339(),
                tx.transaction_type().to_string(),
                format_pence(tx.amount()),
                name_of(tx.from_account()),
                name_of(tx.to_account()),
                format_pence(tx.round_up()),
                tx.description().unwrap_or_default().to_string(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(transactions.len())
    }

    pub async fn export_transactions_json<W: Write>(&self, writer: W) -> Result<usize> {
        let transactions = self
            .service
            .list_transactions(TransactionFilter::default())
            .await?;
        serde_json::to_writer_pretty(writer, &transactions)?;
        Ok(transactions.len())
    }

    /// One row per account with its balance and pot.
    pub async fn export_accounts_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let balances = self.service.all_balances().await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "name",
            "account_type",
            "starting_balance",
            "current_balance",
            "round_up_enabled",
            "round_up_pot",
            "postcode",
        ])?;

        for entry in &balances {
            let account = &entry.account;
            csv_writer.write_record([
                account.id.to_string(),
                account.name.clone(),
                account.account_type.to_string(),
                format_pence(account.starting_balance),
                format_pence(entry.current_balance),
                account.round_up_enabled.to_string(),
                format_pence(entry.round_up_pot),
                account.postcode.clone().unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(balances.len())
    }

    pub async fn export_accounts_json<W: Write>(&self, writer: W) -> Result<usize> {
        let balances = self.service.all_balances().await?;
        serde_json::to_writer_pretty(writer, &balances)?;
        Ok(balances.len())
    }

    /// Accounts, businesses and transactions in one JSON document.
    pub async fn export_full_json<W: Write>(&self, writer: W) -> Result<LedgerSnapshotSummary> {
        let snapshot = LedgerSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            accounts: self.service.all_balances().await?,
            businesses: self.service.list_businesses().await?,
            transactions: self
                .service
                .list_transactions(TransactionFilter::default())
                .await?,
        };
        serde_json::to_writer_pretty(writer, &snapshot)?;

        Ok(LedgerSnapshotSummary {
            accounts: snapshot.accounts.len(),
            businesses: snapshot.businesses.len(),
            transactions: snapshot.transactions.len(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerSnapshotSummary {
    pub accounts: usize,
    pub businesses: usize,
    pub transactions: usize,
}
