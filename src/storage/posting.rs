use anyhow::{Context, Result};
use sqlx::{Row, Sqlite};

use crate::domain::{AccountId, AccountSnapshot, Business, BusinessId, Pence, Transaction};

use super::{Repository, encode_timestamp, fetch_account_snapshot, fetch_business};

/// One post's unit of work: a database transaction holding the write lock from
/// the moment it opens. Dropping the unit without [`PostingUnit::commit`]
/// rolls everything back, including the reserved sequence number.
pub struct PostingUnit {
    tx: sqlx::Transaction<'static, Sqlite>,
    sequence: i64,
}

impl Repository {
    /// Open a posting unit and reserve the next ledger sequence number.
    ///
    /// Reserving the number is the unit's first statement and a write, so the
    /// unit holds the database write lock before it reads any balance. Units
    /// opened concurrently wait on each other instead of interleaving.
    pub async fn begin_posting(&self) -> Result<PostingUnit> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .context("Failed to begin posting unit")?;

        let row = sqlx::query(
            r#"
            UPDATE sequence_counter
            SET value = value + 1
            WHERE name = 'transaction_sequence'
            RETURNING value
            "#,
        )
        .fetch_one(&mut *tx)
        .await
        .context("Failed to reserve sequence number")?;

        Ok(PostingUnit {
            tx,
            sequence: row.get("value"),
        })
    }
}

impl PostingUnit {
    /// Sequence number the posted transaction will carry.
    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    /// Account and balance as seen inside this unit.
    pub async fn account_snapshot(&mut self, id: AccountId) -> Result<Option<AccountSnapshot>> {
        fetch_account_snapshot(&mut *self.tx, id).await
    }

    pub async fn business(&mut self, id: BusinessId) -> Result<Option<Business>> {
        fetch_business(&mut *self.tx, id).await
    }

    pub async fn insert_transaction(&mut self, transaction: &Transaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO transactions (id, sequence, transaction_type, amount, from_account_id, to_account_id, round_up, timestamp, recorded_at, description)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(transaction.id().to_string())
        .bind(transaction.sequence())
        .bind(transaction.transaction_type().as_str())
        .bind(transaction.amount())
        .bind(transaction.from_account().map(|id| id.to_string()))
        .bind(transaction.to_account().map(|id| id.to_string()))
        .bind(transaction.round_up())
        .bind(encode_timestamp(transaction.timestamp()))
        .bind(encode_timestamp(transaction.recorded_at()))
        .bind(transaction.description())
        .execute(&mut *self.tx)
        .await
        .context("Failed to insert transaction")?;
        Ok(())
    }

    /// Add to an account's round-up pot in place.
    pub async fn add_to_round_up_pot(&mut self, id: AccountId, amount: Pence) -> Result<()> {
        let result = sqlx::query("UPDATE accounts SET round_up_pot = round_up_pot + ? WHERE id = ?")
            .bind(amount)
            .bind(id.to_string())
            .execute(&mut *self.tx)
            .await
            .context("Failed to update round-up pot")?;

        if result.rows_affected() != 1 {
            anyhow::bail!("round-up pot update touched {} accounts", result.rows_affected());
        }
        Ok(())
    }

    pub async fn commit(self) -> Result<()> {
        self.tx.commit().await.context("Failed to commit posting")
    }
}
