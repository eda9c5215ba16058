use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{Executor, Row, Sqlite, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, AccountSnapshot, AccountType, Business, BusinessId, Pence, RoundUpReclaim,
    Transaction, TransactionId, TransactionType,
};

use super::{MIGRATION_001_INITIAL, MIGRATION_002_ROUND_UP_RECLAIMS};

const BUSY_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_CONNECTIONS: u32 = 8;

const ACCOUNT_COLUMNS: &str = "id, name, starting_balance, account_type, round_up_enabled, postcode, round_up_pot, allow_overdraft, business_id, created_at";

/// Account columns plus the derived balance.
const ACCOUNT_WITH_BALANCE: &str = r#"
    SELECT id, name, starting_balance, account_type, round_up_enabled, postcode, round_up_pot,
           allow_overdraft, business_id, created_at,
           starting_balance
             + COALESCE((SELECT SUM(amount) FROM transactions WHERE to_account_id = accounts.id), 0)
             - COALESCE((SELECT SUM(amount) FROM transactions WHERE from_account_id = accounts.id), 0)
             - round_up_pot AS balance
    FROM accounts
"#;

const BUSINESS_COLUMNS: &str = "id, name, category, sanctioned, created_at";

const TRANSACTION_COLUMNS: &str = "id, sequence, transaction_type, amount, from_account_id, to_account_id, round_up, timestamp, recorded_at, description";

/// True if `err` wraps a UNIQUE constraint failure, e.g. a name taken by a
/// concurrent writer between the lookup and the insert.
pub fn is_unique_violation(err: &anyhow::Error) -> bool {
    err.downcast_ref::<sqlx::Error>()
        .and_then(|e| e.as_database_error())
        .is_some_and(|e| e.is_unique_violation())
}

/// Timestamps are stored as fixed-width RFC 3339 so string order is time order.
pub(crate) fn encode_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_timestamp(raw: &str, what: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)
        .with_context(|| format!("Invalid {what} timestamp"))?
        .with_timezone(&Utc))
}

/// Filter for querying the ledger. Every field narrows the result.
#[derive(Debug, Clone, Default)]
pub struct LedgerQuery {
    pub account: Option<AccountId>,
    pub transaction_type: Option<TransactionType>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Repository for persisting and querying accounts, businesses and the ledger.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database URL.
    ///
    /// Writers queue on the database lock for up to the busy timeout before
    /// giving up, so concurrent posts wait for each other.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("Invalid database URL")?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations. Safe to run repeatedly.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;

        sqlx::query(MIGRATION_002_ROUND_UP_RECLAIMS)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 002")?;

        Ok(())
    }

    /// Initialize a database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    // ========================
    // Account operations
    // ========================

    pub async fn save_account(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, name, starting_balance, account_type, round_up_enabled, postcode, round_up_pot, allow_overdraft, business_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(&account.name)
        .bind(account.starting_balance)
        .bind(account.account_type.as_str())
        .bind(account.round_up_enabled)
        .bind(&account.postcode)
        .bind(account.round_up_pot)
        .bind(account.allow_overdraft)
        .bind(account.business_id.map(|id| id.to_string()))
        .bind(encode_timestamp(account.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to save account")?;
        Ok(())
    }

    pub async fn get_account(&self, id: AccountId) -> Result<Option<Account>> {
        fetch_account(&self.pool, id).await
    }

    pub async fn get_account_by_name(&self, name: &str) -> Result<Option<Account>> {
        let row = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE name = ?"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch account by name")?;

        row.as_ref().map(row_to_account).transpose()
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>> {
        let rows = sqlx::query(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list accounts")?;

        rows.iter().map(row_to_account).collect()
    }

    pub async fn rename_account(&self, id: AccountId, name: &str) -> Result<()> {
        sqlx::query("UPDATE accounts SET name = ? WHERE id = ?")
            .bind(name)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to rename account")?;
        Ok(())
    }

    pub async fn set_round_up(&self, id: AccountId, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE accounts SET round_up_enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update round-up setting")?;
        Ok(())
    }

    /// Account plus its current balance, or None if it doesn't exist.
    pub async fn get_account_snapshot(&self, id: AccountId) -> Result<Option<AccountSnapshot>> {
        fetch_account_snapshot(&self.pool, id).await
    }

    /// Every account with its current balance, ordered by name.
    pub async fn list_account_snapshots(&self) -> Result<Vec<AccountSnapshot>> {
        let rows = sqlx::query(&format!("{ACCOUNT_WITH_BALANCE} ORDER BY name"))
            .fetch_all(&self.pool)
            .await
            .context("Failed to list account balances")?;

        rows.iter().map(row_to_snapshot).collect()
    }

    /// Pay an account's whole round-up pot back into its balance.
    /// Returns None when the pot is empty.
    pub async fn reclaim_round_up(&self, id: AccountId) -> Result<Option<RoundUpReclaim>> {
        let mut tx = self.pool.begin().await.context("Failed to begin reclaim")?;
        let mut reclaim = RoundUpReclaim::new(id, 0);

        // Writing first takes the database write lock before the pot is read.
        let row = sqlx::query(
            r#"
            INSERT INTO round_up_reclaims (id, account_id, amount, reclaimed_at)
            SELECT ?, id, round_up_pot, ? FROM accounts WHERE id = ? AND round_up_pot > 0
            RETURNING amount
            "#,
        )
        .bind(reclaim.id.to_string())
        .bind(encode_timestamp(reclaim.reclaimed_at))
        .bind(id.to_string())
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to record round-up reclaim")?;

        let Some(row) = row else {
            return Ok(None);
        };
        reclaim.amount = row.get("amount");

        sqlx::query("UPDATE accounts SET round_up_pot = round_up_pot - ? WHERE id = ?")
            .bind(reclaim.amount)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to empty round-up pot")?;

        tx.commit().await.context("Failed to commit reclaim")?;

        Ok(Some(reclaim))
    }

    /// Total reclaimed from each account's pot.
    pub async fn reclaimed_totals(&self) -> Result<HashMap<AccountId, Pence>> {
        let rows = sqlx::query(
            "SELECT account_id, SUM(amount) AS total FROM round_up_reclaims GROUP BY account_id",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to sum round-up reclaims")?;

        let mut totals = HashMap::new();
        for row in rows {
            let id: String = row.get("account_id");
            let id = Uuid::parse_str(&id).context("Invalid account ID")?;
            totals.insert(id, row.get::<Pence, _>("total"));
        }
        Ok(totals)
    }

    pub async fn list_reclaims(&self, account_id: AccountId) -> Result<Vec<RoundUpReclaim>> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, amount, reclaimed_at
            FROM round_up_reclaims
            WHERE account_id = ?
            ORDER BY reclaimed_at
            "#,
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list round-up reclaims")?;

        rows.iter()
            .map(|row| -> Result<RoundUpReclaim> {
                let id: String = row.get("id");
                let account_id: String = row.get("account_id");
                let reclaimed_at: String = row.get("reclaimed_at");
                Ok(RoundUpReclaim {
                    id: Uuid::parse_str(&id).context("Invalid reclaim ID")?,
                    account_id: Uuid::parse_str(&account_id).context("Invalid account ID")?,
                    amount: row.get("amount"),
                    reclaimed_at: decode_timestamp(&reclaimed_at, "reclaimed_at")?,
                })
            })
            .collect()
    }

    // ========================
    // Business operations
    // ========================

    pub async fn save_business(&self, business: &Business) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO businesses (id, name, category, sanctioned, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(business.id.to_string())
        .bind(&business.name)
        .bind(&business.category)
        .bind(business.sanctioned)
        .bind(encode_timestamp(business.created_at))
        .execute(&self.pool)
        .await
        .context("Failed to save business")?;
        Ok(())
    }

    pub async fn get_business(&self, id: BusinessId) -> Result<Option<Business>> {
        fetch_business(&self.pool, id).await
    }

    pub async fn get_business_by_name(&self, name: &str) -> Result<Option<Business>> {
        let row = sqlx::query(&format!(
            "SELECT {BUSINESS_COLUMNS} FROM businesses WHERE name = ?"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch business by name")?;

        row.as_ref().map(row_to_business).transpose()
    }

    pub async fn list_businesses(&self) -> Result<Vec<Business>> {
        let rows = sqlx::query(&format!(
            "SELECT {BUSINESS_COLUMNS} FROM businesses ORDER BY name"
        ))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list businesses")?;

        rows.iter().map(row_to_business).collect()
    }

    pub async fn set_sanctioned(&self, id: BusinessId, sanctioned: bool) -> Result<()> {
        sqlx::query("UPDATE businesses SET sanctioned = ? WHERE id = ?")
            .bind(sanctioned)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update sanctions flag")?;
        Ok(())
    }

    // ========================
    // Ledger queries
    // ========================

    pub async fn get_transaction(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let row = sqlx::query(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch transaction")?;

        row.as_ref().map(row_to_transaction).transpose()
    }

    /// Every transaction, in ledger order.
    pub async fn list_transactions(&self) -> Result<Vec<Transaction>> {
        self.query_transactions(&LedgerQuery::default()).await
    }

    pub async fn query_transactions(&self, filter: &LedgerQuery) -> Result<Vec<Transaction>> {
        let mut query = format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE 1=1");

        let account_str = filter.account.map(|id| id.to_string());
        let from_date_str = filter.from_date.map(encode_timestamp);
        let to_date_str = filter.to_date.map(encode_timestamp);

        if account_str.is_some() {
            query.push_str(" AND (from_account_id = ? OR to_account_id = ?)");
        }
        if filter.transaction_type.is_some() {
            query.push_str(" AND transaction_type = ?");
        }
        if from_date_str.is_some() {
            query.push_str(" AND timestamp >= ?");
        }
        if to_date_str.is_some() {
            query.push_str(" AND timestamp <= ?");
        }

        query.push_str(" ORDER BY sequence");

        if let Some(limit) = filter.limit {
            query.push_str(&format!(" LIMIT {limit}"));
        }

        let mut sql_query = sqlx::query(&query);

        if let Some(ref account) = account_str {
            sql_query = sql_query.bind(account).bind(account);
        }
        if let Some(kind) = filter.transaction_type {
            sql_query = sql_query.bind(kind.as_str());
        }
        if let Some(ref from) = from_date_str {
            sql_query = sql_query.bind(from);
        }
        if let Some(ref to) = to_date_str {
            sql_query = sql_query.bind(to);
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to query transactions")?;

        rows.iter().map(row_to_transaction).collect()
    }

    /// Debit-style spending from an account grouped by destination.
    /// Rows are (destination name, total, count), largest total first.
    pub async fn spending_by_destination(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<(String, Pence, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT COALESCE(a.name, 'Unknown') AS destination,
                   SUM(t.amount) AS total,
                   COUNT(*) AS count
            FROM transactions t
            LEFT JOIN accounts a ON a.id = t.to_account_id
            WHERE t.from_account_id = ?
              AND t.transaction_type IN ('payment', 'withdrawal')
            GROUP BY t.to_account_id
            ORDER BY total DESC, destination
            "#,
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to compute spending trends")?;

        Ok(rows
            .iter()
            .map(|row| (row.get("destination"), row.get("total"), row.get("count")))
            .collect())
    }

    /// Accounts ranked by debit-style spending.
    /// Rows are (account id, name, total, count).
    pub async fn top_spenders(&self, limit: usize) -> Result<Vec<(AccountId, String, Pence, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT a.id AS account_id,
                   a.name AS name,
                   SUM(t.amount) AS total,
                   COUNT(*) AS count
            FROM transactions t
            JOIN accounts a ON a.id = t.from_account_id
            WHERE t.transaction_type IN ('payment', 'withdrawal')
            GROUP BY a.id
            ORDER BY total DESC, name
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to rank spenders")?;

        rows.iter()
            .map(|row| -> Result<(AccountId, String, Pence, i64)> {
                let id: String = row.get("account_id");
                Ok((
                    Uuid::parse_str(&id).context("Invalid account ID")?,
                    row.get("name"),
                    row.get("total"),
                    row.get("count"),
                ))
            })
            .collect()
    }
}

async fn fetch_account<'e, E>(executor: E, id: AccountId) -> Result<Option<Account>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = ?"
    ))
    .bind(id.to_string())
    .fetch_optional(executor)
    .await
    .context("Failed to fetch account")?;

    row.as_ref().map(row_to_account).transpose()
}

pub(crate) async fn fetch_account_snapshot<'e, E>(
    executor: E,
    id: AccountId,
) -> Result<Option<AccountSnapshot>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!("{ACCOUNT_WITH_BALANCE} WHERE id = ?"))
        .bind(id.to_string())
        .fetch_optional(executor)
        .await
        .context("Failed to fetch account balance")?;

    row.as_ref().map(row_to_snapshot).transpose()
}

pub(crate) async fn fetch_business<'e, E>(executor: E, id: BusinessId) -> Result<Option<Business>>
where
    E: Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(&format!(
        "SELECT {BUSINESS_COLUMNS} FROM businesses WHERE id = ?"
    ))
    .bind(id.to_string())
    .fetch_optional(executor)
    .await
    .context("Failed to fetch business")?;

    row.as_ref().map(row_to_business).transpose()
}

fn row_to_account(row: &SqliteRow) -> Result<Account> {
    let id: String = row.get("id");
    let account_type: String = row.get("account_type");
    let business_id: Option<String> = row.get("business_id");
    let created_at: String = row.get("created_at");

    Ok(Account {
        id: Uuid::parse_str(&id).context("Invalid account ID")?,
        name: row.get("name"),
        starting_balance: row.get("starting_balance"),
        account_type: account_type
            .parse::<AccountType>()
            .map_err(|e| anyhow::anyhow!(e))?,
        round_up_enabled: row.get::<i32, _>("round_up_enabled") != 0,
        postcode: row.get("postcode"),
        round_up_pot: row.get("round_up_pot"),
        allow_overdraft: row.get::<i32, _>("allow_overdraft") != 0,
        business_id: business_id
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .context("Invalid business ID")?,
        created_at: decode_timestamp(&created_at, "created_at")?,
    })
}

fn row_to_snapshot(row: &SqliteRow) -> Result<AccountSnapshot> {
    // SQLite turns integer overflow into REAL, which must not reach a Pence.
    let balance: i64 = row
        .try_get("balance")
        .context("Account balance is not an integer")?;

    Ok(AccountSnapshot {
        account: row_to_account(row)?,
        balance,
    })
}

fn row_to_business(row: &SqliteRow) -> Result<Business> {
    let id: String = row.get("id");
    let created_at: String = row.get("created_at");

    Ok(Business {
        id: Uuid::parse_str(&id).context("Invalid business ID")?,
        name: row.get("name"),
        category: row.get("category"),
        sanctioned: row.get::<i32, _>("sanctioned") != 0,
        created_at: decode_timestamp(&created_at, "created_at")?,
    })
}

fn row_to_transaction(row: &SqliteRow) -> Result<Transaction> {
    let id: String = row.get("id");
    let transaction_type: String = row.get("transaction_type");
    let from_account: Option<String> = row.get("from_account_id");
    let to_account: Option<String> = row.get("to_account_id");
    let timestamp: String = row.get("timestamp");
    let recorded_at: String = row.get("recorded_at");

    Ok(Transaction::from_parts(
        Uuid::parse_str(&id).context("Invalid transaction ID")?,
        row.get("sequence"),
        transaction_type
            .parse::<TransactionType>()
            .map_err(|e| anyhow::anyhow!(e))?,
        row.get("amount"),
        from_account
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .context("Invalid from_account ID")?,
        to_account
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .context("Invalid to_account ID")?,
        row.get("round_up"),
        decode_timestamp(&timestamp, "transaction")?,
        decode_timestamp(&recorded_at, "recorded_at")?,
        row.get("description"),
    ))
}
