use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::domain::{
    Account, AccountId, AccountType, Business, IntegrityReport, MAX_AMOUNT, NewAccount,
    NewTransaction, Pence, PostingContext, RoundUpReclaim, Transaction, TransactionId,
    TransactionType, build_integrity_report, format_pence, plan_posting, validate_request,
    within_limit,
};
use crate::storage::{LedgerQuery, Repository, is_unique_violation};

use super::{AppError, BalanceEntry, SpendingTrend, TopSpender};

/// Default size of the top-spenders ranking.
pub const DEFAULT_TOP_SPENDERS: usize = 10;

/// Application service providing the banking operations.
/// This is the primary interface for any client (CLI, API, tests).
#[derive(Clone)]
pub struct LedgerService {
    repo: Repository,
}

/// Filter for listing transactions. Accounts are given by name or id.
#[derive(Debug, Clone, Default)]
pub struct TransactionFilter {
    pub account: Option<String>,
    pub transaction_type: Option<TransactionType>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// Trim a new account or business name and reject blank or id-shaped ones.
/// Lookups try a name as an id first, so a name that parses as a UUID could
/// never be found by name.
fn checked_name<'a>(kind: &str, name: &'a str) -> Result<&'a str, AppError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation(format!("{kind} name must not be empty")));
    }
    if Uuid::parse_str(name).is_ok() {
        return Err(AppError::Validation(format!(
            "{kind} name '{name}' must not look like an id"
        )));
    }
    Ok(name)
}

/// Map a UNIQUE failure from a racing writer to `conflict`.
fn already_exists(err: anyhow::Error, conflict: AppError) -> AppError {
    if is_unique_violation(&err) {
        conflict
    } else {
        AppError::Database(err)
    }
}

impl LedgerService {
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// Create (if needed) and migrate the database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    pub async fn close(&self) {
        self.repo.close().await;
    }

    // ========================
    // Account operations
    // ========================

    #[instrument(skip(self, request), fields(name = %request.name))]
    pub async fn create_account(&self, request: NewAccount) -> Result<Account, AppError> {
        let name = checked_name("account", &request.name)?;
        if !within_limit(request.starting_balance) {
            return Err(AppError::Validation(format!(
                "starting balance {}p exceeds the limit of {}",
                request.starting_balance,
                format_pence(MAX_AMOUNT)
            )));
        }
        if self.repo.get_account_by_name(name).await?.is_some() {
            return Err(AppError::AccountAlreadyExists(name.to_string()));
        }

        let business = match request.business.as_deref() {
            Some(reference) => Some(self.get_business(reference).await?),
            None => None,
        };
        if business.is_some() && request.account_type != AccountType::Business {
            return Err(AppError::Validation(format!(
                "only business accounts can be linked to a business, not {}",
                request.account_type
            )));
        }

        let mut account = Account::new(
            name.to_string(),
            request.account_type,
            request.starting_balance,
        )
        .with_round_up(request.round_up_enabled);

        if let Some(postcode) = request.postcode.filter(|p| !p.trim().is_empty()) {
            account = account.with_postcode(postcode.trim());
        }
        if let Some(allow) = request.allow_overdraft {
            account = account.with_allow_overdraft(allow);
        }
        if let Some(business) = business {
            account = account.with_business(business.id);
        }

        if account.starting_balance < 0 && !account.allow_overdraft {
            return Err(AppError::Validation(format!(
                "starting balance {}p is negative but account '{}' has no overdraft",
                account.starting_balance, account.name
            )));
        }

        self.repo
            .save_account(&account)
            .await
            .map_err(|e| already_exists(e, AppError::AccountAlreadyExists(account.name.clone())))?;
        info!(account_id = %account.id, account_type = %account.account_type, "Created account");
        Ok(account)
    }

    /// Look an account up by id or, failing that, by name.
    pub async fn get_account(&self, reference: &str) -> Result<Account, AppError> {
        let found = match Uuid::parse_str(reference) {
            Ok(id) => self.repo.get_account(id).await?,
            Err(_) => self.repo.get_account_by_name(reference).await?,
        };
        found.ok_or_else(|| AppError::AccountNotFound(reference.to_string()))
    }

    pub async fn get_account_by_id(&self, id: AccountId) -> Result<Account, AppError> {
        self.repo
            .get_account(id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(id.to_string()))
    }

    pub async fn list_accounts(&self) -> Result<Vec<Account>, AppError> {
        Ok(self.repo.list_accounts().await?)
    }

    #[instrument(skip(self))]
    pub async fn rename_account(&self, reference: &str, new_name: &str) -> Result<Account, AppError> {
        let mut account = self.get_account(reference).await?;
        let new_name = checked_name("account", new_name)?;
        if new_name == account.name {
            return Ok(account);
        }
        if self.repo.get_account_by_name(new_name).await?.is_some() {
            return Err(AppError::AccountAlreadyExists(new_name.to_string()));
        }

        self.repo
            .rename_account(account.id, new_name)
            .await
            .map_err(|e| already_exists(e, AppError::AccountAlreadyExists(new_name.to_string())))?;
        account.name = new_name.to_string();
        info!(account_id = %account.id, "Renamed account");
        Ok(account)
    }

    /// Current balance of one account.
    pub async fn current_balance(&self, reference: &str) -> Result<BalanceEntry, AppError> {
        let account = self.get_account(reference).await?;
        let snapshot = self
            .repo
            .get_account_snapshot(account.id)
            .await?
            .ok_or_else(|| AppError::AccountNotFound(reference.to_string()))?;

        Ok(BalanceEntry {
            round_up_pot: snapshot.account.round_up_pot,
            current_balance: snapshot.balance,
            account: snapshot.account,
        })
    }

    /// Current balances of every account, ordered by name.
    pub async fn all_balances(&self) -> Result<Vec<BalanceEntry>, AppError> {
        let snapshots = self.repo.list_account_snapshots().await?;
        Ok(snapshots
            .into_iter()
            .map(|snapshot| BalanceEntry {
                round_up_pot: snapshot.account.round_up_pot,
                current_balance: snapshot.balance,
                account: snapshot.account,
            })
            .collect())
    }

    #[instrument(skip(self))]
    pub async fn set_round_up(&self, reference: &str, enabled: bool) -> Result<Account, AppError> {
        let mut account = self.get_account(reference).await?;
        self.repo.set_round_up(account.id, enabled).await?;
        account.round_up_enabled = enabled;
        info!(account_id = %account.id, enabled, "Updated round-up setting");
        Ok(account)
    }

    /// Flip round-up on or off.
    pub async fn toggle_round_up(&self, reference: &str) -> Result<Account, AppError> {
        let account = self.get_account(reference).await?;
        self.set_round_up(&account.id.to_string(), !account.round_up_enabled)
            .await
    }

    /// Move the whole round-up pot back into the account balance.
    /// Returns the amount reclaimed, zero when the pot was empty.
    #[instrument(skip(self))]
    pub async fn reclaim_round_up(&self, reference: &str) -> Result<Pence, AppError> {
        let account = self.get_account(reference).await?;
        match self.repo.reclaim_round_up(account.id).await? {
            Some(reclaim) => {
                info!(account_id = %account.id, amount = reclaim.amount, "Reclaimed round-up pot");
                Ok(reclaim.amount)
            }
            None => {
                debug!(account_id = %account.id, "Round-up pot already empty");
                Ok(0)
            }
        }
    }

    /// Past reclaims of an account's round-up pot, oldest first.
    pub async fn list_reclaims(&self, reference: &str) -> Result<Vec<RoundUpReclaim>, AppError> {
        let account = self.get_account(reference).await?;
        Ok(self.repo.list_reclaims(account.id).await?)
    }

    // ========================
    // Business operations
    // ========================

    #[instrument(skip(self))]
    pub async fn create_business(&self, name: &str, category: &str) -> Result<Business, AppError> {
        let name = checked_name("business", name)?;
        if self.repo.get_business_by_name(name).await?.is_some() {
            return Err(AppError::BusinessAlreadyExists(name.to_string()));
        }

        let business = Business::new(name.to_string(), category.trim().to_string());
        self.repo
            .save_business(&business)
            .await
            .map_err(|e| already_exists(e, AppError::BusinessAlreadyExists(business.name.clone())))?;
        info!(business_id = %business.id, "Created business");
        Ok(business)
    }

    /// Look a business up by id or, failing that, by name.
    pub async fn get_business(&self, reference: &str) -> Result<Business, AppError> {
        let found = match Uuid::parse_str(reference) {
            Ok(id) => self.repo.get_business(id).await?,
            Err(_) => self.repo.get_business_by_name(reference).await?,
        };
        found.ok_or_else(|| AppError::BusinessNotFound(reference.to_string()))
    }

    pub async fn list_businesses(&self) -> Result<Vec<Business>, AppError> {
        Ok(self.repo.list_businesses().await?)
    }

    #[instrument(skip(self))]
    pub async fn set_sanctioned(&self, reference: &str, sanctioned: bool) -> Result<Business, AppError> {
        let mut business = self.get_business(reference).await?;
        self.repo.set_sanctioned(business.id, sanctioned).await?;
        business.sanctioned = sanctioned;
        warn!(business_id = %business.id, sanctioned, "Changed sanctions status");
        Ok(business)
    }

    // ========================
    // Posting
    // ========================

    /// Validate and apply a transaction. On success the transaction record,
    /// both balance changes and any round-up are committed together; on error
    /// nothing changes.
    #[instrument(
        skip(self, request),
        fields(kind = %request.transaction_type, amount = request.amount)
    )]
    pub async fn post_transaction(&self, request: NewTransaction) -> Result<Transaction, AppError> {
        match self.apply_posting(&request).await {
            Ok(transaction) => {
                info!(
                    transaction_id = %transaction.id(),
                    sequence = transaction.sequence(),
                    round_up = transaction.round_up(),
                    "Posted transaction"
                );
                Ok(transaction)
            }
            Err(err) if err.is_rejection() => {
                warn!(error = %err, "Rejected transaction");
                Err(err)
            }
            Err(err) => {
                error!(error = %err, "Failed to post transaction");
                Err(err)
            }
        }
    }

    async fn apply_posting(&self, request: &NewTransaction) -> Result<Transaction, AppError> {
        // Shape errors don't need the write lock.
        validate_request(request)?;

        let mut unit = self.repo.begin_posting().await?;

        let from = match request.from_account {
            Some(id) => unit.account_snapshot(id).await?,
            None => None,
        };
        let to = match request.to_account {
            Some(id) => unit.account_snapshot(id).await?,
            None => None,
        };
        let to_business = match to.as_ref().and_then(|s| s.account.business_id) {
            Some(id) => unit.business(id).await?,
            None => None,
        };

        let context = PostingContext {
            from: from.as_ref(),
            to: to.as_ref(),
            to_business: to_business.as_ref(),
        };
        let plan = plan_posting(request, context, unit.sequence(), Utc::now())?;

        unit.insert_transaction(&plan.transaction).await?;
        if plan.round_up > 0 {
            if let Some(from) = plan.transaction.from_account() {
                unit.add_to_round_up_pot(from, plan.round_up).await?;
            }
        }
        unit.commit().await?;

        Ok(plan.transaction)
    }

    // ========================
    // Ledger queries
    // ========================

    pub async fn get_transaction(&self, id: TransactionId) -> Result<Transaction, AppError> {
        self.repo
            .get_transaction(id)
            .await?
            .ok_or_else(|| AppError::TransactionNotFound(id.to_string()))
    }

    pub async fn list_transactions(
        &self,
        filter: TransactionFilter,
    ) -> Result<Vec<Transaction>, AppError> {
        let account = match filter.account.as_deref() {
            Some(reference) => Some(self.get_account(reference).await?.id),
            None => None,
        };

        let query = LedgerQuery {
            account,
            transaction_type: filter.transaction_type,
            from_date: filter.from_date,
            to_date: filter.to_date,
            limit: filter.limit,
        };
        Ok(self.repo.query_transactions(&query).await?)
    }

    /// History of one account, oldest first.
    pub async fn account_transactions(&self, reference: &str) -> Result<Vec<Transaction>, AppError> {
        self.list_transactions(TransactionFilter {
            account: Some(reference.to_string()),
            ..TransactionFilter::default()
        })
        .await
    }

    /// Map of account ids to names, for display.
    pub async fn account_names(&self) -> Result<HashMap<AccountId, String>, AppError> {
        let accounts = self.repo.list_accounts().await?;
        Ok(accounts.into_iter().map(|a| (a.id, a.name)).collect())
    }

    // ========================
    // Reporting
    // ========================

    /// Where an account's money went, largest destination first.
    pub async fn spending_trends(&self, reference: &str) -> Result<Vec<SpendingTrend>, AppError> {
        let account = self.get_account(reference).await?;
        let rows = self.repo.spending_by_destination(account.id).await?;
        Ok(rows
            .into_iter()
            .map(|(destination, total, count)| SpendingTrend {
                destination,
                total,
                count,
            })
            .collect())
    }

    /// Accounts ranked by payments and withdrawals.
    pub async fn top_spenders(&self, limit: usize) -> Result<Vec<TopSpender>, AppError> {
        let rows = self.repo.top_spenders(limit).await?;
        Ok(rows
            .into_iter()
            .map(|(account_id, name, total, count)| TopSpender {
                account_id,
                name,
                total,
                count,
            })
            .collect())
    }

    // ========================
    // Integrity
    // ========================

    /// Cross-check stored pots and balances against the ledger.
    pub async fn check_integrity(&self) -> Result<IntegrityReport, AppError> {
        let accounts = self.repo.list_accounts().await?;
        let transactions = self.repo.list_transactions().await?;
        let reclaimed = self.repo.reclaimed_totals().await?;

        let report = build_integrity_report(&accounts, &transactions, &reclaimed);
        if !report.is_healthy() {
            warn!(?report, "Ledger integrity check failed");
        }
        Ok(report)
    }
}
