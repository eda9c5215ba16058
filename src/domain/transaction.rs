use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, Pence};

pub type TransactionId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    /// Card or merchant payment out of an account
    Payment,
    /// Cash taken out of an account
    Withdrawal,
    /// Money paid into an account from outside the bank
    Deposit,
    /// Movement between two accounts
    Transfer,
}

/// Which account references a transaction type takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reference {
    Required,
    Optional,
    Forbidden,
}

impl TransactionType {
    pub const ALL: [TransactionType; 4] = [
        TransactionType::Payment,
        TransactionType::Withdrawal,
        TransactionType::Deposit,
        TransactionType::Transfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Payment => "payment",
            TransactionType::Withdrawal => "withdrawal",
            TransactionType::Deposit => "deposit",
            TransactionType::Transfer => "transfer",
        }
    }

    /// Debit-style transactions spend money and qualify for round-up.
    pub fn is_debit(&self) -> bool {
        matches!(self, TransactionType::Payment | TransactionType::Withdrawal)
    }

    pub fn from_account(&self) -> Reference {
        match self {
            TransactionType::Deposit => Reference::Forbidden,
            _ => Reference::Required,
        }
    }

    pub fn to_account(&self) -> Reference {
        match self {
            TransactionType::Payment => Reference::Optional,
            TransactionType::Withdrawal => Reference::Forbidden,
            TransactionType::Deposit | TransactionType::Transfer => Reference::Required,
        }
    }
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "payment" => Ok(TransactionType::Payment),
            "withdrawal" => Ok(TransactionType::Withdrawal),
            "deposit" => Ok(TransactionType::Deposit),
            "transfer" => Ok(TransactionType::Transfer),
            other => Err(format!(
                "unknown transaction type '{other}' (expected payment, withdrawal, deposit or transfer)"
            )),
        }
    }
}

impl std::fmt::Display for TransactionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A posted ledger entry. Fields are read-only once built: corrections are new
/// offsetting transactions, never edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    id: TransactionId,
    sequence: i64,
    transaction_type: TransactionType,
    amount: Pence,
    from_account: Option<AccountId>,
    to_account: Option<AccountId>,
    round_up: Pence,
    timestamp: DateTime<Utc>,
    recorded_at: DateTime<Utc>,
    description: Option<String>,
}

impl Transaction {
    /// Assemble a transaction record. Only the posting planner and the storage
    /// layer build these.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        id: TransactionId,
        sequence: i64,
        transaction_type: TransactionType,
        amount: Pence,
        from_account: Option<AccountId>,
        to_account: Option<AccountId>,
        round_up: Pence,
        timestamp: DateTime<Utc>,
        recorded_at: DateTime<Utc>,
        description: Option<String>,
    ) -> Self {
        Self {
            id,
            sequence,
            transaction_type,
            amount,
            from_account,
            to_account,
            round_up,
            timestamp,
            recorded_at,
            description,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Position in the ledger; strictly increasing and gap-free.
    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    pub fn transaction_type(&self) -> TransactionType {
        self.transaction_type
    }

    pub fn amount(&self) -> Pence {
        self.amount
    }

    pub fn from_account(&self) -> Option<AccountId> {
        self.from_account
    }

    pub fn to_account(&self) -> Option<AccountId> {
        self.to_account
    }

    /// Pence moved into the payer's round-up pot by this posting.
    pub fn round_up(&self) -> Pence {
        self.round_up
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn recorded_at(&self) -> DateTime<Utc> {
        self.recorded_at
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn involves(&self, account_id: AccountId) -> bool {
        self.from_account == Some(account_id) || self.to_account == Some(account_id)
    }
}

/// Transaction-creation request, the boundary contract of the posting engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub transaction_type: TransactionType,
    pub amount: Pence,
    #[serde(default)]
    pub from_account: Option<AccountId>,
    #[serde(default)]
    pub to_account: Option<AccountId>,
    /// When the transaction happened; the posting time when omitted.
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewTransaction {
    pub fn new(transaction_type: TransactionType, amount: Pence) -> Self {
        Self {
            transaction_type,
            amount,
            from_account: None,
            to_account: None,
            timestamp: None,
            description: None,
        }
    }

    pub fn payment(from: AccountId, amount: Pence) -> Self {
        Self::new(TransactionType::Payment, amount).source(from)
    }

    pub fn withdrawal(from: AccountId, amount: Pence) -> Self {
        Self::new(TransactionType::Withdrawal, amount).source(from)
    }

    pub fn deposit(to: AccountId, amount: Pence) -> Self {
        Self::new(TransactionType::Deposit, amount).destination(to)
    }

    pub fn transfer(from: AccountId, to: AccountId, amount: Pence) -> Self {
        Self::new(TransactionType::Transfer, amount).source(from).destination(to)
    }

    pub fn source(mut self, account: AccountId) -> Self {
        self.from_account = Some(account);
        self
    }

    pub fn destination(mut self, account: AccountId) -> Self {
        self.to_account = Some(account);
        self
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
