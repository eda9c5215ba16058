use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{BusinessId, Pence};

pub type AccountId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Everyday spending account
    #[default]
    Current,
    /// Savings account; may receive money and move it out by transfer or withdrawal
    Savings,
    /// Account held by or for a business
    Business,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Current => "current",
            AccountType::Savings => "savings",
            AccountType::Business => "business",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AccountType::Current => "Current Account",
            AccountType::Savings => "Savings Account",
            AccountType::Business => "Business Account",
        }
    }

    /// Business accounts may run an overdraft unless told otherwise.
    pub fn permits_overdraft(&self) -> bool {
        matches!(self, AccountType::Business)
    }

    /// Savings accounts cannot pay merchants directly.
    pub fn can_make_payments(&self) -> bool {
        !matches!(self, AccountType::Savings)
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "current" => Ok(AccountType::Current),
            "savings" => Ok(AccountType::Savings),
            "business" => Ok(AccountType::Business),
            other => Err(format!(
                "unknown account type '{other}' (expected current, savings or business)"
            )),
        }
    }
}

impl std::fmt::Display for AccountType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub name: String,
    pub starting_balance: Pence,
    pub account_type: AccountType,
    pub round_up_enabled: bool,
    pub postcode: Option<String>,
    /// Round-up savings set aside from the spendable balance.
    pub round_up_pot: Pence,
    pub allow_overdraft: bool,
    /// Business this account collects payments for, if any.
    pub business_id: Option<BusinessId>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    pub fn new(name: String, account_type: AccountType, starting_balance: Pence) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            starting_balance,
            account_type,
            round_up_enabled: false,
            postcode: None,
            round_up_pot: 0,
            allow_overdraft: account_type.permits_overdraft(),
            business_id: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_round_up(mut self, enabled: bool) -> Self {
        self.round_up_enabled = enabled;
        self
    }

    pub fn with_postcode(mut self, postcode: impl Into<String>) -> Self {
        self.postcode = Some(postcode.into());
        self
    }

    pub fn with_allow_overdraft(mut self, allow: bool) -> Self {
        self.allow_overdraft = allow;
        self
    }

    pub fn with_business(mut self, business_id: BusinessId) -> Self {
        self.business_id = Some(business_id);
        self
    }
}

/// Creation request for an account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAccount {
    pub name: String,
    pub starting_balance: Pence,
    #[serde(default)]
    pub account_type: AccountType,
    #[serde(default)]
    pub round_up_enabled: bool,
    #[serde(default)]
    pub postcode: Option<String>,
    #[serde(default)]
    pub allow_overdraft: Option<bool>,
    /// Name or id of the business to link.
    #[serde(default)]
    pub business: Option<String>,
}

impl NewAccount {
    pub fn new(name: impl Into<String>, account_type: AccountType, starting_balance: Pence) -> Self {
        Self {
            name: name.into(),
            starting_balance,
            account_type,
            ..Self::default()
        }
    }

    pub fn round_up(mut self, enabled: bool) -> Self {
        self.round_up_enabled = enabled;
        self
    }

    pub fn postcode(mut self, postcode: impl Into<String>) -> Self {
        self.postcode = Some(postcode.into());
        self
    }

    pub fn allow_overdraft(mut self, allow: bool) -> Self {
        self.allow_overdraft = Some(allow);
        self
    }

    pub fn business(mut self, business: impl Into<String>) -> Self {
        self.business = Some(business.into());
        self
    }
}

/// An account together with its balance as of a point in the ledger.
#[derive(Debug, Clone)]
pub struct AccountSnapshot {
    pub account: Account,
    pub balance: Pence,
}
