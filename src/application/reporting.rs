use serde::Serialize;

use crate::domain::{Account, AccountId, Pence};

/// Money an account spent with one destination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpendingTrend {
    pub destination: String,
    pub total: Pence,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopSpender {
    pub account_id: AccountId,
    pub name: String,
    pub total: Pence,
    pub count: i64,
}

/// Balance view of one account.
#[derive(Debug, Clone, Serialize)]
pub struct BalanceEntry {
    pub account: Account,
    /// Spendable balance, net of the round-up pot.
    pub current_balance: Pence,
    pub round_up_pot: Pence,
}

impl BalanceEntry {
    /// Balance including money set aside in the pot.
    pub fn total_held(&self) -> Pence {
        self.current_balance + self.round_up_pot
    }
}
