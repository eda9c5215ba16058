use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AccountId, PENCE_PER_POUND, Pence};

/// Record of a round-up pot being paid back into its account's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundUpReclaim {
    pub id: Uuid,
    pub account_id: AccountId,
    pub amount: Pence,
    pub reclaimed_at: DateTime<Utc>,
}

impl RoundUpReclaim {
    pub fn new(account_id: AccountId, amount: Pence) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            amount,
            reclaimed_at: Utc::now(),
        }
    }
}

/// Round an amount up to the next whole pound, or None if that doesn't fit
/// in an i64.
pub fn ceil_to_whole_unit(amount: Pence) -> Option<Pence> {
    amount.checked_add(round_up_amount(amount))
}

/// Spare change saved when `amount` is rounded up: `ceil(amount) - amount`.
/// Whole-pound amounts save nothing. Never overflows.
pub fn round_up_amount(amount: Pence) -> Pence {
    (PENCE_PER_POUND - amount.rem_euclid(PENCE_PER_POUND)) % PENCE_PER_POUND
}
