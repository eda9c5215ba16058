use std::collections::{HashMap, HashSet};

use serde::Serialize;

use super::{Account, AccountId, Pence, Transaction};

/// Balance of an account after replaying `transactions`:
/// starting balance + incoming - outgoing - money held in the round-up pot.
pub fn compute_balance(account: &Account, transactions: &[Transaction]) -> Pence {
    let movement = transactions.iter().fold(0, |balance, tx| {
        let incoming = if tx.to_account() == Some(account.id) {
            tx.amount()
        } else {
            0
        };
        let outgoing = if tx.from_account() == Some(account.id) {
            tx.amount()
        } else {
            0
        };
        balance + incoming - outgoing
    });

    account.starting_balance + movement - account.round_up_pot
}

/// Total round-up contributions recorded against each paying account.
pub fn round_up_totals(transactions: &[Transaction]) -> HashMap<AccountId, Pence> {
    let mut totals = HashMap::new();
    for tx in transactions {
        if let (Some(from), round_up) = (tx.from_account(), tx.round_up()) {
            if round_up > 0 {
                *totals.entry(from).or_insert(0) += round_up;
            }
        }
    }
    totals
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PotMismatch {
    pub account: String,
    pub pot: Pence,
    pub expected: Pence,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NegativeBalance {
    pub account: String,
    pub balance: Pence,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub account_count: usize,
    pub transaction_count: usize,
    pub has_sequence_gaps: bool,
    pub invalid_amounts: usize,
    pub dangling_references: usize,
    pub pot_mismatches: Vec<PotMismatch>,
    pub negative_balances: Vec<NegativeBalance>,
}

impl IntegrityReport {
    pub fn is_healthy(&self) -> bool {
        !self.has_sequence_gaps
            && self.invalid_amounts == 0
            && self.dangling_references == 0
            && self.pot_mismatches.is_empty()
            && self.negative_balances.is_empty()
    }
}

/// Cross-check stored accounts against the transaction ledger.
///
/// `reclaimed` is the total paid back out of each account's pot.
pub fn build_integrity_report(
    accounts: &[Account],
    transactions: &[Transaction],
    reclaimed: &HashMap<AccountId, Pence>,
) -> IntegrityReport {
    let known: HashSet<AccountId> = accounts.iter().map(|a| a.id).collect();

    let mut sequences: Vec<i64> = transactions.iter().map(Transaction::sequence).collect();
    sequences.sort_unstable();
    let has_sequence_gaps = sequences
        .iter()
        .enumerate()
        .any(|(i, seq)| *seq != sequences[0] + i as i64);

    let invalid_amounts = transactions
        .iter()
        .filter(|tx| tx.amount() <= 0 || tx.round_up() < 0)
        .count();

    let dangling_references = transactions
        .iter()
        .filter(|tx| {
            [tx.from_account(), tx.to_account()]
                .into_iter()
                .flatten()
                .any(|id| !known.contains(&id))
        })
        .count();

    let contributed = round_up_totals(transactions);
    let mut pot_mismatches = Vec::new();
    let mut negative_balances = Vec::new();

    for account in accounts {
        let expected = contributed.get(&account.id).copied().unwrap_or(0)
            - reclaimed.get(&account.id).copied().unwrap_or(0);
        if account.round_up_pot != expected {
            pot_mismatches.push(PotMismatch {
                account: account.name.clone(),
                pot: account.round_up_pot,
                expected,
            });
        }

        let balance = compute_balance(account, transactions);
        if !account.allow_overdraft && balance < 0 {
            negative_balances.push(NegativeBalance {
                account: account.name.clone(),
                balance,
            });
        }
    }

    IntegrityReport {
        account_count: accounts.len(),
        transaction_count: transactions.len(),
        has_sequence_gaps,
        invalid_amounts,
        dangling_references,
        pot_mismatches,
        negative_balances,
    }
}
