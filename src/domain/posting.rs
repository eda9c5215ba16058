//! Validation and planning for a single post.
//!
//! Everything here is pure: the caller resolves the referenced accounts (with
//! balances read inside its unit of work) and applies the returned plan.

use chrono::{DateTime, SubsecRound, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::{
    AccountId, AccountSnapshot, Business, MAX_AMOUNT, NewTransaction, Pence, Reference,
    Transaction, format_pence, round_up_amount, within_limit,
};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PostingError {
    #[error("invalid transaction: {0}")]
    Validation(String),

    #[error("invalid account reference: {0}")]
    InvalidAccountReference(String),

    #[error("insufficient funds in account {account}: balance {balance}p, required {required}p")]
    InsufficientFunds {
        account: String,
        balance: Pence,
        required: Pence,
    },

    #[error("business '{business}' is sanctioned and cannot receive transactions")]
    SanctionedBusiness { business: String },
}

/// Accounts a request refers to, as seen by the posting unit.
#[derive(Debug, Default, Clone, Copy)]
pub struct PostingContext<'a> {
    pub from: Option<&'a AccountSnapshot>,
    pub to: Option<&'a AccountSnapshot>,
    /// Business linked to the destination account, if any.
    pub to_business: Option<&'a Business>,
}

/// What applying a request will do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostingPlan {
    pub transaction: Transaction,
    /// Pence to add to the source account's round-up pot.
    pub round_up: Pence,
}

/// Checks that need no account lookups: amount and reference shape.
pub fn validate_request(request: &NewTransaction) -> Result<(), PostingError> {
    if request.amount <= 0 {
        return Err(PostingError::Validation(format!(
            "amount must be positive, got {}p",
            request.amount
        )));
    }
    if request.amount > MAX_AMOUNT {
        return Err(PostingError::Validation(format!(
            "amount {}p exceeds the limit of {}",
            request.amount,
            format_pence(MAX_AMOUNT)
        )));
    }

    let kind = request.transaction_type;
    check_reference("from_account", kind.from_account(), request.from_account, kind)?;
    check_reference("to_account", kind.to_account(), request.to_account, kind)?;

    if let (Some(from), Some(to)) = (request.from_account, request.to_account) {
        if from == to {
            return Err(PostingError::Validation(
                "from_account and to_account must differ".to_string(),
            ));
        }
    }

    Ok(())
}

fn check_reference(
    field: &str,
    rule: Reference,
    value: Option<AccountId>,
    kind: super::TransactionType,
) -> Result<(), PostingError> {
    match (rule, value) {
        (Reference::Required, None) => Err(PostingError::Validation(format!(
            "{kind} requires {field}"
        ))),
        (Reference::Forbidden, Some(_)) => Err(PostingError::Validation(format!(
            "{kind} must not have {field}"
        ))),
        _ => Ok(()),
    }
}

/// Validate `request` against the resolved accounts and build the record to
/// persist. `sequence` is the ledger position reserved by the unit of work.
pub fn plan_posting(
    request: &NewTransaction,
    context: PostingContext<'_>,
    sequence: i64,
    recorded_at: DateTime<Utc>,
) -> Result<PostingPlan, PostingError> {
    validate_request(request)?;

    let from = resolve("from_account", request.from_account, context.from)?;
    let to = resolve("to_account", request.to_account, context.to)?;

    if let (Some(to), Some(business)) = (to, context.to_business) {
        if to.account.business_id == Some(business.id) && business.sanctioned {
            return Err(PostingError::SanctionedBusiness {
                business: business.name.clone(),
            });
        }
    }

    let kind = request.transaction_type;
    let mut round_up = 0;

    if let Some(from) = from {
        if kind == super::TransactionType::Payment && !from.account.account_type.can_make_payments()
        {
            return Err(PostingError::InvalidAccountReference(format!(
                "{} account '{}' cannot make payments",
                from.account.account_type, from.account.name
            )));
        }

        if kind.is_debit() && from.account.round_up_enabled {
            round_up = round_up_amount(request.amount);
        }

        let required = request
            .amount
            .checked_add(round_up)
            .ok_or_else(|| PostingError::Validation("amount is out of range".to_string()))?;
        if !from.account.allow_overdraft && from.balance < required {
            return Err(PostingError::InsufficientFunds {
                account: from.account.name.clone(),
                balance: from.balance,
                required,
            });
        }
        check_resulting_balance(from, from.balance.checked_sub(required))?;
    }

    if let Some(to) = to {
        check_resulting_balance(to, to.balance.checked_add(request.amount))?;
    }

    // Microsecond precision, matching what storage keeps.
    let recorded_at = recorded_at.trunc_subsecs(6);
    let timestamp = request
        .timestamp
        .map(|ts| ts.trunc_subsecs(6))
        .unwrap_or(recorded_at);

    let transaction = Transaction::from_parts(
        Uuid::new_v4(),
        sequence,
        kind,
        request.amount,
        request.from_account,
        request.to_account,
        round_up,
        timestamp,
        recorded_at,
        request.description.clone(),
    );

    Ok(PostingPlan {
        transaction,
        round_up,
    })
}

fn check_resulting_balance(
    account: &AccountSnapshot,
    resulting: Option<Pence>,
) -> Result<(), PostingError> {
    match resulting {
        Some(balance) if within_limit(balance) => Ok(()),
        _ => Err(PostingError::Validation(format!(
            "balance of account '{}' would leave the range of ±{}",
            account.account.name,
            format_pence(MAX_AMOUNT)
        ))),
    }
}

fn resolve<'a>(
    field: &str,
    requested: Option<AccountId>,
    found: Option<&'a AccountSnapshot>,
) -> Result<Option<&'a AccountSnapshot>, PostingError> {
    match (requested, found) {
        (None, _) => Ok(None),
        (Some(id), Some(snapshot)) if snapshot.account.id == id => Ok(Some(snapshot)),
        (Some(id), _) => Err(PostingError::InvalidAccountReference(format!(
            "{field} {id} does not exist"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::domain::{Account, AccountType, TransactionType};

    fn snapshot(account: Account, balance: Pence) -> AccountSnapshot {
        AccountSnapshot { account, balance }
    }

    fn current(balance: Pence) -> AccountSnapshot {
        snapshot(
            Account::new("Alice".into(), AccountType::Current, balance),
            balance,
        )
    }

    fn plan(request: &NewTransaction, context: PostingContext<'_>) -> Result<PostingPlan, PostingError> {
        plan_posting(request, context, 1, Utc::now())
    }

    #[test]
    fn rejects_non_positive_amounts() {
        let alice = current(10_000);
        for amount in [0, -1] {
            let request = NewTransaction::payment(alice.account.id, amount);
            assert!(matches!(
                validate_request(&request),
                Err(PostingError::Validation(_))
            ));
        }
    }

    #[test]
    fn rejects_wrong_reference_shape() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let deposit_with_source = NewTransaction::deposit(b, 100).source(a);
        let withdrawal_with_target = NewTransaction::withdrawal(a, 100).destination(b);
        let transfer_without_target = NewTransaction::new(TransactionType::Transfer, 100).source(a);
        let payment_without_source = NewTransaction::new(TransactionType::Payment, 100);
        let self_transfer = NewTransaction::transfer(a, a, 100);

        for request in [
            deposit_with_source,
            withdrawal_with_target,
            transfer_without_target,
            payment_without_source,
            self_transfer,
        ] {
            assert!(
                matches!(validate_request(&request), Err(PostingError::Validation(_))),
                "{request:?} should be rejected"
            );
        }
    }

    #[test]
    fn missing_account_is_an_invalid_reference() {
        let request = NewTransaction::payment(Uuid::new_v4(), 100);
        let result = plan(&request, PostingContext::default());
        assert!(matches!(result, Err(PostingError::InvalidAccountReference(_))));
    }

    #[test]
    fn mismatched_snapshot_is_an_invalid_reference() {
        let alice = current(10_000);
        let request = NewTransaction::payment(Uuid::new_v4(), 100);
        let context = PostingContext {
            from: Some(&alice),
            ..Default::default()
        };
        assert!(matches!(
            plan(&request, context),
            Err(PostingError::InvalidAccountReference(_))
        ));
    }

    #[test]
    fn payment_with_round_up_plans_spare_change() {
        let alice = snapshot(
            Account::new("Alice".into(), AccountType::Current, 10_000).with_round_up(true),
            10_000,
        );
        let request = NewTransaction::payment(alice.account.id, 1234);
        let context = PostingContext {
            from: Some(&alice),
            ..Default::default()
        };

        let plan = plan(&request, context).unwrap();
        assert_eq!(plan.round_up, 66);
        assert_eq!(plan.transaction.round_up(), 66);
        assert_eq!(plan.transaction.amount(), 1234);
        assert_eq!(plan.transaction.sequence(), 1);
    }

    #[test]
    fn transfers_never_round_up() {
        let alice = snapshot(
            Account::new("Alice".into(), AccountType::Current, 10_000).with_round_up(true),
            10_000,
        );
        let savings = snapshot(Account::new("Pot".into(), AccountType::Savings, 0), 0);
        let request = NewTransaction::transfer(alice.account.id, savings.account.id, 1234);
        let context = PostingContext {
            from: Some(&alice),
            to: Some(&savings),
            to_business: None,
        };

        assert_eq!(plan(&request, context).unwrap().round_up, 0);
    }

    #[test]
    fn round_up_counts_towards_required_funds() {
        let alice = snapshot(
            Account::new("Alice".into(), AccountType::Current, 1000).with_round_up(true),
            1000,
        );
        // 9.99 plus 0.01 round-up fits exactly; 9.50 plus 0.50 does too.
        for amount in [999, 950] {
            let request = NewTransaction::payment(alice.account.id, amount);
            let context = PostingContext {
                from: Some(&alice),
                ..Default::default()
            };
            assert!(plan(&request, context).is_ok());
        }

        let request = NewTransaction::payment(alice.account.id, 1001);
        let context = PostingContext {
            from: Some(&alice),
            ..Default::default()
        };
        assert_eq!(
            plan(&request, context),
            Err(PostingError::InsufficientFunds {
                account: "Alice".into(),
                balance: 1000,
                required: 1100,
            })
        );
    }

    #[test]
    fn overdraft_accounts_skip_funds_check() {
        let shop = snapshot(Account::new("Shop".into(), AccountType::Business, 0), 0);
        let request = NewTransaction::withdrawal(shop.account.id, 50_000);
        let context = PostingContext {
            from: Some(&shop),
            ..Default::default()
        };
        assert!(plan(&request, context).is_ok());
    }

    #[test]
    fn savings_cannot_pay() {
        let savings = snapshot(Account::new("Rainy day".into(), AccountType::Savings, 5000), 5000);
        let request = NewTransaction::payment(savings.account.id, 100);
        let context = PostingContext {
            from: Some(&savings),
            ..Default::default()
        };
        assert!(matches!(
            plan(&request, context),
            Err(PostingError::InvalidAccountReference(_))
        ));
    }

    #[test]
    fn sanctioned_business_wins_over_insufficient_funds() {
        let alice = current(0);
        let business = Business::new("Shady Ltd".into(), "retail".into()).with_sanctioned(true);
        let shop = snapshot(
            Account::new("Shady till".into(), AccountType::Business, 0).with_business(business.id),
            0,
        );
        let request = NewTransaction::payment(alice.account.id, 10_000).destination(shop.account.id);
        let context = PostingContext {
            from: Some(&alice),
            to: Some(&shop),
            to_business: Some(&business),
        };

        assert_eq!(
            plan(&request, context),
            Err(PostingError::SanctionedBusiness {
                business: "Shady Ltd".into()
            })
        );
    }

    #[test]
    fn deposits_into_sanctioned_business_are_rejected() {
        let business = Business::new("Shady Ltd".into(), "retail".into()).with_sanctioned(true);
        let shop = snapshot(
            Account::new("Shady till".into(), AccountType::Business, 0).with_business(business.id),
            0,
        );
        let request = NewTransaction::deposit(shop.account.id, 500);
        let context = PostingContext {
            to: Some(&shop),
            to_business: Some(&business),
            ..Default::default()
        };
        assert!(matches!(
            plan(&request, context),
            Err(PostingError::SanctionedBusiness { .. })
        ));
    }

    #[test]
    fn rejects_amounts_over_the_limit() {
        let request = NewTransaction::deposit(Uuid::new_v4(), MAX_AMOUNT + 1);
        assert!(matches!(
            validate_request(&request),
            Err(PostingError::Validation(_))
        ));

        let request = NewTransaction::deposit(Uuid::new_v4(), MAX_AMOUNT);
        assert!(validate_request(&request).is_ok());
    }

    #[test]
    fn huge_withdrawal_with_round_up_is_rejected_not_overflowed() {
        let shop = snapshot(
            Account::new("Shop".into(), AccountType::Business, 0).with_round_up(true),
            0,
        );
        let context = PostingContext {
            from: Some(&shop),
            ..Default::default()
        };

        let request = NewTransaction::withdrawal(shop.account.id, i64::MAX - 1);
        assert!(matches!(
            plan(&request, context),
            Err(PostingError::Validation(_))
        ));

        // Within the amount limit, but drives the overdraft past it.
        let deep = snapshot(
            Account::new("Deep".into(), AccountType::Business, 0).with_round_up(true),
            -MAX_AMOUNT + 10,
        );
        let request = NewTransaction::withdrawal(deep.account.id, 1_001);
        let context = PostingContext {
            from: Some(&deep),
            ..Default::default()
        };
        assert!(matches!(
            plan(&request, context),
            Err(PostingError::Validation(_))
        ));
    }

    #[test]
    fn credit_past_the_limit_is_rejected() {
        let bob = current(MAX_AMOUNT - 100);
        let context = PostingContext {
            to: Some(&bob),
            ..Default::default()
        };

        let request = NewTransaction::deposit(bob.account.id, 101);
        assert!(matches!(
            plan(&request, context),
            Err(PostingError::Validation(_))
        ));

        let request = NewTransaction::deposit(bob.account.id, 100);
        assert!(plan(&request, context).is_ok());
    }

    #[test]
    fn credit_onto_an_out_of_range_balance_does_not_overflow() {
        let bob = current(i64::MAX - 5);
        let context = PostingContext {
            to: Some(&bob),
            ..Default::default()
        };
        let request = NewTransaction::deposit(bob.account.id, 10);
        assert!(matches!(
            plan(&request, context),
            Err(PostingError::Validation(_))
        ));
    }

    #[test]
    fn timestamp_defaults_to_recorded_at() {
        let alice = current(0);
        let request = NewTransaction::deposit(alice.account.id, 500);
        let context = PostingContext {
            to: Some(&alice),
            ..Default::default()
        };
        let now = Utc::now();
        let plan = plan_posting(&request, context, 7, now).unwrap();
        assert_eq!(plan.transaction.timestamp(), now.trunc_subsecs(6));
        assert_eq!(plan.transaction.recorded_at(), now.trunc_subsecs(6));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: any affordable debit from a round-up account plans exactly
        /// ceil(amount) - amount into the pot.
        #[test]
        fn debit_round_up_is_ceil_minus_amount(
            amount in 1i64..1_000_000i64,
            withdrawal in any::<bool>(),
        ) {
            let balance = 2_000_000;
            let alice = snapshot(
                Account::new("Alice".into(), AccountType::Current, balance).with_round_up(true),
                balance,
            );
            let request = if withdrawal {
                NewTransaction::withdrawal(alice.account.id, amount)
            } else {
                NewTransaction::payment(alice.account.id, amount)
            };
            let context = PostingContext { from: Some(&alice), ..Default::default() };

            let plan = plan_posting(&request, context, 1, Utc::now()).unwrap();
            let ceil = (amount + 99) / 100 * 100;
            prop_assert_eq!(plan.round_up, ceil - amount);
        }

        /// Property: with round-up disabled nothing is planned for the pot.
        #[test]
        fn no_round_up_when_disabled(amount in 1i64..1_000_000i64) {
            let alice = current(2_000_000);
            let request = NewTransaction::payment(alice.account.id, amount);
            let context = PostingContext { from: Some(&alice), ..Default::default() };

            let plan = plan_posting(&request, context, 1, Utc::now()).unwrap();
            prop_assert_eq!(plan.round_up, 0);
        }
    }
}
