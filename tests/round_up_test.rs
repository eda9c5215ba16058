mod common;

use anyhow::Result;
use common::{StandardAccounts, balance_of, pay, pot_of, test_service};
use creditunion::application::AppError;
use creditunion::domain::{AccountType, NewAccount, NewTransaction, round_up_amount};

#[tokio::test]
async fn test_payment_rounds_up_into_pot() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let accounts = StandardAccounts::create(&service).await?;

    let tx = pay(&service, &accounts.alice, &accounts.shop, 1_240).await?;

    assert_eq!(tx.round_up(), 60);
    assert_eq!(pot_of(&service, &accounts.alice).await?, 60);
    // Pot money is no longer spendable
    assert_eq!(balance_of(&service, &accounts.alice).await?, 10_000 - 1_240 - 60);
    // The payee only receives the payment itself
    assert_eq!(balance_of(&service, &accounts.shop).await?, 1_240);

    Ok(())
}

#[tokio::test]
async fn test_pot_grows_by_exact_round_up_over_many_payments() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let accounts = StandardAccounts::create(&service).await?;

    let amounts = [1, 99, 100, 101, 250, 1_999, 37];
    let mut expected_pot = 0;
    for amount in amounts {
        pay(&service, &accounts.alice, &accounts.shop, amount).await?;
        expected_pot += round_up_amount(amount);
        assert_eq!(pot_of(&service, &accounts.alice).await?, expected_pot);
    }

    let spent: i64 = amounts.iter().sum();
    assert_eq!(
        balance_of(&service, &accounts.alice).await?,
        10_000 - spent - expected_pot
    );
    assert!(service.check_integrity().await?.is_healthy());

    Ok(())
}

#[tokio::test]
async fn test_whole_pound_payment_adds_nothing() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let accounts = StandardAccounts::create(&service).await?;

    let tx = pay(&service, &accounts.alice, &accounts.shop, 500).await?;

    assert_eq!(tx.round_up(), 0);
    assert_eq!(pot_of(&service, &accounts.alice).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_withdrawal_rounds_up_but_transfer_does_not() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let accounts = StandardAccounts::create(&service).await?;

    let withdrawal = service
        .post_transaction(NewTransaction::withdrawal(accounts.alice.id, 1_010))
        .await?;
    assert_eq!(withdrawal.round_up(), 90);

    let transfer = service
        .post_transaction(NewTransaction::transfer(
            accounts.alice.id,
            accounts.bob.id,
            1_010,
        ))
        .await?;
    assert_eq!(transfer.round_up(), 0);

    assert_eq!(pot_of(&service, &accounts.alice).await?, 90);

    Ok(())
}

#[tokio::test]
async fn test_round_up_counts_towards_required_funds() -> Result<()> {
    let (service, _temp) = test_service().await?;

    let dan = service
        .create_account(NewAccount::new("Dan", AccountType::Current, 1_000).round_up(true))
        .await?;

    // 9.50 + 0.50 round-up fits exactly
    service
        .post_transaction(NewTransaction::withdrawal(dan.id, 950))
        .await?;
    assert_eq!(balance_of(&service, &dan).await?, 0);

    let result = service
        .post_transaction(NewTransaction::deposit(dan.id, 999))
        .await;
    assert!(result.is_ok());

    // 9.99 balance, 9.99 + 0.01 required
    let result = service
        .post_transaction(NewTransaction::withdrawal(dan.id, 999))
        .await;
    assert!(matches!(
        result,
        Err(AppError::InsufficientFunds {
            balance: 999,
            required: 1_000,
            ..
        })
    ));
    assert_eq!(pot_of(&service, &dan).await?, 50);

    Ok(())
}

#[tokio::test]
async fn test_disabled_round_up_adds_nothing() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let accounts = StandardAccounts::create(&service).await?;

    let tx = pay(&service, &accounts.bob, &accounts.shop, 1_240).await?;

    assert_eq!(tx.round_up(), 0);
    assert_eq!(pot_of(&service, &accounts.bob).await?, 0);

    Ok(())
}

#[tokio::test]
async fn test_toggle_round_up() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let accounts = StandardAccounts::create(&service).await?;

    let bob = service.toggle_round_up("Bob").await?;
    assert!(bob.round_up_enabled);
    pay(&service, &accounts.bob, &accounts.shop, 110).await?;
    assert_eq!(pot_of(&service, &accounts.bob).await?, 90);

    let bob = service.toggle_round_up("Bob").await?;
    assert!(!bob.round_up_enabled);
    pay(&service, &accounts.bob, &accounts.shop, 110).await?;
    assert_eq!(pot_of(&service, &accounts.bob).await?, 90);

    let bob = service.set_round_up("Bob", true).await?;
    assert!(bob.round_up_enabled);
    assert!(service.get_account("Bob").await?.round_up_enabled);

    Ok(())
}

#[tokio::test]
async fn test_reclaim_returns_pot_to_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let accounts = StandardAccounts::create(&service).await?;

    pay(&service, &accounts.alice, &accounts.shop, 1_240).await?;
    pay(&service, &accounts.alice, &accounts.shop, 330).await?;
    assert_eq!(pot_of(&service, &accounts.alice).await?, 130);

    let reclaimed = service.reclaim_round_up("Alice").await?;

    assert_eq!(reclaimed, 130);
    assert_eq!(pot_of(&service, &accounts.alice).await?, 0);
    assert_eq!(
        balance_of(&service, &accounts.alice).await?,
        10_000 - 1_240 - 330
    );

    let reclaims = service.list_reclaims("Alice").await?;
    assert_eq!(reclaims.len(), 1);
    assert_eq!(reclaims[0].amount, 130);
    assert_eq!(reclaims[0].account_id, accounts.alice.id);

    // The ledger still explains the pot after a reclaim
    pay(&service, &accounts.alice, &accounts.shop, 1_001).await?;
    assert_eq!(pot_of(&service, &accounts.alice).await?, 99);
    assert!(service.check_integrity().await?.is_healthy());

    Ok(())
}

#[tokio::test]
async fn test_reclaim_of_empty_pot_records_nothing() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardAccounts::create(&service).await?;

    assert_eq!(service.reclaim_round_up("Alice").await?, 0);
    assert!(service.list_reclaims("Alice").await?.is_empty());

    Ok(())
}
