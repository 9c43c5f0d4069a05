//! Ledger properties checked against the in-memory store
//!
//! Run with: cargo test --test ledger_properties

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;

use loyalty_mart::ledger::{
    ApplyOutcome, LedgerError, LedgerStore, MemoryLedger, SubmitOutcome, UserStore,
    WithdrawOutcome,
};
use loyalty_mart::models::{OrderStatus, OrderTransition, OrderUpdate, UserId};
use loyalty_mart::validation::OrderNumber;

fn number(raw: &str) -> OrderNumber {
    OrderNumber::parse(raw).unwrap()
}

/// Submit `order` for `user` and settle it with `amount`
async fn credit(ledger: &MemoryLedger, user: UserId, order: &str, amount: Decimal) {
    ledger.submit_order(user, &number(order)).await.unwrap();
    let outcome = ledger
        .apply_order_result(&OrderUpdate::new(order, OrderTransition::processed(amount)))
        .await
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::Applied);
}

/// current == sum(processed accruals) - sum(withdrawals)
async fn assert_accounting_identity(ledger: &MemoryLedger, user: UserId) {
    let accrued: Decimal = ledger
        .orders_of(user)
        .await
        .unwrap()
        .iter()
        .filter(|o| o.status == OrderStatus::Processed)
        .filter_map(|o| o.accrual)
        .sum();
    let withdrawn: Decimal = ledger
        .withdrawals_of(user)
        .await
        .unwrap()
        .iter()
        .map(|w| w.sum)
        .sum();
    let balance = ledger.balance_of(user).await.unwrap();

    assert_eq!(balance.current, accrued - withdrawn);
    assert_eq!(balance.withdrawn, withdrawn);
    assert!(balance.current >= Decimal::ZERO);
}

#[tokio::test]
async fn test_settled_order_credits_exact_amount() {
    let ledger = MemoryLedger::new();
    let alice = ledger.create_user("alice", "h").await.unwrap().unwrap();

    credit(&ledger, alice, "79927398713", dec!(500.50)).await;

    let order = ledger.order("79927398713").unwrap();
    assert_eq!(order.status, OrderStatus::Processed);
    assert_eq!(order.accrual, Some(dec!(500.50)));

    let balance = ledger.balance_of(alice).await.unwrap();
    assert_eq!(balance.current, dec!(500.50));
    assert_eq!(balance.withdrawn, Decimal::ZERO);
}

#[tokio::test]
async fn test_applying_same_result_twice_credits_once() {
    let ledger = MemoryLedger::new();
    let alice = ledger.create_user("alice", "h").await.unwrap().unwrap();
    credit(&ledger, alice, "79927398713", dec!(42)).await;

    let again = ledger
        .apply_order_result(&OrderUpdate::new(
            "79927398713",
            OrderTransition::processed(dec!(42)),
        ))
        .await
        .unwrap();
    assert_eq!(again, ApplyOutcome::AlreadyTerminal);

    let flipped = ledger
        .apply_order_result(&OrderUpdate::new("79927398713", OrderTransition::invalid()))
        .await
        .unwrap();
    assert_eq!(flipped, ApplyOutcome::AlreadyTerminal);

    assert_eq!(ledger.balance_of(alice).await.unwrap().current, dec!(42));
    assert_eq!(
        ledger.order("79927398713").unwrap().status,
        OrderStatus::Processed
    );
}

#[tokio::test]
async fn test_zero_accrual_still_settles() {
    let ledger = MemoryLedger::new();
    let alice = ledger.create_user("alice", "h").await.unwrap().unwrap();
    credit(&ledger, alice, "18", Decimal::ZERO).await;

    let again = ledger
        .apply_order_result(&OrderUpdate::new("18", OrderTransition::processed(dec!(5))))
        .await
        .unwrap();
    assert_eq!(again, ApplyOutcome::AlreadyTerminal);
    assert_eq!(ledger.balance_of(alice).await.unwrap().current, Decimal::ZERO);
}

#[tokio::test]
async fn test_rejected_credits_keep_balance_in_range() {
    let ledger = MemoryLedger::new();
    let alice = ledger.create_user("alice", "h").await.unwrap().unwrap();
    credit(&ledger, alice, "79927398713", dec!(100)).await;
    ledger.submit_order(alice, &number("34")).await.unwrap();

    let negative = OrderUpdate::new("34", OrderTransition::processed(dec!(-50)));
    assert!(matches!(
        ledger.apply_order_result(&negative).await,
        Err(LedgerError::InvalidAccrual(_))
    ));

    let huge = OrderUpdate::new(
        "34",
        OrderTransition::processed(Decimal::MAX / dec!(2) + dec!(1)),
    );
    assert!(ledger.apply_order_result(&huge).await.is_err());

    assert_eq!(ledger.order("34").unwrap().status, OrderStatus::New);
    assert_eq!(ledger.balance_of(alice).await.unwrap().current, dec!(100));
    assert_accounting_identity(&ledger, alice).await;
}

#[tokio::test]
async fn test_invalid_result_leaves_balance_alone() {
    let ledger = MemoryLedger::new();
    let alice = ledger.create_user("alice", "h").await.unwrap().unwrap();
    ledger.submit_order(alice, &number("26")).await.unwrap();

    let outcome = ledger
        .apply_order_result(&OrderUpdate::new("26", OrderTransition::invalid()))
        .await
        .unwrap();
    assert_eq!(outcome, ApplyOutcome::Applied);

    let order = ledger.order("26").unwrap();
    assert_eq!(order.status, OrderStatus::Invalid);
    assert_eq!(order.accrual, None);
    assert_eq!(ledger.balance_of(alice).await.unwrap().current, Decimal::ZERO);
}

#[tokio::test]
async fn test_withdrawal_over_balance_changes_nothing() {
    let ledger = MemoryLedger::new();
    let alice = ledger.create_user("alice", "h").await.unwrap().unwrap();
    credit(&ledger, alice, "79927398713", dec!(100.00)).await;

    let outcome = ledger
        .withdraw(alice, &number("2377225624"), dec!(150.00))
        .await
        .unwrap();
    assert_eq!(outcome, WithdrawOutcome::InsufficientFunds);

    let balance = ledger.balance_of(alice).await.unwrap();
    assert_eq!(balance.current, dec!(100.00));
    assert_eq!(balance.withdrawn, Decimal::ZERO);
    assert!(ledger.withdrawals_of(alice).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_racing_withdrawals_exactly_one_wins() {
    let ledger = Arc::new(MemoryLedger::new());
    let alice = ledger.create_user("alice", "h").await.unwrap().unwrap();
    credit(&ledger, alice, "79927398713", dec!(100)).await;

    let handles: Vec<_> = ["2377225624", "49927398716"]
        .into_iter()
        .map(|reference| {
            let ledger = ledger.clone();
            tokio::spawn(async move {
                ledger
                    .withdraw(alice, &number(reference), dec!(80))
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut accepted = 0;
    for handle in handles {
        if handle.await.unwrap() == WithdrawOutcome::Accepted {
            accepted += 1;
        }
    }

    assert_eq!(accepted, 1, "exactly one withdrawal crosses the threshold");
    let balance = ledger.balance_of(alice).await.unwrap();
    assert_eq!(balance.current, dec!(20));
    assert_eq!(balance.withdrawn, dec!(80));
}

#[tokio::test]
async fn test_duplicate_submission_keeps_one_row() {
    let ledger = MemoryLedger::new();
    let alice = ledger.create_user("alice", "h").await.unwrap().unwrap();
    let bob = ledger.create_user("bob", "h").await.unwrap().unwrap();
    let order = number("12345678903");

    assert_eq!(
        ledger.submit_order(alice, &order).await.unwrap(),
        SubmitOutcome::Created
    );
    assert_eq!(
        ledger.submit_order(alice, &order).await.unwrap(),
        SubmitOutcome::AlreadyOwned
    );
    assert_eq!(
        ledger.submit_order(alice, &order).await.unwrap(),
        SubmitOutcome::AlreadyOwned
    );
    assert_eq!(
        ledger.submit_order(bob, &order).await.unwrap(),
        SubmitOutcome::OwnedByOther
    );

    assert_eq!(ledger.order_count(), 1);
    assert_eq!(ledger.order("12345678903").unwrap().user_id, alice);
    assert!(ledger.orders_of(bob).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_accounting_identity_across_mixed_history() {
    let ledger = MemoryLedger::new();
    let alice = ledger.create_user("alice", "h").await.unwrap().unwrap();
    let bob = ledger.create_user("bob", "h").await.unwrap().unwrap();

    credit(&ledger, alice, "79927398713", dec!(500.50)).await;
    credit(&ledger, alice, "34", dec!(19.99)).await;
    credit(&ledger, bob, "42", dec!(7)).await;
    ledger.submit_order(alice, &number("59")).await.unwrap();
    ledger
        .apply_order_result(&OrderUpdate::new("59", OrderTransition::processing()))
        .await
        .unwrap();

    ledger
        .withdraw(alice, &number("2377225624"), dec!(120.49))
        .await
        .unwrap();
    ledger
        .withdraw(bob, &number("67"), dec!(7))
        .await
        .unwrap();
    assert_eq!(
        ledger.withdraw(bob, &number("75"), dec!(0.01)).await.unwrap(),
        WithdrawOutcome::InsufficientFunds
    );

    assert_accounting_identity(&ledger, alice).await;
    assert_accounting_identity(&ledger, bob).await;
    assert_eq!(ledger.balance_of(alice).await.unwrap().current, dec!(400.00));
    assert_eq!(ledger.balance_of(bob).await.unwrap().current, Decimal::ZERO);
}

#[tokio::test]
async fn test_lists_are_in_submission_order() {
    let ledger = MemoryLedger::new();
    let alice = ledger.create_user("alice", "h").await.unwrap().unwrap();
    for raw in ["83", "91", "109"] {
        ledger.submit_order(alice, &number(raw)).await.unwrap();
    }

    let numbers: Vec<String> = ledger
        .orders_of(alice)
        .await
        .unwrap()
        .into_iter()
        .map(|o| o.number)
        .collect();
    assert_eq!(numbers, vec!["83", "91", "109"]);
}
