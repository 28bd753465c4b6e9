mod common;

use betline::ussd::session::{FlowScratch, MenuId, Step};
use common::{harness, Caller};
use rust_decimal::Decimal;

/// Login, then walk betting -> sports -> first sport -> first event -> first market -> first selection.
async fn to_stake_prompt(caller: &mut Caller<'_>) -> String {
    caller.login_as_jane().await;
    let betting = caller.press("2").await;
    assert!(betting.contains("1. Sports"), "unexpected: {}", betting);
    let sports = caller.press("1").await;
    assert!(sports.contains("Choose a sport:"), "unexpected: {}", sports);
    assert!(sports.contains("1. Football"));
    let events = caller.press("1").await;
    assert!(events.contains("1. Arsenal v Chelsea"), "unexpected: {}", events);
    let markets = caller.press("1").await;
    assert!(markets.contains("1. Match Result"), "unexpected: {}", markets);
    let selections = caller.press("1").await;
    assert!(selections.contains("1. Arsenal @ 2.10"), "unexpected: {}", selections);
    caller.press("1").await
}

#[tokio::test]
async fn happy_path_books_one_bet() {
    let h = harness();
    let mut caller = Caller::new(&h, "bet-happy");

    let stake_prompt = to_stake_prompt(&mut caller).await;
    assert!(stake_prompt.contains("Arsenal @ 2.10"), "unexpected: {}", stake_prompt);
    assert!(stake_prompt.contains("Enter stake (min KES 10.00):"));

    let confirm = caller.press("100").await;
    assert!(confirm.starts_with("CON Confirm bet"), "unexpected: {}", confirm);
    assert!(confirm.contains("Stake: KES 100.00"));
    assert!(confirm.contains("Payout: KES 210.00"));

    let placed = caller.press("1").await;
    assert!(placed.starts_with("END Bet placed!"), "unexpected: {}", placed);
    assert!(placed.contains("Ref: BL"));
    assert!(placed.contains("Stake: KES 100.00"));
    assert!(placed.contains("Potential payout: KES 210.00"));

    let session = caller.session();
    let user_id = session.user_id.clone().expect("signed in");
    assert!(!session.is_active, "terminal reply should end the session");
    assert_eq!(h.backend.bet_count(&user_id), 1);
    let balance = h.server.context().services.balance(&user_id).await.expect("balance");
    assert_eq!(balance, Decimal::new(900, 0));
}

#[tokio::test]
async fn insufficient_balance_stays_on_stake_entry() {
    let h = harness();
    let mut caller = Caller::new(&h, "bet-broke");
    to_stake_prompt(&mut caller).await;

    let reply = caller.press("5000").await;
    assert!(reply.starts_with("CON "), "unexpected: {}", reply);
    assert!(reply.contains("Insufficient balance"), "unexpected: {}", reply);
    assert!(reply.contains("KES 1000.00"));

    let session = caller.session();
    assert_eq!(session.current_menu, MenuId::PlaceBet);
    assert_eq!(session.step, Some(Step::Stake));
    assert_eq!(h.backend.bet_count(session.user_id.as_deref().unwrap_or_default()), 0);
}

#[tokio::test]
async fn stake_below_minimum_is_rejected() {
    let h = harness();
    let mut caller = Caller::new(&h, "bet-min");
    to_stake_prompt(&mut caller).await;

    let reply = caller.press("5").await;
    assert!(reply.contains("Minimum stake is"), "unexpected: {}", reply);
    assert_eq!(caller.session().step, Some(Step::Stake));
}

#[tokio::test]
async fn change_stake_then_cancel() {
    let h = harness();
    let mut caller = Caller::new(&h, "bet-cancel");
    to_stake_prompt(&mut caller).await;
    caller.press("100").await;

    let again = caller.press("2").await;
    assert!(again.contains("Enter stake"), "unexpected: {}", again);
    let confirm = caller.press("50").await;
    assert!(confirm.contains("Stake: KES 50.00"), "unexpected: {}", confirm);
    assert!(confirm.contains("Payout: KES 105.00"));

    let cancelled = caller.press("0").await;
    assert!(cancelled.starts_with("CON Bet cancelled."), "unexpected: {}", cancelled);
    assert!(cancelled.contains("1. Sports"));

    let session = caller.session();
    assert_eq!(session.current_menu, MenuId::BettingMenu);
    assert!(session.flow.is_none());
    assert_eq!(h.backend.bet_count(session.user_id.as_deref().unwrap_or_default()), 0);
}

#[tokio::test]
async fn back_from_selection_keeps_bet_slip() {
    let h = harness();
    let mut caller = Caller::new(&h, "bet-back");
    caller.login_as_jane().await;
    for key in ["2", "1", "1", "1", "1"] {
        caller.press(key).await;
    }
    assert_eq!(caller.session().step, Some(Step::Selection));

    let reply = caller.press("0").await;
    assert!(reply.contains("1. Arsenal v Chelsea"), "unexpected: {}", reply);
    let session = caller.session();
    assert_eq!(session.current_menu, MenuId::Events);
    assert!(matches!(session.flow, Some(FlowScratch::Bet(_))));
}

#[tokio::test]
async fn betting_requires_login() {
    let h = harness();
    let mut caller = Caller::new(&h, "bet-anon");
    caller.dial().await;

    // "2" on the main menu is registration, never the betting menu.
    let reply = caller.press("2").await;
    assert!(reply.contains("Register"), "unexpected: {}", reply);
    assert_ne!(caller.session().current_menu, MenuId::BettingMenu);
}

#[tokio::test]
async fn history_lists_placed_bet() {
    let h = harness();
    let mut caller = Caller::new(&h, "bet-history-1");
    to_stake_prompt(&mut caller).await;
    caller.press("100").await;
    caller.press("1").await;

    let mut viewer = Caller::new(&h, "bet-history-2");
    viewer.login_as_jane().await;
    let history = viewer.press("3").await;
    assert!(history.contains("Bet History"), "unexpected: {}", history);
    assert!(history.contains("Arsenal"));
    assert!(history.contains("KES 100.00"));
}
