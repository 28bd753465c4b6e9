//! Bet placement sub-machine: `market -> selection -> stake -> confirm`.
//!
//! The bet slip in the session's flow scratch accumulates the choices. Odds
//! are taken from a fresh catalog read when the selection is made and shown
//! back on the confirmation screen; the placement call carries an
//! idempotency key minted when the stake is entered, so neither a retried
//! callback nor a second confirmation of the same slip can book a second bet.

use log::{info, warn};
use uuid::Uuid;

use crate::metrics;
use crate::services::{potential_payout, BetSelection, Event, ServiceResult};
use crate::ussd::dispatch::{MenuContext, MenuResult};
use crate::ussd::menus::betting::{self, NO_LONGER_AVAILABLE};
use crate::ussd::menus::{main_menu, money, numbered, redisplay, with_footer};
use crate::ussd::response::Reply;
use crate::ussd::session::{BetSlip, MenuId, Session, Step};
use crate::validation::{parse_choice, parse_stake, InputError};

pub const BET_NOT_PLACED: &str = "Bet not placed. Select 1 to try again.";
pub const BET_UNAVAILABLE: &str = "Betting is unavailable. Select 1 to try again.";
pub const BET_CANCELLED: &str = "Bet cancelled.";

/// Key handed to the betting adapter. Every confirmation of the same priced
/// slip reuses it, so a placement that timed out after booking is not booked
/// twice when the caller confirms again.
pub fn idempotency_key(session: &Session) -> String {
    session
        .bet_slip()
        .and_then(|slip| slip.placement_key.clone())
        .unwrap_or_else(|| format!("{}:{}", session.session_id, session.turn))
}

/// Re-read the event the slip points at.
async fn current_event(slip: &BetSlip, ctx: &MenuContext) -> ServiceResult<Option<Event>> {
    match (&slip.sport_key, &slip.event_id) {
        (Some(sport), Some(event)) => ctx.services.event(sport, event).await,
        _ => Ok(None),
    }
}

/// Back to the event list when the slip no longer resolves.
async fn event_gone(session: &mut Session, ctx: &MenuContext) -> MenuResult {
    if let Some(slip) = session.bet_slip_mut() {
        slip.clear_from_event();
    }
    session.return_to(MenuId::Events);
    Ok(betting::render_events(session, ctx).await?.with_error(NO_LONGER_AVAILABLE))
}

/// Furthest step the slip can support, never past the one requested.
fn supported_step(requested: Option<Step>, slip: &BetSlip) -> Step {
    let has_selection = slip.selection_name.is_some() && slip.odds.is_some();
    let has_stake = slip.stake.is_some() && slip.potential_payout.is_some();
    match requested {
        Some(Step::Confirm) if has_selection && has_stake => Step::Confirm,
        Some(Step::Confirm) | Some(Step::Stake) if has_selection => Step::Stake,
        Some(Step::Confirm) | Some(Step::Stake) | Some(Step::Selection) if slip.market_key.is_some() => {
            Step::Selection
        }
        _ => Step::Market,
    }
}

fn render_markets(session: &mut Session, event: &Event, ctx: &MenuContext) -> Reply {
    session.step = Some(Step::Market);
    let shown: Vec<_> = event.markets.iter().take(ctx.betting.max_markets).collect();
    let ids: Vec<String> = shown.iter().map(|m| m.key.clone()).collect();
    session.set_listing(&ids);
    if shown.is_empty() {
        return with_footer(format!("{}\nNo markets open.", event.name));
    }
    let lines = numbered(shown.iter().map(|m| m.name.as_str()));
    with_footer(format!("{}\nChoose market:\n{}", event.name, lines))
}

pub async fn render(session: &mut Session, ctx: &MenuContext) -> MenuResult {
    let Some(slip) = session.bet_slip().cloned() else {
        session.return_to(MenuId::Sports);
        return betting::render_sports(session, ctx).await;
    };
    let step = supported_step(session.step, &slip);
    session.step = Some(step);

    match (step, &slip.selection_name, slip.odds, slip.stake, slip.potential_payout) {
        (Step::Confirm, Some(name), Some(odds), Some(stake), Some(payout)) => Ok(Reply::con(format!(
            "Confirm bet\n{}\n{} @ {}\nStake: {}\nPayout: {}\n1. Confirm\n2. Change stake\n0. Cancel",
            slip.event_name.as_deref().unwrap_or_default(),
            name,
            odds,
            money(ctx, stake),
            money(ctx, payout)
        ))),
        (Step::Stake, Some(name), Some(odds), _, _) => Ok(with_footer(format!(
            "{} @ {}\nEnter stake (min {}):",
            name,
            odds,
            money(ctx, ctx.betting.min_stake)
        ))),
        (Step::Selection, ..) => {
            let Some(event) = current_event(&slip, ctx).await? else {
                return event_gone(session, ctx).await;
            };
            let Some(market) = event
                .markets
                .iter()
                .find(|m| Some(&m.key) == slip.market_key.as_ref())
            else {
                return Ok(render_markets(session, &event, ctx));
            };
            let shown: Vec<_> = market.selections.iter().take(ctx.betting.max_list_items).collect();
            let ids: Vec<String> = shown.iter().map(|s| s.id.clone()).collect();
            session.set_listing(&ids);
            let lines = numbered(shown.iter().map(|s| format!("{} @ {}", s.name, s.odds)));
            Ok(with_footer(format!("{}\n{}", market.name, lines)))
        }
        _ => {
            let Some(event) = current_event(&slip, ctx).await? else {
                return event_gone(session, ctx).await;
            };
            Ok(render_markets(session, &event, ctx))
        }
    }
}

pub async fn choose_market(session: &mut Session, input: &str, ctx: &MenuContext) -> MenuResult {
    let listing = session.listing();
    let index = match parse_choice(input, listing.len()) {
        Ok(i) => i,
        Err(e) => return redisplay(session, ctx, e).await,
    };
    let Some(slip) = session.bet_slip().cloned() else {
        return render(session, ctx).await;
    };
    let Some(event) = current_event(&slip, ctx).await? else {
        return event_gone(session, ctx).await;
    };
    let Some(market) = event.markets.into_iter().find(|m| m.key == listing[index]) else {
        return redisplay(session, ctx, NO_LONGER_AVAILABLE).await;
    };
    if let Some(slip) = session.bet_slip_mut() {
        slip.clear_from_market();
        slip.market_key = Some(market.key);
        slip.market_name = Some(market.name);
    }
    session.step = Some(Step::Selection);
    render(session, ctx).await
}

pub async fn choose_selection(session: &mut Session, input: &str, ctx: &MenuContext) -> MenuResult {
    let listing = session.listing();
    let index = match parse_choice(input, listing.len()) {
        Ok(i) => i,
        Err(e) => return redisplay(session, ctx, e).await,
    };
    let Some(slip) = session.bet_slip().cloned() else {
        return render(session, ctx).await;
    };
    let Some(event) = current_event(&slip, ctx).await? else {
        return event_gone(session, ctx).await;
    };
    let selection = event
        .markets
        .into_iter()
        .find(|m| Some(&m.key) == slip.market_key.as_ref())
        .and_then(|m| m.selections.into_iter().find(|s| s.id == listing[index]));
    let Some(selection) = selection else {
        return redisplay(session, ctx, NO_LONGER_AVAILABLE).await;
    };
    if let Some(slip) = session.bet_slip_mut() {
        slip.clear_from_selection();
        slip.selection_id = Some(selection.id);
        slip.selection_name = Some(selection.name);
        slip.odds = Some(selection.odds);
    }
    session.step = Some(Step::Stake);
    render(session, ctx).await
}

pub async fn enter_stake(session: &mut Session, input: &str, ctx: &MenuContext) -> MenuResult {
    let stake = match parse_stake(input, ctx.betting.min_stake, ctx.betting.max_stake) {
        Ok(stake) => stake,
        Err(e) => return redisplay(session, ctx, e).await,
    };
    let Some(user_id) = session.user_id.clone() else {
        session.go_home();
        return Ok(main_menu::render(ctx));
    };
    let balance = ctx.services.balance(&user_id).await?;
    if stake > balance {
        let message = format!("Insufficient balance. Your balance is {}.", money(ctx, balance));
        return redisplay(session, ctx, message).await;
    }
    let Some(odds) = session.bet_slip().and_then(|s| s.odds) else {
        session.step = Some(Step::Selection);
        return render(session, ctx).await;
    };
    if let Some(slip) = session.bet_slip_mut() {
        slip.stake = Some(stake);
        slip.potential_payout = Some(potential_payout(stake, odds));
        slip.placement_key = Some(Uuid::new_v4().simple().to_string());
    }
    session.step = Some(Step::Confirm);
    render(session, ctx).await
}

pub async fn confirm(session: &mut Session, input: &str, ctx: &MenuContext) -> MenuResult {
    match input {
        "1" => place(session, ctx).await,
        "2" => {
            if let Some(slip) = session.bet_slip_mut() {
                slip.clear_stake();
            }
            session.step = Some(Step::Stake);
            render(session, ctx).await
        }
        "0" => {
            info!("session {} cancelled bet slip", session.session_id);
            session.clear_flow();
            session.return_to(MenuId::BettingMenu);
            Ok(betting::render().with_notice(BET_CANCELLED))
        }
        _ => redisplay(session, ctx, InputError::InvalidChoice).await,
    }
}

async fn place(session: &mut Session, ctx: &MenuContext) -> MenuResult {
    let Some(user_id) = session.user_id.clone() else {
        session.go_home();
        return Ok(main_menu::render(ctx));
    };
    let slip = session.bet_slip().cloned().unwrap_or_default();
    let (
        Some(event_id),
        Some(event_name),
        Some(market_key),
        Some(selection_id),
        Some(selection_name),
        Some(odds),
        Some(stake),
    ) = (
        slip.event_id,
        slip.event_name,
        slip.market_key,
        slip.selection_id,
        slip.selection_name,
        slip.odds,
        slip.stake,
    )
    else {
        session.step = Some(Step::Stake);
        return render(session, ctx).await;
    };

    let selection = BetSelection {
        event_id,
        event_name,
        market_key,
        selection_id,
        selection_name,
        odds,
        idempotency_key: idempotency_key(session),
    };

    match ctx.services.place_bet(&user_id, &selection, stake).await {
        Ok(Some(receipt)) => {
            metrics::inc_bets_placed();
            info!(
                "session {} placed bet {} stake {} odds {}",
                session.session_id, receipt.reference, receipt.stake, receipt.odds
            );
            session.clear_flow();
            session.reset_to(MenuId::AccountMenu);
            Ok(Reply::end(format!(
                "Bet placed!\nRef: {}\n{} @ {}\nStake: {}\nPotential payout: {}",
                receipt.reference,
                selection.selection_name,
                receipt.odds,
                money(ctx, receipt.stake),
                money(ctx, receipt.potential_payout)
            )))
        }
        Ok(None) => {
            warn!("session {} bet refused by betting service", session.session_id);
            Ok(render(session, ctx).await?.with_error(BET_NOT_PLACED))
        }
        Err(e) => {
            // Never retried here; the caller must confirm again.
            warn!("session {} bet placement failed: {}", session.session_id, e);
            Ok(render(session, ctx).await?.with_error(BET_UNAVAILABLE))
        }
    }
}
