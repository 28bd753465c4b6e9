//! Betting menu plus the sport and event lists that lead into placement.

use crate::ussd::dispatch::{MenuContext, MenuResult};
use crate::ussd::menus::{account, numbered, placement, redisplay, with_footer};
use crate::ussd::response::Reply;
use crate::ussd::session::{BetSlip, FlowScratch, MenuId, Session, Step};
use crate::validation::{parse_choice, InputError};

pub const NO_LONGER_AVAILABLE: &str = "That option is no longer available.";

pub fn render() -> Reply {
    with_footer("Betting\n1. Sports\n2. Active Bets\n3. Bet History")
}

pub async fn handle(session: &mut Session, input: &str, ctx: &MenuContext) -> MenuResult {
    match input {
        "1" => {
            session.navigate_to(MenuId::Sports);
            render_sports(session, ctx).await
        }
        "2" => {
            session.navigate_to(MenuId::ActiveBets);
            account::render_bets(session, ctx).await
        }
        "3" => {
            session.navigate_to(MenuId::BetHistory);
            account::render_bets(session, ctx).await
        }
        _ => redisplay(session, ctx, InputError::InvalidChoice).await,
    }
}

pub async fn render_sports(session: &mut Session, ctx: &MenuContext) -> MenuResult {
    let sports = ctx.services.sports().await?;
    let shown: Vec<_> = sports.into_iter().take(ctx.betting.max_list_items).collect();
    let ids: Vec<String> = shown.iter().map(|s| s.key.clone()).collect();
    session.set_listing(&ids);
    if shown.is_empty() {
        return Ok(with_footer("No sports available right now."));
    }
    Ok(with_footer(format!(
        "Choose a sport:\n{}",
        numbered(shown.iter().map(|s| s.name.as_str()))
    )))
}

pub async fn choose_sport(session: &mut Session, input: &str, ctx: &MenuContext) -> MenuResult {
    let listing = session.listing();
    let index = match parse_choice(input, listing.len()) {
        Ok(i) => i,
        Err(e) => return redisplay(session, ctx, e).await,
    };
    let sports = ctx.services.sports().await?;
    let Some(sport) = sports.into_iter().find(|s| s.key == listing[index]) else {
        return redisplay(session, ctx, NO_LONGER_AVAILABLE).await;
    };
    session.flow = Some(FlowScratch::Bet(BetSlip {
        sport_key: Some(sport.key),
        sport_name: Some(sport.name),
        ..BetSlip::default()
    }));
    session.navigate_to(MenuId::Events);
    render_events(session, ctx).await
}

pub async fn render_events(session: &mut Session, ctx: &MenuContext) -> MenuResult {
    let Some((sport_key, sport_name)) = session
        .bet_slip()
        .and_then(|slip| Some((slip.sport_key.clone()?, slip.sport_name.clone().unwrap_or_default())))
    else {
        // No sport chosen in this flow; go pick one.
        session.return_to(MenuId::Sports);
        return render_sports(session, ctx).await;
    };
    let events = ctx.services.events(&sport_key).await?;
    let shown: Vec<_> = events.into_iter().take(ctx.betting.max_list_items).collect();
    let ids: Vec<String> = shown.iter().map(|e| e.id.clone()).collect();
    session.set_listing(&ids);
    if shown.is_empty() {
        return Ok(with_footer(format!("No upcoming {} events.", sport_name)));
    }
    let lines = numbered(
        shown
            .iter()
            .map(|e| format!("{} {}", e.name, e.starts_at.format("%d/%m %H:%M"))),
    );
    Ok(with_footer(format!("{}\n{}", sport_name, lines)))
}

pub async fn choose_event(session: &mut Session, input: &str, ctx: &MenuContext) -> MenuResult {
    let listing = session.listing();
    let index = match parse_choice(input, listing.len()) {
        Ok(i) => i,
        Err(e) => return redisplay(session, ctx, e).await,
    };
    let Some(sport_key) = session.bet_slip().and_then(|s| s.sport_key.clone()) else {
        return render_events(session, ctx).await;
    };
    let Some(event) = ctx.services.event(&sport_key, &listing[index]).await? else {
        return redisplay(session, ctx, NO_LONGER_AVAILABLE).await;
    };
    if let Some(slip) = session.bet_slip_mut() {
        slip.clear_from_event();
        slip.event_id = Some(event.id);
        slip.event_name = Some(event.name);
    }
    session.navigate_to(MenuId::PlaceBet);
    session.step = Some(Step::Market);
    placement::render(session, ctx).await
}
