//! Menu handlers and screen rendering.
//!
//! Every screen is rendered from the session alone (plus adapter calls), so
//! a redisplay after an error, a back-navigation and a fresh arrival all
//! produce the same text. Lists are numbered from 1 and capped by the
//! betting config; the ids shown are remembered in the session listing so a
//! numeric choice maps to exactly what the caller saw.

use rust_decimal::Decimal;

use super::dispatch::{MenuContext, MenuResult};
use super::response::Reply;
use super::session::{FlowScratch, MenuId, Session};
use crate::validation::InputError;

pub mod account;
pub mod auth;
pub mod betting;
pub mod help;
pub mod main_menu;
pub mod placement;

/// Footer shown on every screen below the main and account menus.
pub const NAV_FOOTER: &str = "0. Back  *. Home";

/// Render whatever screen the session currently points at.
pub async fn render_menu(session: &mut Session, ctx: &MenuContext) -> MenuResult {
    retain_flow(session);
    match session.current_menu {
        MenuId::MainMenu => Ok(main_menu::render(ctx)),
        MenuId::Login | MenuId::Register => Ok(auth::render(session)),
        MenuId::AccountMenu => Ok(account::render(session)),
        MenuId::Balance => account::render_balance(session, ctx).await,
        MenuId::ActiveBets | MenuId::BetHistory => account::render_bets(session, ctx).await,
        MenuId::Help => Ok(help::render(ctx)),
        MenuId::BettingMenu => Ok(betting::render()),
        MenuId::Sports => betting::render_sports(session, ctx).await,
        MenuId::Events => betting::render_events(session, ctx).await,
        MenuId::PlaceBet => placement::render(session, ctx).await,
    }
}

/// Re-render the current screen with an inline error line.
pub async fn redisplay(session: &mut Session, ctx: &MenuContext, error: impl std::fmt::Display) -> MenuResult {
    Ok(render_menu(session, ctx).await?.with_error(error))
}

/// Read-only screens: the only valid keys are the global ones.
pub async fn view_only(session: &mut Session, _input: &str, ctx: &MenuContext) -> MenuResult {
    redisplay(session, ctx, InputError::InvalidChoice).await
}

/// Drop flow scratch that does not belong to the current menu.
fn retain_flow(session: &mut Session) {
    let keep = match (&session.flow, session.current_menu) {
        (Some(FlowScratch::Login(_)), MenuId::Login) => true,
        (Some(FlowScratch::Register(_)), MenuId::Register) => true,
        (Some(FlowScratch::Bet(_)), MenuId::Sports | MenuId::Events | MenuId::PlaceBet) => true,
        (None, _) => true,
        _ => false,
    };
    if !keep {
        session.clear_flow();
    }
}

/// `"1. First\n2. Second"`
pub(crate) fn numbered<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {}", i + 1, item.as_ref()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn money(ctx: &MenuContext, amount: Decimal) -> String {
    format!("{} {:.2}", ctx.betting.currency, amount)
}

/// Screen body followed by the navigation footer.
pub(crate) fn with_footer(body: impl AsRef<str>) -> Reply {
    Reply::con(format!("{}\n{}", body.as_ref(), NAV_FOOTER))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbered_list_starts_at_one() {
        assert_eq!(numbered(["Football", "Tennis"]), "1. Football\n2. Tennis");
        assert_eq!(numbered(Vec::<String>::new()), "");
    }

    #[test]
    fn flow_scratch_is_dropped_outside_its_menus() {
        let mut s = Session::new("s1", "254700000001", "*384#", None);
        s.flow = Some(FlowScratch::Bet(Default::default()));
        s.current_menu = MenuId::Events;
        retain_flow(&mut s);
        assert!(s.bet_slip().is_some());

        s.current_menu = MenuId::BettingMenu;
        retain_flow(&mut s);
        assert!(s.flow.is_none());
    }
}
