use log::info;

use crate::services::BetFilter;
use crate::ussd::dispatch::{MenuContext, MenuResult};
use crate::ussd::menus::{betting, help, money, redisplay, with_footer};
use crate::ussd::response::Reply;
use crate::ussd::session::{MenuId, Session};
use crate::validation::InputError;

pub fn render(session: &Session) -> Reply {
    Reply::con(format!(
        "Welcome {}!\n1. Check Balance\n2. Place Bet\n3. Bet History\n4. Help\n0. Logout",
        session.first_name()
    ))
}

pub async fn handle(session: &mut Session, input: &str, ctx: &MenuContext) -> MenuResult {
    match input {
        "1" => {
            session.navigate_to(MenuId::Balance);
            render_balance(session, ctx).await
        }
        "2" => {
            session.navigate_to(MenuId::BettingMenu);
            Ok(betting::render())
        }
        "3" => {
            session.navigate_to(MenuId::BetHistory);
            render_bets(session, ctx).await
        }
        "4" => {
            session.navigate_to(MenuId::Help);
            Ok(help::render(ctx))
        }
        "0" => {
            info!("session {} logged out", session.session_id);
            session.sign_out();
            Ok(Reply::end("You have been logged out. Goodbye!"))
        }
        _ => redisplay(session, ctx, InputError::InvalidChoice).await,
    }
}

pub async fn render_balance(session: &mut Session, ctx: &MenuContext) -> MenuResult {
    let Some(user_id) = session.user_id.clone() else {
        session.go_home();
        return Ok(super::main_menu::render(ctx));
    };
    let balance = ctx.services.balance(&user_id).await?;
    Ok(with_footer(format!("Your balance is {}", money(ctx, balance))))
}

/// Active bets or full history, depending on the current menu.
pub async fn render_bets(session: &mut Session, ctx: &MenuContext) -> MenuResult {
    let Some(user_id) = session.user_id.clone() else {
        session.go_home();
        return Ok(super::main_menu::render(ctx));
    };
    let (filter, title, empty) = if session.current_menu == MenuId::ActiveBets {
        (BetFilter::Active, "Active Bets", "You have no active bets.")
    } else {
        (BetFilter::All, "Bet History", "You have not placed any bets yet.")
    };
    let bets = ctx.services.bets(&user_id, filter).await?;
    if bets.is_empty() {
        return Ok(with_footer(empty));
    }
    let lines: Vec<String> = bets
        .iter()
        .take(ctx.betting.max_list_items)
        .map(|b| {
            format!(
                "{} {} {} @{} {}",
                b.reference,
                b.selection_name,
                money(ctx, b.stake),
                b.odds,
                b.status.label()
            )
        })
        .collect();
    Ok(with_footer(format!("{}\n{}", title, lines.join("\n"))))
}
