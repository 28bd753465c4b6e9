use crate::ussd::dispatch::{MenuContext, MenuResult};
use crate::ussd::menus::{redisplay, with_footer};
use crate::ussd::response::Reply;
use crate::ussd::session::Session;
use crate::validation::InputError;

pub fn render(ctx: &MenuContext) -> Reply {
    with_footer(format!(
        "{} Help\nLogin, choose Place Bet, pick a sport, event, market and outcome, then enter your stake.\nMin stake {} {}.",
        ctx.brand, ctx.betting.currency, ctx.betting.min_stake
    ))
}

pub async fn handle(session: &mut Session, _input: &str, ctx: &MenuContext) -> MenuResult {
    redisplay(session, ctx, InputError::InvalidChoice).await
}
