use crate::ussd::dispatch::{MenuContext, MenuResult};
use crate::ussd::menus::{account, auth, help, redisplay};
use crate::ussd::response::Reply;
use crate::ussd::session::{FlowScratch, LoginScratch, MenuId, RegisterScratch, Session, Step};
use crate::validation::InputError;

pub fn render(ctx: &MenuContext) -> Reply {
    Reply::con(format!(
        "Welcome to {}\n1. Login\n2. Register\n3. Help\n0. Exit",
        ctx.brand
    ))
}

pub async fn handle(session: &mut Session, input: &str, ctx: &MenuContext) -> MenuResult {
    match input {
        "1" if session.is_authenticated() => {
            // Already signed in this session; `*` only left the account area.
            session.reset_to(MenuId::AccountMenu);
            Ok(account::render(session))
        }
        "1" => {
            session.navigate_to(MenuId::Login);
            session.step = Some(Step::Phone);
            session.flow = Some(FlowScratch::Login(LoginScratch::default()));
            Ok(auth::render(session))
        }
        "2" => {
            session.navigate_to(MenuId::Register);
            session.step = Some(Step::Phone);
            session.flow = Some(FlowScratch::Register(RegisterScratch::default()));
            Ok(auth::render(session))
        }
        "3" => {
            session.navigate_to(MenuId::Help);
            Ok(help::render(ctx))
        }
        "0" => Ok(Reply::end(format!("Thank you for using {}. Goodbye!", ctx.brand))),
        _ => redisplay(session, ctx, InputError::InvalidChoice).await,
    }
}
