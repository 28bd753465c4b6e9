//! Login (`phone -> pin`) and registration (`phone -> name -> pin -> confirm_pin`).
//!
//! Both flows keep their intermediate fields in typed flow scratch and clear
//! it on success. A failed login restarts at phone entry so a caller who
//! mistyped the number is not stuck retrying PINs against it.

use log::{info, warn};

use crate::logutil::mask_phone;
use crate::ussd::dispatch::{MenuContext, MenuResult};
use crate::ussd::menus::{account, redisplay, with_footer};
use crate::ussd::response::Reply;
use crate::ussd::session::{MenuId, Session, Step};
use crate::validation::{validate_name, validate_phone, validate_pin};

pub const INVALID_CREDENTIALS: &str = "Invalid credentials. Try again.";
pub const PIN_MISMATCH: &str = "PINs do not match.";
pub const ALREADY_REGISTERED: &str = "This number is already registered. Please login.";

pub fn render(session: &Session) -> Reply {
    let prompt = match (session.current_menu, session.step) {
        (MenuId::Login, Some(Step::Pin)) => "Enter your 4-digit PIN:",
        (MenuId::Login, _) => "Login\nEnter your phone number:",
        (MenuId::Register, Some(Step::Name)) => "Enter your full name:",
        (MenuId::Register, Some(Step::Pin)) => "Create a 4-digit PIN:",
        (MenuId::Register, Some(Step::ConfirmPin)) => "Confirm your PIN:",
        _ => "Register\nEnter your phone number:",
    };
    with_footer(prompt)
}

pub async fn login_phone(session: &mut Session, input: &str, ctx: &MenuContext) -> MenuResult {
    match validate_phone(input) {
        Ok(phone) => {
            session.login_scratch().phone = Some(phone);
            session.step = Some(Step::Pin);
            Ok(render(session))
        }
        Err(e) => redisplay(session, ctx, e).await,
    }
}

pub async fn login_pin(session: &mut Session, input: &str, ctx: &MenuContext) -> MenuResult {
    let pin = match validate_pin(input) {
        Ok(pin) => pin,
        Err(e) => return redisplay(session, ctx, e).await,
    };
    let Some(phone) = session.login_scratch().phone.clone() else {
        session.step = Some(Step::Phone);
        return Ok(render(session));
    };

    match ctx.services.authenticate(&phone, &pin).await? {
        Some(user) => {
            info!("session {} signed in {}", session.session_id, mask_phone(&phone));
            session.sign_in(user.id, user.name);
            Ok(account::render(session))
        }
        None => {
            warn!(
                target: "security",
                "failed login for {} from session {} (caller {})",
                mask_phone(&phone),
                session.session_id,
                mask_phone(&session.phone_number)
            );
            session.login_scratch().phone = None;
            session.step = Some(Step::Phone);
            Ok(render(session).with_error(INVALID_CREDENTIALS))
        }
    }
}

pub async fn register_phone(session: &mut Session, input: &str, ctx: &MenuContext) -> MenuResult {
    let phone = match validate_phone(input) {
        Ok(phone) => phone,
        Err(e) => return redisplay(session, ctx, e).await,
    };
    if ctx.services.find_user_by_phone(&phone).await?.is_some() {
        return redisplay(session, ctx, ALREADY_REGISTERED).await;
    }
    session.register_scratch().phone = Some(phone);
    session.step = Some(Step::Name);
    Ok(render(session))
}

pub async fn register_name(session: &mut Session, input: &str, ctx: &MenuContext) -> MenuResult {
    match validate_name(input, &ctx.name_rules) {
        Ok(name) => {
            session.register_scratch().name = Some(name);
            session.step = Some(Step::Pin);
            Ok(render(session))
        }
        Err(e) => redisplay(session, ctx, e).await,
    }
}

pub async fn register_pin(session: &mut Session, input: &str, ctx: &MenuContext) -> MenuResult {
    match validate_pin(input) {
        Ok(pin) => {
            session.register_scratch().pin = Some(pin);
            session.step = Some(Step::ConfirmPin);
            Ok(render(session))
        }
        Err(e) => redisplay(session, ctx, e).await,
    }
}

pub async fn register_confirm_pin(session: &mut Session, input: &str, ctx: &MenuContext) -> MenuResult {
    let scratch = session.register_scratch().clone();
    let (Some(phone), Some(name), Some(pin)) = (scratch.phone, scratch.name, scratch.pin) else {
        // Scratch lost: start the flow over rather than guess.
        *session.register_scratch() = Default::default();
        session.step = Some(Step::Phone);
        return Ok(render(session));
    };

    if input != pin {
        session.register_scratch().pin = None;
        session.step = Some(Step::Pin);
        return Ok(render(session).with_error(PIN_MISMATCH));
    }

    match ctx.services.create_user(&phone, &name, &pin).await? {
        Some(user) => {
            info!("session {} registered {}", session.session_id, mask_phone(&phone));
            session.sign_in(user.id, user.name);
            Ok(account::render(session).with_notice("Registration successful."))
        }
        None => {
            *session.register_scratch() = Default::default();
            session.step = Some(Step::Phone);
            Ok(render(session).with_error(ALREADY_REGISTERED))
        }
    }
}
