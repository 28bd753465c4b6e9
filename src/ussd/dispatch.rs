//! Table-driven menu dispatch.
//!
//! Handlers are plain functions registered under `(menu, step)`. The two
//! global keys are resolved here before any handler runs: `*` always goes
//! home, `0` pops one level unless the current screen gives it its own
//! meaning (exit, logout, cancel).

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use log::{debug, warn};
use std::collections::HashMap;

use super::menus::{self, account, auth, betting, help, main_menu, placement};
use super::response::Reply;
use super::session::{MenuId, Session, Step};
use crate::config::{BettingConfig, Config};
use crate::services::{ServiceError, Services};
use crate::validation::NameRules;

pub const HOME_KEY: &str = "*";
pub const BACK_KEY: &str = "0";

/// Everything a handler may consult besides the session.
pub struct MenuContext {
    pub brand: String,
    pub services: Services,
    pub betting: BettingConfig,
    pub name_rules: NameRules,
}

impl MenuContext {
    pub fn from_config(config: &Config, services: Services) -> Self {
        MenuContext {
            brand: config.server.name.clone(),
            services,
            betting: config.betting.clone(),
            name_rules: NameRules::default(),
        }
    }
}

pub type MenuResult = Result<Reply, ServiceError>;

pub type Handler = for<'a> fn(&'a mut Session, &'a str, &'a MenuContext) -> BoxFuture<'a, MenuResult>;

macro_rules! handler {
    ($f:path) => {{
        let h: Handler = |session, input, ctx| $f(session, input, ctx).boxed();
        h
    }};
}

pub struct Dispatcher {
    table: HashMap<(MenuId, Option<Step>), Handler>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let mut table: HashMap<(MenuId, Option<Step>), Handler> = HashMap::new();
        table.insert((MenuId::MainMenu, None), handler!(main_menu::handle));

        table.insert((MenuId::Login, Some(Step::Phone)), handler!(auth::login_phone));
        table.insert((MenuId::Login, Some(Step::Pin)), handler!(auth::login_pin));
        table.insert((MenuId::Register, Some(Step::Phone)), handler!(auth::register_phone));
        table.insert((MenuId::Register, Some(Step::Name)), handler!(auth::register_name));
        table.insert((MenuId::Register, Some(Step::Pin)), handler!(auth::register_pin));
        table.insert((MenuId::Register, Some(Step::ConfirmPin)), handler!(auth::register_confirm_pin));

        table.insert((MenuId::AccountMenu, None), handler!(account::handle));
        table.insert((MenuId::Balance, None), handler!(menus::view_only));
        table.insert((MenuId::ActiveBets, None), handler!(menus::view_only));
        table.insert((MenuId::BetHistory, None), handler!(menus::view_only));
        table.insert((MenuId::Help, None), handler!(help::handle));

        table.insert((MenuId::BettingMenu, None), handler!(betting::handle));
        table.insert((MenuId::Sports, None), handler!(betting::choose_sport));
        table.insert((MenuId::Events, None), handler!(betting::choose_event));

        table.insert((MenuId::PlaceBet, Some(Step::Market)), handler!(placement::choose_market));
        table.insert((MenuId::PlaceBet, Some(Step::Selection)), handler!(placement::choose_selection));
        table.insert((MenuId::PlaceBet, Some(Step::Stake)), handler!(placement::enter_stake));
        table.insert((MenuId::PlaceBet, Some(Step::Confirm)), handler!(placement::confirm));

        Dispatcher { table }
    }

    /// Screens where `0` is an option of the screen rather than "back".
    fn claims_back_key(session: &Session) -> bool {
        matches!(
            (session.current_menu, session.step),
            (MenuId::MainMenu, None) | (MenuId::AccountMenu, None) | (MenuId::PlaceBet, Some(Step::Confirm))
        )
    }

    /// Route one keystroke. The session is mutated in place; the caller persists it.
    pub async fn dispatch(&self, session: &mut Session, input: &str, ctx: &MenuContext) -> MenuResult {
        let input = input.trim();

        if input == HOME_KEY {
            session.go_home();
            return menus::render_menu(session, ctx).await;
        }

        if session.current_menu.requires_auth() && !session.is_authenticated() {
            warn!(
                "session {} reached {} without authentication; resetting",
                session.session_id, session.current_menu
            );
            session.go_home();
            return menus::render_menu(session, ctx).await;
        }

        if input.is_empty() {
            return menus::render_menu(session, ctx).await;
        }

        if input == BACK_KEY && !Self::claims_back_key(session) {
            let landed = session.back_or_parent();
            debug!("session {} back to {}", session.session_id, landed);
            return menus::render_menu(session, ctx).await;
        }

        match self.table.get(&(session.current_menu, session.step)) {
            Some(handler) => handler(session, input, ctx).await,
            None => {
                warn!(
                    "no handler for {}/{:?} in session {}; restarting at main menu",
                    session.current_menu,
                    session.step.map(Step::as_str),
                    session.session_id
                );
                session.go_home();
                menus::render_menu(session, ctx).await
            }
        }
    }
}
