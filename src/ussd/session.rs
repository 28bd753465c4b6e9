use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bumped whenever the persisted layout of [`Session`] changes.
pub const SESSION_SCHEMA_VERSION: u8 = 2;

/// Generic scratch key holding the ids rendered on the current list screen.
pub const LISTING_KEY: &str = "listing";

/// # USSD Session Record
///
/// The only state that survives between gateway callbacks. The gateway
/// resends the whole keystroke history each turn, so "where the caller is"
/// lives entirely here: the owning menu, the sub-step inside that menu,
/// flow-scoped scratch and the navigation stack.
///
/// ## Liveness
///
/// A record is visible to lookups while `is_active` is set and `now <
/// expires_at`. Every successful store update moves `expires_at` forward by
/// the configured TTL; nothing ever moves it back.
///
/// ## Scratch
///
/// Flow state is typed: a single [`FlowScratch`] owned by whichever flow is
/// running (login, registration or a bet slip). Starting another flow
/// replaces it and leaving a flow clears it, so a half-finished registration
/// can never bleed into a later bet. The generic `data` bag only carries the
/// [`LISTING_KEY`] entry, which is dropped on every menu change.
///
/// ## Usage
///
/// ```rust
/// use betline::ussd::session::{MenuId, Session};
///
/// let mut session = Session::new("ATUid_1", "254712345678", "*384#", None);
/// assert_eq!(session.current_menu, MenuId::MainMenu);
///
/// session.navigate_to(MenuId::Help);
/// assert_eq!(session.history, vec![MenuId::MainMenu]);
///
/// assert_eq!(session.go_back(), Some(MenuId::MainMenu));
/// assert!(session.history.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub phone_number: String,
    pub service_code: String,
    pub network_code: Option<String>,
    /// Set once authentication or registration succeeds
    pub user_id: Option<String>,
    /// Display name of the authenticated account holder
    pub user_name: Option<String>,
    pub current_menu: MenuId,
    pub step: Option<Step>,
    pub flow: Option<FlowScratch>,
    pub data: BTreeMap<String, String>,
    /// Menus left by forward navigation, most recent last
    pub history: Vec<MenuId>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    /// Keystroke tokens already consumed; a callback carrying this many or
    /// fewer tokens is a replay
    pub turn: usize,
    /// Cumulative text of the last processed callback
    pub last_text: String,
    /// Encoded reply to the last processed callback
    pub last_response: Option<String>,
    /// Incremented on every store write
    pub version: u64,
    pub schema_version: u8,
}

/// Menu identifiers. Each one owns the session while it is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MenuId {
    MainMenu,
    Login,
    Register,
    AccountMenu,
    Balance,
    BettingMenu,
    Sports,
    Events,
    PlaceBet,
    ActiveBets,
    BetHistory,
    Help,
}

impl MenuId {
    /// Where `0` lands when the navigation stack is empty.
    pub fn default_parent(self) -> MenuId {
        match self {
            MenuId::MainMenu | MenuId::Login | MenuId::Register | MenuId::Help => MenuId::MainMenu,
            MenuId::AccountMenu => MenuId::MainMenu,
            MenuId::Balance | MenuId::BettingMenu => MenuId::AccountMenu,
            MenuId::Sports | MenuId::ActiveBets => MenuId::BettingMenu,
            MenuId::BetHistory => MenuId::AccountMenu,
            MenuId::Events => MenuId::Sports,
            MenuId::PlaceBet => MenuId::Events,
        }
    }

    /// Menus that require an authenticated session
    pub fn requires_auth(self) -> bool {
        !matches!(
            self,
            MenuId::MainMenu | MenuId::Login | MenuId::Register | MenuId::Help
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MenuId::MainMenu => "main_menu",
            MenuId::Login => "login",
            MenuId::Register => "register",
            MenuId::AccountMenu => "account_menu",
            MenuId::Balance => "balance",
            MenuId::BettingMenu => "betting_menu",
            MenuId::Sports => "sports",
            MenuId::Events => "events",
            MenuId::PlaceBet => "place_bet",
            MenuId::ActiveBets => "active_bets",
            MenuId::BetHistory => "bet_history",
            MenuId::Help => "help",
        }
    }
}

impl std::fmt::Display for MenuId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sub-states inside a multi-stage menu
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    Phone,
    Name,
    Pin,
    ConfirmPin,
    Market,
    Selection,
    Stake,
    Confirm,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Step::Phone => "phone",
            Step::Name => "name",
            Step::Pin => "pin",
            Step::ConfirmPin => "confirm_pin",
            Step::Market => "market",
            Step::Selection => "selection",
            Step::Stake => "stake",
            Step::Confirm => "confirm",
        }
    }
}

/// Typed flow scratch; exactly one flow owns it at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FlowScratch {
    Login(LoginScratch),
    Register(RegisterScratch),
    Bet(BetSlip),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoginScratch {
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterScratch {
    pub phone: Option<String>,
    pub name: Option<String>,
    pub pin: Option<String>,
}

/// Selections accumulated while browsing towards a bet.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BetSlip {
    pub sport_key: Option<String>,
    pub sport_name: Option<String>,
    pub event_id: Option<String>,
    pub event_name: Option<String>,
    pub market_key: Option<String>,
    pub market_name: Option<String>,
    pub selection_id: Option<String>,
    pub selection_name: Option<String>,
    pub odds: Option<Decimal>,
    pub stake: Option<Decimal>,
    pub potential_payout: Option<Decimal>,
    /// Idempotency key for placing this priced slip, minted when the stake is entered
    pub placement_key: Option<String>,
}

impl BetSlip {
    /// Drop everything chosen after the event (back to market choice).
    pub fn clear_from_market(&mut self) {
        self.market_key = None;
        self.market_name = None;
        self.clear_from_selection();
    }

    pub fn clear_from_selection(&mut self) {
        self.selection_id = None;
        self.selection_name = None;
        self.odds = None;
        self.clear_stake();
    }

    pub fn clear_stake(&mut self) {
        self.stake = None;
        self.potential_payout = None;
        self.placement_key = None;
    }

    /// Drop the event and everything after it (back to event choice).
    pub fn clear_from_event(&mut self) {
        self.event_id = None;
        self.event_name = None;
        self.clear_from_market();
    }
}

impl Session {
    /// Create a fresh session at the main menu. Timestamps are provisional;
    /// the store stamps them on create.
    pub fn new(
        session_id: impl Into<String>,
        phone_number: impl Into<String>,
        service_code: impl Into<String>,
        network_code: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Session {
            session_id: session_id.into(),
            phone_number: phone_number.into(),
            service_code: service_code.into(),
            network_code,
            user_id: None,
            user_name: None,
            current_menu: MenuId::MainMenu,
            step: None,
            flow: None,
            data: BTreeMap::new(),
            history: Vec::new(),
            created_at: now,
            last_activity: now,
            expires_at: now,
            is_active: true,
            turn: 0,
            last_text: String::new(),
            last_response: None,
            version: 0,
            schema_version: SESSION_SCHEMA_VERSION,
        }
    }

    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.is_active && now < self.expires_at
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// First word of the account holder's name, or "there" before login.
    pub fn first_name(&self) -> &str {
        self.user_name
            .as_deref()
            .and_then(|n| n.split_whitespace().next())
            .unwrap_or("there")
    }

    /// Push the current menu and move forward to `menu`.
    pub fn navigate_to(&mut self, menu: MenuId) {
        self.history.push(self.current_menu);
        self.current_menu = menu;
        self.step = None;
        self.data.remove(LISTING_KEY);
    }

    /// Pop one level. Returns the menu landed on, or `None` when the stack
    /// was already empty (the caller decides the fallback).
    pub fn go_back(&mut self) -> Option<MenuId> {
        let previous = self.history.pop()?;
        self.current_menu = previous;
        self.step = None;
        self.data.remove(LISTING_KEY);
        Some(previous)
    }

    /// `0` semantics: pop one level, or land on the menu's default parent
    /// when nothing is stacked. Returns the menu landed on.
    pub fn back_or_parent(&mut self) -> MenuId {
        match self.go_back() {
            Some(menu) => menu,
            None => {
                let parent = self.current_menu.default_parent();
                self.current_menu = parent;
                self.step = None;
                self.data.remove(LISTING_KEY);
                parent
            }
        }
    }

    /// Unwind the stack to the most recent visit of `menu`, or jump there
    /// with an empty stack when it was never visited.
    pub fn return_to(&mut self, menu: MenuId) {
        match self.history.iter().rposition(|m| *m == menu) {
            Some(pos) => self.history.truncate(pos),
            None => self.history.clear(),
        }
        self.current_menu = menu;
        self.step = None;
        self.data.remove(LISTING_KEY);
    }

    /// `*` semantics: main menu, empty stack, no flow scratch.
    pub fn go_home(&mut self) {
        self.history.clear();
        self.current_menu = MenuId::MainMenu;
        self.step = None;
        self.flow = None;
        self.data.clear();
    }

    /// Replace the whole navigation context with `menu` as the new root.
    pub fn reset_to(&mut self, menu: MenuId) {
        self.history.clear();
        self.current_menu = menu;
        self.step = None;
        self.data.remove(LISTING_KEY);
    }

    pub fn set_listing(&mut self, ids: &[String]) {
        self.data.insert(LISTING_KEY.to_string(), ids.join(","));
    }

    pub fn listing(&self) -> Vec<String> {
        self.data
            .get(LISTING_KEY)
            .map(|s| {
                s.split(',')
                    .filter(|p| !p.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn clear_flow(&mut self) {
        self.flow = None;
    }

    pub fn login_scratch(&mut self) -> &mut LoginScratch {
        if !matches!(self.flow, Some(FlowScratch::Login(_))) {
            self.flow = Some(FlowScratch::Login(LoginScratch::default()));
        }
        match self.flow {
            Some(FlowScratch::Login(ref mut s)) => s,
            _ => unreachable!("login scratch initialized above"),
        }
    }

    pub fn register_scratch(&mut self) -> &mut RegisterScratch {
        if !matches!(self.flow, Some(FlowScratch::Register(_))) {
            self.flow = Some(FlowScratch::Register(RegisterScratch::default()));
        }
        match self.flow {
            Some(FlowScratch::Register(ref mut s)) => s,
            _ => unreachable!("register scratch initialized above"),
        }
    }

    /// The active bet slip, if a betting flow is running.
    pub fn bet_slip(&self) -> Option<&BetSlip> {
        match &self.flow {
            Some(FlowScratch::Bet(slip)) => Some(slip),
            _ => None,
        }
    }

    pub fn bet_slip_mut(&mut self) -> Option<&mut BetSlip> {
        match &mut self.flow {
            Some(FlowScratch::Bet(slip)) => Some(slip),
            _ => None,
        }
    }

    /// Mark the user as authenticated and make the account menu the root.
    pub fn sign_in(&mut self, user_id: String, user_name: String) {
        self.user_id = Some(user_id);
        self.user_name = Some(user_name);
        self.clear_flow();
        self.reset_to(MenuId::AccountMenu);
    }

    pub fn sign_out(&mut self) {
        self.user_id = None;
        self.user_name = None;
        self.go_home();
    }

    /// Copy what one callback changed onto the stored record. Identity,
    /// timestamps, liveness and version stay under the store's control.
    pub fn apply_turn_to(&self, stored: &mut Session) {
        stored.user_id = self.user_id.clone();
        stored.user_name = self.user_name.clone();
        stored.current_menu = self.current_menu;
        stored.step = self.step;
        stored.flow = self.flow.clone();
        stored.data = self.data.clone();
        stored.history = self.history.clone();
        stored.turn = self.turn;
        stored.last_text = self.last_text.clone();
        stored.last_response = self.last_response.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session::new("s1", "254700000001", "*384#", None)
    }

    #[test]
    fn navigation_push_and_pop() {
        let mut s = session();
        s.navigate_to(MenuId::Login);
        s.navigate_to(MenuId::Help);
        assert_eq!(s.history, vec![MenuId::MainMenu, MenuId::Login]);
        assert_eq!(s.go_back(), Some(MenuId::Login));
        assert_eq!(s.go_back(), Some(MenuId::MainMenu));
        assert_eq!(s.go_back(), None);
        assert_eq!(s.current_menu, MenuId::MainMenu);
    }

    #[test]
    fn back_on_empty_stack_uses_default_parent() {
        let mut s = session();
        s.reset_to(MenuId::BettingMenu);
        assert!(s.history.is_empty());
        assert_eq!(s.back_or_parent(), MenuId::AccountMenu);
        assert!(s.history.is_empty());
    }

    #[test]
    fn return_to_unwinds_stack() {
        let mut s = session();
        s.reset_to(MenuId::AccountMenu);
        s.navigate_to(MenuId::BettingMenu);
        s.navigate_to(MenuId::Sports);
        s.navigate_to(MenuId::Events);
        s.navigate_to(MenuId::PlaceBet);
        s.return_to(MenuId::BettingMenu);
        assert_eq!(s.current_menu, MenuId::BettingMenu);
        assert_eq!(s.history, vec![MenuId::AccountMenu]);
    }

    #[test]
    fn home_clears_stack_and_scratch() {
        let mut s = session();
        s.login_scratch().phone = Some("5551234567".into());
        s.navigate_to(MenuId::Login);
        s.set_listing(&["a".into(), "b".into()]);
        s.go_home();
        assert_eq!(s.current_menu, MenuId::MainMenu);
        assert!(s.history.is_empty());
        assert!(s.flow.is_none());
        assert!(s.listing().is_empty());
    }

    #[test]
    fn starting_a_flow_replaces_previous_scratch() {
        let mut s = session();
        s.register_scratch().name = Some("Jane".into());
        s.login_scratch().phone = Some("5551234567".into());
        assert!(matches!(s.flow, Some(FlowScratch::Login(_))));
        assert_eq!(s.register_scratch().name, None);
    }

    #[test]
    fn listing_roundtrip_and_cleared_on_navigation() {
        let mut s = session();
        s.set_listing(&["soccer".into(), "tennis".into()]);
        assert_eq!(s.listing(), vec!["soccer".to_string(), "tennis".to_string()]);
        s.navigate_to(MenuId::Help);
        assert!(s.listing().is_empty());
    }

    #[test]
    fn applying_a_turn_leaves_store_bookkeeping_alone() {
        let mut stored = session();
        stored.version = 7;
        stored.is_active = false;
        let mut turn = stored.clone();
        turn.version = 1;
        turn.is_active = true;
        turn.turn = 3;
        turn.navigate_to(MenuId::Help);
        turn.last_response = Some("CON Help".into());

        turn.apply_turn_to(&mut stored);
        assert_eq!(stored.current_menu, MenuId::Help);
        assert_eq!(stored.turn, 3);
        assert_eq!(stored.last_response.as_deref(), Some("CON Help"));
        assert_eq!(stored.version, 7);
        assert!(!stored.is_active);
    }

    #[test]
    fn first_name_defaults_before_login() {
        let mut s = session();
        assert_eq!(s.first_name(), "there");
        s.sign_in("u1".into(), "Jane Doe".into());
        assert_eq!(s.first_name(), "Jane");
        assert_eq!(s.current_menu, MenuId::AccountMenu);
    }
}
