//! In-process adapter backend.
//!
//! Implements all four adapter traits over one mutex-guarded state, seeded
//! from a JSON document (see `data/seeds/catalog.json`). PINs are stored as
//! Argon2id hashes exactly as a real directory would store them. Used by the
//! `local` service mode and by the test suite.

use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use log::{debug, info};
use password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::{
    potential_payout, Bet, BetFilter, BetReceipt, BetSelection, BetStatus, Betting, Catalog, Event, Market,
    Selection, ServiceError, ServiceResult, Sport, User, UserDirectory, Wallet,
};
use crate::logutil::mask_phone;
use crate::validation::secure_json_parse;

const MAX_SEED_BYTES: usize = 4 * 1024 * 1024;

/// Seed document for the local backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub sports: Vec<Sport>,
    #[serde(default)]
    pub events: Vec<Event>,
    #[serde(default)]
    pub accounts: Vec<SeedAccount>,
    /// Credited to accounts created through registration
    #[serde(default)]
    pub signup_balance: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedAccount {
    pub phone: String,
    pub name: String,
    pub pin: String,
    pub balance: Decimal,
}

impl Seed {
    /// Load a seed document from disk.
    pub async fn load(path: &str) -> anyhow::Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to read seed file {}: {}", path, e))?;
        let seed: Seed = secure_json_parse(&content, MAX_SEED_BYTES)
            .map_err(|e| anyhow::anyhow!("Failed to parse seed file {}: {}", path, e))?;
        Ok(seed)
    }

    /// A small built-in catalog with one demo account, for running without a seed file.
    pub fn demo() -> Self {
        let soon = Utc::now() + Duration::hours(3);
        let match_result = |id: &str, home: &str, away: &str, odds: [i64; 3]| Market {
            key: format!("{}-1x2", id),
            name: "Match Result".to_string(),
            selections: vec![
                Selection {
                    id: format!("{}-home", id),
                    name: home.to_string(),
                    odds: Decimal::new(odds[0], 2),
                },
                Selection {
                    id: format!("{}-draw", id),
                    name: "Draw".to_string(),
                    odds: Decimal::new(odds[1], 2),
                },
                Selection {
                    id: format!("{}-away", id),
                    name: away.to_string(),
                    odds: Decimal::new(odds[2], 2),
                },
            ],
        };
        let goals = |id: &str| Market {
            key: format!("{}-ou25", id),
            name: "Total Goals 2.5".to_string(),
            selections: vec![
                Selection {
                    id: format!("{}-over", id),
                    name: "Over 2.5".to_string(),
                    odds: Decimal::new(185, 2),
                },
                Selection {
                    id: format!("{}-under", id),
                    name: "Under 2.5".to_string(),
                    odds: Decimal::new(195, 2),
                },
            ],
        };
        Seed {
            sports: vec![
                Sport {
                    key: "soccer".to_string(),
                    name: "Football".to_string(),
                },
                Sport {
                    key: "basketball".to_string(),
                    name: "Basketball".to_string(),
                },
            ],
            events: vec![
                Event {
                    id: "ev-1001".to_string(),
                    sport_key: "soccer".to_string(),
                    name: "Arsenal v Chelsea".to_string(),
                    starts_at: soon,
                    markets: vec![match_result("ev-1001", "Arsenal", "Chelsea", [210, 340, 330]), goals("ev-1001")],
                },
                Event {
                    id: "ev-1002".to_string(),
                    sport_key: "soccer".to_string(),
                    name: "Gor Mahia v AFC Leopards".to_string(),
                    starts_at: soon + Duration::hours(24),
                    markets: vec![match_result("ev-1002", "Gor Mahia", "AFC Leopards", [175, 320, 450])],
                },
                Event {
                    id: "ev-2001".to_string(),
                    sport_key: "basketball".to_string(),
                    name: "Lakers v Celtics".to_string(),
                    starts_at: soon,
                    markets: vec![Market {
                        key: "ev-2001-ml".to_string(),
                        name: "Moneyline".to_string(),
                        selections: vec![
                            Selection {
                                id: "ev-2001-home".to_string(),
                                name: "Lakers".to_string(),
                                odds: Decimal::new(190, 2),
                            },
                            Selection {
                                id: "ev-2001-away".to_string(),
                                name: "Celtics".to_string(),
                                odds: Decimal::new(195, 2),
                            },
                        ],
                    }],
                },
            ],
            accounts: vec![SeedAccount {
                phone: "5551234567".to_string(),
                name: "Jane Wanjiru".to_string(),
                pin: "4321".to_string(),
                balance: Decimal::new(1000, 0),
            }],
            signup_balance: Decimal::ZERO,
        }
    }
}

struct LocalUser {
    user: User,
    pin_hash: String,
}

#[derive(Default)]
struct LocalState {
    users_by_phone: HashMap<String, LocalUser>,
    balances: HashMap<String, Decimal>,
    bets: HashMap<String, Vec<Bet>>,
    receipts_by_key: HashMap<String, BetReceipt>,
    sports: Vec<Sport>,
    events: Vec<Event>,
}

/// In-process user directory, wallet, catalog and betting book.
pub struct LocalBackend {
    argon2: Argon2<'static>,
    signup_balance: Decimal,
    state: Mutex<LocalState>,
}

impl LocalBackend {
    /// Build a backend with default Argon2 parameters.
    pub fn new(seed: Seed) -> Self {
        Self::with_params(seed, None)
    }

    /// Build a backend with explicit Argon2 parameters (tests use cheap ones).
    pub fn with_params(seed: Seed, params: Option<Params>) -> Self {
        let argon2 = match params {
            Some(p) => Argon2::new(Algorithm::Argon2id, Version::V0x13, p),
            None => Argon2::default(),
        };
        let backend = LocalBackend {
            argon2,
            signup_balance: seed.signup_balance,
            state: Mutex::new(LocalState {
                sports: seed.sports,
                events: seed.events,
                ..LocalState::default()
            }),
        };
        for account in seed.accounts {
            match backend.insert_user(&account.phone, &account.name, &account.pin, account.balance) {
                Ok(Some(_)) => {}
                Ok(None) => debug!("Duplicate seed account {} skipped", mask_phone(&account.phone)),
                Err(e) => log::warn!("Seed account {} not loaded: {}", mask_phone(&account.phone), e),
            }
        }
        backend
    }

    fn lock(&self) -> ServiceResult<std::sync::MutexGuard<'_, LocalState>> {
        self.state
            .lock()
            .map_err(|_| ServiceError::unavailable("local-backend", "state lock poisoned"))
    }

    fn hash_pin(&self, pin: &str) -> ServiceResult<String> {
        let salt = SaltString::generate(&mut rand::thread_rng());
        self.argon2
            .hash_password(pin.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| ServiceError::unavailable("user-directory", e))
    }

    fn insert_user(&self, phone: &str, name: &str, pin: &str, balance: Decimal) -> ServiceResult<Option<User>> {
        let pin_hash = self.hash_pin(pin)?;
        let mut state = self.lock()?;
        if state.users_by_phone.contains_key(phone) {
            return Ok(None);
        }
        let user = User {
            id: Uuid::new_v4().to_string(),
            phone: phone.to_string(),
            name: name.to_string(),
        };
        state.balances.insert(user.id.clone(), balance);
        state.users_by_phone.insert(
            phone.to_string(),
            LocalUser {
                user: user.clone(),
                pin_hash,
            },
        );
        Ok(Some(user))
    }

    /// Overwrite a wallet balance (tests and operator tooling).
    pub fn set_balance(&self, user_id: &str, balance: Decimal) -> ServiceResult<()> {
        self.lock()?.balances.insert(user_id.to_string(), balance);
        Ok(())
    }

    /// Number of bets recorded for a user.
    pub fn bet_count(&self, user_id: &str) -> usize {
        self.lock()
            .map(|s| s.bets.get(user_id).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }

    /// Number of registered accounts.
    pub fn user_count(&self) -> usize {
        self.lock().map(|s| s.users_by_phone.len()).unwrap_or(0)
    }
}

#[async_trait]
impl UserDirectory for LocalBackend {
    async fn find_by_phone(&self, phone: &str) -> ServiceResult<Option<User>> {
        Ok(self.lock()?.users_by_phone.get(phone).map(|u| u.user.clone()))
    }

    async fn authenticate(&self, phone: &str, pin: &str) -> ServiceResult<Option<User>> {
        let (user, hash) = {
            let state = self.lock()?;
            match state.users_by_phone.get(phone) {
                Some(u) => (u.user.clone(), u.pin_hash.clone()),
                None => return Ok(None),
            }
        };
        let parsed = PasswordHash::new(&hash).map_err(|e| ServiceError::unavailable("user-directory", e))?;
        if self.argon2.verify_password(pin.as_bytes(), &parsed).is_ok() {
            Ok(Some(user))
        } else {
            Ok(None)
        }
    }

    async fn create(&self, phone: &str, name: &str, pin: &str) -> ServiceResult<Option<User>> {
        let created = self.insert_user(phone, name, pin, self.signup_balance)?;
        if created.is_some() {
            info!("Registered account for {}", mask_phone(phone));
        }
        Ok(created)
    }
}

#[async_trait]
impl Wallet for LocalBackend {
    async fn get_balance(&self, user_id: &str) -> ServiceResult<Decimal> {
        self.lock()?
            .balances
            .get(user_id)
            .copied()
            .ok_or_else(|| ServiceError::rejected("wallet", format!("no wallet for {}", user_id)))
    }
}

#[async_trait]
impl Catalog for LocalBackend {
    async fn list_sports(&self) -> ServiceResult<Vec<Sport>> {
        Ok(self.lock()?.sports.clone())
    }

    async fn list_events(&self, sport_key: &str) -> ServiceResult<Vec<Event>> {
        let mut events: Vec<Event> = self
            .lock()?
            .events
            .iter()
            .filter(|e| e.sport_key == sport_key)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.starts_at.cmp(&b.starts_at).then(a.id.cmp(&b.id)));
        Ok(events)
    }
}

#[async_trait]
impl Betting for LocalBackend {
    async fn place_bet(
        &self,
        user_id: &str,
        selection: &BetSelection,
        stake: Decimal,
    ) -> ServiceResult<Option<BetReceipt>> {
        let mut state = self.lock()?;
        if let Some(existing) = state.receipts_by_key.get(&selection.idempotency_key) {
            debug!("Replayed placement {} returns existing receipt", selection.idempotency_key);
            return Ok(Some(existing.clone()));
        }
        let balance = state.balances.get(user_id).copied().unwrap_or(Decimal::ZERO);
        if stake <= Decimal::ZERO || stake > balance {
            return Ok(None);
        }
        state.balances.insert(user_id.to_string(), balance - stake);

        let reference = format!("BL{}", &Uuid::new_v4().simple().to_string()[..8].to_uppercase());
        let receipt = BetReceipt {
            reference: reference.clone(),
            stake,
            odds: selection.odds,
            potential_payout: potential_payout(stake, selection.odds),
            placed_at: Utc::now(),
        };
        state.bets.entry(user_id.to_string()).or_default().push(Bet {
            reference,
            event_name: selection.event_name.clone(),
            selection_name: selection.selection_name.clone(),
            stake,
            odds: selection.odds,
            status: BetStatus::Pending,
            placed_at: receipt.placed_at,
        });
        state
            .receipts_by_key
            .insert(selection.idempotency_key.clone(), receipt.clone());
        Ok(Some(receipt))
    }

    async fn list_bets(&self, user_id: &str, filter: BetFilter) -> ServiceResult<Vec<Bet>> {
        let state = self.lock()?;
        let mut bets: Vec<Bet> = state
            .bets
            .get(user_id)
            .map(|b| {
                b.iter()
                    .filter(|bet| filter == BetFilter::All || bet.status == BetStatus::Pending)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        bets.sort_by(|a, b| b.placed_at.cmp(&a.placed_at));
        Ok(bets)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> LocalBackend {
        LocalBackend::with_params(Seed::demo(), Params::new(1024, 1, 1, None).ok())
    }

    fn selection(key: &str) -> BetSelection {
        BetSelection {
            event_id: "ev-1001".into(),
            event_name: "Arsenal v Chelsea".into(),
            market_key: "ev-1001-1x2".into(),
            selection_id: "ev-1001-home".into(),
            selection_name: "Arsenal".into(),
            odds: Decimal::new(210, 2),
            idempotency_key: key.into(),
        }
    }

    #[tokio::test]
    async fn seeded_account_authenticates() {
        let b = backend();
        let user = b.authenticate("5551234567", "4321").await.unwrap().unwrap();
        assert_eq!(user.name, "Jane Wanjiru");
        assert!(b.authenticate("5551234567", "0000").await.unwrap().is_none());
        assert!(b.authenticate("5550000000", "4321").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn duplicate_registration_is_refused() {
        let b = backend();
        assert!(b.create("5551234567", "Other", "1111").await.unwrap().is_none());
        let created = b.create("254700000002", "Otieno", "2468").await.unwrap().unwrap();
        assert_eq!(b.get_balance(&created.id).await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn placement_debits_wallet_once_per_key() {
        let b = backend();
        let user = b.find_by_phone("5551234567").await.unwrap().unwrap();
        let stake = Decimal::new(100, 0);

        let first = b.place_bet(&user.id, &selection("s1:7"), stake).await.unwrap().unwrap();
        let again = b.place_bet(&user.id, &selection("s1:7"), stake).await.unwrap().unwrap();
        assert_eq!(first.reference, again.reference);
        assert_eq!(first.potential_payout, Decimal::new(210, 0));
        assert_eq!(b.bet_count(&user.id), 1);
        assert_eq!(b.get_balance(&user.id).await.unwrap(), Decimal::new(900, 0));
    }

    #[tokio::test]
    async fn placement_over_balance_is_refused() {
        let b = backend();
        let user = b.find_by_phone("5551234567").await.unwrap().unwrap();
        let placed = b
            .place_bet(&user.id, &selection("s1:8"), Decimal::new(5000, 0))
            .await
            .unwrap();
        assert!(placed.is_none());
    }

    #[tokio::test]
    async fn events_are_filtered_by_sport() {
        let b = backend();
        let events = b.list_events("soccer").await.unwrap();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.sport_key == "soccer"));
        assert!(b.list_events("cricket").await.unwrap().is_empty());
    }
}
