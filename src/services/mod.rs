//! # Outbound Service Adapters
//!
//! The menus never own accounts, balances, fixtures or bets. They reach the
//! systems that do through four narrow traits:
//!
//! - [`UserDirectory`] - account lookup, PIN authentication, registration
//! - [`Wallet`] - balance lookup
//! - [`Catalog`] - sports and their upcoming events (with markets and odds)
//! - [`Betting`] - bet placement and bet listings
//!
//! [`Services`] bundles one implementation of each and wraps every call in a
//! bounded timeout so a slow collaborator degrades into a "try later"
//! message instead of hanging the gateway callback.
//!
//! Two backends ship with the crate: [`local::LocalBackend`] (in-process,
//! seeded from JSON; used for development and tests) and, behind the
//! `http-services` feature, [`http::HttpBackend`] (JSON over HTTP).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, ServiceMode};
use crate::metrics;

#[cfg(feature = "http-services")]
pub mod http;
pub mod local;

/// Errors surfaced by adapter calls
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// The call did not finish within the configured bound.
    #[error("{service} call timed out after {after:?}")]
    Timeout {
        service: &'static str,
        after: Duration,
    },

    /// The collaborator could not be reached or answered with a fault.
    #[error("{service} unavailable: {reason}")]
    Unavailable {
        service: &'static str,
        reason: String,
    },

    /// The collaborator answered but refused the request.
    #[error("{service} rejected request: {reason}")]
    Rejected {
        service: &'static str,
        reason: String,
    },
}

impl ServiceError {
    pub fn unavailable(service: &'static str, reason: impl std::fmt::Display) -> Self {
        ServiceError::Unavailable {
            service,
            reason: reason.to_string(),
        }
    }

    pub fn rejected(service: &'static str, reason: impl std::fmt::Display) -> Self {
        ServiceError::Rejected {
            service,
            reason: reason.to_string(),
        }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub phone: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sport {
    pub key: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub sport_key: String,
    pub name: String,
    pub starts_at: DateTime<Utc>,
    #[serde(default)]
    pub markets: Vec<Market>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    pub key: String,
    pub name: String,
    pub selections: Vec<Selection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    pub id: String,
    pub name: String,
    pub odds: Decimal,
}

/// What the caller chose, as sent to [`Betting::place_bet`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetSelection {
    pub event_id: String,
    pub event_name: String,
    pub market_key: String,
    pub selection_id: String,
    pub selection_name: String,
    pub odds: Decimal,
    /// Repeated placements with the same key must not create a second bet.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BetReceipt {
    pub reference: String,
    pub stake: Decimal,
    pub odds: Decimal,
    pub potential_payout: Decimal,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetStatus {
    Pending,
    Won,
    Lost,
    Void,
}

impl BetStatus {
    pub fn label(self) -> &'static str {
        match self {
            BetStatus::Pending => "Pending",
            BetStatus::Won => "Won",
            BetStatus::Lost => "Lost",
            BetStatus::Void => "Void",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bet {
    pub reference: String,
    pub event_name: String,
    pub selection_name: String,
    pub stake: Decimal,
    pub odds: Decimal,
    pub status: BetStatus,
    pub placed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BetFilter {
    /// Unsettled bets
    Active,
    /// Everything, newest first
    All,
}

impl BetFilter {
    pub fn as_str(self) -> &'static str {
        match self {
            BetFilter::Active => "active",
            BetFilter::All => "all",
        }
    }
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_by_phone(&self, phone: &str) -> ServiceResult<Option<User>>;
    async fn authenticate(&self, phone: &str, pin: &str) -> ServiceResult<Option<User>>;
    async fn create(&self, phone: &str, name: &str, pin: &str) -> ServiceResult<Option<User>>;
}

#[async_trait]
pub trait Wallet: Send + Sync {
    async fn get_balance(&self, user_id: &str) -> ServiceResult<Decimal>;
}

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn list_sports(&self) -> ServiceResult<Vec<Sport>>;
    async fn list_events(&self, sport_key: &str) -> ServiceResult<Vec<Event>>;
}

#[async_trait]
pub trait Betting: Send + Sync {
    async fn place_bet(
        &self,
        user_id: &str,
        selection: &BetSelection,
        stake: Decimal,
    ) -> ServiceResult<Option<BetReceipt>>;
    async fn list_bets(&self, user_id: &str, filter: BetFilter) -> ServiceResult<Vec<Bet>>;
}

/// One implementation of each adapter plus the per-call bound.
#[derive(Clone)]
pub struct Services {
    users: Arc<dyn UserDirectory>,
    wallet: Arc<dyn Wallet>,
    catalog: Arc<dyn Catalog>,
    betting: Arc<dyn Betting>,
    timeout: Duration,
}

impl Services {
    pub fn new(
        users: Arc<dyn UserDirectory>,
        wallet: Arc<dyn Wallet>,
        catalog: Arc<dyn Catalog>,
        betting: Arc<dyn Betting>,
        timeout: Duration,
    ) -> Self {
        Self {
            users,
            wallet,
            catalog,
            betting,
            timeout,
        }
    }

    /// Use a single backend that implements all four adapters.
    pub fn from_backend<B>(backend: Arc<B>, timeout: Duration) -> Self
    where
        B: UserDirectory + Wallet + Catalog + Betting + 'static,
    {
        Self {
            users: backend.clone(),
            wallet: backend.clone(),
            catalog: backend.clone(),
            betting: backend,
            timeout,
        }
    }

    /// Build the configured backend.
    pub async fn from_config(config: &Config) -> anyhow::Result<Self> {
        let timeout = config.services.timeout();
        match config.services.mode {
            ServiceMode::Local => {
                let seed = match &config.services.seed_file {
                    Some(path) if std::path::Path::new(path).exists() => local::Seed::load(path).await?,
                    Some(path) => {
                        warn!("Seed file {} not found; using built-in demo catalog", path);
                        local::Seed::demo()
                    }
                    None => local::Seed::demo(),
                };
                let backend = local::LocalBackend::with_params(seed, config.argon2_params()?);
                info!("Using local services ({} account(s))", backend.user_count());
                Ok(Self::from_backend(Arc::new(backend), timeout))
            }
            #[cfg(feature = "http-services")]
            ServiceMode::Http => {
                let backend = http::HttpBackend::new(&config.services.base_url, timeout)?;
                info!("Using HTTP services at {}", config.services.base_url);
                Ok(Self::from_backend(Arc::new(backend), timeout))
            }
            #[cfg(not(feature = "http-services"))]
            ServiceMode::Http => Err(anyhow::anyhow!(
                "services.mode = \"http\" requires the http-services feature"
            )),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn bounded<T, F>(&self, service: &'static str, fut: F) -> ServiceResult<T>
    where
        F: Future<Output = ServiceResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                if !matches!(e, ServiceError::Rejected { .. }) {
                    metrics::inc_adapter_failures();
                }
                warn!("{} call failed: {}", service, e);
                Err(e)
            }
            Err(_) => {
                metrics::inc_adapter_timeouts();
                warn!("{} call timed out after {:?}", service, self.timeout);
                Err(ServiceError::Timeout {
                    service,
                    after: self.timeout,
                })
            }
        }
    }

    pub async fn find_user_by_phone(&self, phone: &str) -> ServiceResult<Option<User>> {
        self.bounded("user-directory", self.users.find_by_phone(phone))
            .await
    }

    pub async fn authenticate(&self, phone: &str, pin: &str) -> ServiceResult<Option<User>> {
        self.bounded("user-directory", self.users.authenticate(phone, pin))
            .await
    }

    pub async fn create_user(&self, phone: &str, name: &str, pin: &str) -> ServiceResult<Option<User>> {
        self.bounded("user-directory", self.users.create(phone, name, pin))
            .await
    }

    pub async fn balance(&self, user_id: &str) -> ServiceResult<Decimal> {
        self.bounded("wallet", self.wallet.get_balance(user_id)).await
    }

    pub async fn sports(&self) -> ServiceResult<Vec<Sport>> {
        self.bounded("catalog", self.catalog.list_sports()).await
    }

    pub async fn events(&self, sport_key: &str) -> ServiceResult<Vec<Event>> {
        self.bounded("catalog", self.catalog.list_events(sport_key))
            .await
    }

    /// Find one event of a sport by id.
    pub async fn event(&self, sport_key: &str, event_id: &str) -> ServiceResult<Option<Event>> {
        let events = self.events(sport_key).await?;
        Ok(events.into_iter().find(|e| e.id == event_id))
    }

    pub async fn place_bet(
        &self,
        user_id: &str,
        selection: &BetSelection,
        stake: Decimal,
    ) -> ServiceResult<Option<BetReceipt>> {
        self.bounded("betting", self.betting.place_bet(user_id, selection, stake))
            .await
    }

    pub async fn bets(&self, user_id: &str, filter: BetFilter) -> ServiceResult<Vec<Bet>> {
        self.bounded("betting", self.betting.list_bets(user_id, filter))
            .await
    }
}

/// `stake * odds`, rounded to cents.
pub fn potential_payout(stake: Decimal, odds: Decimal) -> Decimal {
    (stake * odds).round_dp(2)
}
