//! JSON-over-HTTP adapter backend.
//!
//! Talks to the external user directory, wallet, catalog and betting
//! services through one base URL:
//!
//! | Call | Request |
//! |------|---------|
//! | find by phone | `GET  /users/by-phone/{phone}` |
//! | authenticate | `POST /users/authenticate` `{phone, pin}` |
//! | create | `POST /users` `{phone, name, pin}` |
//! | balance | `GET  /wallets/{user_id}/balance` -> `{balance}` |
//! | sports | `GET  /sports` |
//! | events | `GET  /sports/{key}/events` |
//! | place bet | `POST /bets` `{user_id, selection, stake}` |
//! | list bets | `GET  /users/{user_id}/bets?status={active,all}` |
//!
//! `404` on a lookup and `401`/`409`/`422` on a mutation mean "no result"
//! (`None`); any other non-success status is a [`ServiceError::Unavailable`].
//! The per-call bound is applied by [`super::Services`], the client timeout
//! here is only a backstop.

use async_trait::async_trait;
use log::debug;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{
    Bet, BetFilter, BetReceipt, BetSelection, Betting, Catalog, Event, ServiceError, ServiceResult, Sport, User,
    UserDirectory, Wallet,
};

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct Credentials<'a> {
    phone: &'a str,
    pin: &'a str,
}

#[derive(Serialize)]
struct NewUser<'a> {
    phone: &'a str,
    name: &'a str,
    pin: &'a str,
}

#[derive(Deserialize)]
struct BalanceBody {
    balance: Decimal,
}

#[derive(Serialize)]
struct PlaceBetBody<'a> {
    user_id: &'a str,
    selection: &'a BetSelection,
    stake: Decimal,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> ServiceResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout + Duration::from_secs(1))
            .user_agent(concat!("betline/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ServiceError::unavailable("http-client", e))?;
        Ok(HttpBackend {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Decode a JSON body, mapping any of `absent` to `None`.
    async fn decode<T: DeserializeOwned>(
        service: &'static str,
        response: reqwest::Response,
        absent: &[StatusCode],
    ) -> ServiceResult<Option<T>> {
        let status = response.status();
        if absent.contains(&status) {
            debug!("{} answered {}; treating as no result", service, status);
            return Ok(None);
        }
        if !status.is_success() {
            return Err(ServiceError::unavailable(service, format!("status {}", status)));
        }
        response
            .json::<T>()
            .await
            .map(Some)
            .map_err(|e| ServiceError::unavailable(service, e))
    }

    async fn get<T: DeserializeOwned>(
        &self,
        service: &'static str,
        path: &str,
        absent: &[StatusCode],
    ) -> ServiceResult<Option<T>> {
        let response = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| ServiceError::unavailable(service, e))?;
        Self::decode(service, response, absent).await
    }

    async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        service: &'static str,
        path: &str,
        body: &B,
        absent: &[StatusCode],
    ) -> ServiceResult<Option<T>> {
        let response = self
            .client
            .post(self.url(path))
            .json(body)
            .send()
            .await
            .map_err(|e| ServiceError::unavailable(service, e))?;
        Self::decode(service, response, absent).await
    }
}

const REFUSED: &[StatusCode] = &[
    StatusCode::UNAUTHORIZED,
    StatusCode::CONFLICT,
    StatusCode::UNPROCESSABLE_ENTITY,
];

#[async_trait]
impl UserDirectory for HttpBackend {
    async fn find_by_phone(&self, phone: &str) -> ServiceResult<Option<User>> {
        let path = format!("/users/by-phone/{}", urlencoding::encode(phone));
        self.get("user-directory", &path, &[StatusCode::NOT_FOUND]).await
    }

    async fn authenticate(&self, phone: &str, pin: &str) -> ServiceResult<Option<User>> {
        self.post(
            "user-directory",
            "/users/authenticate",
            &Credentials { phone, pin },
            &[StatusCode::NOT_FOUND, StatusCode::UNAUTHORIZED],
        )
        .await
    }

    async fn create(&self, phone: &str, name: &str, pin: &str) -> ServiceResult<Option<User>> {
        self.post("user-directory", "/users", &NewUser { phone, name, pin }, REFUSED)
            .await
    }
}

#[async_trait]
impl Wallet for HttpBackend {
    async fn get_balance(&self, user_id: &str) -> ServiceResult<Decimal> {
        let path = format!("/wallets/{}/balance", urlencoding::encode(user_id));
        let body: Option<BalanceBody> = self.get("wallet", &path, &[StatusCode::NOT_FOUND]).await?;
        body.map(|b| b.balance)
            .ok_or_else(|| ServiceError::rejected("wallet", format!("no wallet for {}", user_id)))
    }
}

#[async_trait]
impl Catalog for HttpBackend {
    async fn list_sports(&self) -> ServiceResult<Vec<Sport>> {
        let sports: Option<Vec<Sport>> = self.get("catalog", "/sports", &[]).await?;
        Ok(sports.unwrap_or_default())
    }

    async fn list_events(&self, sport_key: &str) -> ServiceResult<Vec<Event>> {
        let path = format!("/sports/{}/events", urlencoding::encode(sport_key));
        let events: Option<Vec<Event>> = self.get("catalog", &path, &[StatusCode::NOT_FOUND]).await?;
        Ok(events.unwrap_or_default())
    }
}

#[async_trait]
impl Betting for HttpBackend {
    async fn place_bet(
        &self,
        user_id: &str,
        selection: &BetSelection,
        stake: Decimal,
    ) -> ServiceResult<Option<BetReceipt>> {
        let body = PlaceBetBody {
            user_id,
            selection,
            stake,
        };
        self.post("betting", "/bets", &body, REFUSED).await
    }

    async fn list_bets(&self, user_id: &str, filter: BetFilter) -> ServiceResult<Vec<Bet>> {
        let path = format!(
            "/users/{}/bets?status={}",
            urlencoding::encode(user_id),
            filter.as_str()
        );
        let bets: Option<Vec<Bet>> = self.get("betting", &path, &[StatusCode::NOT_FOUND]).await?;
        Ok(bets.unwrap_or_default())
    }
}
