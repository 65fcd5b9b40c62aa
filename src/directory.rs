//! Lookups owned by other services: apartment pricing and renter identity.
//!
//! A "not found" answer is `Ok(None)`. `Err` is reserved for the remote side
//! being unreachable or answering garbage, so callers never mistake an outage
//! for a missing record.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::model::{ApartmentId, RenterId};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{service} lookup failed: {message}")]
pub struct DirectoryError {
    pub service: &'static str,
    pub message: String,
}

impl DirectoryError {
    fn new(service: &'static str, message: impl Into<String>) -> Self {
        Self {
            service,
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait ApartmentDirectory: Send + Sync {
    async fn nightly_rate(&self, apartment_id: ApartmentId) -> Result<Option<Decimal>, DirectoryError>;
}

#[async_trait]
pub trait RenterDirectory: Send + Sync {
    async fn id_for_email(&self, email: &str) -> Result<Option<RenterId>, DirectoryError>;
}

/// The collaborators an engine is wired with.
#[derive(Clone)]
pub struct Directories {
    pub apartments: Arc<dyn ApartmentDirectory>,
    pub renters: Arc<dyn RenterDirectory>,
}

impl Directories {
    /// Use one value for both lookups.
    pub fn from_shared<D>(directory: Arc<D>) -> Self
    where
        D: ApartmentDirectory + RenterDirectory + 'static,
    {
        Self {
            apartments: directory.clone(),
            renters: directory,
        }
    }
}

// ── HTTP ─────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApartmentBody {
    #[serde(with = "rust_decimal::serde::float")]
    nightly_rate: Decimal,
}

#[derive(Deserialize)]
struct RenterIdBody {
    id: RenterId,
}

/// Talks to the apartments and users services over JSON/HTTP.
#[derive(Debug, Clone)]
pub struct HttpDirectory {
    client: reqwest::Client,
    apartments_url: String,
    users_url: String,
}

impl HttpDirectory {
    pub fn new(apartments_url: &str, users_url: &str, timeout: Duration) -> Result<Self, DirectoryError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DirectoryError::new("http", e.to_string()))?;
        Ok(Self {
            client,
            apartments_url: apartments_url.trim_end_matches('/').to_string(),
            users_url: users_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        service: &'static str,
        request: reqwest::RequestBuilder,
    ) -> Result<Option<T>, DirectoryError> {
        let response = request
            .send()
            .await
            .map_err(|e| DirectoryError::new(service, e.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => response
                .json::<T>()
                .await
                .map(Some)
                .map_err(|e| DirectoryError::new(service, format!("invalid body: {e}"))),
            status => Err(DirectoryError::new(service, format!("unexpected status {status}"))),
        }
    }
}

#[async_trait]
impl ApartmentDirectory for HttpDirectory {
    async fn nightly_rate(&self, apartment_id: ApartmentId) -> Result<Option<Decimal>, DirectoryError> {
        let url = format!("{}/apartments/{apartment_id}", self.apartments_url);
        let body: Option<ApartmentBody> = self.get_json("apartments", self.client.get(url)).await?;
        Ok(body.map(|b| b.nightly_rate))
    }
}

#[async_trait]
impl RenterDirectory for HttpDirectory {
    async fn id_for_email(&self, email: &str) -> Result<Option<RenterId>, DirectoryError> {
        let url = format!("{}/users/id", self.users_url);
        let request = self.client.get(url).query(&[("email", email)]);
        let body: Option<RenterIdBody> = self.get_json("users", request).await?;
        Ok(body.map(|b| b.id))
    }
}

// ── In-memory ────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeedApartment {
    id: ApartmentId,
    #[serde(with = "rust_decimal::serde::float")]
    nightly_rate: Decimal,
}

#[derive(Deserialize)]
struct SeedRenter {
    id: RenterId,
    email: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct Seed {
    apartments: Vec<SeedApartment>,
    renters: Vec<SeedRenter>,
}

/// Fixed apartment rates and renter emails held in memory.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    rates: DashMap<ApartmentId, Decimal>,
    renters: DashMap<String, RenterId>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed format: `{"apartments":[{"id":1,"nightlyRate":100}],"renters":[{"id":7,"email":"a@b.c"}]}`.
    pub fn from_seed_json(json: &str) -> Result<Self, serde_json::Error> {
        let seed: Seed = serde_json::from_str(json)?;
        let dir = Self::new();
        for a in seed.apartments {
            dir.set_rate(a.id, a.nightly_rate);
        }
        for r in seed.renters {
            dir.add_renter(r.id, &r.email);
        }
        Ok(dir)
    }

    pub fn set_rate(&self, apartment_id: ApartmentId, nightly_rate: Decimal) {
        self.rates.insert(apartment_id, nightly_rate);
    }

    pub fn add_renter(&self, renter_id: RenterId, email: &str) {
        self.renters.insert(email.to_string(), renter_id);
    }
}

#[async_trait]
impl ApartmentDirectory for StaticDirectory {
    async fn nightly_rate(&self, apartment_id: ApartmentId) -> Result<Option<Decimal>, DirectoryError> {
        Ok(self.rates.get(&apartment_id).map(|r| *r.value()))
    }
}

#[async_trait]
impl RenterDirectory for StaticDirectory {
    async fn id_for_email(&self, email: &str) -> Result<Option<RenterId>, DirectoryError> {
        Ok(self.renters.get(email).map(|r| *r.value()))
    }
}
