//! Credential check and session token issuance.
//!
//! A team record without a hash is enrolled by whoever logs in first. The
//! enrollment write is conditional on the version read, so two racing first
//! logins cannot both enroll: the loser is verified against the winner's
//! hash like any later login.
//!
//! Store reads and writes, hashing and verification all run on the blocking
//! pool; none of them may hold up the runtime threads serving requests.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use vickrey_core::paths;
use vickrey_core::store::{
    run_blocking, to_fields, DocPath, DocumentStore, DocumentStoreExt, Precondition, StoreError,
};
use vickrey_core::team::TeamRecord;

use crate::identity::{IdentityError, IdentityProvider};
use crate::password::{self, PasswordError};

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("invalid JSON payload")]
    InvalidPayload,

    #[error("team not found")]
    TeamNotFound,

    #[error("unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Password(#[from] PasswordError),

    #[error(transparent)]
    Identity(#[from] IdentityError),

    #[error("background task failed: {0}")]
    Task(String),
}

impl BrokerError {
    pub fn status(&self) -> StatusCode {
        match self {
            BrokerError::InvalidPayload => StatusCode::BAD_REQUEST,
            BrokerError::TeamNotFound => StatusCode::NOT_FOUND,
            BrokerError::Unauthorized => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("login failed: {self}");
            return (status, "internal error").into_response();
        }
        (status, self.to_string()).into_response()
    }
}

/// Outcome of trying to enroll a first password.
enum Enrollment {
    Enrolled,
    /// Someone else enrolled first; verify against their hash.
    LostRace(String),
}

/// Authenticates teams against their credential records.
pub struct Broker {
    store: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
}

impl Broker {
    pub fn new(store: Arc<dyn DocumentStore>, identity: Arc<dyn IdentityProvider>) -> Self {
        Self { store, identity }
    }

    /// Enroll or verify `password` for `username` and return a session token.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<String, BrokerError> {
        let path = paths::team(username).map_err(|_| BrokerError::TeamNotFound)?;
        let Some((record, version)) = self.read_team(&path).await? else {
            return Err(BrokerError::TeamNotFound);
        };

        let stored_hash = match record.password_hash.filter(|h| !h.is_empty()) {
            Some(hash) => hash,
            None => match self.enroll(&path, version, password).await? {
                Enrollment::Enrolled => {
                    info!(username, "enrolled first password");
                    return self.issue(username).await;
                }
                Enrollment::LostRace(hash) => {
                    debug!(username, "lost enrollment race, verifying against winner");
                    hash
                }
            },
        };

        if !verify_blocking(password, stored_hash).await? {
            warn!(username, "password mismatch");
            return Err(BrokerError::Unauthorized);
        }
        self.issue(username).await
    }

    async fn enroll(
        &self,
        path: &DocPath,
        version: u64,
        password: &str,
    ) -> Result<Enrollment, BrokerError> {
        let hash = hash_blocking(password).await?;
        let record = TeamRecord {
            password_hash: Some(hash),
            updated_at: Some(Utc::now()),
        };
        let fields = to_fields(path, &record)?;

        let written = run_blocking(&self.store, {
            let path = path.clone();
            move |store| store.update(&path, fields, Precondition::Version(version))
        })
        .await;
        match written {
            Ok(_) => Ok(Enrollment::Enrolled),
            Err(StoreError::Conflict { .. }) => {
                let Some((winner, _)) = self.read_team(path).await? else {
                    return Err(BrokerError::TeamNotFound);
                };
                // A concurrent reset or unrelated write can leave the record
                // without a hash; refuse rather than enroll on stale state.
                match winner.password_hash.filter(|h| !h.is_empty()) {
                    Some(hash) => Ok(Enrollment::LostRace(hash)),
                    None => Err(BrokerError::Unauthorized),
                }
            }
            Err(StoreError::NotFound(_)) => Err(BrokerError::TeamNotFound),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_team(&self, path: &DocPath) -> Result<Option<(TeamRecord, u64)>, StoreError> {
        let path = path.clone();
        run_blocking(&self.store, move |store| store.get_as::<TeamRecord>(&path)).await
    }

    async fn issue(&self, username: &str) -> Result<String, BrokerError> {
        Ok(self.identity.custom_token(username).await?)
    }
}

async fn hash_blocking(password: &str) -> Result<String, BrokerError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || password::hash_password(&password))
        .await
        .map_err(|e| BrokerError::Task(e.to_string()))?
        .map_err(BrokerError::from)
}

async fn verify_blocking(password: &str, hash: String) -> Result<bool, BrokerError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || password::verify_password(&password, &hash))
        .await
        .map_err(|e| BrokerError::Task(e.to_string()))?
        .map_err(BrokerError::from)
}
