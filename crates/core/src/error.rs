//! Error types shared across the core crate.

use std::path::PathBuf;

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::Carrier;

/// Reservation or settings input that can never be acted upon.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Departure and arrival name the same station.
    #[error("departure and arrival are both {0}")]
    SameStation(String),
    /// Station is not part of the carrier catalog.
    #[error("{station} is not a {carrier} station")]
    UnknownStation {
        /// Carrier whose catalog was consulted.
        carrier: Carrier,
        /// Offending station name.
        station: String,
    },
    /// No passengers were requested.
    #[error("at least one passenger is required")]
    NoPassengers,
    /// More passengers than a single booking accepts.
    #[error("at most 9 passengers can travel together, got {0}")]
    TooManyPassengers(u32),
    /// Departure hour outside `0..=23`.
    #[error("departure hour must be between 0 and 23, got {0}")]
    InvalidHour(u8),
    /// Travel date already passed.
    #[error("travel date {0} is in the past")]
    DateInPast(NaiveDate),
    /// Station selection without any station.
    #[error("select at least one station")]
    EmptySelection,
    /// Station listed more than once in a selection.
    #[error("station {0} is selected more than once")]
    DuplicateStation(String),
    /// Login id or password left blank.
    #[error("login id and password are both required")]
    MissingCredentials,
}

/// Failures raised by a credential backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The secure backend is not usable on this host.
    #[error("no secure credential backend available: {0}")]
    NoBackend(String),
    /// Filesystem failure while writing the fallback store.
    #[error("failed to write {path}: {source}")]
    Io {
        /// File or directory being written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Store contents could not be encoded.
    #[error("failed to encode credential store: {0}")]
    Encode(#[from] serde_json::Error),
    /// Any other backend failure.
    #[error("credential backend error: {0}")]
    Backend(String),
}

/// Failures reported by a carrier client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RailError {
    /// Bad credentials or login refused.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// No seat left for the requested train and class.
    #[error("no seats available")]
    SoldOut,
    /// Payment was refused or did not complete.
    #[error("payment failed: {0}")]
    Payment(String),
    /// Carrier unreachable or timed out.
    #[error("network error: {0}")]
    Network(String),
    /// Anything else the carrier reported.
    #[error("{0}")]
    Other(String),
}

/// Failures raised while sending a notification.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Request could not be delivered.
    #[error("notification transport failed: {0}")]
    Transport(String),
    /// Service answered with a non-success status.
    #[error("notification rejected with status {status}: {body}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Response body returned by the service.
        body: String,
    },
}

/// Failures raised by [`crate::settings::SettingsRepository`] writes.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Input rejected before touching the store.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Store write failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Trial login failed.
    #[error(transparent)]
    Rail(#[from] RailError),
}

/// Reasons a reservation session refused to start.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Parameters failed validation; nothing was persisted.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// No saved login exists for the carrier.
    #[error("no {0} login saved; set up credentials first")]
    CredentialsRequired(Carrier),
    /// A session is already in flight on this runner.
    #[error("a reservation session is already running")]
    AlreadyRunning,
    /// Worker thread could not be spawned.
    #[error("failed to spawn reservation worker: {0}")]
    Spawn(#[source] std::io::Error),
}
