#![warn(clippy::all, missing_docs)]

//! Core domain logic for SRTGo.
//!
//! This crate hosts the reservation models, credential storage, settings
//! persistence and the reservation session runner used by the terminal UI
//! and any future frontends. Carrier protocol clients plug in through
//! [`rail::RailClient`].

pub mod config;
pub mod error;
pub mod models;
pub mod progress;
pub mod rail;
pub mod session;
pub mod settings;
pub mod store;

pub use config::AppConfig;
pub use error::{RailError, SessionError, SettingsError, StoreError, ValidationError};
pub use models::{Account, Carrier, ReservationParameters, SeatPreference};
pub use progress::{ProgressEvent, ProgressReceiver};
pub use session::{ReservationSessionRunner, RunnerOptions, SessionOutcome, SessionPhase};
pub use settings::SettingsRepository;
pub use store::CredentialStore;
