mod app;
mod prompt;

use std::{
    fs::{self, OpenOptions},
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use srtgo_core::{
    config::{self, AppConfig},
    models::{Carrier, PassengerCounts, SeatClass},
    rail::{DryRunRailClient, RailClient, RailSession, Reservation, Train},
    CredentialStore, RailError, RunnerOptions, SettingsRepository,
};
use tracing::info;
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    config::ensure_default_config()?;
    let config = AppConfig::load()?;

    let store = Arc::new(CredentialStore::from_config(&config.store));
    let settings = SettingsRepository::new(store);
    let options = RunnerOptions::from(&config.session);

    let clients = Clients {
        srt: client_for(Carrier::Srt, config.dry_run),
        ktx: client_for(Carrier::Ktx, config.dry_run),
    };
    info!(dry_run = config.dry_run, "starting srtgo");

    let mut app = app::SrtGoApp::new(settings, clients, options, config.dry_run);
    app.run().await
}

/// One carrier client per supported carrier.
pub struct Clients {
    srt: Arc<dyn RailClient>,
    ktx: Arc<dyn RailClient>,
}

impl Clients {
    fn get(&self, carrier: Carrier) -> Arc<dyn RailClient> {
        match carrier {
            Carrier::Srt => Arc::clone(&self.srt),
            Carrier::Ktx => Arc::clone(&self.ktx),
        }
    }
}

fn client_for(carrier: Carrier, dry_run: bool) -> Arc<dyn RailClient> {
    if dry_run {
        Arc::new(DryRunRailClient::new(carrier))
    } else {
        Arc::new(UnlinkedRailClient)
    }
}

/// Stand-in used when no live carrier client is compiled in.
struct UnlinkedRailClient;

impl UnlinkedRailClient {
    fn unavailable<T>() -> Result<T, RailError> {
        Err(RailError::Auth(
            "no live carrier client is linked; set dry_run = true in settings.toml to rehearse"
                .to_string(),
        ))
    }
}

impl RailClient for UnlinkedRailClient {
    fn login(&self, _account_id: &str, _password: &str) -> Result<RailSession, RailError> {
        Self::unavailable()
    }

    fn search(
        &self,
        _session: &RailSession,
        _departure: &str,
        _arrival: &str,
        _date: NaiveDate,
        _hour: u8,
    ) -> Result<Vec<Train>, RailError> {
        Self::unavailable()
    }

    fn reserve(
        &self,
        _session: &RailSession,
        _train: &Train,
        _seat_class: SeatClass,
        _passengers: &PassengerCounts,
    ) -> Result<Reservation, RailError> {
        Self::unavailable()
    }

    fn pay(&self, _session: &RailSession, _reservation: &Reservation) -> Result<(), RailError> {
        Self::unavailable()
    }
}

fn init_logging() -> Result<()> {
    let log_dir = config::config_dir().join("logs");
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create {}", log_dir.display()))?;
    let log_path = log_dir.join("srtgo.log");
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // The terminal belongs to the UI, so only the file layer is installed.
    let file_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(false)
        .compact()
        .with_writer(Mutex::new(log_file));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .init();

    Ok(())
}
