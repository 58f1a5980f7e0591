//! Typed settings stored in the [`CredentialStore`].
//!
//! Values are kept under the carrier name as service (`SRT`, `KTX`) with one
//! key per field, matching the layout older SRTGo releases wrote, so existing
//! keychains and `config.json` files keep working.

use std::{str::FromStr, sync::Arc};

use chrono::{Local, NaiveDate, NaiveDateTime};
use tracing::{debug, info, warn};

use crate::{
    error::{SettingsError, StoreError, ValidationError},
    models::{
        stations, Account, Carrier, PassengerOptionSet, ReservationParameters, StationSelection,
    },
    rail::RailClient,
    store::CredentialStore,
};

const KEY_ID: &str = "id";
const KEY_PASSWORD: &str = "pass";
const KEY_VERIFIED: &str = "ok";
const KEY_STATIONS: &str = "station";

// Passenger options are global but have always lived under the SRT service.
const OPTIONS_SERVICE: &str = "SRT";
const KEY_OPTIONS: &str = "options";

const NOTIFY_SERVICE: &str = "kakao";
const KEY_ACCESS_TOKEN: &str = "access_token";

const KEY_DEPARTURE: &str = "departure";
const KEY_ARRIVAL: &str = "arrival";
const KEY_DATE: &str = "date";
const KEY_TIME: &str = "time";
const KEY_ADULT: &str = "adult";
const KEY_CHILD: &str = "child";
const KEY_SENIOR: &str = "senior";
const KEY_DISABILITY_1_TO_3: &str = "disability1to3";
const KEY_DISABILITY_4_TO_6: &str = "disability4to6";
const KEY_SEAT: &str = "seat";
const KEY_AUTO_PAY: &str = "auto_pay";

const DATE_FORMAT: &str = "%Y%m%d";

/// Typed accessors over the credential store. Cheap to clone; every load re-reads the store.
#[derive(Clone)]
pub struct SettingsRepository {
    store: Arc<CredentialStore>,
}

impl SettingsRepository {
    /// Wrap a shared store.
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }

    /// Underlying store.
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Saved login for `carrier`, if both id and password are present.
    pub fn load_account(&self, carrier: Carrier) -> Option<Account> {
        let service = carrier.as_str();
        let id = self.store.get(service, KEY_ID).filter(|id| !id.is_empty())?;
        let password = self
            .store
            .get(service, KEY_PASSWORD)
            .filter(|password| !password.is_empty())?;
        let verified = self.store.get(service, KEY_VERIFIED).as_deref() == Some("1");
        Some(Account {
            carrier,
            id,
            password,
            verified,
        })
    }

    /// Persist a login for `carrier`.
    pub fn save_account(
        &self,
        carrier: Carrier,
        id: &str,
        password: &str,
        verified: bool,
    ) -> Result<(), SettingsError> {
        let id = id.trim();
        if id.is_empty() || password.is_empty() {
            return Err(ValidationError::MissingCredentials.into());
        }
        let service = carrier.as_str();
        self.store.set(service, KEY_ID, id)?;
        self.store.set(service, KEY_PASSWORD, password)?;
        self.store
            .set(service, KEY_VERIFIED, if verified { "1" } else { "0" })?;
        info!(%carrier, verified, "saved login");
        Ok(())
    }

    /// Try the login against the carrier and save it as verified only if it succeeds.
    pub fn verify_and_save_account(
        &self,
        client: &dyn RailClient,
        carrier: Carrier,
        id: &str,
        password: &str,
    ) -> Result<Account, SettingsError> {
        let id = id.trim();
        if id.is_empty() || password.is_empty() {
            return Err(ValidationError::MissingCredentials.into());
        }
        client.login(id, password)?;
        self.save_account(carrier, id, password, true)?;
        Ok(Account {
            carrier,
            id: id.to_string(),
            password: password.to_string(),
            verified: true,
        })
    }

    /// Forget the login for `carrier`.
    pub fn delete_account(&self, carrier: Carrier) -> Result<(), StoreError> {
        let service = carrier.as_str();
        for key in [KEY_ID, KEY_PASSWORD, KEY_VERIFIED] {
            self.store.delete(service, key)?;
        }
        info!(%carrier, "deleted login");
        Ok(())
    }

    /// Catalog and current selection for `carrier`; the carrier default when nothing usable is saved.
    pub fn load_stations(&self, carrier: Carrier) -> (&'static [&'static str], StationSelection) {
        let catalog = stations::catalog(carrier);
        let Some(raw) = self.store.get(carrier.as_str(), KEY_STATIONS) else {
            return (catalog, StationSelection::default_for(carrier));
        };

        let mut selected: Vec<String> = Vec::new();
        for name in raw.split(',').map(str::trim).filter(|name| !name.is_empty()) {
            if !stations::is_known(carrier, name) {
                warn!(%carrier, station = name, "dropping unknown saved station");
            } else if !selected.iter().any(|existing| existing == name) {
                selected.push(name.to_string());
            }
        }

        if selected.is_empty() {
            return (catalog, StationSelection::default_for(carrier));
        }
        (
            catalog,
            StationSelection {
                carrier,
                stations: selected,
            },
        )
    }

    /// Persist a station selection; invalid selections leave the stored one untouched.
    pub fn save_stations(&self, selection: &StationSelection) -> Result<(), SettingsError> {
        selection.validate()?;
        self.store.set(
            selection.carrier.as_str(),
            KEY_STATIONS,
            &selection.stations.join(","),
        )?;
        Ok(())
    }

    /// Enabled passenger options.
    pub fn load_options(&self) -> PassengerOptionSet {
        self.store
            .get(OPTIONS_SERVICE, KEY_OPTIONS)
            .map(|raw| PassengerOptionSet::parse(&raw))
            .unwrap_or_default()
    }

    /// Persist passenger options.
    pub fn save_options(&self, options: &PassengerOptionSet) -> Result<(), StoreError> {
        self.store
            .set(OPTIONS_SERVICE, KEY_OPTIONS, &options.to_stored())
    }

    /// KakaoTalk access token used for notifications.
    pub fn load_notification_token(&self) -> Option<String> {
        self.store
            .get(NOTIFY_SERVICE, KEY_ACCESS_TOKEN)
            .filter(|token| !token.trim().is_empty())
    }

    /// Persist the KakaoTalk access token; an empty token removes it.
    pub fn save_notification_token(&self, token: &str) -> Result<(), StoreError> {
        let token = token.trim();
        if token.is_empty() {
            return self.store.delete(NOTIFY_SERVICE, KEY_ACCESS_TOKEN);
        }
        self.store.set(NOTIFY_SERVICE, KEY_ACCESS_TOKEN, token)
    }

    /// Last used parameters for `carrier` merged over the built-in defaults.
    pub fn load_reservation_parameters(&self, carrier: Carrier) -> ReservationParameters {
        self.load_reservation_parameters_at(carrier, Local::now().naive_local())
    }

    /// Same as [`Self::load_reservation_parameters`] with an explicit clock.
    pub fn load_reservation_parameters_at(
        &self,
        carrier: Carrier,
        now: NaiveDateTime,
    ) -> ReservationParameters {
        let defaults = ReservationParameters::defaults(carrier, now);
        let service = carrier.as_str();
        let today = now.date();

        let departure = self
            .store
            .get(service, KEY_DEPARTURE)
            .filter(|name| !name.is_empty())
            .unwrap_or(defaults.departure);
        let arrival = self
            .store
            .get(service, KEY_ARRIVAL)
            .filter(|name| !name.is_empty())
            .unwrap_or(defaults.arrival);
        let date = self.field(service, KEY_DATE, defaults.date, |raw| {
            NaiveDate::parse_from_str(raw, DATE_FORMAT).ok()
        });
        let date = if date < today {
            debug!(%carrier, %date, "saved travel date has passed, using default");
            defaults.date
        } else {
            date
        };
        let hour = self.field(service, KEY_TIME, defaults.hour, |raw| {
            raw.get(..2)
                .and_then(|hour| hour.parse::<u8>().ok())
                .filter(|hour| *hour <= 23)
        });

        let mut passengers = defaults.passengers;
        passengers.adult = self.parsed(service, KEY_ADULT, passengers.adult);
        passengers.child = self.parsed(service, KEY_CHILD, passengers.child);
        passengers.senior = self.parsed(service, KEY_SENIOR, passengers.senior);
        passengers.disability1to3 =
            self.parsed(service, KEY_DISABILITY_1_TO_3, passengers.disability1to3);
        passengers.disability4to6 =
            self.parsed(service, KEY_DISABILITY_4_TO_6, passengers.disability4to6);

        let seat = self.parsed(service, KEY_SEAT, defaults.seat);
        let auto_pay = self.field(service, KEY_AUTO_PAY, defaults.auto_pay, |raw| match raw {
            "1" | "true" => Some(true),
            "0" | "false" => Some(false),
            _ => None,
        });

        ReservationParameters {
            departure,
            arrival,
            date,
            hour,
            passengers,
            seat,
            auto_pay,
        }
    }

    /// Persist parameters as the defaults for the next session.
    pub fn save_reservation_parameters(
        &self,
        carrier: Carrier,
        params: &ReservationParameters,
    ) -> Result<(), StoreError> {
        let service = carrier.as_str();
        let counts = &params.passengers;
        let fields = [
            (KEY_DEPARTURE, params.departure.clone()),
            (KEY_ARRIVAL, params.arrival.clone()),
            (KEY_DATE, params.date.format(DATE_FORMAT).to_string()),
            (KEY_TIME, format!("{:02}0000", params.hour)),
            (KEY_ADULT, counts.adult.to_string()),
            (KEY_CHILD, counts.child.to_string()),
            (KEY_SENIOR, counts.senior.to_string()),
            (KEY_DISABILITY_1_TO_3, counts.disability1to3.to_string()),
            (KEY_DISABILITY_4_TO_6, counts.disability4to6.to_string()),
            (KEY_SEAT, params.seat.as_str().to_string()),
            (KEY_AUTO_PAY, if params.auto_pay { "1" } else { "0" }.to_string()),
        ];
        for (key, value) in fields {
            self.store.set(service, key, &value)?;
        }
        debug!(%carrier, "saved reservation parameters");
        Ok(())
    }

    fn field<T>(
        &self,
        service: &str,
        key: &str,
        default: T,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> T {
        let Some(raw) = self.store.get(service, key) else {
            return default;
        };
        match parse(raw.trim()) {
            Some(value) => value,
            None => {
                warn!(service, key, value = %raw, "ignoring unreadable saved value");
                default
            }
        }
    }

    fn parsed<T: FromStr>(&self, service: &str, key: &str, default: T) -> T {
        self.field(service, key, default, |raw| raw.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::RailError,
        models::{PassengerCategory, PassengerCounts, SeatClass, SeatPreference},
        rail::{DryRunRailClient, RailSession, Reservation, Train},
    };
    use std::time::Duration;
    use tempfile::{tempdir, TempDir};

    fn repository() -> (TempDir, SettingsRepository) {
        let dir = tempdir().expect("tempdir");
        let store = CredentialStore::file_only(dir.path().join("config.json"));
        (dir, SettingsRepository::new(Arc::new(store)))
    }

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(9, 30, 0)
            .unwrap()
    }

    #[test]
    fn account_round_trip_and_delete() -> anyhow::Result<()> {
        let (_dir, settings) = repository();
        assert_eq!(settings.load_account(Carrier::Srt), None);

        settings.save_account(Carrier::Srt, " 010-1234-5678 ", "secret", false)?;
        let account = settings.load_account(Carrier::Srt).expect("saved account");
        assert_eq!(account.id, "010-1234-5678");
        assert_eq!(account.password, "secret");
        assert!(!account.verified);
        assert_eq!(settings.load_account(Carrier::Ktx), None);

        settings.delete_account(Carrier::Srt)?;
        assert_eq!(settings.load_account(Carrier::Srt), None);
        settings.delete_account(Carrier::Srt)?;
        Ok(())
    }

    #[test]
    fn blank_credentials_are_rejected() {
        let (_dir, settings) = repository();
        assert!(matches!(
            settings.save_account(Carrier::Ktx, "  ", "secret", true),
            Err(SettingsError::Validation(ValidationError::MissingCredentials))
        ));
        assert_eq!(settings.load_account(Carrier::Ktx), None);
    }

    #[test]
    fn verified_only_after_successful_trial_login() -> anyhow::Result<()> {
        let (_dir, settings) = repository();
        let client = DryRunRailClient::new(Carrier::Srt).with_latency(Duration::ZERO);

        let account =
            settings.verify_and_save_account(&client, Carrier::Srt, "member", "secret")?;
        assert!(account.verified);
        assert_eq!(settings.load_account(Carrier::Srt), Some(account));
        Ok(())
    }

    #[test]
    fn failed_trial_login_writes_nothing() {
        struct RejectingClient;

        impl RailClient for RejectingClient {
            fn login(&self, _: &str, _: &str) -> Result<RailSession, RailError> {
                Err(RailError::Auth("bad password".to_string()))
            }

            fn search(
                &self,
                _: &RailSession,
                _: &str,
                _: &str,
                _: NaiveDate,
                _: u8,
            ) -> Result<Vec<Train>, RailError> {
                unreachable!("search after failed login")
            }

            fn reserve(
                &self,
                _: &RailSession,
                _: &Train,
                _: SeatClass,
                _: &PassengerCounts,
            ) -> Result<Reservation, RailError> {
                unreachable!("reserve after failed login")
            }

            fn pay(&self, _: &RailSession, _: &Reservation) -> Result<(), RailError> {
                unreachable!("pay after failed login")
            }
        }

        let (_dir, settings) = repository();
        let result =
            settings.verify_and_save_account(&RejectingClient, Carrier::Ktx, "member", "wrong");
        assert!(matches!(result, Err(SettingsError::Rail(_))));
        assert_eq!(settings.load_account(Carrier::Ktx), None);
    }

    #[test]
    fn stations_default_until_saved() -> anyhow::Result<()> {
        let (_dir, settings) = repository();
        let (catalog, selection) = settings.load_stations(Carrier::Srt);
        assert_eq!(catalog.len(), 32);
        assert_eq!(selection, StationSelection::default_for(Carrier::Srt));

        let chosen = StationSelection {
            carrier: Carrier::Srt,
            stations: vec!["수서".to_string(), "부산".to_string(), "포항".to_string()],
        };
        settings.save_stations(&chosen)?;
        assert_eq!(settings.load_stations(Carrier::Srt).1, chosen);
        assert_eq!(
            settings.load_stations(Carrier::Ktx).1,
            StationSelection::default_for(Carrier::Ktx)
        );
        Ok(())
    }

    #[test]
    fn rejected_station_save_keeps_previous_selection() -> anyhow::Result<()> {
        let (_dir, settings) = repository();
        let chosen = StationSelection {
            carrier: Carrier::Ktx,
            stations: vec!["서울".to_string(), "강릉".to_string()],
        };
        settings.save_stations(&chosen)?;
        let before = settings.load_stations(Carrier::Ktx);

        let empty = StationSelection {
            carrier: Carrier::Ktx,
            stations: Vec::new(),
        };
        assert!(matches!(
            settings.save_stations(&empty),
            Err(SettingsError::Validation(ValidationError::EmptySelection))
        ));
        assert_eq!(settings.load_stations(Carrier::Ktx), before);
        Ok(())
    }

    #[test]
    fn unknown_saved_stations_are_dropped() -> anyhow::Result<()> {
        let (_dir, settings) = repository();
        settings.store().set("SRT", "station", "수서,서울,부산,수서")?;
        assert_eq!(
            settings.load_stations(Carrier::Srt).1.stations,
            vec!["수서".to_string(), "부산".to_string()]
        );

        settings.store().set("SRT", "station", "서울")?;
        assert_eq!(
            settings.load_stations(Carrier::Srt).1,
            StationSelection::default_for(Carrier::Srt)
        );
        Ok(())
    }

    #[test]
    fn options_round_trip_under_shared_key() -> anyhow::Result<()> {
        let (_dir, settings) = repository();
        assert_eq!(settings.load_options(), PassengerOptionSet::default());

        let mut options = PassengerOptionSet::default();
        options.categories.insert(PassengerCategory::Senior);
        options.categories.insert(PassengerCategory::Disability4To6);
        options.ktx_only = true;
        settings.save_options(&options)?;

        assert_eq!(settings.load_options(), options);
        assert_eq!(
            settings.store().get("SRT", "options").as_deref(),
            Some("senior,disability4to6,ktx")
        );
        Ok(())
    }

    #[test]
    fn notification_token_round_trip() -> anyhow::Result<()> {
        let (_dir, settings) = repository();
        assert_eq!(settings.load_notification_token(), None);
        settings.save_notification_token(" token ")?;
        assert_eq!(settings.load_notification_token().as_deref(), Some("token"));
        settings.save_notification_token("")?;
        assert_eq!(settings.load_notification_token(), None);
        Ok(())
    }

    #[test]
    fn parameters_round_trip() -> anyhow::Result<()> {
        let (_dir, settings) = repository();
        let params = ReservationParameters {
            departure: "동탄".to_string(),
            arrival: "광주송정".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, 15).unwrap(),
            hour: 7,
            passengers: PassengerCounts {
                adult: 2,
                child: 1,
                senior: 0,
                disability1to3: 0,
                disability4to6: 1,
            },
            seat: SeatPreference::SpecialOnly,
            auto_pay: true,
        };
        settings.save_reservation_parameters(Carrier::Srt, &params)?;

        assert_eq!(settings.load_reservation_parameters_at(Carrier::Srt, now()), params);
        assert_eq!(settings.store().get("SRT", "time").as_deref(), Some("070000"));
        assert_eq!(settings.store().get("SRT", "date").as_deref(), Some("20240315"));
        Ok(())
    }

    #[test]
    fn parameters_merge_field_by_field() -> anyhow::Result<()> {
        let (_dir, settings) = repository();
        let store = settings.store();
        store.set("KTX", "arrival", "강릉")?;
        store.set("KTX", "time", "180000")?;
        store.set("KTX", "child", "2")?;
        store.set("KTX", "senior", "many")?;
        store.set("KTX", "date", "20240101")?;
        store.set("KTX", "seat", "window")?;

        let loaded = settings.load_reservation_parameters_at(Carrier::Ktx, now());
        let defaults = ReservationParameters::defaults(Carrier::Ktx, now());
        assert_eq!(loaded.departure, defaults.departure);
        assert_eq!(loaded.arrival, "강릉");
        assert_eq!(loaded.hour, 18);
        assert_eq!(loaded.passengers.adult, 1);
        assert_eq!(loaded.passengers.child, 2);
        assert_eq!(loaded.passengers.senior, 0);
        assert_eq!(loaded.date, defaults.date);
        assert_eq!(loaded.seat, SeatPreference::GeneralFirst);
        assert!(!loaded.auto_pay);
        Ok(())
    }
}
