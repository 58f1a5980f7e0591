//! Shared domain models.

pub mod stations;

use std::{collections::BTreeSet, fmt, str::FromStr};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Largest party a single reservation accepts.
pub const MAX_PASSENGERS: u32 = 9;

/// Days a travel date may lag behind today before it is rejected.
const DATE_GRACE_DAYS: i64 = 1;

/// Railway operator a login and its settings belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Carrier {
    /// Supseoul Rapid Transit.
    #[serde(rename = "SRT")]
    Srt,
    /// Korail KTX.
    #[serde(rename = "KTX")]
    Ktx,
}

impl Carrier {
    /// Both carriers in menu order.
    pub const ALL: [Carrier; 2] = [Carrier::Srt, Carrier::Ktx];

    /// Name used as the store service and in messages.
    pub fn as_str(self) -> &'static str {
        match self {
            Carrier::Srt => "SRT",
            Carrier::Ktx => "KTX",
        }
    }

    /// The other carrier.
    pub fn toggled(self) -> Self {
        match self {
            Carrier::Srt => Carrier::Ktx,
            Carrier::Ktx => Carrier::Srt,
        }
    }

    fn default_departure(self) -> &'static str {
        match self {
            Carrier::Srt => "수서",
            Carrier::Ktx => "서울",
        }
    }
}

impl fmt::Display for Carrier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Carrier {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "SRT" => Ok(Carrier::Srt),
            "KTX" | "KORAIL" => Ok(Carrier::Ktx),
            other => Err(format!("unknown carrier {other}")),
        }
    }
}

/// Saved login for one carrier.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    /// Carrier the login belongs to.
    pub carrier: Carrier,
    /// Membership number, email or phone number.
    pub id: String,
    /// Login password.
    pub password: String,
    /// Set once a trial login with these credentials succeeded.
    pub verified: bool,
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("carrier", &self.carrier)
            .field("id", &self.id)
            .field("password", &"********")
            .field("verified", &self.verified)
            .finish()
    }
}

/// Stations offered in the departure/arrival pickers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StationSelection {
    /// Carrier the selection applies to.
    pub carrier: Carrier,
    /// Selected station names, in catalog order as saved.
    pub stations: Vec<String>,
}

impl StationSelection {
    /// Carrier default used when nothing was saved.
    pub fn default_for(carrier: Carrier) -> Self {
        Self {
            carrier,
            stations: stations::default_selection(carrier)
                .iter()
                .map(|name| name.to_string())
                .collect(),
        }
    }

    /// Check that the selection is non-empty, free of duplicates and drawn from the catalog.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.stations.is_empty() {
            return Err(ValidationError::EmptySelection);
        }
        let mut seen = BTreeSet::new();
        for station in &self.stations {
            if !stations::is_known(self.carrier, station) {
                return Err(ValidationError::UnknownStation {
                    carrier: self.carrier,
                    station: station.clone(),
                });
            }
            if !seen.insert(station.as_str()) {
                return Err(ValidationError::DuplicateStation(station.clone()));
            }
        }
        Ok(())
    }
}

/// Discounted passenger categories the booking form can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PassengerCategory {
    /// Children.
    Child,
    /// Seniors.
    Senior,
    /// Severe disability, grades 1 to 3.
    Disability1To3,
    /// Mild disability, grades 4 to 6.
    Disability4To6,
}

impl PassengerCategory {
    /// Every category in form order.
    pub const ALL: [PassengerCategory; 4] = [
        PassengerCategory::Child,
        PassengerCategory::Senior,
        PassengerCategory::Disability1To3,
        PassengerCategory::Disability4To6,
    ];

    /// Token used in the persisted option list and as the count key.
    pub fn token(self) -> &'static str {
        match self {
            PassengerCategory::Child => "child",
            PassengerCategory::Senior => "senior",
            PassengerCategory::Disability1To3 => "disability1to3",
            PassengerCategory::Disability4To6 => "disability4to6",
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|category| category.token() == token)
    }
}

const KTX_ONLY_TOKEN: &str = "ktx";

/// Passenger categories enabled in the booking form, plus the KTX-only train filter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassengerOptionSet {
    /// Enabled discounted categories.
    pub categories: BTreeSet<PassengerCategory>,
    /// Skip non-KTX Korail trains while searching.
    pub ktx_only: bool,
}

impl PassengerOptionSet {
    /// Parse the comma separated stored form, ignoring unknown tokens.
    pub fn parse(raw: &str) -> Self {
        let mut options = Self::default();
        for token in raw.split(',').map(str::trim).filter(|token| !token.is_empty()) {
            if token == KTX_ONLY_TOKEN {
                options.ktx_only = true;
            } else if let Some(category) = PassengerCategory::from_token(token) {
                options.categories.insert(category);
            } else {
                tracing::warn!(token, "ignoring unknown passenger option");
            }
        }
        options
    }

    /// Comma separated stored form.
    pub fn to_stored(&self) -> String {
        let mut tokens: Vec<&str> = PassengerCategory::ALL
            .into_iter()
            .filter(|category| self.categories.contains(category))
            .map(PassengerCategory::token)
            .collect();
        if self.ktx_only {
            tokens.push(KTX_ONLY_TOKEN);
        }
        tokens.join(",")
    }

    /// Whether the form should offer `category`.
    pub fn enables(&self, category: PassengerCategory) -> bool {
        self.categories.contains(&category)
    }
}

/// Head count per passenger category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PassengerCounts {
    /// Adults.
    pub adult: u8,
    /// Children.
    pub child: u8,
    /// Seniors.
    pub senior: u8,
    /// Severe disability, grades 1 to 3.
    pub disability1to3: u8,
    /// Mild disability, grades 4 to 6.
    pub disability4to6: u8,
}

impl Default for PassengerCounts {
    fn default() -> Self {
        Self {
            adult: 1,
            child: 0,
            senior: 0,
            disability1to3: 0,
            disability4to6: 0,
        }
    }
}

impl PassengerCounts {
    /// Total number of travellers.
    pub fn total(&self) -> u32 {
        [
            self.adult,
            self.child,
            self.senior,
            self.disability1to3,
            self.disability4to6,
        ]
        .iter()
        .map(|count| u32::from(*count))
        .sum()
    }

    /// Count for a discounted category.
    pub fn get(&self, category: PassengerCategory) -> u8 {
        match category {
            PassengerCategory::Child => self.child,
            PassengerCategory::Senior => self.senior,
            PassengerCategory::Disability1To3 => self.disability1to3,
            PassengerCategory::Disability4To6 => self.disability4to6,
        }
    }

    /// Mutable count for a discounted category.
    pub fn get_mut(&mut self, category: PassengerCategory) -> &mut u8 {
        match category {
            PassengerCategory::Child => &mut self.child,
            PassengerCategory::Senior => &mut self.senior,
            PassengerCategory::Disability1To3 => &mut self.disability1to3,
            PassengerCategory::Disability4To6 => &mut self.disability4to6,
        }
    }
}

/// Car class of a seat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeatClass {
    /// Standard car.
    General,
    /// First class car.
    Special,
}

impl fmt::Display for SeatClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeatClass::General => f.write_str("general"),
            SeatClass::Special => f.write_str("special"),
        }
    }
}

/// Which car classes a session may book, in order of preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeatPreference {
    /// General first, special when general is gone.
    #[default]
    GeneralFirst,
    /// General only.
    GeneralOnly,
    /// Special first, general when special is gone.
    SpecialFirst,
    /// Special only.
    SpecialOnly,
}

impl SeatPreference {
    /// Every preference in form order.
    pub const ALL: [SeatPreference; 4] = [
        SeatPreference::GeneralFirst,
        SeatPreference::GeneralOnly,
        SeatPreference::SpecialFirst,
        SeatPreference::SpecialOnly,
    ];

    /// Classes to try, most preferred first.
    pub fn seat_classes(self) -> &'static [SeatClass] {
        match self {
            SeatPreference::GeneralFirst => &[SeatClass::General, SeatClass::Special],
            SeatPreference::GeneralOnly => &[SeatClass::General],
            SeatPreference::SpecialFirst => &[SeatClass::Special, SeatClass::General],
            SeatPreference::SpecialOnly => &[SeatClass::Special],
        }
    }

    /// Stored token.
    pub fn as_str(self) -> &'static str {
        match self {
            SeatPreference::GeneralFirst => "general_first",
            SeatPreference::GeneralOnly => "general_only",
            SeatPreference::SpecialFirst => "special_first",
            SeatPreference::SpecialOnly => "special_only",
        }
    }

    /// Next preference, wrapping around.
    pub fn next(self) -> Self {
        let index = Self::ALL.iter().position(|pref| *pref == self).unwrap_or(0);
        Self::ALL[(index + 1) % Self::ALL.len()]
    }
}

impl fmt::Display for SeatPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SeatPreference::GeneralFirst => "general, then special",
            SeatPreference::GeneralOnly => "general only",
            SeatPreference::SpecialFirst => "special, then general",
            SeatPreference::SpecialOnly => "special only",
        })
    }
}

impl FromStr for SeatPreference {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|pref| pref.as_str() == value.trim())
            .ok_or_else(|| format!("unknown seat preference {value}"))
    }
}

/// Everything a reservation session needs to know about the trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationParameters {
    /// Departure station.
    pub departure: String,
    /// Arrival station.
    pub arrival: String,
    /// Travel date.
    pub date: NaiveDate,
    /// Earliest departure hour, `0..=23`.
    pub hour: u8,
    /// Head count per category.
    pub passengers: PassengerCounts,
    /// Car class preference.
    pub seat: SeatPreference,
    /// Pay immediately after a successful reservation.
    pub auto_pay: bool,
}

impl ReservationParameters {
    /// Built-in defaults for a carrier given the current local time.
    pub fn defaults(carrier: Carrier, now: NaiveDateTime) -> Self {
        let soon = now + Duration::minutes(10);
        Self {
            departure: carrier.default_departure().to_string(),
            arrival: "동대구".to_string(),
            date: soon.date(),
            hour: 12,
            passengers: PassengerCounts::default(),
            seat: SeatPreference::default(),
            auto_pay: false,
        }
    }

    /// Reject parameters no carrier could ever book.
    pub fn validate(&self, carrier: Carrier, today: NaiveDate) -> Result<(), ValidationError> {
        if self.departure == self.arrival {
            return Err(ValidationError::SameStation(self.departure.clone()));
        }
        for station in [&self.departure, &self.arrival] {
            if !stations::is_known(carrier, station) {
                return Err(ValidationError::UnknownStation {
                    carrier,
                    station: station.clone(),
                });
            }
        }
        let total = self.passengers.total();
        if total == 0 {
            return Err(ValidationError::NoPassengers);
        }
        if total > MAX_PASSENGERS {
            return Err(ValidationError::TooManyPassengers(total));
        }
        if self.hour > 23 {
            return Err(ValidationError::InvalidHour(self.hour));
        }
        if self.date < today - Duration::days(DATE_GRACE_DAYS) {
            return Err(ValidationError::DateInPast(self.date));
        }
        Ok(())
    }

    /// Short human readable route description.
    pub fn describe(&self) -> String {
        format!(
            "{} → {} on {} from {:02}:00, {} passenger(s)",
            self.departure,
            self.arrival,
            self.date.format("%Y-%m-%d"),
            self.hour,
            self.passengers.total()
        )
    }
}
