//! Carrier client and notification capabilities consumed by the session runner.
//!
//! Live SRT/Korail protocol clients live outside this crate; they plug in by
//! implementing [`RailClient`].

mod dry_run;
mod kakao;

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::{
    error::{NotifyError, RailError},
    models::{PassengerCounts, SeatClass},
};

pub use dry_run::DryRunRailClient;
pub use kakao::KakaoNotifier;

/// Authenticated carrier session returned by [`RailClient::login`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RailSession {
    /// Login id the session belongs to.
    pub account_id: String,
    /// Opaque carrier token or cookie.
    pub token: String,
}

/// A departure returned by a search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Train {
    /// Train number, e.g. `"305"`.
    pub number: String,
    /// Service name, e.g. `"SRT"`, `"KTX-산천"`, `"ITX-새마을"`.
    pub name: String,
    /// Departure station.
    pub departure: String,
    /// Arrival station.
    pub arrival: String,
    /// Departure time.
    pub departs_at: NaiveTime,
    /// Arrival time.
    pub arrives_at: NaiveTime,
    /// General car seats left.
    pub general_available: bool,
    /// Special car seats left.
    pub special_available: bool,
}

impl Train {
    /// Whether seats of `class` are left.
    pub fn has_seat(&self, class: SeatClass) -> bool {
        match class {
            SeatClass::General => self.general_available,
            SeatClass::Special => self.special_available,
        }
    }

    /// Whether this is a KTX service (as opposed to ITX or Mugunghwa).
    pub fn is_ktx(&self) -> bool {
        self.name.starts_with("KTX")
    }

    /// One line description for logs.
    pub fn describe(&self) -> String {
        format!(
            "{} {} {} {} → {} {}",
            self.name,
            self.number,
            self.departure,
            self.departs_at.format("%H:%M"),
            self.arrival,
            self.arrives_at.format("%H:%M")
        )
    }
}

/// A held reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Carrier reservation number.
    pub id: String,
    /// Reserved train.
    pub train: Train,
    /// Reserved car class.
    pub seat_class: SeatClass,
    /// Travellers on the reservation.
    pub passengers: PassengerCounts,
    /// Total fare in won, when the carrier reports it.
    pub fare: Option<u32>,
}

impl Reservation {
    /// One line description for logs and notifications.
    pub fn describe(&self) -> String {
        let mut line = format!(
            "#{} {} ({} seat, {} passenger(s))",
            self.id,
            self.train.describe(),
            self.seat_class,
            self.passengers.total()
        );
        if let Some(fare) = self.fare {
            line.push_str(&format!(", {fare} won"));
        }
        line
    }
}

/// Blocking client for one carrier.
///
/// Calls run on the session worker thread and are never interrupted; the
/// runner checks for cancellation only between calls.
pub trait RailClient: Send + Sync {
    /// Authenticate; fails with [`RailError::Auth`] on bad credentials.
    fn login(&self, account_id: &str, password: &str) -> Result<RailSession, RailError>;

    /// Departures between two stations on `date` leaving at or after `hour`.
    fn search(
        &self,
        session: &RailSession,
        departure: &str,
        arrival: &str,
        date: NaiveDate,
        hour: u8,
    ) -> Result<Vec<Train>, RailError>;

    /// Hold seats; fails with [`RailError::SoldOut`] when none are left.
    fn reserve(
        &self,
        session: &RailSession,
        train: &Train,
        seat_class: SeatClass,
        passengers: &PassengerCounts,
    ) -> Result<Reservation, RailError>;

    /// Pay for a held reservation.
    fn pay(&self, session: &RailSession, reservation: &Reservation) -> Result<(), RailError>;
}

/// Fire-and-forget message push.
pub trait Notifier: Send + Sync {
    /// Deliver `message` to the user.
    fn send(&self, message: &str) -> Result<(), NotifyError>;
}
