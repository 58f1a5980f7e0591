use std::{
    sync::atomic::{AtomicU32, Ordering},
    thread,
    time::Duration,
};

use chrono::{NaiveDate, NaiveTime, Timelike};
use tracing::debug;

use super::{RailClient, RailSession, Reservation, Train};
use crate::{
    error::RailError,
    models::{Carrier, PassengerCounts, SeatClass},
};

/// Simulated carrier used to rehearse sessions without touching a live system.
///
/// Any non-empty login succeeds. The first `sold_out_rounds` searches report
/// every train full; afterwards the second train has general seats. Each
/// call sleeps for `latency` to resemble a network round trip.
pub struct DryRunRailClient {
    carrier: Carrier,
    sold_out_rounds: u32,
    latency: Duration,
    searches: AtomicU32,
    reservations: AtomicU32,
}

impl DryRunRailClient {
    /// Simulated client for `carrier`.
    pub fn new(carrier: Carrier) -> Self {
        Self {
            carrier,
            sold_out_rounds: 3,
            latency: Duration::from_millis(300),
            searches: AtomicU32::new(0),
            reservations: AtomicU32::new(0),
        }
    }

    /// Number of full searches before seats appear.
    pub fn with_sold_out_rounds(mut self, rounds: u32) -> Self {
        self.sold_out_rounds = rounds;
        self
    }

    /// Simulated per-call latency.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn pause(&self) {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
    }

    fn service_names(&self) -> [&'static str; 3] {
        match self.carrier {
            Carrier::Srt => ["SRT", "SRT", "SRT"],
            Carrier::Ktx => ["KTX", "KTX-산천", "ITX-새마을"],
        }
    }
}

impl RailClient for DryRunRailClient {
    fn login(&self, account_id: &str, password: &str) -> Result<RailSession, RailError> {
        self.pause();
        if account_id.trim().is_empty() || password.is_empty() {
            return Err(RailError::Auth("login id and password are required".to_string()));
        }
        Ok(RailSession {
            account_id: account_id.to_string(),
            token: format!("dry-run-{}", self.carrier),
        })
    }

    fn search(
        &self,
        _session: &RailSession,
        departure: &str,
        arrival: &str,
        _date: NaiveDate,
        hour: u8,
    ) -> Result<Vec<Train>, RailError> {
        self.pause();
        let round = self.searches.fetch_add(1, Ordering::SeqCst) + 1;
        let seats_left = round > self.sold_out_rounds;
        debug!(round, seats_left, "dry-run search");

        let base = NaiveTime::from_hms_opt(u32::from(hour.min(23)), 5, 0).unwrap_or_default();
        let trains = self
            .service_names()
            .into_iter()
            .enumerate()
            .map(|(index, name)| {
                let departs_at = base + chrono::Duration::minutes(40 * index as i64);
                let arrives_at = departs_at + chrono::Duration::minutes(110);
                Train {
                    number: format!("{}", 301 + index * 2 + departs_at.hour() as usize * 10),
                    name: name.to_string(),
                    departure: departure.to_string(),
                    arrival: arrival.to_string(),
                    departs_at,
                    arrives_at,
                    general_available: seats_left && index == 1,
                    special_available: false,
                }
            })
            .collect();
        Ok(trains)
    }

    fn reserve(
        &self,
        _session: &RailSession,
        train: &Train,
        seat_class: SeatClass,
        passengers: &PassengerCounts,
    ) -> Result<Reservation, RailError> {
        self.pause();
        if !train.has_seat(seat_class) {
            return Err(RailError::SoldOut);
        }
        let sequence = self.reservations.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Reservation {
            id: format!("DRY{sequence:06}"),
            train: train.clone(),
            seat_class,
            passengers: *passengers,
            fare: Some(passengers.total() * 52_900),
        })
    }

    fn pay(&self, _session: &RailSession, _reservation: &Reservation) -> Result<(), RailError> {
        self.pause();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(client: &DryRunRailClient) -> RailSession {
        client.login("member", "secret").expect("login")
    }

    #[test]
    fn rejects_blank_credentials() {
        let client = DryRunRailClient::new(Carrier::Srt).with_latency(Duration::ZERO);
        assert!(matches!(client.login("", "secret"), Err(RailError::Auth(_))));
        assert!(matches!(client.login("member", ""), Err(RailError::Auth(_))));
    }

    #[test]
    fn seats_appear_after_sold_out_rounds() {
        let client = DryRunRailClient::new(Carrier::Ktx)
            .with_latency(Duration::ZERO)
            .with_sold_out_rounds(1);
        let session = session(&client);
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        let first = client.search(&session, "서울", "부산", date, 9).unwrap();
        assert!(first.iter().all(|train| !train.has_seat(SeatClass::General)));

        let second = client.search(&session, "서울", "부산", date, 9).unwrap();
        let open = second
            .iter()
            .find(|train| train.has_seat(SeatClass::General))
            .expect("a train with seats");
        assert!(open.is_ktx());

        let reservation = client
            .reserve(&session, open, SeatClass::General, &PassengerCounts::default())
            .unwrap();
        assert_eq!(reservation.id, "DRY000001");
        assert_eq!(
            client.reserve(&session, &first[0], SeatClass::General, &PassengerCounts::default()),
            Err(RailError::SoldOut)
        );
    }
}
