//! Reservation session lifecycle.
//!
//! [`ReservationSessionRunner`] validates parameters, saves them, resolves the
//! stored login and then hands the attempt to a worker thread that logs in,
//! polls the carrier and reports every step through a
//! [`crate::progress::ProgressReceiver`].

mod cancel;
mod runner;
mod state;

pub use cancel::CancelToken;
pub use runner::{ReservationSessionRunner, RunnerOptions};
pub use state::{SessionOutcome, SessionPhase, SessionState};
