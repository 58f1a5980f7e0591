use std::fmt;

use crate::{
    models::{Carrier, ReservationParameters},
    progress::ProgressEvent,
    rail::Reservation,
};

/// Where a reservation session stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// Nothing started yet.
    #[default]
    Idle,
    /// Parameters accepted, being saved.
    Validating,
    /// Resolving the saved login and logging in.
    Authenticating,
    /// Polling the carrier for seats.
    Booking,
    /// Reservation held (and paid when auto-pay is on).
    Completed,
    /// Stopped on request.
    Cancelled,
    /// Ended by an error.
    Failed,
}

impl SessionPhase {
    /// Whether the session has ended.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionPhase::Completed | SessionPhase::Cancelled | SessionPhase::Failed
        )
    }

    /// Whether a session is in flight.
    pub fn is_active(self) -> bool {
        !self.is_terminal() && self != SessionPhase::Idle
    }

    /// Short label for status lines.
    pub fn label(self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Validating => "validating",
            SessionPhase::Authenticating => "logging in",
            SessionPhase::Booking => "searching",
            SessionPhase::Completed => "completed",
            SessionPhase::Cancelled => "cancelled",
            SessionPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Mutable record of the current session, shared between runner and worker.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Carrier being booked.
    pub carrier: Option<Carrier>,
    /// Login id in use, once resolved.
    pub account_id: Option<String>,
    /// Parameters the session was started with.
    pub params: Option<ReservationParameters>,
    /// Current phase.
    pub phase: SessionPhase,
    /// Reservation obtained, if any.
    pub reservation: Option<Reservation>,
    /// Every progress message in production order.
    pub log: Vec<ProgressEvent>,
}

impl SessionState {
    /// Fresh state for a new attempt.
    pub fn new(carrier: Carrier, params: ReservationParameters) -> Self {
        Self {
            carrier: Some(carrier),
            params: Some(params),
            ..Self::default()
        }
    }
}

/// Final result handed back by [`super::ReservationSessionRunner::wait`].
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    /// Phase the session ended in (or is currently in, if it never started a worker).
    pub phase: SessionPhase,
    /// Reservation obtained, kept even when payment failed.
    pub reservation: Option<Reservation>,
    /// Complete progress log.
    pub log: Vec<ProgressEvent>,
}

impl SessionOutcome {
    /// Whether any log message starts with `prefix`.
    pub fn logged(&self, prefix: &str) -> bool {
        self.log.iter().any(|event| event.message.starts_with(prefix))
    }
}

impl From<&SessionState> for SessionOutcome {
    fn from(state: &SessionState) -> Self {
        Self {
            phase: state.phase,
            reservation: state.reservation.clone(),
            log: state.log.clone(),
        }
    }
}
