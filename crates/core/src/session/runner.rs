//! Reservation session runner and its worker thread.
//!
//! The worker logs in, polls the carrier until a seat is held, optionally
//! pays, and sends the completion notification before it exits.

use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use chrono::Local;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::{
    cancel::CancelToken,
    state::{SessionOutcome, SessionPhase, SessionState},
};
use crate::{
    config::SessionConfig,
    error::{RailError, SessionError},
    models::{Account, Carrier, ReservationParameters, SeatClass, SeatPreference},
    progress::{self, ProgressEvent, ProgressReceiver, ProgressSender},
    rail::{Notifier, RailClient, RailSession, Reservation, Train},
    settings::SettingsRepository,
};

/// Cadence of the search loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerOptions {
    /// Delay between search attempts.
    pub poll_interval: Duration,
    /// Cap for the delay after consecutive carrier errors.
    pub max_backoff: Duration,
    /// Give up after this many search attempts.
    pub max_attempts: Option<u32>,
}

impl From<&SessionConfig> for RunnerOptions {
    fn from(config: &SessionConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            max_backoff: config.max_backoff(),
            max_attempts: config.max_attempts,
        }
    }
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self::from(&SessionConfig::default())
    }
}

/// Appends to the session log and mirrors every entry onto the progress channel.
#[derive(Clone)]
struct Reporter {
    state: Arc<Mutex<SessionState>>,
    progress: ProgressSender,
}

impl Reporter {
    fn transition(&self, phase: SessionPhase, message: impl Into<String>) {
        let mut state = self.state.lock();
        self.push(&mut state, Some(phase), message.into());
    }

    fn note(&self, message: impl Into<String>) {
        let mut state = self.state.lock();
        self.push(&mut state, None, message.into());
    }

    // Sending while the state lock is held keeps channel order identical to log order.
    fn push(&self, state: &mut SessionState, phase: Option<SessionPhase>, message: String) {
        if let Some(phase) = phase {
            state.phase = phase;
        }
        info!(phase = %state.phase, "{message}");
        let event = ProgressEvent::now(state.phase, message);
        state.log.push(event.clone());
        self.progress.send(event);
    }
}

/// Owns at most one in-flight reservation attempt.
///
/// `start` runs validation, parameter persistence and the credential lookup on
/// the caller's thread so those failures are reported immediately; the login
/// and search loop then run on a dedicated worker thread.
pub struct ReservationSessionRunner {
    settings: SettingsRepository,
    client: Arc<dyn RailClient>,
    notifier: Option<Arc<dyn Notifier>>,
    options: RunnerOptions,
    state: Arc<Mutex<SessionState>>,
    cancel: Arc<CancelToken>,
    reporter: Option<Reporter>,
    worker: Option<JoinHandle<()>>,
}

impl ReservationSessionRunner {
    /// Runner booking through `client`.
    pub fn new(settings: SettingsRepository, client: Arc<dyn RailClient>) -> Self {
        Self {
            settings,
            client,
            notifier: None,
            options: RunnerOptions::default(),
            state: Arc::new(Mutex::new(SessionState::default())),
            cancel: Arc::new(CancelToken::new()),
            reporter: None,
            worker: None,
        }
    }

    /// Send a message when a session completes or fails.
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Replace the notifier used by sessions started from now on.
    pub fn set_notifier(&mut self, notifier: Option<Arc<dyn Notifier>>) {
        self.notifier = notifier;
    }

    /// Override the search cadence.
    pub fn with_options(mut self, options: RunnerOptions) -> Self {
        self.options = options;
        self
    }

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.state.lock().phase
    }

    /// Whether a session is in flight.
    ///
    /// Stays true after the terminal phase until the worker has exited, which
    /// covers the completion notification.
    pub fn is_running(&self) -> bool {
        self.phase().is_active()
            || self
                .worker
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
    }

    /// Copy of the current session log.
    pub fn log(&self) -> Vec<ProgressEvent> {
        self.state.lock().log.clone()
    }

    /// Snapshot of the current session.
    pub fn outcome(&self) -> SessionOutcome {
        SessionOutcome::from(&*self.state.lock())
    }

    /// Start a reservation attempt.
    ///
    /// Invalid parameters are rejected without any state change or write.
    /// Otherwise the parameters are saved as the next defaults, and a missing
    /// login ends the session as [`SessionPhase::Failed`] with
    /// [`SessionError::CredentialsRequired`] before any carrier call.
    pub fn start(
        &mut self,
        carrier: Carrier,
        params: ReservationParameters,
    ) -> Result<ProgressReceiver, SessionError> {
        if self.is_running() {
            return Err(SessionError::AlreadyRunning);
        }
        params.validate(carrier, Local::now().date_naive())?;

        // Already finished, so this join does not block.
        if let Some(previous) = self.worker.take() {
            if previous.join().is_err() {
                warn!("previous reservation worker panicked");
            }
        }

        let (sender, receiver) = progress::channel();
        let cancel = Arc::new(CancelToken::new());
        *self.state.lock() = SessionState::new(carrier, params.clone());
        let reporter = Reporter {
            state: Arc::clone(&self.state),
            progress: sender,
        };
        self.cancel = Arc::clone(&cancel);
        self.reporter = Some(reporter.clone());

        reporter.transition(
            SessionPhase::Validating,
            format!("Starting {carrier} reservation: {}", params.describe()),
        );
        if let Err(err) = self.settings.save_reservation_parameters(carrier, &params) {
            warn!(%carrier, "failed to save reservation parameters: {err}");
            reporter.note(format!("Could not save these settings for next time: {err}"));
        }

        reporter.transition(
            SessionPhase::Authenticating,
            format!("Loading saved {carrier} login"),
        );
        let Some(account) = self.settings.load_account(carrier) else {
            reporter.transition(
                SessionPhase::Failed,
                format!("No {carrier} login saved; set up your credentials first"),
            );
            return Err(SessionError::CredentialsRequired(carrier));
        };
        self.state.lock().account_id = Some(account.id.clone());

        let worker = Worker {
            carrier,
            account,
            ktx_only: self.settings.load_options().ktx_only,
            params,
            client: Arc::clone(&self.client),
            notifier: self.notifier.clone(),
            options: self.options.clone(),
            cancel,
            reporter: reporter.clone(),
        };
        let handle = thread::Builder::new()
            .name(format!("srtgo-{}", carrier.as_str().to_ascii_lowercase()))
            .spawn(move || worker.run());
        match handle {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(receiver)
            }
            Err(err) => {
                reporter.transition(
                    SessionPhase::Failed,
                    format!("Could not start the reservation worker: {err}"),
                );
                Err(SessionError::Spawn(err))
            }
        }
    }

    /// Ask the running session to stop at its next poll point.
    ///
    /// Idempotent; does nothing when no session is in flight.
    pub fn stop(&self) {
        let Some(reporter) = self.reporter.as_ref() else {
            return;
        };
        let mut state = self.state.lock();
        if !state.phase.is_active() {
            return;
        }
        if self.cancel.cancel() {
            reporter.push(
                &mut state,
                None,
                "Stop requested; finishing the current step".to_string(),
            );
        }
    }

    /// Block until the worker has finished and return the final session record.
    pub fn wait(&mut self) -> SessionOutcome {
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                warn!("reservation worker panicked");
            }
        }
        self.outcome()
    }
}

impl Drop for ReservationSessionRunner {
    fn drop(&mut self) {
        self.stop();
    }
}

enum Exit {
    Completed(String),
    Cancelled(String),
    Failed(String),
}

enum Attempt {
    Reserved(Reservation),
    Unavailable,
    Transient(RailError),
    Fatal(String),
    Cancelled,
}

struct Worker {
    carrier: Carrier,
    account: Account,
    params: ReservationParameters,
    ktx_only: bool,
    client: Arc<dyn RailClient>,
    notifier: Option<Arc<dyn Notifier>>,
    options: RunnerOptions,
    cancel: Arc<CancelToken>,
    reporter: Reporter,
}

impl Worker {
    fn run(self) {
        let exit = self.execute();
        let phase = self.finish(exit);
        self.notify(phase);
    }

    fn execute(&self) -> Exit {
        if self.cancel.is_cancelled() {
            return Exit::Cancelled("Stopped before logging in".to_string());
        }
        self.reporter.note(format!(
            "Logging in to {} as {}",
            self.carrier, self.account.id
        ));
        let session = match self.client.login(&self.account.id, &self.account.password) {
            Ok(session) => session,
            Err(err) => return Exit::Failed(format!("Login failed: {err}")),
        };
        self.reporter.transition(
            SessionPhase::Booking,
            format!("Logged in; searching {}", self.params.describe()),
        );

        let mut attempts = 0u32;
        let mut failures = 0u32;
        loop {
            if self.cancel.is_cancelled() {
                return self.stopped(attempts);
            }
            if let Some(max) = self.options.max_attempts {
                if attempts >= max {
                    return Exit::Failed(format!("No seats found after {attempts} search attempt(s)"));
                }
            }
            attempts += 1;

            match self.attempt(&session, attempts) {
                Attempt::Reserved(reservation) => return self.settle(&session, reservation),
                Attempt::Unavailable => {
                    failures = 0;
                    if attempts % 10 == 0 {
                        self.reporter
                            .note(format!("Still searching after {attempts} attempts"));
                    }
                }
                Attempt::Transient(err) => {
                    failures += 1;
                    self.reporter
                        .note(format!("Search attempt {attempts} failed: {err}"));
                }
                Attempt::Fatal(message) => return Exit::Failed(message),
                Attempt::Cancelled => return self.stopped(attempts),
            }

            if self.cancel.wait(self.delay(failures)) {
                return self.stopped(attempts);
            }
        }
    }

    fn attempt(&self, session: &RailSession, attempt: u32) -> Attempt {
        let params = &self.params;
        debug!(attempt, "searching for seats");
        let trains = match self.client.search(
            session,
            &params.departure,
            &params.arrival,
            params.date,
            params.hour,
        ) {
            Ok(trains) => trains,
            Err(RailError::SoldOut) => return Attempt::Unavailable,
            Err(RailError::Auth(reason)) => {
                return Attempt::Fatal(format!("Carrier rejected the session: {reason}"))
            }
            Err(err) => return Attempt::Transient(err),
        };

        if self.cancel.is_cancelled() {
            return Attempt::Cancelled;
        }
        let filter_ktx = self.ktx_only && self.carrier == Carrier::Ktx;
        let Some((train, seat_class)) = pick_train(&trains, params.seat, filter_ktx) else {
            debug!(attempt, trains = trains.len(), "no matching seats");
            return Attempt::Unavailable;
        };

        self.reporter.note(format!(
            "Seats found on {} ({seat_class}); reserving",
            train.describe()
        ));
        match self
            .client
            .reserve(session, train, seat_class, &params.passengers)
        {
            Ok(reservation) => Attempt::Reserved(reservation),
            Err(RailError::SoldOut) => {
                self.reporter
                    .note("Seats were taken before the reservation went through");
                Attempt::Unavailable
            }
            Err(RailError::Auth(reason)) => {
                Attempt::Fatal(format!("Carrier rejected the session: {reason}"))
            }
            Err(err) => Attempt::Transient(err),
        }
    }

    fn settle(&self, session: &RailSession, reservation: Reservation) -> Exit {
        let id = reservation.id.clone();
        self.reporter
            .note(format!("Reserved {}", reservation.describe()));
        self.reporter.state.lock().reservation = Some(reservation.clone());

        if !self.params.auto_pay {
            return Exit::Completed(format!("Reservation #{id} is waiting for payment"));
        }
        if self.cancel.is_cancelled() {
            return Exit::Cancelled(format!(
                "Stopped before payment; reservation #{id} is kept unpaid"
            ));
        }

        self.reporter.note(format!("Paying for reservation #{id}"));
        match self.client.pay(session, &reservation) {
            Ok(()) => Exit::Completed(format!("Paid for reservation #{id}")),
            Err(err) => {
                self.reporter.note(format!(
                    "Payment failed: {err}; reservation #{id} is kept"
                ));
                Exit::Failed(format!("Reserved #{id} but payment did not go through"))
            }
        }
    }

    fn stopped(&self, attempts: u32) -> Exit {
        Exit::Cancelled(format!("Stopped after {attempts} search attempt(s)"))
    }

    fn delay(&self, failures: u32) -> Duration {
        let factor = 1u32 << failures.min(16);
        self.options
            .poll_interval
            .saturating_mul(factor)
            .min(self.options.max_backoff.max(self.options.poll_interval))
    }

    // Decided under the state lock so a concurrent stop() either sees the
    // terminal phase or turns a completion into a cancellation.
    fn finish(&self, exit: Exit) -> SessionPhase {
        let mut state = self.reporter.state.lock();
        let (phase, message) = match exit {
            Exit::Completed(message) if self.cancel.is_cancelled() => (
                SessionPhase::Cancelled,
                format!("Stopped before completion; {message}"),
            ),
            Exit::Completed(message) => (SessionPhase::Completed, message),
            Exit::Cancelled(message) => (SessionPhase::Cancelled, message),
            Exit::Failed(message) => (SessionPhase::Failed, message),
        };
        self.reporter.push(&mut state, Some(phase), message);
        phase
    }

    fn notify(&self, phase: SessionPhase) {
        let Some(notifier) = self.notifier.as_ref() else {
            return;
        };
        if !matches!(phase, SessionPhase::Completed | SessionPhase::Failed) {
            return;
        }

        let text = {
            let state = self.reporter.state.lock();
            let summary = state
                .log
                .last()
                .map(|event| event.message.clone())
                .unwrap_or_default();
            let mut text = format!("[SRTGo {}] {summary}", self.carrier);
            if let Some(reservation) = &state.reservation {
                text.push('\n');
                text.push_str(&reservation.describe());
            }
            text
        };

        match notifier.send(&text) {
            Ok(()) => debug!("session notification sent"),
            Err(err) => {
                warn!("session notification failed: {err}");
                self.reporter.note(format!("Notification failed: {err}"));
            }
        }
    }
}

/// First train with seats in an acceptable class, most preferred class first.
fn pick_train(
    trains: &[Train],
    preference: SeatPreference,
    ktx_only: bool,
) -> Option<(&Train, SeatClass)> {
    trains
        .iter()
        .filter(|train| !ktx_only || train.is_ktx())
        .find_map(|train| {
            preference
                .seat_classes()
                .iter()
                .copied()
                .find(|class| train.has_seat(*class))
                .map(|class| (train, class))
        })
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            atomic::{AtomicUsize, Ordering},
            mpsc,
        },
    };

    use chrono::{NaiveDate, NaiveTime};
    use tempfile::{tempdir, TempDir};

    use super::*;
    use crate::{
        error::{NotifyError, ValidationError},
        models::PassengerCounts,
        store::{testing::MemoryBackend, CredentialStore},
    };

    fn train(name: &str, general: bool, special: bool) -> Train {
        Train {
            number: "301".to_string(),
            name: name.to_string(),
            departure: "수서".to_string(),
            arrival: "부산".to_string(),
            departs_at: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            arrives_at: NaiveTime::from_hms_opt(11, 30, 0).unwrap(),
            general_available: general,
            special_available: special,
        }
    }

    #[derive(Default)]
    struct ScriptedClient {
        login_error: Option<RailError>,
        searches: Mutex<VecDeque<Result<Vec<Train>, RailError>>>,
        fallback_search: Vec<Train>,
        reserve_errors: Mutex<VecDeque<RailError>>,
        pay_error: Option<RailError>,
        search_started: Mutex<Option<mpsc::Sender<()>>>,
        search_release: Mutex<Option<mpsc::Receiver<()>>>,
        logins: AtomicUsize,
        search_calls: AtomicUsize,
        reserved: Mutex<Vec<SeatClass>>,
        payments: AtomicUsize,
    }

    impl ScriptedClient {
        fn with_trains(trains: Vec<Train>) -> Self {
            Self {
                fallback_search: trains,
                ..Self::default()
            }
        }

        fn gated(trains: Vec<Train>) -> (Self, mpsc::Receiver<()>, mpsc::Sender<()>) {
            let (started_tx, started_rx) = mpsc::channel();
            let (release_tx, release_rx) = mpsc::channel();
            let client = Self {
                fallback_search: trains,
                search_started: Mutex::new(Some(started_tx)),
                search_release: Mutex::new(Some(release_rx)),
                ..Self::default()
            };
            (client, started_rx, release_tx)
        }
    }

    impl RailClient for ScriptedClient {
        fn login(&self, account_id: &str, _password: &str) -> Result<RailSession, RailError> {
            self.logins.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = &self.login_error {
                return Err(err.clone());
            }
            Ok(RailSession {
                account_id: account_id.to_string(),
                token: "token".to_string(),
            })
        }

        fn search(
            &self,
            _session: &RailSession,
            _departure: &str,
            _arrival: &str,
            _date: NaiveDate,
            _hour: u8,
        ) -> Result<Vec<Train>, RailError> {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(started) = self.search_started.lock().as_ref() {
                let _ = started.send(());
            }
            if let Some(release) = self.search_release.lock().as_ref() {
                let _ = release.recv();
            }
            self.searches
                .lock()
                .pop_front()
                .unwrap_or_else(|| Ok(self.fallback_search.clone()))
        }

        fn reserve(
            &self,
            _session: &RailSession,
            train: &Train,
            seat_class: SeatClass,
            passengers: &PassengerCounts,
        ) -> Result<Reservation, RailError> {
            if let Some(err) = self.reserve_errors.lock().pop_front() {
                return Err(err);
            }
            self.reserved.lock().push(seat_class);
            Ok(Reservation {
                id: "R0001".to_string(),
                train: train.clone(),
                seat_class,
                passengers: *passengers,
                fare: Some(59_800),
            })
        }

        fn pay(&self, _session: &RailSession, _reservation: &Reservation) -> Result<(), RailError> {
            self.payments.fetch_add(1, Ordering::SeqCst);
            match &self.pay_error {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            }
        }
    }

    #[derive(Default)]
    struct RecordingNotifier {
        messages: Mutex<Vec<String>>,
        fail: bool,
    }

    impl Notifier for RecordingNotifier {
        fn send(&self, message: &str) -> Result<(), NotifyError> {
            self.messages.lock().push(message.to_string());
            if self.fail {
                return Err(NotifyError::Transport("offline".to_string()));
            }
            Ok(())
        }
    }

    fn fast() -> RunnerOptions {
        RunnerOptions {
            poll_interval: Duration::from_millis(1),
            max_backoff: Duration::from_millis(4),
            max_attempts: None,
        }
    }

    fn settings_with_login() -> (TempDir, SettingsRepository) {
        let (dir, settings) = empty_settings();
        settings
            .save_account(Carrier::Srt, "member", "secret", true)
            .expect("save account");
        (dir, settings)
    }

    fn empty_settings() -> (TempDir, SettingsRepository) {
        let dir = tempdir().expect("tempdir");
        let store = CredentialStore::file_only(dir.path().join("config.json"));
        (dir, SettingsRepository::new(Arc::new(store)))
    }

    fn params() -> ReservationParameters {
        let mut params =
            ReservationParameters::defaults(Carrier::Srt, Local::now().naive_local());
        params.arrival = "부산".to_string();
        params
    }

    fn runner(settings: &SettingsRepository, client: &Arc<ScriptedClient>) -> ReservationSessionRunner {
        let client: Arc<dyn RailClient> = client.clone();
        ReservationSessionRunner::new(settings.clone(), client).with_options(fast())
    }

    #[test]
    fn same_station_is_rejected_while_idle() {
        let (_dir, settings) = settings_with_login();
        let client = Arc::new(ScriptedClient::default());
        let mut runner = runner(&settings, &client);

        let mut params = params();
        params.arrival = params.departure.clone();
        let err = runner.start(Carrier::Srt, params).unwrap_err();

        assert!(matches!(
            err,
            SessionError::Validation(ValidationError::SameStation(_))
        ));
        assert_eq!(runner.phase(), SessionPhase::Idle);
        assert!(runner.log().is_empty());
        assert_eq!(settings.store().get("SRT", "departure"), None);
        assert_eq!(client.logins.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn passenger_totals_outside_range_are_rejected() {
        let (_dir, settings) = settings_with_login();
        let client = Arc::new(ScriptedClient::default());
        let mut runner = runner(&settings, &client);

        for (adult, child) in [(0, 0), (10, 0), (6, 4), (9, 9)] {
            let mut params = params();
            params.passengers = PassengerCounts {
                adult,
                child,
                ..PassengerCounts::default()
            };
            let err = runner.start(Carrier::Srt, params).unwrap_err();
            assert!(matches!(err, SessionError::Validation(_)), "{adult}+{child}");
            assert_eq!(runner.phase(), SessionPhase::Idle);
        }
    }

    #[test]
    fn missing_login_fails_without_contacting_the_carrier() {
        let (_dir, settings) = empty_settings();
        let client = Arc::new(ScriptedClient::with_trains(vec![train("SRT", true, true)]));
        let mut runner = runner(&settings, &client);

        let err = runner.start(Carrier::Srt, params()).unwrap_err();

        assert!(matches!(err, SessionError::CredentialsRequired(Carrier::Srt)));
        let outcome = runner.wait();
        assert_eq!(outcome.phase, SessionPhase::Failed);
        assert!(outcome.logged("No SRT login saved"));
        assert_eq!(client.logins.load(Ordering::SeqCst), 0);
        assert_eq!(client.search_calls.load(Ordering::SeqCst), 0);
        assert_eq!(settings.store().get("SRT", "arrival").as_deref(), Some("부산"));
    }

    #[test]
    fn general_first_falls_back_to_special() {
        let (_dir, settings) = settings_with_login();
        let client = Arc::new(ScriptedClient::with_trains(vec![train("SRT", false, true)]));
        let mut runner = runner(&settings, &client);

        let receiver = runner.start(Carrier::Srt, params());
        assert!(receiver.is_ok());
        let outcome = runner.wait();

        assert_eq!(outcome.phase, SessionPhase::Completed);
        assert_eq!(*client.reserved.lock(), vec![SeatClass::Special]);
        assert_eq!(
            outcome.reservation.map(|reservation| reservation.seat_class),
            Some(SeatClass::Special)
        );
        assert_eq!(client.payments.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn general_only_never_books_special() {
        let (_dir, settings) = settings_with_login();
        let client = Arc::new(ScriptedClient::with_trains(vec![train("SRT", false, true)]));
        let mut runner = runner(&settings, &client).with_options(RunnerOptions {
            max_attempts: Some(3),
            ..fast()
        });

        let mut params = params();
        params.seat = SeatPreference::GeneralOnly;
        runner.start(Carrier::Srt, params).expect("start");
        let outcome = runner.wait();

        assert_eq!(outcome.phase, SessionPhase::Failed);
        assert!(outcome.logged("No seats found after 3"));
        assert_eq!(client.search_calls.load(Ordering::SeqCst), 3);
        assert!(client.reserved.lock().is_empty());
    }

    #[test]
    fn payment_failure_keeps_the_reservation() {
        let (_dir, settings) = settings_with_login();
        let client = Arc::new(ScriptedClient {
            pay_error: Some(RailError::Payment("card declined".to_string())),
            ..ScriptedClient::with_trains(vec![train("SRT", true, false)])
        });
        let mut runner = runner(&settings, &client);

        let mut params = params();
        params.auto_pay = true;
        runner.start(Carrier::Srt, params).expect("start");
        let outcome = runner.wait();

        assert_eq!(outcome.phase, SessionPhase::Failed);
        assert!(outcome.logged("Reserved #R0001"));
        assert!(outcome.logged("Payment failed"));
        assert!(outcome.reservation.is_some());
        assert_eq!(client.payments.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn auto_pay_success_completes() {
        let (_dir, settings) = settings_with_login();
        let client = Arc::new(ScriptedClient::with_trains(vec![train("SRT", true, false)]));
        let mut runner = runner(&settings, &client);

        let mut params = params();
        params.auto_pay = true;
        runner.start(Carrier::Srt, params).expect("start");
        let outcome = runner.wait();

        assert_eq!(outcome.phase, SessionPhase::Completed);
        assert!(outcome.logged("Paid for reservation #R0001"));
        assert_eq!(client.payments.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn login_failure_is_not_retried() {
        let (_dir, settings) = settings_with_login();
        let client = Arc::new(ScriptedClient {
            login_error: Some(RailError::Auth("wrong password".to_string())),
            ..ScriptedClient::default()
        });
        let mut runner = runner(&settings, &client);

        runner.start(Carrier::Srt, params()).expect("start");
        let outcome = runner.wait();

        assert_eq!(outcome.phase, SessionPhase::Failed);
        assert!(outcome.logged("Login failed"));
        assert_eq!(client.logins.load(Ordering::SeqCst), 1);
        assert_eq!(client.search_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn sold_out_and_transient_errors_keep_searching() {
        let (_dir, settings) = settings_with_login();
        let client = Arc::new(ScriptedClient::with_trains(vec![train("SRT", true, false)]));
        client.searches.lock().extend([
            Ok(vec![train("SRT", false, false)]),
            Err(RailError::Network("timeout".to_string())),
            Err(RailError::SoldOut),
        ]);
        client.reserve_errors.lock().push_back(RailError::SoldOut);
        let mut runner = runner(&settings, &client);

        runner.start(Carrier::Srt, params()).expect("start");
        let outcome = runner.wait();

        assert_eq!(outcome.phase, SessionPhase::Completed);
        assert!(outcome.logged("Search attempt 2 failed: network error: timeout"));
        assert!(outcome.logged("Seats were taken"));
        assert_eq!(client.search_calls.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn stop_during_in_flight_search_cancels() {
        let (_dir, settings) = settings_with_login();
        let (client, started, release) = ScriptedClient::gated(vec![train("SRT", true, true)]);
        let client = Arc::new(client);
        let mut runner = runner(&settings, &client);

        runner.start(Carrier::Srt, params()).expect("start");
        started.recv().expect("search started");
        runner.stop();
        runner.stop();
        release.send(()).expect("release search");
        let outcome = runner.wait();

        assert_eq!(outcome.phase, SessionPhase::Cancelled);
        assert!(client.reserved.lock().is_empty());
        assert_eq!(
            outcome
                .log
                .iter()
                .filter(|event| event.message.starts_with("Stop requested"))
                .count(),
            1
        );
    }

    #[test]
    fn stop_wakes_the_poll_delay() {
        let (_dir, settings) = settings_with_login();
        let client = Arc::new(ScriptedClient::with_trains(vec![train("SRT", false, false)]));
        let mut runner = runner(&settings, &client).with_options(RunnerOptions {
            poll_interval: Duration::from_secs(120),
            max_backoff: Duration::from_secs(120),
            max_attempts: None,
        });

        runner.start(Carrier::Srt, params()).expect("start");
        while client.search_calls.load(Ordering::SeqCst) == 0 {
            thread::sleep(Duration::from_millis(1));
        }
        runner.stop();
        let outcome = runner.wait();

        assert_eq!(outcome.phase, SessionPhase::Cancelled);
        assert_eq!(client.search_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn second_start_while_running_is_refused() {
        let (_dir, settings) = settings_with_login();
        let (client, started, release) = ScriptedClient::gated(vec![train("SRT", true, false)]);
        let client = Arc::new(client);
        let mut runner = runner(&settings, &client);

        runner.start(Carrier::Srt, params()).expect("start");
        started.recv().expect("search started");

        let mut other = params();
        other.arrival = "포항".to_string();
        assert!(matches!(
            runner.start(Carrier::Srt, other),
            Err(SessionError::AlreadyRunning)
        ));
        assert_eq!(settings.store().get("SRT", "arrival").as_deref(), Some("부산"));

        release.send(()).expect("release search");
        assert_eq!(runner.wait().phase, SessionPhase::Completed);
    }

    #[test]
    fn stop_after_completion_changes_nothing_and_restart_works() {
        let (_dir, settings) = settings_with_login();
        let client = Arc::new(ScriptedClient::with_trains(vec![train("SRT", true, false)]));
        let mut runner = runner(&settings, &client);

        runner.start(Carrier::Srt, params()).expect("start");
        let first = runner.wait();
        assert_eq!(first.phase, SessionPhase::Completed);

        runner.stop();
        assert_eq!(runner.phase(), SessionPhase::Completed);
        assert_eq!(runner.log().len(), first.log.len());

        runner.start(Carrier::Srt, params()).expect("restart");
        let second = runner.wait();
        assert_eq!(second.phase, SessionPhase::Completed);
        assert!(second.log[0].message.starts_with("Starting SRT reservation"));
    }

    #[test]
    fn progress_channel_mirrors_the_log() {
        let (_dir, settings) = settings_with_login();
        let client = Arc::new(ScriptedClient::with_trains(vec![train("SRT", true, false)]));
        let mut runner = runner(&settings, &client);

        let mut receiver = runner.start(Carrier::Srt, params()).expect("start");
        let outcome = runner.wait();
        let streamed = receiver.drain();

        assert_eq!(streamed, outcome.log);
        let phases: Vec<SessionPhase> = streamed.iter().map(|event| event.phase).collect();
        assert_eq!(phases.first(), Some(&SessionPhase::Validating));
        assert!(phases.contains(&SessionPhase::Authenticating));
        assert!(phases.contains(&SessionPhase::Booking));
        assert_eq!(phases.last(), Some(&SessionPhase::Completed));
    }

    #[test]
    fn notifier_is_called_once_and_failures_are_ignored() {
        let (_dir, settings) = settings_with_login();
        let client = Arc::new(ScriptedClient::with_trains(vec![train("SRT", true, false)]));
        let notifier = Arc::new(RecordingNotifier {
            fail: true,
            ..RecordingNotifier::default()
        });
        let mut runner = runner(&settings, &client).with_notifier(notifier.clone());

        runner.start(Carrier::Srt, params()).expect("start");
        let outcome = runner.wait();

        assert_eq!(outcome.phase, SessionPhase::Completed);
        assert!(outcome.logged("Notification failed"));
        let messages = notifier.messages.lock();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("R0001"));
    }

    #[test]
    fn cancelled_sessions_are_not_notified() {
        let (_dir, settings) = settings_with_login();
        let (client, started, release) = ScriptedClient::gated(vec![train("SRT", true, false)]);
        let client = Arc::new(client);
        let notifier = Arc::new(RecordingNotifier::default());
        let mut runner = runner(&settings, &client).with_notifier(notifier.clone());

        runner.start(Carrier::Srt, params()).expect("start");
        started.recv().expect("search started");
        runner.stop();
        release.send(()).expect("release search");

        assert_eq!(runner.wait().phase, SessionPhase::Cancelled);
        assert!(notifier.messages.lock().is_empty());
    }

    /// Blocks inside `send` until released, like a slow HTTP call.
    struct SlowNotifier {
        entered: Mutex<mpsc::Sender<()>>,
        release: Mutex<mpsc::Receiver<()>>,
    }

    impl Notifier for SlowNotifier {
        fn send(&self, _message: &str) -> Result<(), NotifyError> {
            let _ = self.entered.lock().send(());
            let _ = self.release.lock().recv();
            Ok(())
        }
    }

    #[test]
    fn restart_during_slow_notification_returns_immediately() {
        let (_dir, settings) = settings_with_login();
        let client = Arc::new(ScriptedClient::with_trains(vec![train("SRT", true, false)]));
        let (entered_tx, entered) = mpsc::channel();
        let (release, release_rx) = mpsc::channel();
        let notifier = Arc::new(SlowNotifier {
            entered: Mutex::new(entered_tx),
            release: Mutex::new(release_rx),
        });
        let mut runner = runner(&settings, &client).with_notifier(notifier);

        runner.start(Carrier::Srt, params()).expect("start");
        entered.recv().expect("notification started");
        assert_eq!(runner.phase(), SessionPhase::Completed);
        assert!(runner.is_running());

        let began = std::time::Instant::now();
        assert!(matches!(
            runner.start(Carrier::Srt, params()),
            Err(SessionError::AlreadyRunning)
        ));
        assert!(began.elapsed() < Duration::from_secs(1));

        release.send(()).expect("release first notification");
        assert_eq!(runner.wait().phase, SessionPhase::Completed);
        assert!(!runner.is_running());

        release.send(()).expect("release second notification");
        runner.start(Carrier::Srt, params()).expect("restart");
        assert_eq!(runner.wait().phase, SessionPhase::Completed);
    }

    #[test]
    fn failed_parameter_save_is_logged_and_the_session_continues() {
        let dir = tempdir().expect("tempdir");
        let backend = MemoryBackend::default();
        let failing_writes = Arc::clone(&backend.failing_writes);
        let store = CredentialStore::new(Box::new(backend), dir.path().join("config.json"));
        let settings = SettingsRepository::new(Arc::new(store));
        settings
            .save_account(Carrier::Srt, "member", "secret", true)
            .expect("save account");
        failing_writes.store(true, Ordering::SeqCst);

        let client = Arc::new(ScriptedClient::with_trains(vec![train("SRT", true, false)]));
        let mut runner = runner(&settings, &client);

        assert!(runner.start(Carrier::Srt, params()).is_ok());
        let outcome = runner.wait();

        assert_eq!(outcome.phase, SessionPhase::Completed);
        assert!(outcome.logged("Could not save these settings"));
        assert_eq!(settings.store().get("SRT", "arrival"), None);
        assert!(!dir.path().join("config.json").exists());
    }

    #[test]
    fn pick_train_respects_preference_and_ktx_filter() {
        let trains = vec![
            train("ITX-새마을", true, true),
            train("KTX", false, true),
            train("KTX-산천", true, false),
        ];

        let (picked, class) = pick_train(&trains, SeatPreference::GeneralFirst, false).unwrap();
        assert_eq!(picked.name, "ITX-새마을");
        assert_eq!(class, SeatClass::General);

        let (picked, class) = pick_train(&trains, SeatPreference::GeneralFirst, true).unwrap();
        assert_eq!(picked.name, "KTX");
        assert_eq!(class, SeatClass::Special);

        let (picked, class) = pick_train(&trains, SeatPreference::GeneralOnly, true).unwrap();
        assert_eq!(picked.name, "KTX-산천");
        assert_eq!(class, SeatClass::General);

        assert!(pick_train(&trains[2..], SeatPreference::SpecialOnly, false).is_none());
    }
}
