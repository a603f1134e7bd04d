//! Scan session state machine.
//!
//! A [`ScanController`] turns decoded-code events into at most one validation
//! request per physical ticket. The camera can deliver another frame before
//! the previous validation has finished, so acceptance is decided under a
//! lock: the phase, the last accepted code and a processing guard must all
//! agree before a code goes out.
//!
//! ```text
//! Idle -> Scanning -> Captured -> Validating -> Resulted -> (reset) -> Scanning
//!                        \_____ format rejected _____/
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::error::{PiscanError, TransportError};
use crate::normalize::{normalize, ValidationResult};
use crate::time::{ResultTime, TimeNormalizer};
use crate::types::RawScanEvent;
use crate::validation::check_code;

/// Sends one code to whatever decides its verdict.
///
/// [`crate::client::BackendClient`] is the production implementation.
pub trait TicketValidator: Send + Sync {
    /// Returns the raw verdict payload for `code`.
    fn validate(&self, code: &str) -> impl Future<Output = Result<Value, TransportError>> + Send;
}

/// Where the session is in the current scan cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPhase {
    /// Camera not started.
    #[default]
    Idle,
    /// Camera live, waiting for a code.
    Scanning,
    /// A code was accepted but not yet classified.
    Captured,
    /// Request in flight.
    Validating,
    /// Result on screen, camera inactive until reset.
    Resulted,
}

/// Snapshot of a scan session, published on every transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSessionState {
    /// Current step of the scan cycle.
    pub phase: ScanPhase,
    /// Result of the last cycle, cleared on reset.
    pub validation_result: Option<ValidationResult>,
    /// When the shown result was produced.
    pub result_time: Option<ResultTime>,
    /// Completed validation attempts. Format rejections do not count.
    pub scan_count: u64,
    /// Attempts whose normalized result was valid.
    pub success_count: u64,
}

impl ScanSessionState {
    /// A result is on screen.
    #[must_use]
    pub fn scanned(&self) -> bool {
        self.phase == ScanPhase::Resulted
    }

    /// The camera should be delivering frames.
    #[must_use]
    pub fn scanning(&self) -> bool {
        self.phase == ScanPhase::Scanning
    }

    /// A code is being classified or validated; the camera must hold frames.
    #[must_use]
    pub fn validating(&self) -> bool {
        matches!(self.phase, ScanPhase::Captured | ScanPhase::Validating)
    }
}

/// Why a decoded-code event was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// A validation is already in flight.
    Validating,
    /// Same code as the last accepted one, and no reset since.
    SameCode,
    /// The processing guard is still held.
    GuardHeld,
    /// The session is not scanning.
    CameraInactive,
}

impl IgnoreReason {
    /// Stable label used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validating => "validating",
            Self::SameCode => "same_code",
            Self::GuardHeld => "guard_held",
            Self::CameraInactive => "camera_inactive",
        }
    }
}

/// What [`ScanController::handle_scan`] did with an event.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanOutcome {
    /// Dropped without touching the session.
    Ignored(IgnoreReason),
    /// The cycle finished with this result.
    Resulted(ValidationResult),
}

#[derive(Debug, Default)]
struct Session {
    state: ScanSessionState,
    last_scanned_code: Option<String>,
    is_processing: bool,
    /// Bumped on every accepted code; cooldown timers only release their own cycle.
    cycle: u64,
}

/// Session state plus everything a detached validation task needs to finish a cycle.
struct Shared {
    times: TimeNormalizer,
    cooldown: Duration,
    session: Mutex<Session>,
    updates: watch::Sender<ScanSessionState>,
}

impl Shared {
    /// Counts a completed attempt and shows its result.
    async fn complete(self: &Arc<Self>, cycle: u64, result: ValidationResult) {
        let mut session = self.session.lock().await;
        if session.cycle != cycle || session.state.phase != ScanPhase::Validating {
            warn!(cycle, current = session.cycle, "stale validation result dropped");
            return;
        }

        session.state.scan_count += 1;
        if result.valid {
            session.state.success_count += 1;
        }
        info!(
            cycle,
            valid = result.valid,
            duplicate = result.is_duplicate,
            scan_count = session.state.scan_count,
            "validation finished"
        );
        self.finish(&mut session, result);
    }

    /// Stores `result`, enters `Resulted` and arms the guard cooldown.
    fn finish(self: &Arc<Self>, session: &mut Session, result: ValidationResult) {
        let now = Utc::now();
        let stamp = result
            .timestamp
            .clone()
            .unwrap_or_else(|| now.to_rfc3339());
        session.state.result_time = Some(self.times.result_time(&stamp, now));
        session.state.validation_result = Some(result);
        session.state.phase = ScanPhase::Resulted;
        self.publish(&session.state);
        self.arm_cooldown(session.cycle);
    }

    fn arm_cooldown(self: &Arc<Self>, cycle: u64) {
        let shared = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(shared.cooldown).await;
            let mut session = shared.session.lock().await;
            if session.cycle == cycle && session.is_processing {
                session.is_processing = false;
                debug!(cycle, "scan guard released");
            }
        });
    }

    fn publish(&self, state: &ScanSessionState) {
        self.updates.send_replace(state.clone());
    }
}

/// Owns the scan session and drives validation for accepted codes.
///
/// Validation runs on its own task, so a caller that stops awaiting
/// [`ScanController::handle_scan`] does not strand the session in
/// `Validating`; the cycle still reaches `Resulted`.
pub struct ScanController<V> {
    validator: Arc<V>,
    shared: Arc<Shared>,
}

impl<V: TicketValidator + 'static> ScanController<V> {
    /// Creates an idle controller.
    ///
    /// `cooldown` is how long the processing guard stays held after a result.
    pub fn new(validator: V, times: TimeNormalizer, cooldown: Duration) -> Self {
        let (updates, _) = watch::channel(ScanSessionState::default());
        Self {
            validator: Arc::new(validator),
            shared: Arc::new(Shared {
                times,
                cooldown,
                session: Mutex::new(Session::default()),
                updates,
            }),
        }
    }

    /// Receives every published session state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ScanSessionState> {
        self.shared.updates.subscribe()
    }

    /// The current session state.
    pub async fn snapshot(&self) -> ScanSessionState {
        self.shared.session.lock().await.state.clone()
    }

    /// Starts the camera session.
    ///
    /// # Errors
    ///
    /// Returns [`PiscanError::CameraPermissionDenied`] if the camera may not
    /// be used. The session stays idle.
    pub async fn start(&self, permission_granted: bool) -> Result<(), PiscanError> {
        if !permission_granted {
            warn!("camera permission denied");
            return Err(PiscanError::CameraPermissionDenied);
        }

        let mut session = self.shared.session.lock().await;
        if session.state.phase == ScanPhase::Idle {
            session.state.phase = ScanPhase::Scanning;
            self.shared.publish(&session.state);
            info!("scan session started");
        }
        Ok(())
    }

    /// Processes one decoded-code event.
    pub async fn handle_scan(&self, event: &RawScanEvent) -> ScanOutcome {
        let code = event.data.clone();

        let cycle = {
            let mut session = self.shared.session.lock().await;
            if let Some(reason) = ignore_reason(&session, &code) {
                debug!(reason = reason.as_str(), "scan ignored");
                return ScanOutcome::Ignored(reason);
            }

            session.is_processing = true;
            session.last_scanned_code = Some(code.clone());
            session.cycle += 1;
            session.state.phase = ScanPhase::Captured;
            self.shared.publish(&session.state);

            if let Err(reason) = check_code(&code) {
                info!(error = %reason, "scan rejected by format check");
                let result = ValidationResult::format_rejected(&reason);
                self.shared.finish(&mut session, result.clone());
                return ScanOutcome::Resulted(result);
            }

            session.state.phase = ScanPhase::Validating;
            self.shared.publish(&session.state);
            info!(cycle = session.cycle, "validating ticket");
            session.cycle
        };

        let validator = Arc::clone(&self.validator);
        let shared = Arc::clone(&self.shared);
        let task = tokio::spawn(async move {
            let result = match validator.validate(&code).await {
                Ok(payload) => normalize(&payload),
                Err(err) => {
                    warn!(cycle, error = %err, "validation request failed");
                    ValidationResult::network_failure(&err)
                }
            };
            shared.complete(cycle, result.clone()).await;
            result
        });

        match task.await {
            Ok(result) => ScanOutcome::Resulted(result),
            Err(err) => {
                warn!(cycle, error = %err, "validation task failed");
                let result = ValidationResult::network_failure(&err);
                self.shared.complete(cycle, result.clone()).await;
                ScanOutcome::Resulted(result)
            }
        }
    }

    /// Returns to scanning, clearing the result and the guard.
    ///
    /// Counters are kept. Has no effect while idle or validating; returns
    /// whether the session is now scanning.
    pub async fn reset(&self) -> bool {
        let mut session = self.shared.session.lock().await;
        match session.state.phase {
            ScanPhase::Idle | ScanPhase::Captured | ScanPhase::Validating => {
                debug!(phase = ?session.state.phase, "reset ignored");
                false
            }
            ScanPhase::Scanning | ScanPhase::Resulted => {
                session.is_processing = false;
                session.last_scanned_code = None;
                session.state.validation_result = None;
                session.state.result_time = None;
                session.state.phase = ScanPhase::Scanning;
                self.shared.publish(&session.state);
                debug!("scan session reset");
                true
            }
        }
    }
}

/// First rule that keeps `code` out of the current session.
///
/// The guard is the deciding reason only while a result is on screen and
/// the cooldown has not yet run out; a different code scanned then is
/// refused as [`IgnoreReason::GuardHeld`] rather than `CameraInactive`.
fn ignore_reason(session: &Session, code: &str) -> Option<IgnoreReason> {
    if matches!(
        session.state.phase,
        ScanPhase::Captured | ScanPhase::Validating
    ) {
        Some(IgnoreReason::Validating)
    } else if session.last_scanned_code.as_deref() == Some(code) {
        Some(IgnoreReason::SameCode)
    } else if session.is_processing {
        Some(IgnoreReason::GuardHeld)
    } else if session.state.phase != ScanPhase::Scanning {
        Some(IgnoreReason::CameraInactive)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::{codes, ResultKind, NETWORK_ERROR_MESSAGE};
    use crate::time::DisplayZone;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const COOLDOWN: Duration = Duration::from_millis(1000);

    #[derive(Clone)]
    struct ScriptedValidator {
        calls: Arc<AtomicUsize>,
        reply: Result<Value, TransportError>,
        delay: Duration,
    }

    impl ScriptedValidator {
        fn replying(reply: Result<Value, TransportError>) -> Self {
            Self {
                calls: Arc::new(AtomicUsize::new(0)),
                reply,
                delay: Duration::ZERO,
            }
        }

        fn slow(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl TicketValidator for ScriptedValidator {
        async fn validate(&self, _code: &str) -> Result<Value, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply.clone()
        }
    }

    fn valid_reply() -> Result<Value, TransportError> {
        Ok(json!({
            "valid": true,
            "message": "Welcome",
            "customerName": "J. Doe",
            "seatFormatted": "Row 4, Seat 4"
        }))
    }

    async fn started(validator: ScriptedValidator) -> ScanController<ScriptedValidator> {
        let controller = ScanController::new(
            validator,
            TimeNormalizer::new(DisplayZone::Named(chrono_tz::UTC)),
            COOLDOWN,
        );
        controller.start(true).await.unwrap();
        controller
    }

    async fn guard_held<V: TicketValidator + 'static>(controller: &ScanController<V>) -> bool {
        controller.shared.session.lock().await.is_processing
    }

    #[tokio::test]
    async fn test_start_requires_permission() {
        let controller = ScanController::new(
            ScriptedValidator::replying(valid_reply()),
            TimeNormalizer::default(),
            COOLDOWN,
        );
        let err = controller.start(false).await.unwrap_err();
        assert!(err.is_fatal_to_session());
        assert_eq!(controller.snapshot().await.phase, ScanPhase::Idle);

        let outcome = controller.handle_scan(&RawScanEvent::new("ABC-123")).await;
        assert_eq!(outcome, ScanOutcome::Ignored(IgnoreReason::CameraInactive));
    }

    #[tokio::test]
    async fn test_accepted_scan_reaches_result() {
        let validator = ScriptedValidator::replying(valid_reply());
        let controller = started(validator.clone()).await;

        let outcome = controller.handle_scan(&RawScanEvent::new("ABC-123")).await;
        let ScanOutcome::Resulted(result) = outcome else {
            panic!("expected a result");
        };
        assert!(result.valid);
        assert_eq!(result.customer_name.as_deref(), Some("J. Doe"));

        let state = controller.snapshot().await;
        assert!(state.scanned());
        assert_eq!(state.scan_count, 1);
        assert_eq!(state.success_count, 1);
        assert_eq!(state.validation_result, Some(result));
        assert!(state.result_time.is_some());
        assert_eq!(validator.calls(), 1);
    }

    #[tokio::test]
    async fn test_same_code_without_reset_is_ignored() {
        let validator = ScriptedValidator::replying(valid_reply());
        let controller = started(validator.clone()).await;

        controller.handle_scan(&RawScanEvent::new("ABC-123")).await;
        let before = controller.snapshot().await;
        let outcome = controller.handle_scan(&RawScanEvent::new("ABC-123")).await;

        assert_eq!(outcome, ScanOutcome::Ignored(IgnoreReason::SameCode));
        assert_eq!(controller.snapshot().await, before);
        assert_eq!(validator.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_frames_make_one_request() {
        let validator =
            ScriptedValidator::replying(valid_reply()).slow(Duration::from_millis(200));
        let controller = started(validator.clone()).await;

        let first = RawScanEvent::new("ABC-123");
        let other = RawScanEvent::new("XYZ-999");
        let (a, b, c) = tokio::join!(
            controller.handle_scan(&first),
            controller.handle_scan(&first),
            controller.handle_scan(&other),
        );

        assert!(matches!(a, ScanOutcome::Resulted(_)));
        assert_eq!(b, ScanOutcome::Ignored(IgnoreReason::Validating));
        assert_eq!(c, ScanOutcome::Ignored(IgnoreReason::Validating));
        assert_eq!(validator.calls(), 1);
        assert_eq!(controller.snapshot().await.scan_count, 1);
    }

    #[tokio::test]
    async fn test_format_rejection_skips_network_and_count() {
        let validator = ScriptedValidator::replying(valid_reply());
        let controller = started(validator.clone()).await;

        let outcome = controller.handle_scan(&RawScanEvent::new(" x ")).await;
        let ScanOutcome::Resulted(result) = outcome else {
            panic!("expected a result");
        };
        assert!(!result.valid);
        assert_eq!(result.kind(), ResultKind::FormatRejected);
        assert_eq!(result.error_code.as_deref(), Some(codes::INVALID_FORMAT));

        let state = controller.snapshot().await;
        assert_eq!(state.phase, ScanPhase::Resulted);
        assert_eq!(state.scan_count, 0);
        assert_eq!(validator.calls(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_still_counts() {
        let validator =
            ScriptedValidator::replying(Err(TransportError::Timeout { attempts: 3 }));
        let controller = started(validator.clone()).await;

        let outcome = controller.handle_scan(&RawScanEvent::new("ABC-123")).await;
        let ScanOutcome::Resulted(result) = outcome else {
            panic!("expected a result");
        };
        assert!(!result.valid);
        assert!(!result.is_duplicate);
        assert_eq!(result.message, NETWORK_ERROR_MESSAGE);
        assert_eq!(result.kind(), ResultKind::NetworkError);

        let state = controller.snapshot().await;
        assert_eq!(state.scan_count, 1);
        assert_eq!(state.success_count, 0);
    }

    #[tokio::test]
    async fn test_duplicate_verdict_is_not_a_success() {
        let validator = ScriptedValidator::replying(Ok(json!({
            "valid": true,
            "errorCode": "ALREADY_VALIDATED"
        })));
        let controller = started(validator).await;

        controller.handle_scan(&RawScanEvent::new("ABC-123")).await;
        let state = controller.snapshot().await;
        let result = state.validation_result.unwrap();
        assert!(result.is_duplicate);
        assert_eq!(result.kind(), ResultKind::Duplicate);
        assert_eq!(state.scan_count, 1);
        assert_eq!(state.success_count, 0);
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let validator = ScriptedValidator::replying(valid_reply());
        let controller = started(validator.clone()).await;
        controller.handle_scan(&RawScanEvent::new("ABC-123")).await;

        assert!(controller.reset().await);
        let once = controller.snapshot().await;
        assert!(controller.reset().await);
        let twice = controller.snapshot().await;

        assert_eq!(once, twice);
        assert!(twice.scanning());
        assert!(twice.validation_result.is_none());
        assert_eq!(twice.scan_count, 1);
        assert!(!guard_held(&controller).await);

        // The same ticket may be scanned again after a reset.
        let outcome = controller.handle_scan(&RawScanEvent::new("ABC-123")).await;
        assert!(matches!(outcome, ScanOutcome::Resulted(_)));
        assert_eq!(validator.calls(), 2);
    }

    #[tokio::test]
    async fn test_reset_while_idle_is_noop() {
        let controller = ScanController::new(
            ScriptedValidator::replying(valid_reply()),
            TimeNormalizer::default(),
            COOLDOWN,
        );
        assert!(!controller.reset().await);
        assert_eq!(controller.snapshot().await.phase, ScanPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_guard_released_after_cooldown() {
        let controller = started(ScriptedValidator::replying(valid_reply())).await;
        controller.handle_scan(&RawScanEvent::new("ABC-123")).await;
        assert!(guard_held(&controller).await);

        tokio::time::sleep(COOLDOWN - Duration::from_millis(10)).await;
        assert!(guard_held(&controller).await);

        tokio::time::sleep(Duration::from_millis(20)).await;
        tokio::task::yield_now().await;
        assert!(!guard_held(&controller).await);

        // Still showing the result: the camera stays inactive until reset.
        let outcome = controller.handle_scan(&RawScanEvent::new("XYZ-999")).await;
        assert_eq!(outcome, ScanOutcome::Ignored(IgnoreReason::CameraInactive));
    }

    #[tokio::test(start_paused = true)]
    async fn test_different_code_during_cooldown_hits_guard() {
        let validator = ScriptedValidator::replying(valid_reply());
        let controller = started(validator.clone()).await;
        controller.handle_scan(&RawScanEvent::new("ABC-123")).await;
        let before = controller.snapshot().await;

        let outcome = controller.handle_scan(&RawScanEvent::new("XYZ-999")).await;

        assert_eq!(outcome, ScanOutcome::Ignored(IgnoreReason::GuardHeld));
        assert_eq!(controller.snapshot().await, before);
        assert_eq!(validator.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_scan_still_reaches_result() {
        let validator =
            ScriptedValidator::replying(valid_reply()).slow(Duration::from_secs(60));
        let controller = started(validator.clone()).await;

        let abandoned = tokio::time::timeout(
            Duration::from_secs(1),
            controller.handle_scan(&RawScanEvent::new("ABC-123")),
        )
        .await;
        assert!(abandoned.is_err());
        assert!(controller.snapshot().await.validating());
        assert!(!controller.reset().await);

        tokio::time::sleep(Duration::from_secs(120)).await;
        let state = controller.snapshot().await;
        assert_eq!(state.phase, ScanPhase::Resulted);
        assert_eq!(state.scan_count, 1);
        assert_eq!(state.success_count, 1);

        assert!(controller.reset().await);
        let outcome = controller.handle_scan(&RawScanEvent::new("XYZ-999")).await;
        assert!(matches!(outcome, ScanOutcome::Resulted(_)));
        assert_eq!(validator.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_cooldown_keeps_newer_guard() {
        let controller = started(ScriptedValidator::replying(valid_reply())).await;

        controller.handle_scan(&RawScanEvent::new("ABC-123")).await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        controller.reset().await;
        controller.handle_scan(&RawScanEvent::new("XYZ-999")).await;

        // First cycle's timer fires here; the second cycle's guard must survive it.
        tokio::time::sleep(Duration::from_millis(600)).await;
        tokio::task::yield_now().await;
        assert!(guard_held(&controller).await);

        tokio::time::sleep(Duration::from_millis(500)).await;
        tokio::task::yield_now().await;
        assert!(!guard_held(&controller).await);
    }

    #[tokio::test]
    async fn test_subscribers_see_transitions() {
        let controller = started(ScriptedValidator::replying(valid_reply())).await;
        let mut updates = controller.subscribe();
        assert!(updates.borrow_and_update().scanning());

        controller.handle_scan(&RawScanEvent::new("ABC-123")).await;
        assert!(updates.has_changed().unwrap());
        assert!(updates.borrow_and_update().scanned());

        controller.reset().await;
        assert!(updates.borrow_and_update().scanning());
    }
}
