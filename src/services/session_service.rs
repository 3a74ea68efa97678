use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;
use validator::Validate;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::activity_log::ActivityKind;
use crate::models::question::{AnswerValue, Question};
use crate::models::results_snapshot::ResultsSnapshot;
use crate::models::test::Test;
use crate::models::test_attempt::TestAttempt;
use crate::services::activity_logger::ActivityLogger;
use crate::services::connectivity::ConnectivityMonitor;
use crate::services::countdown::Countdown;
use crate::services::grading_service::{GradeSummary, GradingService};
use crate::services::proctoring_service::{analyze_or_fallback, ProctoringAnalyzer, ProctoringRequest};
use crate::services::storage::{results_key, KeyValueStore};
use crate::services::sync_service::OfflineQueue;
use crate::services::transport::{send_with_timeout, AttemptTransport};
use crate::utils::time::now;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    InProgress,
    Submitting,
    Submitted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    pub id: String,
    pub name: Option<String>,
    pub source_ip: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Next,
    Previous,
    Jump(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardAction {
    Copy,
    Cut,
    Paste,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClipboardDecision {
    Allow,
    /// The caller must cancel the native event.
    Prevent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    Manual { confirmed: bool },
    TimeExpired,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    Transmitted,
    Queued { local_id: String },
    Rejected { reason: String },
    LocalFailure { reason: String },
}

impl Delivery {
    pub fn message(&self) -> &'static str {
        match self {
            Delivery::Transmitted => "Your test has been submitted.",
            Delivery::Queued { .. } => "You are offline. Your answers are saved and will sync later.",
            Delivery::Rejected { .. } => "The server refused this submission. Your results are saved on this device.",
            Delivery::LocalFailure { .. } => "Your results are saved on this device but could not be queued for upload.",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionReceipt {
    pub attempt: TestAttempt,
    pub delivery: Delivery,
}

/// UI-originated events consumed by [`SessionController::run`].
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Navigate(Navigation),
    Answer {
        question_id: String,
        value: AnswerValue,
    },
    VisibilityHidden,
    Clipboard(ClipboardAction),
    Submit {
        confirmed: bool,
    },
}

/// Messages for the UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotice {
    TimeWarning { remaining: Duration },
    SubmissionBlocked { reason: String },
    Submitted { delivery: Delivery },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimerSignal {
    Warning,
    Expired,
}

#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub warning_threshold: Duration,
    pub proctoring_timeout: Duration,
    pub transmit_timeout: Duration,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            warning_threshold: Duration::from_secs(60),
            proctoring_timeout: Duration::from_secs(20),
            transmit_timeout: Duration::from_secs(15),
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            warning_threshold: Duration::from_secs(config.time_warning_seconds),
            proctoring_timeout: Duration::from_secs(config.proctoring_timeout_secs),
            transmit_timeout: Duration::from_secs(config.transmit_timeout_secs),
        }
    }
}

/// Collaborators shared by every session in the process.
#[derive(Clone)]
pub struct SessionDeps {
    pub proctoring: Arc<dyn ProctoringAnalyzer>,
    pub transport: Arc<dyn AttemptTransport>,
    pub queue: Arc<OfflineQueue>,
    pub storage: Arc<dyn KeyValueStore>,
    pub connectivity: ConnectivityMonitor,
}

/// Drives one participant's single pass through a test.
///
/// `InProgress -> Submitting -> Submitted`. `Submitting` falls back to
/// `InProgress` only when a manual submission fails validation; expiry and
/// delivery problems always end in `Submitted`.
pub struct SessionController {
    test: Test,
    participant: Participant,
    attempt_id: Uuid,
    local_id: String,
    state: SessionState,
    start_time: DateTime<Utc>,
    current_index: usize,
    answers: HashMap<String, AnswerValue>,
    logger: ActivityLogger,
    countdown: Countdown,
    timer_rx: mpsc::UnboundedReceiver<TimerSignal>,
    notices: Option<mpsc::UnboundedSender<SessionNotice>>,
    receipt: Option<SubmissionReceipt>,
    deps: SessionDeps,
    settings: SessionSettings,
}

impl SessionController {
    /// Enters `InProgress`: freezes the test definition, stamps the start
    /// time and arms the countdown. Must be called inside a tokio runtime.
    pub fn start(
        test: &Test,
        participant: Participant,
        deps: SessionDeps,
        settings: SessionSettings,
    ) -> Result<Self> {
        if participant.id.trim().is_empty() {
            return Err(Error::BadRequest("participant id is required".to_string()));
        }
        if test.id.trim().is_empty() {
            return Err(Error::BadRequest("test id is required".to_string()));
        }
        if test.questions.is_empty() {
            return Err(Error::BadRequest(format!("test {} has no questions", test.id)));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = test.questions.iter().find(|q| !seen.insert(q.id.as_str())) {
            return Err(Error::BadRequest(format!("duplicate question id {}", dup.id)));
        }

        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let total = Duration::from_secs(u64::from(test.duration_minutes) * 60);
        let mut countdown = Countdown::new(total, settings.warning_threshold);
        let warn_tx = timer_tx.clone();
        countdown.on_threshold(move || {
            let _ = warn_tx.send(TimerSignal::Warning);
        });
        countdown.on_expire(move || {
            let _ = timer_tx.send(TimerSignal::Expired);
        });
        countdown.start();

        let mut logger = ActivityLogger::new(participant.id.clone(), participant.source_ip.clone());
        logger.append(
            ActivityKind::SessionStarted,
            format!("Started test {} ({} minutes)", test.id, test.duration_minutes),
        );

        let attempt_id = Uuid::new_v4();
        tracing::info!(%attempt_id, test_id = %test.id, participant_id = %participant.id, "Test session started");

        Ok(Self {
            test: test.clone(),
            participant,
            attempt_id,
            local_id: format!("local-{}", attempt_id.simple()),
            state: SessionState::InProgress,
            start_time: now(),
            current_index: 0,
            answers: HashMap::new(),
            logger,
            countdown,
            timer_rx,
            notices: None,
            receipt: None,
            deps,
            settings,
        })
    }

    pub fn set_notice_sender(&mut self, tx: mpsc::UnboundedSender<SessionNotice>) {
        self.notices = Some(tx);
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    pub fn remaining(&self) -> Duration {
        self.countdown.remaining()
    }

    pub fn logger(&self) -> &ActivityLogger {
        &self.logger
    }

    pub fn answer(&self, question_id: &str) -> Option<&AnswerValue> {
        self.answers.get(question_id)
    }

    pub fn answered_count(&self) -> usize {
        self.answers.len()
    }

    pub fn receipt(&self) -> Option<&SubmissionReceipt> {
        self.receipt.as_ref()
    }

    pub fn current_question(&self) -> &Question {
        &self.test.questions[self.current_index]
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    fn ensure_in_progress(&self) -> Result<()> {
        match self.state {
            SessionState::InProgress => Ok(()),
            other => Err(Error::InvalidState(format!("session is {:?}", other))),
        }
    }

    /// Moves between questions without touching answers. `Next`/`Previous`
    /// stop at the ends.
    pub fn navigate(&mut self, nav: Navigation) -> Result<&Question> {
        self.ensure_in_progress()?;
        let last = self.test.questions.len() - 1;
        self.current_index = match nav {
            Navigation::Next => (self.current_index + 1).min(last),
            Navigation::Previous => self.current_index.saturating_sub(1),
            Navigation::Jump(idx) if idx <= last => idx,
            Navigation::Jump(idx) => {
                return Err(Error::BadRequest(format!(
                    "question index {} out of range (0..={})",
                    idx, last
                )))
            }
        };
        Ok(self.current_question())
    }

    /// Last write wins; every call appends one log entry.
    pub fn record_answer(&mut self, question_id: &str, value: AnswerValue) -> Result<()> {
        self.ensure_in_progress()?;
        if self.test.question(question_id).is_none() {
            return Err(Error::NotFound(format!("question {} is not part of this test", question_id)));
        }
        self.answers.insert(question_id.to_string(), value);
        self.logger
            .append(ActivityKind::AnswerRecorded, format!("Answered question {}", question_id));
        Ok(())
    }

    /// Tab/window hidden. Logged when tab-switch detection is on, never
    /// blocked. Returns whether it was logged.
    pub fn on_visibility_hidden(&mut self) -> bool {
        if self.state != SessionState::InProgress || !self.test.anti_cheat.detect_tab_switch {
            return false;
        }
        let switches = self.logger.count(ActivityKind::TabHidden) + 1;
        self.logger.append(
            ActivityKind::TabHidden,
            format!("Test tab hidden (switch #{})", switches),
        );
        tracing::info!(attempt_id = %self.attempt_id, switches, "Tab switch recorded");
        true
    }

    pub fn on_clipboard(&mut self, action: ClipboardAction) -> ClipboardDecision {
        if self.state != SessionState::InProgress || !self.test.anti_cheat.block_clipboard {
            return ClipboardDecision::Allow;
        }
        self.logger.append(
            ActivityKind::ClipboardBlocked,
            format!("Blocked clipboard {:?}", action).to_lowercase(),
        );
        ClipboardDecision::Prevent
    }

    /// Manual submission. Needs confirmation; a second call after
    /// submission returns the original receipt without doing anything.
    pub async fn submit(&mut self, confirmed: bool) -> Result<SubmissionReceipt> {
        self.finish(SubmitTrigger::Manual { confirmed }).await
    }

    /// Time ran out: submits without asking.
    pub async fn auto_submit(&mut self) -> Result<SubmissionReceipt> {
        self.finish(SubmitTrigger::TimeExpired).await
    }

    async fn finish(&mut self, trigger: SubmitTrigger) -> Result<SubmissionReceipt> {
        if let Some(receipt) = &self.receipt {
            tracing::debug!(attempt_id = %self.attempt_id, "Submit called on a submitted session");
            return Ok(receipt.clone());
        }
        if trigger == (SubmitTrigger::Manual { confirmed: false }) {
            return Err(Error::ConfirmationRequired);
        }

        self.state = SessionState::Submitting;
        // A wall clock stepped backwards must not produce an inverted attempt.
        let end_time = now().max(self.start_time);
        let grade = GradingService::grade(&self.test.questions, &self.answers);
        let mut attempt = self.build_attempt(&grade, end_time);

        if let Err(e) = attempt.validate() {
            tracing::warn!(attempt_id = %self.attempt_id, error = %e, "Attempt failed validation");
            if trigger != SubmitTrigger::TimeExpired {
                self.state = SessionState::InProgress;
                return Err(Error::Validation(e));
            }
            // Expiry has no way back to InProgress: keep the local results
            // and end the session without delivering.
            self.countdown.cancel();
            self.logger.append(ActivityKind::TimeExpired, "Time expired, submitting automatically");
            attempt.activity_log = self.logger.entries().to_vec();
            self.save_snapshot(&grade, end_time).await;
            return Ok(self.complete(
                attempt,
                Delivery::LocalFailure {
                    reason: format!("attempt failed validation: {}", e),
                },
            ));
        }

        self.countdown.cancel();
        if trigger == SubmitTrigger::TimeExpired {
            self.logger.append(ActivityKind::TimeExpired, "Time expired, submitting automatically");
            attempt.activity_log = self.logger.entries().to_vec();
        }

        self.save_snapshot(&grade, end_time).await;

        let verdict = analyze_or_fallback(
            self.deps.proctoring.as_ref(),
            &ProctoringRequest {
                actor_id: self.participant.id.clone(),
                test_id: self.test.id.clone(),
                activity_log: self.logger.serialize(),
            },
            self.settings.proctoring_timeout,
        )
        .await;
        attempt.is_suspicious = verdict.is_suspicious;
        attempt.suspicious_reason = Some(verdict.reason);

        let delivery = self.deliver(&attempt).await;
        tracing::info!(
            attempt_id = %attempt.id,
            test_id = %attempt.test_id,
            score = attempt.score_percentage,
            suspicious = attempt.is_suspicious,
            delivery = ?delivery,
            "Attempt submitted"
        );
        Ok(self.complete(attempt, delivery))
    }

    fn complete(&mut self, attempt: TestAttempt, delivery: Delivery) -> SubmissionReceipt {
        let receipt = SubmissionReceipt { attempt, delivery };
        self.receipt = Some(receipt.clone());
        self.state = SessionState::Submitted;
        self.notify(SessionNotice::Submitted {
            delivery: receipt.delivery.clone(),
        });
        receipt
    }

    fn build_attempt(&self, grade: &GradeSummary, end_time: DateTime<Utc>) -> TestAttempt {
        TestAttempt {
            id: self.attempt_id,
            test_id: self.test.id.clone(),
            participant_id: self.participant.id.clone(),
            participant_name: self.participant.name.clone(),
            start_time: self.start_time,
            end_time,
            answers: grade.answers.clone(),
            points_awarded: grade.points_awarded,
            max_possible_points: grade.max_possible_points,
            score_percentage: grade.score_percentage,
            is_suspicious: false,
            suspicious_reason: None,
            tab_switches: self.logger.count(ActivityKind::TabHidden) as u32,
            activity_log: self.logger.entries().to_vec(),
        }
    }

    async fn save_snapshot(&self, grade: &GradeSummary, computed_at: DateTime<Utc>) {
        let snapshot = ResultsSnapshot {
            attempt_id: self.attempt_id,
            test_id: self.test.id.clone(),
            questions: self.test.questions.clone(),
            raw_answers: self.answers.clone(),
            scored_answers: grade.answers.clone(),
            points_awarded: grade.points_awarded,
            max_possible_points: grade.max_possible_points,
            score_percentage: grade.score_percentage,
            computed_at,
        };
        let result = match serde_json::to_value(&snapshot) {
            Ok(value) => self.deps.storage.put(&results_key(&self.test.id), value).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::error!(attempt_id = %self.attempt_id, error = ?e, "Failed to persist results snapshot");
        }
    }

    /// Exactly one path: direct send when online, queue when offline or when
    /// the send fails transiently.
    async fn deliver(&self, attempt: &TestAttempt) -> Delivery {
        if self.deps.connectivity.is_online() {
            match send_with_timeout(self.deps.transport.as_ref(), attempt, self.settings.transmit_timeout).await {
                Ok(()) => return Delivery::Transmitted,
                Err(e) if e.is_transient() => {
                    tracing::warn!(attempt_id = %attempt.id, error = %e, "Direct submission failed, queueing");
                }
                Err(e) => {
                    tracing::error!(attempt_id = %attempt.id, error = %e, "Submission rejected");
                    return Delivery::Rejected {
                        reason: e.to_string(),
                    };
                }
            }
        }

        match self
            .deps
            .queue
            .enqueue(attempt.clone(), Some(self.local_id.clone()))
            .await
        {
            Ok(pending) => Delivery::Queued {
                local_id: pending.local_id,
            },
            Err(e) => {
                tracing::error!(attempt_id = %attempt.id, error = ?e, "Failed to queue attempt");
                Delivery::LocalFailure {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn notify(&self, notice: SessionNotice) {
        if let Some(tx) = &self.notices {
            let _ = tx.send(notice);
        }
    }

    async fn handle_timer(&mut self, signal: TimerSignal) -> Result<Option<SubmissionReceipt>> {
        match signal {
            TimerSignal::Warning => {
                if self.state == SessionState::InProgress {
                    let remaining = self.remaining();
                    self.logger.append(
                        ActivityKind::TimeWarning,
                        format!("{} seconds remaining", remaining.as_secs()),
                    );
                    tracing::info!(attempt_id = %self.attempt_id, remaining_secs = remaining.as_secs(), "Time warning");
                    self.notify(SessionNotice::TimeWarning { remaining });
                }
                Ok(None)
            }
            TimerSignal::Expired => self.auto_submit().await.map(Some),
        }
    }

    /// Handles one UI event. Returns the receipt once the session is
    /// submitted.
    pub async fn handle_event(&mut self, event: SessionEvent) -> Result<Option<SubmissionReceipt>> {
        match event {
            SessionEvent::Navigate(nav) => {
                self.navigate(nav)?;
            }
            SessionEvent::Answer { question_id, value } => {
                self.record_answer(&question_id, value)?;
            }
            SessionEvent::VisibilityHidden => {
                self.on_visibility_hidden();
            }
            SessionEvent::Clipboard(action) => {
                self.on_clipboard(action);
            }
            SessionEvent::Submit { confirmed } => {
                return self.submit(confirmed).await.map(Some);
            }
        }
        Ok(None)
    }

    /// Event loop: multiplexes UI events with countdown signals until the
    /// session is submitted. UI errors are reported as notices and do not end
    /// the loop; if the UI channel closes the session waits for expiry.
    pub async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) -> Result<SubmissionReceipt> {
        let mut events_open = true;
        loop {
            tokio::select! {
                Some(signal) = self.timer_rx.recv() => {
                    if let Some(receipt) = self.handle_timer(signal).await? {
                        return Ok(receipt);
                    }
                }
                event = events.recv(), if events_open => match event {
                    Some(event) => match self.handle_event(event).await {
                        Ok(Some(receipt)) => return Ok(receipt),
                        Ok(None) => {}
                        Err(e) => {
                            tracing::debug!(attempt_id = %self.attempt_id, error = %e, "Session event refused");
                            self.notify(SessionNotice::SubmissionBlocked { reason: e.to_string() });
                        }
                    },
                    None => events_open = false,
                },
                else => {
                    return Err(Error::InvalidState("session ended without submission".to_string()));
                }
            }
        }
    }
}
