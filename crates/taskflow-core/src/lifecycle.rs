use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

use crate::error::SyncError;
use crate::validate::{
    CategoryDraft, LoginDraft, PasswordDraft, SignupDraft, TaskDraft, ValidationErrors,
};

pub const DEFAULT_SUCCESS_HOLD: Duration = Duration::from_millis(2000);
pub const DEFAULT_RESET_DELAY: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// How long a succeeded operation stays visible before it closes itself.
    pub success_hold: Duration,
    /// Delay between closing and returning to a clean `Idle`.
    pub reset_delay: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            success_hold: DEFAULT_SUCCESS_HOLD,
            reset_delay: DEFAULT_RESET_DELAY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    Idle,
    InFlight,
    Succeeded,
    Failed { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("operation already in progress")]
    Busy,
    #[error("operation is not open")]
    Closed,
    #[error(transparent)]
    Failed(SyncError),
}

/// Bookkeeping for one user-initiated remote action: the form draft, its
/// field errors, the request phase and the close/reset deadlines.
#[derive(Debug)]
pub struct Operation<D> {
    name: &'static str,
    timings: Timings,
    draft: D,
    phase: Phase,
    open: bool,
    field_errors: ValidationErrors,
    server_messages: bool,
    auth_expired: bool,
    close_at: Option<Instant>,
    reset_at: Option<Instant>,
}

impl<D: Default> Operation<D> {
    pub fn new(name: &'static str, timings: Timings) -> Self {
        Self {
            name,
            timings,
            draft: D::default(),
            phase: Phase::Idle,
            open: false,
            field_errors: ValidationErrors::new(),
            server_messages: false,
            auth_expired: false,
            close_at: None,
            reset_at: None,
        }
    }

    /// Failures show the server's own message when it sent one.
    pub fn with_server_messages(mut self) -> Self {
        self.server_messages = true;
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn draft(&self) -> &D {
        &self.draft
    }

    pub fn draft_mut(&mut self) -> &mut D {
        &mut self.draft
    }

    pub fn field_errors(&self) -> &ValidationErrors {
        &self.field_errors
    }

    pub fn inputs_enabled(&self) -> bool {
        matches!(self.phase, Phase::Idle | Phase::Failed { .. })
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.phase {
            Phase::Failed { message } => Some(message),
            _ => None,
        }
    }

    /// The last failure was an expired session; the caller should route to
    /// login.
    pub fn requires_login(&self) -> bool {
        self.auth_expired
    }

    /// Opening finishes any reset still pending from a previous close.
    pub fn open(&mut self) {
        if self.reset_at.is_some() {
            self.reset();
        }
        self.open = true;
        debug!(operation = self.name, "opened");
    }

    pub fn open_with(&mut self, draft: D) {
        self.open();
        self.draft = draft;
    }

    /// Runs `validate` against the draft. Field errors are stored for
    /// display; the phase is left alone.
    pub fn prepare<T>(
        &mut self,
        validate: impl FnOnce(&D) -> Result<T, ValidationErrors>,
    ) -> Option<T> {
        match validate(&self.draft) {
            Ok(value) => {
                self.field_errors = ValidationErrors::new();
                Some(value)
            }
            Err(errors) => {
                debug!(operation = self.name, fields = errors.len(), "validation failed");
                self.field_errors = errors;
                None
            }
        }
    }

    /// Drives `action` to completion. While an earlier submit is in flight
    /// or has succeeded, `action` is dropped without being polled.
    pub async fn submit<T, F>(&mut self, action: F) -> Result<T, SubmitError>
    where
        F: Future<Output = Result<T, SyncError>>,
    {
        if !self.open {
            return Err(SubmitError::Closed);
        }
        if matches!(self.phase, Phase::InFlight | Phase::Succeeded) {
            debug!(operation = self.name, phase = ?self.phase, "submit rejected");
            return Err(SubmitError::Busy);
        }

        self.phase = Phase::InFlight;
        self.auth_expired = false;
        match action.await {
            Ok(value) => {
                self.phase = Phase::Succeeded;
                self.close_at = Some(Instant::now() + self.timings.success_hold);
                info!(operation = self.name, "succeeded");
                Ok(value)
            }
            Err(err) => {
                let message = if self.server_messages {
                    err.server_message()
                } else {
                    err.user_message()
                };
                self.auth_expired = err.is_auth_expired();
                warn!(operation = self.name, error = %err, "failed");
                self.phase = Phase::Failed { message };
                Err(SubmitError::Failed(err))
            }
        }
    }

    pub fn close(&mut self) {
        self.close_at_instant(Instant::now());
    }

    fn close_at_instant(&mut self, at: Instant) {
        self.open = false;
        self.close_at = None;
        self.reset_at = Some(at + self.timings.reset_delay);
        debug!(operation = self.name, "closed");
    }

    fn reset(&mut self) {
        self.draft = D::default();
        self.phase = Phase::Idle;
        self.field_errors = ValidationErrors::new();
        self.auth_expired = false;
        self.close_at = None;
        self.reset_at = None;
        debug!(operation = self.name, "reset");
    }

    /// Applies every deadline that has passed by `now`.
    pub fn tick(&mut self, now: Instant) {
        if let Some(at) = self.close_at
            && at <= now
        {
            self.close_at_instant(at);
        }
        if let Some(at) = self.reset_at
            && at <= now
        {
            self.reset();
        }
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.close_at, self.reset_at) {
            (Some(close), Some(reset)) => Some(close.min(reset)),
            (close, reset) => close.or(reset),
        }
    }

    /// Sleeps through the remaining deadlines until nothing is pending.
    pub async fn settle(&mut self) {
        while let Some(deadline) = self.next_deadline() {
            sleep_until(deadline).await;
            self.tick(Instant::now());
        }
    }
}

/// The independent operation instances the application drives.
#[derive(Debug)]
pub struct Operations {
    pub add_task: Operation<TaskDraft>,
    pub edit_task: Operation<TaskDraft>,
    pub delete_task: Operation<Option<String>>,
    pub add_category: Operation<CategoryDraft>,
    pub delete_category: Operation<Option<String>>,
    pub change_password: Operation<PasswordDraft>,
    pub login: Operation<LoginDraft>,
    pub signup: Operation<SignupDraft>,
}

impl Operations {
    pub fn new(timings: Timings) -> Self {
        Self {
            add_task: Operation::new("add_task", timings),
            edit_task: Operation::new("edit_task", timings),
            delete_task: Operation::new("delete_task", timings),
            add_category: Operation::new("add_category", timings),
            delete_category: Operation::new("delete_category", timings),
            change_password: Operation::new("change_password", timings),
            login: Operation::new("login", timings).with_server_messages(),
            signup: Operation::new("signup", timings).with_server_messages(),
        }
    }
}

impl Default for Operations {
    fn default() -> Self {
        Self::new(Timings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{GENERIC_FAILURE_MESSAGE, SESSION_EXPIRED_MESSAGE};

    fn op() -> Operation<CategoryDraft> {
        let mut op = Operation::new("add_category", Timings::default());
        op.open();
        op
    }

    #[tokio::test(start_paused = true)]
    async fn success_holds_then_closes_then_resets() {
        let mut op = op();
        op.draft_mut().name = "Groceries".to_string();
        let started = Instant::now();

        op.submit(async { Ok::<_, SyncError>(()) }).await.expect("submit");
        assert_eq!(op.phase(), &Phase::Succeeded);
        assert!(!op.inputs_enabled());

        op.tick(started + Duration::from_millis(1999));
        assert!(op.is_open());

        op.tick(started + Duration::from_millis(2000));
        assert!(!op.is_open());
        assert_eq!(op.phase(), &Phase::Succeeded);
        assert_eq!(op.draft().name, "Groceries");

        op.tick(started + Duration::from_millis(2300));
        assert_eq!(op.phase(), &Phase::Idle);
        assert_eq!(op.draft(), &CategoryDraft::default());
        assert_eq!(op.next_deadline(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn settle_runs_both_deadlines_on_the_paused_clock() {
        let mut op = op();
        let started = Instant::now();
        op.submit(async { Ok::<_, SyncError>(()) }).await.expect("submit");

        op.settle().await;
        assert_eq!(op.phase(), &Phase::Idle);
        assert!(!op.is_open());
        assert!(started.elapsed() >= Duration::from_millis(2300));
    }

    #[tokio::test(start_paused = true)]
    async fn second_submit_after_success_never_polls_the_action() {
        let mut op = op();
        op.submit(async { Ok::<_, SyncError>(()) }).await.expect("submit");

        let mut polled = false;
        let result = op
            .submit(async {
                polled = true;
                Ok::<_, SyncError>(())
            })
            .await;
        assert_eq!(result, Err(SubmitError::Busy));
        assert!(!polled);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_submit_stays_in_flight() {
        let mut op = op();
        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            op.submit(std::future::pending::<Result<(), SyncError>>()),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(op.phase(), &Phase::InFlight);

        let result = op.submit(async { Ok::<_, SyncError>(()) }).await;
        assert_eq!(result, Err(SubmitError::Busy));
    }

    #[tokio::test]
    async fn failure_re_enables_inputs_and_allows_retry() {
        let mut op = op();
        let err = op
            .submit(async {
                Err::<(), _>(SyncError::Remote {
                    status: 500,
                    message: Some("boom".to_string()),
                })
            })
            .await
            .expect_err("should be rejected");
        assert!(matches!(err, SubmitError::Failed(SyncError::Remote { status: 500, .. })));
        assert_eq!(op.error_message(), Some(GENERIC_FAILURE_MESSAGE));
        assert!(op.inputs_enabled());
        assert!(!op.requires_login());
        assert_eq!(op.next_deadline(), None);

        op.submit(async { Ok::<_, SyncError>(()) }).await.expect("retry");
        assert_eq!(op.phase(), &Phase::Succeeded);
    }

    #[tokio::test]
    async fn expired_session_asks_for_login() {
        let mut op = op();
        let _ = op.submit(async { Err::<(), _>(SyncError::AuthExpired) }).await;
        assert_eq!(op.error_message(), Some(SESSION_EXPIRED_MESSAGE));
        assert!(op.requires_login());
    }

    #[tokio::test]
    async fn auth_forms_surface_the_server_message() {
        let mut ops = Operations::default();
        ops.login.open();
        let _ = ops
            .login
            .submit(async {
                Err::<(), _>(SyncError::Remote {
                    status: 400,
                    message: Some("Invalid credentials".to_string()),
                })
            })
            .await;
        assert_eq!(ops.login.error_message(), Some("Invalid credentials"));
        assert_eq!(ops.add_task.phase(), &Phase::Idle);
    }

    #[tokio::test]
    async fn closed_operation_refuses_to_submit() {
        let mut op: Operation<CategoryDraft> = Operation::new("add_category", Timings::default());
        let result = op.submit(async { Ok::<_, SyncError>(()) }).await;
        assert_eq!(result, Err(SubmitError::Closed));
    }

    #[test]
    fn prepare_records_field_errors_without_touching_the_phase() {
        let mut op = op();
        assert_eq!(op.prepare(CategoryDraft::validate), None);
        assert!(!op.field_errors().is_empty());
        assert_eq!(op.phase(), &Phase::Idle);

        op.draft_mut().name = "Work".to_string();
        assert_eq!(op.prepare(CategoryDraft::validate), Some("Work".to_string()));
        assert!(op.field_errors().is_empty());
    }
}
