//! Sign-in lifecycle: sign in, status, and logout.
//!
//! The manager only writes the desired state of a record. Provisioning is
//! left to the reconciler, which it observes through the record status.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use meshgate_core::config::ReconcilerConfig;
use meshgate_core::error::{AppError, ErrorKind};
use meshgate_core::traits::{Clock, RecordStore};
use meshgate_core::types::username::validate_username;
use meshgate_core::types::{AccessRule, RecordPhase, SignInRecord, SignInView};

/// Attempts at a read-modify-write before a conflict is reported.
const MAX_WRITE_ATTEMPTS: usize = 5;

/// How often `logout` re-reads the record while waiting.
const LOGOUT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Result of [`SignInManager::sign_in`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInOutcome {
    /// Access is active.
    Ready(SignInView),
    /// The request was recorded; provisioning is still pending.
    NotReady {
        /// Current view of the record.
        view: SignInView,
        /// When the caller should check again.
        retry_after: Duration,
    },
}

impl SignInOutcome {
    /// The record view in either case.
    pub fn view(&self) -> &SignInView {
        match self {
            SignInOutcome::Ready(view) => view,
            SignInOutcome::NotReady { view, .. } => view,
        }
    }
}

/// Result of [`SignInManager::logout`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOutcome {
    /// Access was revoked within the wait budget.
    SignedOut,
    /// Logout is recorded; revocation has not been observed yet.
    Pending,
    /// There was nothing to revoke.
    AlreadySignedOut,
}

/// Records sign-in intent and reports provisioning progress.
#[derive(Clone)]
pub struct SignInManager {
    /// Record persistence.
    store: Arc<dyn RecordStore>,
    /// Timestamp source for spec writes.
    clock: Arc<dyn Clock>,
    /// Retry hint returned while provisioning is pending.
    retry_after: Duration,
    /// Maximum time `logout` waits for revocation.
    logout_wait: Duration,
    /// Span all sign-in work runs in.
    span: Span,
}

impl std::fmt::Debug for SignInManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignInManager")
            .field("retry_after", &self.retry_after)
            .field("logout_wait", &self.logout_wait)
            .finish()
    }
}

impl SignInManager {
    /// Creates a manager.
    pub fn new(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        config: &ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            clock,
            retry_after: config.retry_after(),
            logout_wait: config.logout_wait(),
            span: info_span!("signin_manager"),
        }
    }

    /// Runs all work inside `span` instead of the default one.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Records that `username` wants `role` for `period`.
    ///
    /// Validates the rule before touching the store, so an invalid request
    /// never creates or changes a record. A repeat sign-in with the role
    /// already provisioned is a renewal and keeps access active.
    pub async fn sign_in(
        &self,
        username: &str,
        role: &str,
        period: Duration,
    ) -> Result<SignInOutcome, AppError> {
        let rule = AccessRule::new(role, period)?;
        self.sign_in_with_rule(username, &rule).await
    }

    /// [`SignInManager::sign_in`] with an already validated rule.
    pub async fn sign_in_with_rule(
        &self,
        username: &str,
        rule: &AccessRule,
    ) -> Result<SignInOutcome, AppError> {
        validate_username(username)?;
        self.write_sign_in(username, rule)
            .instrument(self.span.clone())
            .await
    }

    async fn write_sign_in(
        &self,
        username: &str,
        rule: &AccessRule,
    ) -> Result<SignInOutcome, AppError> {
        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let now = self.clock.now();
            let written = match self.store.get(username).await? {
                None => {
                    let record = SignInRecord::new(username, rule.role(), rule.period(), now);
                    self.store.create(record).await
                }
                Some(mut record) => {
                    let renewal = apply_sign_in(&mut record, rule, now);
                    debug!(username = %username, renewal, generation = record.spec.generation, "Updating sign-in spec");
                    self.store.update(record).await
                }
            };

            match written {
                Ok(record) => {
                    info!(
                        username = %username,
                        role = %rule.role(),
                        period_secs = rule.period().as_secs(),
                        generation = record.spec.generation,
                        "Sign-in recorded"
                    );
                    return Ok(self.outcome_for(&record));
                }
                Err(e) if e.is(ErrorKind::Conflict) || e.is(ErrorKind::NotFound) => {
                    debug!(username = %username, attempt, error = %e, "Sign-in write raced, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(AppError::conflict(format!(
            "sign-in for '{username}' kept conflicting with concurrent writes"
        )))
    }

    /// Current view of `username`'s record.
    ///
    /// Fails with `NotFound` when there is no record, and with `Internal`
    /// when provisioning has failed past its retry budget.
    pub async fn status(&self, username: &str) -> Result<SignInView, AppError> {
        let record = self
            .store
            .get(username)
            .await?
            .ok_or_else(|| AppError::not_found(format!("no sign-in record for '{username}'")))?;

        if !record.status.provisioned {
            if let Some(error) = &record.status.last_error {
                return Err(AppError::internal(format!(
                    "provisioning for '{username}' failed after {} attempts: {error}",
                    record.status.failed_attempts
                )));
            }
        }

        Ok(record.view())
    }

    /// Requests immediate revocation and waits a bounded time for it.
    pub async fn logout(&self, username: &str) -> Result<LogoutOutcome, AppError> {
        async {
            if !self.request_logout(username).await? {
                return Ok(LogoutOutcome::AlreadySignedOut);
            }
            self.wait_for_revocation(username).await
        }
        .instrument(self.span.clone())
        .await
    }

    /// Marks the record for revocation. Returns `false` when there is
    /// nothing to revoke.
    async fn request_logout(&self, username: &str) -> Result<bool, AppError> {
        let mut requested = false;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let Some(mut record) = self.store.get(username).await? else {
                debug!(username = %username, "Logout without a record");
                return Ok(false);
            };

            match record.phase() {
                RecordPhase::Inert => return Ok(false),
                RecordPhase::Deprovisioning => {
                    requested = true;
                    break;
                }
                RecordPhase::Pending | RecordPhase::Provisioned => {}
            }

            record.spec.logout_requested = true;
            record.spec.generation += 1;
            record.spec.updated_at = self.clock.now();

            match self.store.update(record).await {
                Ok(_) => {
                    info!(username = %username, "Logout requested");
                    requested = true;
                    break;
                }
                Err(e) if e.is(ErrorKind::Conflict) => {
                    debug!(username = %username, attempt, "Logout write raced, retrying");
                }
                Err(e) if e.is(ErrorKind::NotFound) => return Ok(false),
                Err(e) => return Err(e),
            }
        }

        if !requested {
            return Err(AppError::conflict(format!(
                "logout for '{username}' kept conflicting with concurrent writes"
            )));
        }
        Ok(true)
    }

    async fn wait_for_revocation(&self, username: &str) -> Result<LogoutOutcome, AppError> {
        let deadline = Instant::now() + self.logout_wait;
        loop {
            match self.store.get(username).await? {
                None => return Ok(LogoutOutcome::SignedOut),
                Some(record) if record.phase() == RecordPhase::Inert => {
                    return Ok(LogoutOutcome::SignedOut);
                }
                Some(_) => {}
            }

            if Instant::now() >= deadline {
                warn!(username = %username, wait_secs = self.logout_wait.as_secs(), "Logout still pending");
                return Ok(LogoutOutcome::Pending);
            }
            tokio::time::sleep(LOGOUT_POLL_INTERVAL).await;
        }
    }

    fn outcome_for(&self, record: &SignInRecord) -> SignInOutcome {
        let view = record.view();
        if view.provisioned {
            SignInOutcome::Ready(view)
        } else {
            SignInOutcome::NotReady {
                view,
                retry_after: self.retry_after,
            }
        }
    }
}

/// Overwrites the desired state of an existing record.
///
/// Returns `true` when this is a renewal of the role already provisioned.
fn apply_sign_in(
    record: &mut SignInRecord,
    rule: &AccessRule,
    now: chrono::DateTime<chrono::Utc>,
) -> bool {
    let renewal = record.status.provisioned
        && record.status.provisioned_role.as_deref() == Some(rule.role());

    record.spec.role = rule.role().to_string();
    record.spec.validity_period = rule.period();
    record.spec.updated_at = now;
    record.spec.generation += 1;
    record.spec.logout_requested = false;

    record.status.last_error = None;
    record.status.failed_attempts = 0;
    if !renewal {
        record.status.provisioned = false;
    }

    renewal
}
