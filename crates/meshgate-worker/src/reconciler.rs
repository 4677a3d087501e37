//! Drives one sign-in record toward its desired state.
//!
//! `reconcile` is level-triggered: it reads the current record and derives
//! everything from it, so replaying the same key any number of times is
//! safe and converges to the same downstream state.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{Instrument, Span};

use meshgate_access::AccessProvisioner;
use meshgate_core::config::RetentionPolicy;
use meshgate_core::error::{AppError, ErrorKind};
use meshgate_core::result::AppResult;
use meshgate_core::traits::{Clock, RecordStore};
use meshgate_core::types::{RecordPhase, SignInRecord};

/// What the runner should do with a key after a successful pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Reconcile again after the delay (the grant's expiry).
    RequeueAfter(Duration),
    /// Nothing scheduled; wait for the next record change.
    AwaitChange,
}

/// Error from a reconcile pass
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Reading or writing the record failed
    #[error("Record store failure: {0}")]
    Store(AppError),

    /// The downstream cluster API failed
    #[error("Provisioning failure: {0}")]
    Provisioning(AppError),

    /// The record changed underneath this pass
    #[error("Stale record: {0}")]
    Stale(AppError),
}

impl ReconcileError {
    /// Stale passes are retried at once and never count as failures.
    pub fn is_stale(&self) -> bool {
        matches!(self, ReconcileError::Stale(_))
    }

    fn from_write(err: AppError) -> Self {
        match err.kind {
            ErrorKind::Conflict | ErrorKind::NotFound => ReconcileError::Stale(err),
            _ => ReconcileError::Store(err),
        }
    }
}

/// Reconciles sign-in records against the downstream cluster.
#[derive(Clone)]
pub struct Reconciler {
    /// Record persistence
    store: Arc<dyn RecordStore>,
    /// Downstream provisioning
    provisioner: AccessProvisioner,
    /// Wall clock for expiry decisions
    clock: Arc<dyn Clock>,
    /// What to do with a record after revocation
    retention: RetentionPolicy,
    /// Span all reconcile passes run in
    span: Span,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("provisioner", &self.provisioner)
            .field("retention", &self.retention)
            .finish()
    }
}

impl Reconciler {
    /// Create a new reconciler
    pub fn new(
        store: Arc<dyn RecordStore>,
        provisioner: AccessProvisioner,
        clock: Arc<dyn Clock>,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            store,
            provisioner,
            clock,
            retention,
            span: tracing::info_span!("reconciler"),
        }
    }

    /// Run all passes inside `span` instead of the default one
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Runs one pass for `username`.
    pub async fn reconcile(&self, username: &str) -> Result<Action, ReconcileError> {
        self.pass(username).instrument(self.span.clone()).await
    }

    async fn pass(&self, username: &str) -> Result<Action, ReconcileError> {
        let Some(record) = self
            .store
            .get(username)
            .await
            .map_err(ReconcileError::Store)?
        else {
            // Record gone: cascade to the downstream grant.
            self.deprovision(username).await?;
            return Ok(Action::AwaitChange);
        };

        let now = self.clock.now();
        let phase = record.phase();
        let unobserved = record.has_unobserved_spec();
        let valid_until = record.status.valid_until;
        tracing::debug!(
            username = %username,
            phase = %phase,
            generation = record.spec.generation,
            observed_generation = record.status.observed_generation,
            "Reconciling sign-in record"
        );

        match phase {
            RecordPhase::Deprovisioning => {
                self.deprovision(username).await?;
                tracing::info!(username = %username, "Access revoked on logout");
                self.retire(record).await
            }
            RecordPhase::Inert => {
                // Converges a grant left behind by an interrupted pass.
                self.deprovision(username).await?;
                Ok(Action::AwaitChange)
            }
            RecordPhase::Pending => self.provision(record, now).await,
            RecordPhase::Provisioned => match valid_until {
                _ if unobserved => self.provision(record, now).await,
                Some(until) if now >= until => {
                    self.deprovision(username).await?;
                    tracing::info!(username = %username, valid_until = %until, "Access expired");
                    self.retire(record).await
                }
                Some(until) => self.ensure(record, until, now).await,
                None => self.provision(record, now).await,
            },
        }
    }

    /// Provisions the current spec and records it as observed.
    async fn provision(
        &self,
        mut record: SignInRecord,
        now: DateTime<Utc>,
    ) -> Result<Action, ReconcileError> {
        let role = record.spec.role.clone();
        let fresh = now
            .checked_add_signed(
                chrono::Duration::from_std(record.spec.validity_period)
                    .unwrap_or(chrono::Duration::MAX),
            )
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let renewal = record.status.provisioned
            && record.status.provisioned_role.as_deref() == Some(role.as_str());
        // A renewal never shortens an active grant.
        let valid_until = match (renewal, record.status.valid_until) {
            (true, Some(current)) => current.max(fresh),
            _ => fresh,
        };

        self.provisioner
            .provision(&record.username, &role, valid_until)
            .await
            .map_err(ReconcileError::Provisioning)?;

        record.status.provisioned = true;
        record.status.valid_until = Some(valid_until);
        record.status.provisioned_role = Some(role.clone());
        record.status.observed_generation = record.spec.generation;
        record.status.last_error = None;
        record.status.failed_attempts = 0;

        let record = self
            .store
            .update(record)
            .await
            .map_err(ReconcileError::from_write)?;

        tracing::info!(
            username = %record.username,
            role = %role,
            renewal = renewal,
            valid_until = %valid_until,
            generation = record.status.observed_generation,
            "Sign-in provisioned"
        );

        Ok(Action::RequeueAfter(until_expiry(valid_until, now)))
    }

    /// Re-asserts an active grant and schedules its expiry.
    async fn ensure(
        &self,
        mut record: SignInRecord,
        until: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Action, ReconcileError> {
        let role = record
            .status
            .provisioned_role
            .clone()
            .unwrap_or_else(|| record.spec.role.clone());

        let outcome = self
            .provisioner
            .provision(&record.username, &role, until)
            .await
            .map_err(ReconcileError::Provisioning)?;
        if !outcome.is_noop() {
            tracing::warn!(username = %record.username, "Repaired drifted access grant");
        }

        if record.status.last_error.is_some() {
            record.status.last_error = None;
            record.status.failed_attempts = 0;
            self.store
                .update(record)
                .await
                .map_err(ReconcileError::from_write)?;
        }

        Ok(Action::RequeueAfter(until_expiry(until, now)))
    }

    /// Applies the retention policy to a revoked record.
    async fn retire(&self, mut record: SignInRecord) -> Result<Action, ReconcileError> {
        match self.retention {
            RetentionPolicy::Delete => {
                self.store
                    .delete(&record.username, Some(record.resource_version))
                    .await
                    .map_err(ReconcileError::from_write)?;
                tracing::debug!(username = %record.username, "Sign-in record deleted");
            }
            RetentionPolicy::Retain => {
                record.status.provisioned = false;
                record.status.provisioned_role = None;
                record.status.observed_generation = record.spec.generation;
                record.status.last_error = None;
                record.status.failed_attempts = 0;
                self.store
                    .update(record)
                    .await
                    .map_err(ReconcileError::from_write)?;
            }
        }
        Ok(Action::AwaitChange)
    }

    async fn deprovision(&self, username: &str) -> Result<bool, ReconcileError> {
        self.provisioner
            .deprovision(username)
            .await
            .map_err(ReconcileError::Provisioning)
    }

    /// Writes a persistent failure onto the record so `status` can report it.
    pub async fn surface_failure(
        &self,
        username: &str,
        attempts: u32,
        error: &ReconcileError,
    ) -> AppResult<()> {
        let Some(mut record) = self.store.get(username).await? else {
            return Ok(());
        };

        let message = error.to_string();
        if record.status.last_error.as_deref() == Some(message.as_str()) {
            return Ok(());
        }

        record.status.last_error = Some(message);
        record.status.failed_attempts = attempts;
        match self.store.update(record).await {
            Ok(_) => Ok(()),
            // Superseded by a newer write; the next pass sees it.
            Err(e) if e.is(ErrorKind::Conflict) || e.is(ErrorKind::NotFound) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

fn until_expiry(valid_until: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (valid_until - now).to_std().unwrap_or(Duration::ZERO)
}
