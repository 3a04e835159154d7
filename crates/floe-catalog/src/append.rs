//! Version-checked appends with bounded conflict retry.
//!
//! An append moves through an explicit state machine:
//!
//! ```text
//! Validating -> Encoding -> Committing(1) -> Committed
//!                              |    ^
//!                   conflict   v    | reload ok
//!                           Retrying(n)
//!
//! any state -> Failed
//! ```
//!
//! Validation and encoding happen once, before any network call. Each commit
//! is conditional on the version the handle last observed; on a version
//! conflict the executor backs off, reloads the table, re-checks schema
//! compatibility and tries again, up to the policy's attempt limit. The same
//! encoded batch (and batch id) is reused across attempts, and at most one
//! attempt can be accepted.

use std::fmt;
use std::sync::Arc;

use floe_core::TableIdent;

use crate::config::RetryPolicy;
use crate::encoder::{EncodedBatch, RecordEncoder};
use crate::error::{CatalogError, Result};
use crate::provisioner::{load_table, TableHandle};
use crate::record::RecordBatch;
use crate::session::CatalogSession;
use crate::transport::{CommitOutcome, TableVersion};

/// States of a single append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendState {
    /// Checking the batch against the table schema.
    Validating,
    /// Encoding the batch into a data file.
    Encoding,
    /// Sending a conditional commit.
    Committing {
        /// 1-based attempt number.
        attempt: u32,
    },
    /// Backing off and reloading after a conflict.
    Retrying {
        /// The attempt that conflicted.
        attempt: u32,
    },
    /// The batch is part of the table.
    Committed,
    /// The append stopped without committing.
    Failed,
}

impl AppendState {
    /// Returns true if `next` is a legal successor of this state.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Committed | Self::Failed, _) => false,
            (_, Self::Failed)
            | (Self::Validating, Self::Encoding)
            | (Self::Encoding, Self::Committing { attempt: 1 })
            | (Self::Committing { .. }, Self::Committed) => true,
            (Self::Committing { attempt: a }, Self::Retrying { attempt: b }) => a == b,
            (Self::Retrying { attempt: a }, Self::Committing { attempt: b }) => b == a + 1,
            _ => false,
        }
    }

    /// Returns true for `Committed` and `Failed`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Failed)
    }
}

impl fmt::Display for AppendState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validating => f.write_str("validating"),
            Self::Encoding => f.write_str("encoding"),
            Self::Committing { attempt } => write!(f, "committing (attempt {attempt})"),
            Self::Retrying { attempt } => write!(f, "retrying after attempt {attempt}"),
            Self::Committed => f.write_str("committed"),
            Self::Failed => f.write_str("failed"),
        }
    }
}

/// Outcome of a successful append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitResult {
    /// Table identifier.
    pub table: TableIdent,
    /// Version the batch was committed on top of.
    pub previous_version: TableVersion,
    /// The new committed version.
    pub version: TableVersion,
    /// Records added by this append.
    pub rows_committed: u64,
    /// Total records after the commit.
    pub total_records: u64,
    /// Commit attempts used, including the successful one.
    pub attempts: u32,
}

/// Appends batches to provisioned tables.
#[derive(Clone)]
pub struct AppendExecutor {
    session: CatalogSession,
    encoder: Arc<dyn RecordEncoder>,
    policy: RetryPolicy,
}

impl fmt::Debug for AppendExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppendExecutor")
            .field("warehouse", &self.session.warehouse())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

struct Tracker<'a> {
    table: &'a TableIdent,
    state: AppendState,
}

impl Tracker<'_> {
    fn enter(&mut self, next: AppendState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal append transition {} -> {next}",
            self.state
        );
        tracing::debug!(table = %self.table, from = %self.state, to = %next, "append state");
        self.state = next;
    }
}

impl AppendExecutor {
    /// Creates an executor using the session's retry policy.
    #[must_use]
    pub fn new(session: CatalogSession, encoder: Arc<dyn RecordEncoder>) -> Self {
        let policy = session.config().retry;
        Self {
            session,
            encoder,
            policy,
        }
    }

    /// Overrides the retry policy.
    #[must_use]
    pub const fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Returns the retry policy in effect.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Appends `batch` to the table as one atomic commit.
    ///
    /// On success the handle is advanced to the new version. On failure the
    /// table is unchanged by this call.
    ///
    /// # Errors
    ///
    /// - [`CatalogError::Validation`] if the batch does not match the schema
    /// - [`CatalogError::Encoding`] if the batch cannot be encoded
    /// - [`CatalogError::CommitConflict`] if every attempt lost the race
    /// - [`CatalogError::SchemaMismatch`] if a reload finds the schema changed
    /// - [`CatalogError::Load`] if a reload finds the table gone or replaced
    /// - [`CatalogError::Transport`] if a round trip fails or times out
    #[tracing::instrument(
        skip(self, handle, batch),
        fields(table = %handle.ident(), rows = batch.len(), max_attempts = self.policy.max_attempts)
    )]
    pub async fn append(&self, handle: &mut TableHandle, batch: &RecordBatch) -> Result<CommitResult> {
        let table = handle.ident().clone();
        let mut tracker = Tracker {
            table: &table,
            state: AppendState::Validating,
        };

        let result = self.run(handle, batch, &mut tracker).await;
        match &result {
            Ok(commit) => tracing::info!(
                version = %commit.version,
                previous = %commit.previous_version,
                rows = commit.rows_committed,
                total_records = commit.total_records,
                attempts = commit.attempts,
                "append committed"
            ),
            Err(e) => {
                tracker.enter(AppendState::Failed);
                tracing::warn!(error = %e, kind = %e.kind(), remedy = %e.remedy(), "append failed");
            }
        }
        result
    }

    async fn run(
        &self,
        handle: &mut TableHandle,
        batch: &RecordBatch,
        tracker: &mut Tracker<'_>,
    ) -> Result<CommitResult> {
        batch.validate(handle.schema())?;

        tracker.enter(AppendState::Encoding);
        let encoded = self.encoder.encode(batch, handle.schema())?;

        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 1;
        tracker.enter(AppendState::Committing { attempt });

        loop {
            let expected = handle.version();
            match self.commit_once(handle, expected, &encoded).await? {
                CommitOutcome::Accepted {
                    version,
                    total_records,
                    sequence_number,
                    manifest_list,
                } => {
                    handle.advance(version, total_records, sequence_number, manifest_list);
                    tracker.enter(AppendState::Committed);
                    return Ok(CommitResult {
                        table: handle.ident().clone(),
                        previous_version: expected,
                        version,
                        rows_committed: encoded.record_count(),
                        total_records,
                        attempts: attempt,
                    });
                }
                CommitOutcome::VersionConflict { message } => {
                    tracing::info!(attempt, %expected, %message, "commit lost version race");
                    if attempt >= max_attempts {
                        return Err(CatalogError::CommitConflict {
                            table: handle.ident().to_string(),
                            attempts: attempt,
                        });
                    }

                    tracker.enter(AppendState::Retrying { attempt });
                    let delay = self.policy.delay_after(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    let remote = load_table(&self.session, handle.ident()).await?;
                    handle.refresh(remote)?;

                    attempt += 1;
                    tracker.enter(AppendState::Committing { attempt });
                }
            }
        }
    }

    async fn commit_once(
        &self,
        handle: &TableHandle,
        expected: TableVersion,
        encoded: &EncodedBatch,
    ) -> Result<CommitOutcome> {
        let remote = handle.remote();
        self.session
            .round_trip("commit_append", |t| async move {
                t.commit_append(remote, expected, encoded).await
            })
            .await?
            .map_err(|e| CatalogError::transport("commit_append", e))
    }
}
