//! Persistence ports.
//!
//! The services only talk to storage through these traits. A
//! [`DataContext`] hands out one [`EntityStore`] per entity type plus the
//! identity directory and the clock, much like a unit of work exposing its
//! entity sets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};

use crate::error::{ServiceError, StoreError};
use crate::models::{
    ApplicationRole, ApplicationUser, ApplicationUserRole, Client, ClientStats, ContentBlock,
    Entity, ExternalCredential, Job, JobItem, NewUser, PasswordReset, Project, TrackedChange,
};
use crate::query::EntityQuery;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
}

/// A staged change to a linked child row.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkOp<L> {
    Insert(L),
    Delete(i64),
}

/// Everything a single write persists, atomically.
#[derive(Debug, Clone)]
pub struct ChangeSet<E: Entity> {
    pub entity: E,
    pub kind: ChangeKind,
    /// Audit row; its `entity_id` is filled in by the store.
    pub tracked_change: Option<TrackedChange>,
    pub links: Vec<LinkOp<E::Link>>,
}

impl<E: Entity> ChangeSet<E> {
    pub fn new(entity: E, kind: ChangeKind) -> Self {
        Self {
            entity,
            kind,
            tracked_change: None,
            links: Vec::new(),
        }
    }
}

/// Storage for one entity type.
#[async_trait]
pub trait EntityStore<E: Entity>: Send + Sync {
    /// Rows matching the query, sorted and paged, with includes attached.
    async fn fetch(&self, query: &EntityQuery) -> Result<Vec<E>, StoreError>;

    /// Number of rows matching the query's predicate, counting at most `cap`.
    async fn count(&self, query: &EntityQuery, cap: Option<i64>) -> Result<i64, StoreError>;

    /// Persists a change set in one transaction and returns the stored entity
    /// with its new concurrency token.
    ///
    /// Updates of versioned entities must carry the token they were read
    /// with; a stale or missing token yields [`StoreError::Conflict`].
    async fn commit(&self, changes: ChangeSet<E>) -> Result<E, StoreError>;

    /// Flags the row as deleted when `soft`, otherwise removes it together
    /// with its dependent rows.
    async fn delete(&self, id: i64, soft: bool) -> Result<(), StoreError>;
}

/// Identity lookups used by role resolution and the account service.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn find_user(&self, id: i64) -> Result<Option<ApplicationUser>, StoreError>;

    async fn find_by_user_name(
        &self,
        normalized_user_name: &str,
    ) -> Result<Option<ApplicationUser>, StoreError>;

    async fn find_by_email(
        &self,
        normalized_email: &str,
    ) -> Result<Option<ApplicationUser>, StoreError>;

    /// Names of the roles the user is a member of.
    async fn roles_of(&self, user_id: i64) -> Result<Vec<String>, StoreError>;

    async fn user_roles(&self, user_id: i64) -> Result<Vec<ApplicationUserRole>, StoreError>;

    async fn find_external_credential(
        &self,
        provider: &str,
        external_id: &str,
    ) -> Result<Option<ExternalCredential>, StoreError>;

    async fn external_credentials(
        &self,
        user_id: i64,
    ) -> Result<Vec<ExternalCredential>, StoreError>;

    /// Creates a user, optionally linked to an external credential.
    async fn create_user(
        &self,
        user: NewUser,
        credential: Option<ExternalCredential>,
    ) -> Result<ApplicationUser, StoreError>;

    /// Replaces the password hash and discards any outstanding reset.
    async fn set_password_hash(&self, user_id: i64, password_hash: &str)
        -> Result<(), StoreError>;

    /// Stores a reset for the user, replacing any earlier one.
    async fn set_password_reset(
        &self,
        user_id: i64,
        reset: &PasswordReset,
    ) -> Result<(), StoreError>;

    async fn password_reset(&self, user_id: i64) -> Result<Option<PasswordReset>, StoreError>;

    async fn clear_password_reset(&self, user_id: i64) -> Result<(), StoreError>;
}

/// An outgoing e-mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailMessage {
    pub to_name: String,
    pub to_email: String,
    pub subject: String,
    pub body: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: MailMessage) -> Result<(), ServiceError>;
}

/// Writes outgoing mail to the log instead of delivering it. The body is
/// left out since it may carry one-time secrets.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, message: MailMessage) -> Result<(), ServiceError> {
        tracing::info!(
            to = %message.to_email,
            subject = %message.subject,
            "Mail not delivered: no transport configured"
        );
        Ok(())
    }
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct FixedClock(Mutex<DateTime<Utc>>);

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self(Mutex::new(at))
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut now) = self.0.lock() {
            *now = at;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.0.lock() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Request-scoped access to every store.
#[async_trait]
pub trait DataContext: Send + Sync {
    fn application_users(&self) -> Arc<dyn EntityStore<ApplicationUser>>;
    fn application_roles(&self) -> Arc<dyn EntityStore<ApplicationRole>>;
    fn clients(&self) -> Arc<dyn EntityStore<Client>>;
    fn projects(&self) -> Arc<dyn EntityStore<Project>>;
    fn client_stats(&self) -> Arc<dyn EntityStore<ClientStats>>;
    fn content_blocks(&self) -> Arc<dyn EntityStore<ContentBlock>>;
    fn jobs(&self) -> Arc<dyn EntityStore<Job>>;
    fn job_items(&self) -> Arc<dyn EntityStore<JobItem>>;

    fn users(&self) -> Arc<dyn UserDirectory>;
    fn clock(&self) -> Arc<dyn Clock>;

    /// Verifies the backing storage is reachable.
    async fn health(&self) -> Result<(), StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock_moves_only_when_set() {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);

        let later = Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap();
        clock.set(later);
        assert_eq!(clock.now(), later);
    }
}
