//! Database entity definitions.
//!
//! Entities are direct mappings to database rows. Versioned rows expose
//! their `version` column to the domain as an opaque concurrency token.

pub mod account;
pub mod client;
pub mod content;
pub mod job;
pub mod tracked_change;

pub use account::{
    ApplicationRoleEntity, ApplicationUserEntity, ApplicationUserRoleEntity,
    ExternalCredentialEntity, PasswordResetEntity,
};
pub use client::{state_ordinal, ClientEntity, ClientStatsEntity, ProjectEntity};
pub use content::ContentBlockEntity;
pub use job::{JobEntity, JobItemEntity};
pub use tracked_change::TrackedChangeEntity;
