//! Domain models.

pub mod account;
pub mod client;
pub mod content;
pub mod entity;
pub mod job;
pub mod project;
pub mod tracked_change;

pub use account::{
    normalize_name, roles, ApplicationRole, ApplicationUser, ApplicationUserRole,
    ExternalCredential, NewUser, PasswordReset,
};
pub use client::{Client, ClientStats};
pub use content::{AllowedToken, ContentBlock, ContentData};
pub use entity::{
    ChangeTracked, Entity, EntitySchema, FieldDef, FieldKind, LinkedItem, NoLink,
};
pub use job::{Job, JobItem};
pub use project::{Project, ProjectState};
pub use tracked_change::TrackedChange;
