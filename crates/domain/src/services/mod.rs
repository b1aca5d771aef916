//! Domain services.
//!
//! The generic services are layered: [`ListService`] applies read security,
//! filters, sorting, includes and paging; [`ReadService`] narrows it to one
//! item; [`WriteService`] orchestrates creates, updates and deletes around
//! entity-specific [`WriteHooks`]. [`ChangeTracking`] decorates the hooks of
//! audited entities.

pub mod access;
pub mod account;
pub mod change_tracking;
pub mod content;
pub mod hooks;
pub mod linked;
pub mod list;
pub mod managed;
pub mod password_reset;
pub mod read;
pub mod write;

pub use access::{AccessPolicy, Caller, Principal, ReadScope, RolePolicy, RoleRule};
pub use account::{AccountService, LoginResult, Registration};
pub use change_tracking::ChangeTracking;
pub use content::ContentService;
pub use list::ListService;
pub use managed::ManagedEntity;
pub use password_reset::{PasswordResetService, PasswordResetSettings};
pub use read::ReadService;
pub use write::{NoHooks, WriteContext, WriteHooks, WriteService};
