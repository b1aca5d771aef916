//! HTTP route handlers.

pub mod account;
pub mod content;
pub mod entities;
pub mod health;
pub mod patch;
