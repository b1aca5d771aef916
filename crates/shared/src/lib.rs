//! Shared utilities for the entity manager backend.
//!
//! This crate provides functionality used across the other crates:
//! - Password hashing with Argon2id
//! - Access token signing and validation
//! - Opaque optimistic-concurrency tokens
//! - One-time secrets and their digests

pub mod concurrency;
pub mod crypto;
pub mod jwt;
pub mod password;
