//! Repository layer: statement execution, unit of work and repositories.
//!
//! # Responsibility
//! - Execute compiled statements and decode rows.
//! - Scope work in a transaction with an identity map and auto flush.
//! - Offer generic and member-specific repository APIs.
//!
//! # Invariants
//! - Repository writes call `Entity::validate()` before SQL mutations.
//! - Repository APIs return semantic errors (`NotFound`, `StaleAccess`,
//!   `NonUniqueResult`) in addition to storage errors.

pub mod bulk;
pub mod executor;
pub mod member_repo;
pub mod member_spec;
pub mod pagination;
pub mod projection;
pub mod repository;
pub mod session;
