//! Domain model: Member/Team/Item entities and their table mappings.
//!
//! # Responsibility
//! - Define record-like entities and their relations.
//! - Describe each entity's table through static [`entity::EntityMeta`].
//!
//! # Invariants
//! - Entities carry no behavior beyond field validity and row mapping.
//! - Relations are explicit [`reference::Ref`] values, never proxies.

pub mod audit;
pub mod entity;
pub mod item;
pub mod member;
pub mod reference;
pub mod team;
