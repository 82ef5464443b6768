//! Data models for catalog entities and their relationships

pub mod date;
pub mod entity;
pub mod relationship;

pub use date::PartialDate;
pub use entity::{entity_type, Entity};
pub use relationship::{filter_by_target_type, has_target_type, Relationship};
