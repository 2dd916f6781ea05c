//! Entity records and the per-run entity store

pub mod entity;
pub mod store;
pub mod tags;

pub use entity::{AttributeGroup, Entity, EntityOptions};
pub use store::{DataError, EntityStore};
pub use tags::TagUniverse;
