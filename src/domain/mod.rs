//! Domain model: entities, value objects and the events they emit.

pub mod aggregates;
pub mod events;
pub mod value_objects;
