//! Domain layer: the emergency request aggregate and its vocabulary.

pub mod aggregates;
pub mod classifier;
pub mod commands;
pub mod events;
