//! RescueNet Core: shared domain abstractions.
//!
//! This crate defines the traits and records the dispatch context depends
//! on: the event-sourcing primitives, and the ports through which the engine
//! reaches its collaborators (fleet/proximity store, identity directory,
//! booking log). It contains no infrastructure code.

pub mod aggregate;
pub mod booking_log;
pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod fleet;
pub mod geo;
pub mod identity;
pub mod repository;
