//! RescueNet Dispatch bounded context.
//!
//! Matches emergency requests to the nearest available ambulances, fire
//! trucks and police officers, and tracks every assignment until the request
//! is complete.

pub mod application;
pub mod config;
pub mod domain;
