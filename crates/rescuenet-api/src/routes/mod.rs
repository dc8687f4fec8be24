//! Route modules.

pub mod assignments;
pub mod health;
pub mod requests;
