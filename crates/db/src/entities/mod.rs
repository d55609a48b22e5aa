//! Database entities.

pub mod vote;

pub use vote::{Choice, Entity as Vote};
