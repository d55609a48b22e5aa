//! Repositories wrapping database access.

pub mod vote;

pub use vote::{InsertOutcome, VoteRepository};
