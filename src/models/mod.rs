//! Domain models for the token checker

pub mod token;

pub use token::{CheckOutcome, DueToken, TokenKey};
