//! Credential models for the identity -> user -> service chain.

pub mod credential;
pub mod secret;

pub use credential::*;
pub use secret::*;
