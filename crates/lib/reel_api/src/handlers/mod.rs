//! Request handlers.

pub mod api_keys;
pub mod auth;
pub mod invites;
pub mod me;
pub mod members;
