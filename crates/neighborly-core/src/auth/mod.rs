//! Session persistence for the signed-in user.
//!
//! Obtaining a token is the host's job; this module only remembers it.
//! `Session` is persisted to disk and tokens expire after 12 hours.

pub mod session;

pub use session::{Session, SessionData};
