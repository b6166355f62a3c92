//! Types stored in the visitor's cookie session.

pub mod session;

pub use session::keys as session_keys;
