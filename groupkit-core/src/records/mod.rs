//! Typed records kept in group storage.
//!
//! Thin helpers over [`Storage`](crate::storage::Storage) for the values the
//! SDK persists. Each helper owns one or two registry keys.

mod device;
mod session;
mod tokens;

pub use device::DeviceIdentity;
pub use session::{SessionState, SessionTracker, MIN_SESSION_TIMEOUT_MS};
pub use tokens::{TokenCache, MAX_TOKEN_HISTORY};
