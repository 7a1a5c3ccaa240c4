//! Focus-timer synchronization core: durable countdown sessions that
//! pause/resume, survive reconnects, auto-complete at expiry, and drive
//! productivity scoring.

pub mod core;
pub mod types;

pub use self::core::TimerCore;
pub use types::{FocusSession, SessionState, SessionType, TimerTemplate};
