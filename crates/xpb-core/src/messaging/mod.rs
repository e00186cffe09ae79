//! Outbound message delivery (Telegram today).

pub mod port;
pub mod throttled;

pub use port::MessagingPort;
pub use throttled::{ThrottleConfig, ThrottledMessenger};
