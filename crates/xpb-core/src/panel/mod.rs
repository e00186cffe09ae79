//! x-ui panel access: session handling, wire schema and typed operations.

pub mod client;
pub mod session;
pub mod status;
pub mod transport;
pub mod wire;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{PanelAccount, PanelClient};
pub use session::{Credentials, SessionManager};
pub use status::{AccountStatus, RemainingTime};
pub use transport::{HttpTransport, Method, PanelRequest, PanelResponse, PanelTransport};
