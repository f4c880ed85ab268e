//! Access broker: team login, session tokens and gated page reads.

pub mod broker;
pub mod gate;
pub mod identity;
pub mod password;
pub mod routes;
pub mod teams;

pub use broker::{Broker, BrokerError};
pub use identity::{IdentityProvider, Rs256TokenIssuer};
pub use routes::{router, AppState};
