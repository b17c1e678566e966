//! Domain layer for rws-gateway.
//!
//! Pure session types: the events the bridge loop reacts to, its lifecycle,
//! the outcome it reports, and the per-request parameters resolved from the
//! endpoint and query string.
//!
//! Nothing here touches sockets, the runtime or the broker.

pub mod params;
pub mod session;

pub use params::SessionParams;
pub use session::{
    BridgeOutcome, FailureKind, SessionEvent, SessionId, SessionLifecycle, SessionState,
};
