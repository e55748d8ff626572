//! Socket lifecycle for the plugin endpoint.
//!
//! The plugin serves gRPC on a unix socket inside the node agent's plugin
//! directory. Stale sockets left by a previous run are cleared on start and
//! the socket file is removed again on stop.

mod endpoint;
mod errors;
mod uds;

pub use self::endpoint::PluginEndpoint;
pub use self::errors::{DialError, ListenerError};
pub use self::uds::connect_unix;

const TRANSPORT_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::transport");
