//! tcpserve
//!
//! A minimal TCP connection-acceptance runtime: it owns the listening socket,
//! hands every accepted connection to an application-supplied [`Handler`],
//! tracks the live connection count, and drains in-flight connections to
//! completion on shutdown.
//!
//! The runtime implements no application protocol of its own; plug in a
//! [`Handler`] (see [`EchoHandler`] for a reference implementation) and call
//! [`Server::serve_with_signal`].

pub mod config;
pub mod counter;
pub mod echo;
pub mod handler;
pub mod server;
pub mod shutdown;

pub use config::Config;
pub use counter::ClientCounter;
pub use echo::EchoHandler;
pub use handler::Handler;
pub use server::Server;
pub use shutdown::CancelToken;

/// Common error type for the runtime
pub type Result<T> = anyhow::Result<T>;
