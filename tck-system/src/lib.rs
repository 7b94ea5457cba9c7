//! TCK System: the harness that drives a dataspace connector through the
//! negotiation and transfer protocols and judges its behaviour.
//!
//! # Module Map
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | [`config::TckConfig`] from properties or environment |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`manager`] | Entity registries, protocol-event handlers, listeners |
//! | [`connector`] | One party's four managers |
//! | [`endpoint`] | Path-pattern keyed inbound dispatch |
//! | [`transport`] | Blocking HTTP and loopback transports |
//! | [`server`] | `axum` front for an endpoint |
//! | [`service`] | Reference connector answering every protocol path |
//! | [`client`] | Local and networked dispatch clients |
//! | [`pipeline`] | Stage engine and the four protocol pipelines |
//! | [`mock`] | Scripted counter-party reactions |
//! | [`actions`] | The reference connector's counter-party actions |
//! | [`runtime`] | [`runtime::TckRuntime`], built once per run |
//!
//! # Threads
//!
//! The test thread builds and executes pipelines and does all blocking
//! waits. Endpoint handlers run on server threads (or on the sender's
//! thread through the loopback transport). Mock actions run on the
//! runtime's bounded blocking pool.

pub mod actions;
pub mod client;
pub mod config;
pub mod connector;
pub mod endpoint;
pub mod logging;
pub mod manager;
pub mod mock;
pub mod pipeline;
pub mod runtime;
pub mod server;
pub mod service;
pub mod transport;

pub use config::TckConfig;
pub use connector::Connector;
pub use runtime::TckRuntime;
