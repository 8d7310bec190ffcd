//! Transport module - listening sockets.
//!
//! - TCP (`tcp://host:port`)
//! - Unix Domain Sockets (`unix://path`, Unix only)

mod listener;

pub use listener::{Connection, ListenAddr, Listener};
