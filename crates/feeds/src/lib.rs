//! Gas price feed collection from the gasz service.
//!
//! - `websocket` - Push client: subscription handshake, heartbeat, reconnects
//! - `rest` - Pull client for one-off readings and the startup seed
//! - `message` - Wire types and the `FeedMessage` channel type

pub mod config;
pub mod error;
pub mod message;
pub mod rest;
pub mod websocket;

pub use config::*;
pub use error::*;
pub use message::*;
pub use rest::*;
pub use websocket::*;
