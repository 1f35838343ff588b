//! Zero-configuration LAN peer discovery and messaging.
//!
//! Processes on the same network segment find each other by *name* instead
//! of by address: one process `advertise`s a name/port pair, another
//! `discover`s it, and from then on they exchange messages with the five
//! primitives below. A background beacon thread handles the broadcasting
//! and bookkeeping; callers never touch a socket directly.
//!
//! # Discovery
//!
//! ```no_run
//! use lanmesh::{advertise, discover};
//!
//! advertise("weather-station", 9001).unwrap();
//!
//! // On another machine on the same LAN:
//! let address = discover("weather-station", 5.0).unwrap();
//! ```
//!
//! # Request/reply
//!
//! ```no_run
//! use lanmesh::{send_message_to, wait_for_message_from, send_reply_to, Payload};
//! use serde_json::json;
//!
//! // Server:
//! let request = wait_for_message_from("0.0.0.0:9002", None, false).unwrap().unwrap();
//! send_reply_to("0.0.0.0:9002", Payload::from_value(json!("ack"))).unwrap();
//!
//! // Client:
//! let reply = send_message_to("10.0.0.5:9002", Payload::from_value(json!("ping")), None).unwrap();
//! ```
//!
//! # Publish/subscribe
//!
//! ```no_run
//! use lanmesh::{send_notification_to, wait_for_notification_from, Payload};
//! use serde_json::json;
//!
//! send_notification_to("0.0.0.0:9003", "weather", Payload::from_value(json!("sunny"))).unwrap();
//! let (topic, payload) = wait_for_notification_from("10.0.0.5:9003", "weather", None).unwrap();
//! ```
//!
//! # Concurrency model
//!
//! The beacon runs on a plain OS thread, not an async executor: every
//! public function here blocks the calling thread for the duration of its
//! network call, matching how the underlying `zmq` sockets are used
//! throughout this crate.

pub mod address;
pub mod beacon;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod primitives;
pub mod transport;
pub mod wire;

pub use address::{local_address, split_address, Address, AddressArg, Endpoint};
pub use error::{Error, Result};
pub use lifecycle::{advertise, discover, unadvertise};
pub use primitives::{
    send_message_to, send_notification_to, send_reply_to, wait_for_message_from,
    wait_for_notification_from,
};
pub use wire::{Payload, Value};
