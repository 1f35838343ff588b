//! The discovery beacon: a background worker that broadcasts this
//! process's advertisements over UDP, listens for peers doing the same,
//! and answers control RPCs from [`crate::lifecycle`] over a local `zmq`
//! replier.

pub mod control;
pub mod tables;
pub mod worker;

pub use tables::Tables;
pub use worker::BeaconHandle;
