//! The five public messaging primitives: two request/reply pairs and one
//! publish/subscribe pair.
//!
//! The requester `send_message_to` uses is scoped to that one call and
//! dropped at the end of it, matching the strict send-then-recv discipline
//! of a `zmq::REQ` socket: caching it across calls would leave it stuck
//! mid-exchange after any timeout. The replier, publisher, and subscriber
//! roles *do* persist between calls, each behind a socket cache keyed by
//! address, so repeated calls to the same address reuse one connection.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;

use crate::address::Address;
use crate::error::{Error, Result};
use crate::transport::{Publisher, Replier, Requester, Subscriber};
use crate::wire::{self, Payload};

struct SocketCache<T> {
    sockets: Mutex<HashMap<String, Arc<Mutex<T>>>>,
}

impl<T> SocketCache<T> {
    fn new() -> Self {
        Self {
            sockets: Mutex::new(HashMap::new()),
        }
    }

    fn get_or_connect(&self, key: &str, connect: impl FnOnce() -> Result<T>) -> Result<Arc<Mutex<T>>> {
        let mut sockets = self.sockets.lock();
        if let Some(existing) = sockets.get(key) {
            return Ok(Arc::clone(existing));
        }
        let socket = Arc::new(Mutex::new(connect()?));
        sockets.insert(key.to_string(), Arc::clone(&socket));
        Ok(socket)
    }
}

static REPLIERS: OnceLock<SocketCache<Replier>> = OnceLock::new();
static PUBLISHERS: OnceLock<SocketCache<Publisher>> = OnceLock::new();
static SUBSCRIBERS: OnceLock<SocketCache<Subscriber>> = OnceLock::new();

fn repliers() -> &'static SocketCache<Replier> {
    REPLIERS.get_or_init(SocketCache::new)
}

fn publishers() -> &'static SocketCache<Publisher> {
    PUBLISHERS.get_or_init(SocketCache::new)
}

fn subscribers() -> &'static SocketCache<Subscriber> {
    SUBSCRIBERS.get_or_init(SocketCache::new)
}

/// The three socket roles whose sockets persist between calls. One address
/// may only ever be claimed for one of these at a time: binding a publisher
/// and a replier on the same address, for instance, is an `invalid-address`
/// error rather than two sockets silently sharing a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Replier,
    Publisher,
    Subscriber,
}

static ADDRESS_ROLES: OnceLock<Mutex<HashMap<String, Role>>> = OnceLock::new();

fn address_roles() -> &'static Mutex<HashMap<String, Role>> {
    ADDRESS_ROLES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Claim `address` for `role`. Claiming the same address for the same role
/// repeatedly is fine (that's what makes the socket caches reusable); a
/// second, different role on an address already claimed fails.
fn claim_role(address: &str, role: Role) -> Result<()> {
    let mut roles = address_roles().lock();
    match roles.get(address) {
        Some(existing) if *existing != role => Err(Error::InvalidAddress(format!(
            "{address} is already in use as a different role"
        ))),
        _ => {
            roles.insert(address.to_string(), role);
            Ok(())
        }
    }
}

fn timed_out(wait_for_s: Option<f64>) -> Error {
    Error::SocketTimedOut {
        wait_for_s: wait_for_s.unwrap_or(f64::INFINITY),
    }
}

/// `None` (wait forever) maps to no poll deadline; `Some(secs)` to a bounded
/// one, including zero for a non-blocking check.
fn to_duration(wait_for_s: Option<f64>) -> Option<Duration> {
    wait_for_s.map(Duration::from_secs_f64)
}

/// Connect to `address`, send `message`, and block up to `wait_for_reply_s`
/// seconds (or forever, if `None`) for the reply.
///
/// `address` must be a single address: passing a sequence of addresses
/// fails with [`Error::InvalidAddress`], since broadcasting a request is
/// explicitly disallowed. Pairs with [`wait_for_message_from`] /
/// [`send_reply_to`] on the peer.
///
/// The requester is scoped to this call: it connects, does its one
/// send/recv exchange, and is dropped before this function returns. A
/// `zmq::REQ` socket must strictly alternate send and recv, so caching it
/// across calls would leave it stuck mid-exchange after any timeout.
pub fn send_message_to(
    address: impl Into<Address>,
    message: Payload,
    wait_for_reply_s: Option<f64>,
) -> Result<Payload> {
    let address = address.into();
    let address = address.one()?;
    let requester = Requester::connect(address)?;
    requester.send(&wire::encode_payload(&message)?)?;
    match requester.recv_timeout(to_duration(wait_for_reply_s))? {
        Some(bytes) => wire::decode_payload(&bytes),
        None => Err(timed_out(wait_for_reply_s)),
    }
}

/// Bind `address` (if not already bound) and block up to `wait_for_s`
/// seconds (or forever, if `None`) for the next incoming message. Returns
/// `Ok(None)` on timeout.
///
/// If `autoreply` is true, immediately replies with [`Payload::Empty`]
/// before returning; otherwise the caller must follow up with
/// [`send_reply_to`] on the same address, reusing the bound socket.
pub fn wait_for_message_from(
    address: &str,
    wait_for_s: Option<f64>,
    autoreply: bool,
) -> Result<Option<Payload>> {
    claim_role(address, Role::Replier)?;
    let replier = repliers().get_or_connect(address, || Replier::bind(address))?;
    let replier = replier.lock();
    let message = match replier.recv_timeout(to_duration(wait_for_s))? {
        Some(bytes) => wire::decode_payload(&bytes)?,
        None => return Ok(None),
    };
    if autoreply {
        replier.send(&wire::encode_payload(&Payload::Empty)?)?;
    }
    Ok(Some(message))
}

/// Send the reply to whatever request [`wait_for_message_from`] most
/// recently received on `address`. Pairing is keyed by address: the replier
/// bound by that call is reused here.
pub fn send_reply_to(address: &str, reply: Payload) -> Result<()> {
    claim_role(address, Role::Replier)?;
    let replier = repliers().get_or_connect(address, || Replier::bind(address))?;
    let replier = replier.lock();
    replier.send(&wire::encode_payload(&reply)?)
}

/// Publish `data` under `topic` at `address`, binding the publisher on
/// first use. Subscribers that haven't connected yet simply miss it: this
/// is fire-and-forget, matching plain `zmq` PUB/SUB semantics.
///
/// Because a subscriber drops every message sent before its connection
/// handshake completes, a publisher that wants delivery certainty should
/// repeatedly call this with `data = Payload::Empty` until the application
/// observes (out of band) that a subscriber is listening, then send the
/// real payload once.
pub fn send_notification_to(address: &str, topic: &str, data: Payload) -> Result<()> {
    claim_role(address, Role::Publisher)?;
    let publisher = publishers().get_or_connect(address, || Publisher::bind(address))?;
    let publisher = publisher.lock();
    let (topic_bytes, data_bytes) = wire::encode_topic(topic, &data)?;
    publisher.send_multipart(&topic_bytes, &data_bytes)
}

/// Connect to `address` (a single address or a sequence of them, if not
/// already connected), subscribe to `topic`, and block up to `wait_for_s`
/// seconds (or forever, if `None`) for the next matching notification
/// across every connected endpoint.
///
/// Returns `(None, None)` on timeout. A subscriber that wants to skip
/// handshake pings should loop until the returned payload is not
/// [`Payload::Empty`].
pub fn wait_for_notification_from(
    address: impl Into<Address>,
    topic: &str,
    wait_for_s: Option<f64>,
) -> Result<(Option<String>, Option<Payload>)> {
    let addresses = address.into().all();
    for address in &addresses {
        claim_role(address, Role::Subscriber)?;
    }
    let key = format!("{}#{}", addresses.join(","), topic);
    let subscriber =
        subscribers().get_or_connect(&key, || Subscriber::connect(&addresses, topic))?;
    let subscriber = subscriber.lock();
    match subscriber.recv_timeout(to_duration(wait_for_s))? {
        Some((topic_bytes, data_bytes)) => {
            let (topic, payload) = wire::decode_topic(&topic_bytes, &data_bytes)?;
            Ok((Some(topic), Some(payload)))
        }
        None => Ok((None, None)),
    }
}
