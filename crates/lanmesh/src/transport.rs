//! Thin RAII wrappers over the four `zmq` socket roles this crate needs,
//! plus a poller that multiplexes across them.
//!
//! Every wrapper owns its `zmq::Socket` and closes it on drop (the
//! underlying crate already does this; the wrappers exist to pin down the
//! role-specific send/receive discipline rather than to reinvent socket
//! lifetime management).

use std::time::Duration;

use crate::error::{Error, Result};

fn context() -> zmq::Context {
    thread_local! {
        static CONTEXT: zmq::Context = zmq::Context::new();
    }
    CONTEXT.with(|ctx| ctx.clone())
}

/// Connects outward, sends one request, then receives exactly one reply.
/// Strictly alternating: a second send before a receive is a logic error in
/// the underlying transport, not something this wrapper guards against.
pub struct Requester {
    socket: zmq::Socket,
}

impl Requester {
    /// Connect to `tcp://{address}`.
    pub fn connect(address: &str) -> Result<Self> {
        let socket = context().socket(zmq::REQ)?;
        socket.connect(&format!("tcp://{address}"))?;
        Ok(Self { socket })
    }

    /// Send one request.
    pub fn send(&self, bytes: &[u8]) -> Result<()> {
        self.socket.send(bytes, 0)?;
        Ok(())
    }

    /// Wait up to `timeout` for the reply, or forever if `None`. Returns
    /// `Ok(None)` on timeout.
    pub fn recv_timeout(&self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>> {
        if poll_one(&self.socket, timeout)? {
            Ok(Some(self.socket.recv_bytes(0)?))
        } else {
            Ok(None)
        }
    }
}

impl Drop for Requester {
    fn drop(&mut self) {
        tracing::debug!("closing requester socket");
    }
}

/// Binds an address, receives requests, and must send a reply before the
/// next receive.
pub struct Replier {
    socket: zmq::Socket,
}

impl Replier {
    /// Bind to `tcp://{address}`.
    pub fn bind(address: &str) -> Result<Self> {
        let socket = context().socket(zmq::REP)?;
        socket
            .bind(&format!("tcp://{address}"))
            .map_err(|e| Error::BindFailed(e.to_string()))?;
        Ok(Self { socket })
    }

    /// Receive one request, waiting up to `timeout` (or forever if `None`).
    /// Returns `Ok(None)` on timeout. `Some(Duration::ZERO)` polls
    /// non-blockingly.
    pub fn recv_timeout(&self, timeout: Option<Duration>) -> Result<Option<Vec<u8>>> {
        if poll_one(&self.socket, timeout)? {
            Ok(Some(self.socket.recv_bytes(0)?))
        } else {
            Ok(None)
        }
    }

    /// Send the reply to the request most recently received.
    pub fn send(&self, bytes: &[u8]) -> Result<()> {
        self.socket.send(bytes, 0)?;
        Ok(())
    }

    /// The raw socket, for registering with a [`Poller`].
    pub fn raw(&self) -> &zmq::Socket {
        &self.socket
    }
}

impl Drop for Replier {
    fn drop(&mut self) {
        tracing::debug!("closing replier socket");
    }
}

/// Binds an address and sends multi-part messages; never receives.
pub struct Publisher {
    socket: zmq::Socket,
}

impl Publisher {
    /// Bind to `tcp://{address}`.
    pub fn bind(address: &str) -> Result<Self> {
        let socket = context().socket(zmq::PUB)?;
        socket
            .bind(&format!("tcp://{address}"))
            .map_err(|e| Error::BindFailed(e.to_string()))?;
        Ok(Self { socket })
    }

    /// Send a two-part `(topic, data)` frame.
    pub fn send_multipart(&self, topic: &[u8], data: &[u8]) -> Result<()> {
        self.socket.send(topic, zmq::SNDMORE)?;
        self.socket.send(data, 0)?;
        Ok(())
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        tracing::debug!("closing publisher socket");
    }
}

/// Connects outward to one or more publishers and filters by topic prefix.
/// Multiple endpoints are multiplexed behind one logical subscriber.
pub struct Subscriber {
    sockets: Vec<zmq::Socket>,
}

impl Subscriber {
    /// Connect to every address in `addresses`, subscribing each to `topic`.
    pub fn connect(addresses: &[String], topic: &str) -> Result<Self> {
        let sockets = addresses
            .iter()
            .map(|address| {
                let socket = context().socket(zmq::SUB)?;
                socket.connect(&format!("tcp://{address}"))?;
                socket.set_subscribe(topic.as_bytes())?;
                Ok(socket)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { sockets })
    }

    /// Poll every connected socket for up to `timeout` (or forever if
    /// `None`); receive and decode one multi-part message from whichever
    /// socket becomes readable first. Returns `Ok(None)` on timeout.
    pub fn recv_timeout(
        &self,
        timeout: Option<Duration>,
    ) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        let mut poller = Poller::new();
        for socket in &self.sockets {
            poller.register(socket);
        }
        let readiness = poller.poll(timeout)?;
        for (socket, ready) in self.sockets.iter().zip(readiness.iter()) {
            if *ready {
                let topic = socket.recv_bytes(0)?;
                let data = socket.recv_bytes(0)?;
                return Ok(Some((topic, data)));
            }
        }
        Ok(None)
    }
}

/// A multi-socket poller: register any number of sockets, then ask which of
/// them are readable within a timeout. The generic counterpart of the
/// per-role pollers each wrapper above uses internally.
pub struct Poller<'a> {
    items: Vec<zmq::PollItem<'a>>,
}

impl<'a> Poller<'a> {
    /// An empty poller with no sockets registered yet.
    pub fn new() -> Self {
        Self { items: Vec::new() }
    }

    /// Register a socket to be polled for readability.
    pub fn register(&mut self, socket: &'a zmq::Socket) {
        self.items.push(socket.as_poll_item(zmq::POLLIN));
    }

    /// Poll every registered socket for up to `timeout`, or forever if
    /// `None`. Returns one readiness flag per socket, in registration order.
    pub fn poll(&mut self, timeout: Option<Duration>) -> Result<Vec<bool>> {
        let millis = match timeout {
            Some(d) => d.as_millis().min(i64::MAX as u128) as i64,
            None => -1,
        };
        zmq::poll(&mut self.items, millis)?;
        Ok(self.items.iter().map(|item| item.is_readable()).collect())
    }
}

impl<'a> Default for Poller<'a> {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        tracing::debug!(count = self.sockets.len(), "closing subscriber sockets");
    }
}

/// Poll a single socket for readability within `timeout` (or forever).
fn poll_one(socket: &zmq::Socket, timeout: Option<Duration>) -> Result<bool> {
    let mut poller = Poller::new();
    poller.register(socket);
    Ok(poller.poll(timeout)?.first().copied().unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::local_address;

    #[test]
    fn request_reply_round_trip() {
        let address = local_address().unwrap();
        let replier = Replier::bind(&address).unwrap();
        let requester = Requester::connect(&address).unwrap();

        requester.send(b"ping").unwrap();
        let received = replier
            .recv_timeout(Some(Duration::from_secs(1)))
            .unwrap()
            .unwrap();
        assert_eq!(received, b"ping");

        replier.send(b"pong").unwrap();
        let reply = requester
            .recv_timeout(Some(Duration::from_secs(1)))
            .unwrap()
            .unwrap();
        assert_eq!(reply, b"pong");
    }

    #[test]
    fn requester_recv_times_out_with_no_peer() {
        let address = local_address().unwrap();
        let requester = Requester::connect(&address).unwrap();
        requester.send(b"hello").unwrap();
        let reply = requester
            .recv_timeout(Some(Duration::from_millis(100)))
            .unwrap();
        assert!(reply.is_none());
    }
}
