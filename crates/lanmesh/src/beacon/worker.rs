//! The background beacon: one OS thread per process that owns the UDP
//! broadcast socket and the control-RPC replier.
//!
//! The rest of this crate is built around short-lived, blocking `zmq`
//! calls, which is why the worker runs on a plain `std::thread` rather than
//! on an async executor: each cycle already blocks on a bounded poll, so
//! there is nothing for a reactor to multiplex.

use std::net::{Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::beacon::control::{self, ControlRequest};
use crate::beacon::tables::Tables;
use crate::config::{BeaconConfig, BEACON_MESSAGE_SIZE, BEACON_PORT, BROADCAST_ADDR, CONTROL_PORT};
use crate::error::Result;
use crate::transport::Replier;
use crate::wire;

/// A running beacon worker. Dropping the handle asks the thread to stop and
/// waits for it to exit.
pub struct BeaconHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl BeaconHandle {
    /// Spawn the worker thread. The control replier binds to
    /// `0.0.0.0:{CONTROL_PORT}`, the UDP socket to `0.0.0.0:{BEACON_PORT}`
    /// with broadcast enabled; both are bound before the thread starts so
    /// bind failures surface to the caller synchronously.
    pub fn spawn(config: BeaconConfig) -> Result<Self> {
        let tables = Arc::new(Tables::new());
        let replier = Replier::bind(&format!("0.0.0.0:{CONTROL_PORT}"))?;
        let udp = bind_broadcast_socket()?;
        let stop = Arc::new(AtomicBool::new(false));

        let worker_stop = Arc::clone(&stop);
        let thread = std::thread::Builder::new()
            .name("lanmesh-beacon".into())
            .spawn(move || run(tables, replier, udp, config, worker_stop))
            .map_err(crate::error::Error::Io)?;

        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    /// Ask the worker to stop and block until it has.
    pub fn shutdown(mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for BeaconHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn bind_broadcast_socket() -> Result<UdpSocket> {
    let socket = UdpSocket::bind(("0.0.0.0", BEACON_PORT))
        .map_err(|e| crate::error::Error::BindFailed(e.to_string()))?;
    socket.set_broadcast(true)?;
    socket.set_read_timeout(Some(Duration::from_millis(50)))?;
    Ok(socket)
}

/// The three-phase cycle: drain pending control RPCs non-blocking, then
/// broadcast this process's advertisements if `interval_secs` has elapsed
/// since the last round, then spend up to `finder_timeout_secs` listening
/// for peers' broadcasts.
fn run(tables: Arc<Tables>, replier: Replier, udp: UdpSocket, config: BeaconConfig, stop: Arc<AtomicBool>) {
    let mut last_broadcast = Instant::now() - Duration::from_secs_f64(config.interval_secs);

    while !stop.load(Ordering::SeqCst) {
        drain_control_rpc(&tables, &replier);

        if last_broadcast.elapsed().as_secs_f64() >= config.interval_secs {
            broadcast_advertisements(&tables, &udp);
            last_broadcast = Instant::now();
        }

        receive_advertisements(&tables, &udp, Duration::from_secs_f64(config.finder_timeout_secs));
    }
}

fn drain_control_rpc(tables: &Tables, replier: &Replier) {
    loop {
        let Ok(Some(bytes)) = replier.recv_timeout(Some(Duration::from_millis(0))) else {
            return;
        };
        let reply = match wire::decode(&bytes).and_then(|frame| ControlRequest::parse(&frame)) {
            Ok(request) => control::dispatch(tables, request),
            Err(err) => {
                tracing::warn!(error = %err, "malformed control RPC frame");
                wire::Value::Null
            }
        };
        match wire::encode(&reply) {
            Ok(bytes) => {
                if let Err(err) = replier.send(&bytes) {
                    tracing::warn!(error = %err, "failed to send control RPC reply");
                }
            }
            Err(err) => tracing::warn!(error = %err, "failed to encode control RPC reply"),
        }
    }
}

fn broadcast_advertisements(tables: &Tables, udp: &UdpSocket) {
    for (name, port) in tables.advertised_snapshot() {
        let datagram = match wire::encode(&serde_json::json!([name, port])) {
            Ok(bytes) => bytes,
            Err(err) => {
                tracing::warn!(name, port, error = %err, "failed to encode advertisement");
                continue;
            }
        };
        if datagram.len() > BEACON_MESSAGE_SIZE {
            tracing::warn!(name, port, "advertisement too large to broadcast, skipping");
            continue;
        }
        if let Err(err) = udp.send_to(&datagram, (BROADCAST_ADDR, BEACON_PORT)) {
            tracing::warn!(error = %err, "failed to broadcast advertisement");
        }
    }
}

fn receive_advertisements(tables: &Tables, udp: &UdpSocket, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    let mut buf = [0u8; BEACON_MESSAGE_SIZE];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return;
        }
        let _ = udp.set_read_timeout(Some(remaining));

        match udp.recv_from(&mut buf) {
            Ok((len, from)) => {
                let Some(ip) = ipv4_of(from) else { continue };
                if let Some((name, port)) = parse_advertisement(&buf[..len]) {
                    tables.record_discovery(&name, ip, port);
                }
            }
            Err(err) if matches!(err.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, "error receiving advertisement");
                return;
            }
        }
    }
}

fn ipv4_of(addr: std::net::SocketAddr) -> Option<Ipv4Addr> {
    match addr.ip() {
        std::net::IpAddr::V4(ip) => Some(ip),
        std::net::IpAddr::V6(_) => None,
    }
}

/// Parse a `[name, port]` advertisement datagram. A truncated or otherwise
/// malformed datagram fails to decode and is treated as absent; the caller
/// drops it with a warning rather than propagating the failure.
fn parse_advertisement(bytes: &[u8]) -> Option<(String, u16)> {
    let value = wire::decode(bytes).ok()?;
    let items = value.as_array()?;
    let name = items.first()?.as_str()?.to_string();
    let port = items.get(1)?.as_u64().and_then(|n| u16::try_from(n).ok())?;
    Some((name, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_advertisement() {
        let datagram = wire::encode(&serde_json::json!(["weather-station", 9001])).unwrap();
        assert_eq!(
            parse_advertisement(&datagram),
            Some(("weather-station".to_string(), 9001))
        );
    }

    #[test]
    fn rejects_advertisement_without_port() {
        let datagram = wire::encode(&serde_json::json!(["weather-station"])).unwrap();
        assert_eq!(parse_advertisement(&datagram), None);
    }

    #[test]
    fn rejects_truncated_advertisement() {
        let datagram = wire::encode(&serde_json::json!(["weather-station", 9001])).unwrap();
        assert_eq!(parse_advertisement(&datagram[..datagram.len() - 2]), None);
    }

    #[test]
    fn broadcast_then_receive_records_discovery() {
        let tables = Tables::new();
        tables.advertise("weather-station", 9001);

        let sender = UdpSocket::bind(("127.0.0.1", 0)).unwrap();
        sender.set_broadcast(true).unwrap();
        let receiver = UdpSocket::bind(("127.0.0.1", 0)).unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_millis(200)))
            .unwrap();
        let receiver_addr = receiver.local_addr().unwrap();

        for (name, port) in tables.advertised_snapshot() {
            let datagram = wire::encode(&serde_json::json!([name, port])).unwrap();
            sender.send_to(&datagram, receiver_addr).unwrap();
        }

        let discovered_tables = Tables::new();
        receive_advertisements(&discovered_tables, &receiver, Duration::from_millis(200));
        let endpoints = discovered_tables.discovered_for("weather-station").unwrap();
        assert_eq!(endpoints, vec![(Ipv4Addr::new(127, 0, 0, 1), 9001)]);
    }
}
