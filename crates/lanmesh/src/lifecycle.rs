//! Process-wide beacon lifecycle: lazy start, the local/remote split, and
//! automatic unadvertise on exit.
//!
//! The first call to [`advertise`], [`unadvertise`], or [`discover`] starts
//! the beacon. If this process can bind the beacon's UDP and control ports
//! it runs the worker itself (`Mode::Local`); if another process on this
//! host already owns them, this process instead talks to that beacon's
//! control RPC over loopback (`Mode::Remote`) rather than failing outright.

use std::sync::{Mutex, OnceLock};
use std::time::Duration;

use serde_json::json;

use crate::address::AddressArg;
use crate::beacon::BeaconHandle;
use crate::config::{BeaconConfig, CONTROL_PORT};
use crate::error::{Error, Result};
use crate::transport::Requester;
use crate::wire::{self, Value};

const CONTROL_RPC_TIMEOUT: Duration = Duration::from_secs(5);

enum Mode {
    Local(#[allow(dead_code)] BeaconHandle),
    Remote,
}

struct Lifecycle {
    #[allow(dead_code)]
    mode: Mode,
    control_address: String,
}

static LIFECYCLE: OnceLock<Lifecycle> = OnceLock::new();
static UNADVERTISE_ON_EXIT: Mutex<Vec<(String, u16)>> = Mutex::new(Vec::new());

fn lifecycle() -> &'static Lifecycle {
    LIFECYCLE.get_or_init(|| match BeaconHandle::spawn(BeaconConfig::default()) {
        Ok(handle) => {
            tracing::info!("beacon bound locally");
            Lifecycle {
                mode: Mode::Local(handle),
                control_address: format!("127.0.0.1:{CONTROL_PORT}"),
            }
        }
        Err(Error::BindFailed(reason)) => {
            tracing::info!(reason, "beacon ports already owned, using existing beacon");
            Lifecycle {
                mode: Mode::Remote,
                control_address: format!("127.0.0.1:{CONTROL_PORT}"),
            }
        }
        Err(err) => {
            // Neither a clean bind nor a recognizable "already running"
            // failure; still fall back to the conventional loopback
            // address rather than panicking at call time, since callers
            // of `advertise`/`discover` have no way to recover otherwise.
            tracing::warn!(error = %err, "beacon failed to start, assuming an existing beacon");
            Lifecycle {
                mode: Mode::Remote,
                control_address: format!("127.0.0.1:{CONTROL_PORT}"),
            }
        }
    })
}

fn control_rpc(request: Value, timeout: Duration) -> Result<Value> {
    let address = &lifecycle().control_address;
    let requester = Requester::connect(address)?;
    requester.send(&wire::encode(&request)?)?;
    match requester.recv_timeout(Some(timeout))? {
        Some(bytes) => wire::decode(&bytes),
        None => Err(Error::SocketTimedOut {
            wait_for_s: timeout.as_secs_f64(),
        }),
    }
}

/// Advertise `address` (a bare port, or `ip:port`) under `name`, starting
/// the beacon if it isn't already running. Registers an automatic
/// unadvertise for process exit. Returns the beacon's acknowledgement text
/// (`name` followed by `"!!"`).
pub fn advertise(name: &str, address: impl Into<AddressArg>) -> Result<String> {
    let (ip, port) = address.into().resolve()?;
    let reply = control_rpc(
        json!(["advertise", name, port, ip]),
        CONTROL_RPC_TIMEOUT,
    )?;
    UNADVERTISE_ON_EXIT
        .lock()
        .unwrap()
        .push((name.to_string(), port));
    Ok(reply.as_str().map(str::to_string).unwrap_or_default())
}

/// Stop advertising `address` under `name`.
pub fn unadvertise(name: &str, address: impl Into<AddressArg>) -> Result<()> {
    let (ip, port) = address.into().resolve()?;
    control_rpc(
        json!(["unadvertise", name, port, ip]),
        CONTROL_RPC_TIMEOUT,
    )?;
    UNADVERTISE_ON_EXIT
        .lock()
        .unwrap()
        .retain(|entry| entry != &(name.to_string(), port));
    Ok(())
}

/// Look up an endpoint advertised under `name`. A negative `wait_for_secs`
/// performs a single lookup with no wait; otherwise blocks up to that many
/// seconds for a match to appear. The control RPC's own wait is sized to
/// `wait_for_secs` plus a margin, so a long discovery wait isn't cut short
/// by the client-side RPC timeout.
pub fn discover(name: &str, wait_for_secs: f64) -> Result<Option<String>> {
    let rpc_timeout = if wait_for_secs < 0.0 {
        CONTROL_RPC_TIMEOUT
    } else {
        Duration::from_secs_f64(wait_for_secs) + CONTROL_RPC_TIMEOUT
    };
    let reply = control_rpc(json!(["discover", name, wait_for_secs]), rpc_timeout)?;
    Ok(reply.as_str().map(str::to_string))
}

/// Run every outstanding unadvertise in last-registered-first order. Wired
/// to a process-exit hook in [`register_exit_hook`]; also callable directly
/// from tests.
fn unadvertise_all_on_exit() {
    let mut pending = UNADVERTISE_ON_EXIT.lock().unwrap();
    while let Some((name, port)) = pending.pop() {
        let reply = control_rpc(
            json!(["unadvertise", name, port, Value::Null]),
            CONTROL_RPC_TIMEOUT,
        );
        if let Err(err) = reply {
            tracing::warn!(name, port, error = %err, "failed to unadvertise on exit");
        }
    }
}

#[ctor::dtor]
fn register_exit_hook() {
    unadvertise_all_on_exit();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unadvertise_all_on_exit_is_lifo_and_empties_the_list() {
        UNADVERTISE_ON_EXIT
            .lock()
            .unwrap()
            .extend([("a".to_string(), 1), ("b".to_string(), 2)]);
        // Without a live beacon these calls fail, but the list must still
        // drain so a second invocation is a no-op.
        unadvertise_all_on_exit();
        assert!(UNADVERTISE_ON_EXIT.lock().unwrap().is_empty());
    }
}
