//! Control RPC: request parsing and verb dispatch.
//!
//! Verbs are parsed once into a tagged [`ControlRequest`] and dispatched
//! with an explicit `match`, rather than resolved by looking up a method by
//! name — an unknown verb is a parse-time error, not a reflection miss.

use std::net::Ipv4Addr;
use std::thread;
use std::time::{Duration, Instant};

use crate::beacon::tables::Tables;
use crate::error::{Error, Result};
use crate::wire::Value;

/// A parsed control RPC request: one of the three verbs the beacon's
/// control channel accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlRequest {
    /// Register `port` (optionally qualified by `ip`) under `name`.
    Advertise {
        name: String,
        port: u16,
        ip: Option<String>,
    },
    /// Remove `port` under `name`.
    Unadvertise {
        name: String,
        port: u16,
        ip: Option<String>,
    },
    /// Block until `name` has a discovered endpoint, or `wait_for_secs`
    /// elapses.
    Discover { name: String, wait_for_secs: f64 },
}

impl ControlRequest {
    /// Parse a `[verb, arg1, arg2, ...]` wire frame. Verb matching is
    /// case-insensitive.
    pub fn parse(frame: &Value) -> Result<Self> {
        let items = frame
            .as_array()
            .ok_or_else(|| Error::DecodeFailed("control frame is not an array".into()))?;
        let verb = items
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| Error::DecodeFailed("control frame missing verb".into()))?
            .to_ascii_lowercase();

        match verb.as_str() {
            "advertise" => Ok(Self::Advertise {
                name: arg_str(items, 1)?,
                port: arg_port(items, 2)?,
                ip: arg_opt_str(items, 3),
            }),
            "unadvertise" => Ok(Self::Unadvertise {
                name: arg_str(items, 1)?,
                port: arg_port(items, 2)?,
                ip: arg_opt_str(items, 3),
            }),
            "discover" => Ok(Self::Discover {
                name: arg_str(items, 1)?,
                wait_for_secs: arg_f64(items, 2).unwrap_or(-1.0),
            }),
            other => Err(Error::UnimplementedVerb(other.to_string())),
        }
    }
}

fn arg_str(items: &[Value], index: usize) -> Result<String> {
    items
        .get(index)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| Error::DecodeFailed(format!("missing string argument at {index}")))
}

fn arg_opt_str(items: &[Value], index: usize) -> Option<String> {
    items.get(index).and_then(Value::as_str).map(str::to_string)
}

fn arg_port(items: &[Value], index: usize) -> Result<u16> {
    // Ports arrive either as JSON numbers or as numeric strings, depending
    // on which side of the wire produced them; accept both.
    match items.get(index) {
        Some(Value::Number(n)) => n
            .as_u64()
            .and_then(|n| u16::try_from(n).ok())
            .ok_or_else(|| Error::DecodeFailed(format!("invalid port at {index}"))),
        Some(Value::String(s)) => s
            .parse()
            .map_err(|_| Error::DecodeFailed(format!("invalid port at {index}"))),
        _ => Err(Error::DecodeFailed(format!("missing port at {index}"))),
    }
}

fn arg_f64(items: &[Value], index: usize) -> Option<f64> {
    items.get(index).and_then(Value::as_f64)
}

/// Dispatch a parsed request against `tables`, returning the reply value.
pub fn dispatch(tables: &Tables, request: ControlRequest) -> Value {
    match request {
        ControlRequest::Advertise { name, port, .. } => {
            tracing::debug!(name, port, "advertise");
            tables.advertise(&name, port);
            Value::String(format!("{name}!!"))
        }
        ControlRequest::Unadvertise { name, port, .. } => {
            tracing::debug!(name, port, "unadvertise");
            if !tables.unadvertise(&name, port) {
                tracing::warn!(name, port, "not currently advertising");
            }
            Value::Null
        }
        ControlRequest::Discover {
            name,
            wait_for_secs,
        } => do_discover(tables, &name, wait_for_secs),
    }
}

/// A negative `wait_for_secs` means "a single lookup, no wait", handled as
/// an explicit branch rather than relying on the deadline already being in
/// the past.
fn do_discover(tables: &Tables, name: &str, wait_for_secs: f64) -> Value {
    tracing::debug!(name, wait_for_secs, "discover");

    if wait_for_secs < 0.0 {
        return pick_endpoint(tables, name).unwrap_or(Value::Null);
    }

    let deadline = Instant::now() + Duration::from_secs_f64(wait_for_secs);
    loop {
        if let Some(reply) = pick_endpoint(tables, name) {
            return reply;
        }
        if Instant::now() >= deadline {
            tracing::warn!(name, wait_for_secs, "not discovered within deadline");
            return Value::Null;
        }
        thread::sleep(Duration::from_millis(1));
    }
}

fn pick_endpoint(tables: &Tables, name: &str) -> Option<Value> {
    let endpoints = tables.discovered_for(name)?;
    let (ip, port) = *pick_random(&endpoints);
    Some(Value::String(format_endpoint(ip, port)))
}

fn pick_random(endpoints: &[(Ipv4Addr, u16)]) -> &(Ipv4Addr, u16) {
    use rand::Rng;
    let index = rand::thread_rng().gen_range(0..endpoints.len());
    &endpoints[index]
}

fn format_endpoint(ip: Ipv4Addr, port: u16) -> String {
    format!("{ip}:{port}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_advertise_with_numeric_port() {
        let request = ControlRequest::parse(&json!(["advertise", "svc", 9001])).unwrap();
        assert_eq!(
            request,
            ControlRequest::Advertise {
                name: "svc".into(),
                port: 9001,
                ip: None,
            }
        );
    }

    #[test]
    fn verb_matching_is_case_insensitive() {
        let request = ControlRequest::parse(&json!(["ADVERTISE", "svc", "9001"])).unwrap();
        assert_eq!(
            request,
            ControlRequest::Advertise {
                name: "svc".into(),
                port: 9001,
                ip: None,
            }
        );
    }

    #[test]
    fn unknown_verb_is_unimplemented() {
        let err = ControlRequest::parse(&json!(["teleport", "svc"])).unwrap_err();
        assert!(matches!(err, Error::UnimplementedVerb(_)));
    }

    #[test]
    fn dispatch_advertise_then_discover_finds_self() {
        let tables = Tables::new();
        let reply = dispatch(
            &tables,
            ControlRequest::Advertise {
                name: "svc".into(),
                port: 9001,
                ip: None,
            },
        );
        assert_eq!(reply, json!("svc!!"));

        tables.record_discovery("svc", Ipv4Addr::new(127, 0, 0, 1), 9001);
        let reply = dispatch(
            &tables,
            ControlRequest::Discover {
                name: "svc".into(),
                wait_for_secs: -1.0,
            },
        );
        assert_eq!(reply, json!("127.0.0.1:9001"));
    }

    #[test]
    fn negative_wait_with_no_match_is_single_lookup() {
        let tables = Tables::new();
        let started = Instant::now();
        let reply = dispatch(
            &tables,
            ControlRequest::Discover {
                name: "absent".into(),
                wait_for_secs: -1.0,
            },
        );
        assert_eq!(reply, Value::Null);
        assert!(started.elapsed() < Duration::from_millis(50));
    }

    #[test]
    fn unadvertise_missing_warns_but_replies_null() {
        let tables = Tables::new();
        let reply = dispatch(
            &tables,
            ControlRequest::Unadvertise {
                name: "svc".into(),
                port: 9001,
                ip: None,
            },
        );
        assert_eq!(reply, Value::Null);
    }
}
