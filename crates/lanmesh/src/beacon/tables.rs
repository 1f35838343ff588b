//! Shared advertisement/discovered tables, guarded by one mutex each.
//!
//! Both tables are written by the beacon worker and read (and, for
//! advertisements, also written) by the control-RPC dispatcher that runs on
//! the same worker thread. They are still mutex-guarded rather than bare
//! `RefCell`s because [`Tables`] is shared (`Arc`) with callers that need to
//! read it from outside the worker, e.g. when reporting diagnostics.

use std::collections::{HashMap, HashSet};
use std::net::Ipv4Addr;

use parking_lot::Mutex;

/// The advertisement set and discovered set, bundled so the worker and the
/// control dispatcher can share one `Arc`.
#[derive(Default)]
pub struct Tables {
    advertised: Mutex<HashMap<String, HashSet<u16>>>,
    discovered: Mutex<HashMap<String, HashSet<(Ipv4Addr, u16)>>>,
}

impl Tables {
    /// A fresh, empty pair of tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `port` as advertised under `name`.
    pub fn advertise(&self, name: &str, port: u16) {
        self.advertised
            .lock()
            .entry(name.to_string())
            .or_default()
            .insert(port);
    }

    /// Remove `port` from `name`'s advertisement bucket. Returns `true` if
    /// it was present. Empty buckets are removed immediately, so the
    /// invariant holds at every point a reader can observe the table, not
    /// just eventually.
    ///
    /// The lock is held across the whole read-modify-remove sequence so a
    /// concurrent advertise/unadvertise on the same name can't interleave
    /// between the lookup and the removal.
    pub fn unadvertise(&self, name: &str, port: u16) -> bool {
        let mut advertised = self.advertised.lock();
        let Some(ports) = advertised.get_mut(name) else {
            return false;
        };
        let removed = ports.remove(&port);
        if ports.is_empty() {
            advertised.remove(name);
        }
        removed
    }

    /// A point-in-time copy of every `(name, port)` pair currently
    /// advertised, for the broadcast phase to iterate without holding the
    /// lock during UDP I/O.
    pub fn advertised_snapshot(&self) -> Vec<(String, u16)> {
        self.advertised
            .lock()
            .iter()
            .flat_map(|(name, ports)| ports.iter().map(move |port| (name.clone(), *port)))
            .collect()
    }

    /// Record a peer advertisement observed on the wire.
    pub fn record_discovery(&self, name: &str, ip: Ipv4Addr, port: u16) {
        self.discovered
            .lock()
            .entry(name.to_string())
            .or_default()
            .insert((ip, port));
    }

    /// A snapshot of every endpoint discovered for `name`, or `None` if
    /// none have been seen yet.
    pub fn discovered_for(&self, name: &str) -> Option<Vec<(Ipv4Addr, u16)>> {
        let discovered = self.discovered.lock();
        let endpoints = discovered.get(name)?;
        if endpoints.is_empty() {
            None
        } else {
            Some(endpoints.iter().copied().collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertise_then_unadvertise_empties_bucket() {
        let tables = Tables::new();
        tables.advertise("svc", 9001);
        assert_eq!(tables.advertised_snapshot(), vec![("svc".to_string(), 9001)]);

        assert!(tables.unadvertise("svc", 9001));
        assert!(tables.advertised_snapshot().is_empty());
    }

    #[test]
    fn unadvertise_missing_port_returns_false() {
        let tables = Tables::new();
        tables.advertise("svc", 9001);
        assert!(!tables.unadvertise("svc", 9002));
        assert!(!tables.unadvertise("other", 9001));
    }

    #[test]
    fn discovery_dedupes_by_ip_and_port() {
        let tables = Tables::new();
        let ip = Ipv4Addr::new(10, 0, 0, 5);
        tables.record_discovery("svc", ip, 9001);
        tables.record_discovery("svc", ip, 9001);
        tables.record_discovery("svc", ip, 9002);

        let mut endpoints = tables.discovered_for("svc").unwrap();
        endpoints.sort();
        assert_eq!(endpoints, vec![(ip, 9001), (ip, 9002)]);
    }

    #[test]
    fn discovered_for_unknown_name_is_none() {
        let tables = Tables::new();
        assert!(tables.discovered_for("nope").is_none());
    }
}
