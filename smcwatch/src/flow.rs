//! Flow identity and the table of known SMC flows.
//!
//! A flow is the pair of network endpoints plus transport endpoints of one
//! TCP connection direction. The table remembers which flows opted into SMC
//! so that follow-up segments without the TCP option are still admitted to
//! reassembly.

use std::{
    collections::{HashMap, HashSet},
    net::IpAddr,
    sync::Mutex,
};

/// Network-layer endpoints of a flow, source to destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NetFlow {
    pub src: IpAddr,
    pub dst: IpAddr,
}

/// Transport-layer endpoints of a flow, source to destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransportFlow {
    pub src: u16,
    pub dst: u16,
}

/// Concurrent set of `(network, transport)` flow pairs currently marked as
/// SMC-bearing.
///
/// All operations serialize under a single mutex; table churn is bounded by
/// the number of active SMC flows, so there is nothing to gain from finer
/// locking. Safe to call from the packet-handler task and stream-completion
/// callbacks concurrently.
#[derive(Debug, Default)]
pub struct FlowTable {
    flows: Mutex<HashMap<NetFlow, HashSet<TransportFlow>>>,
}

impl FlowTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a flow as SMC-bearing.
    pub fn add(&self, net: NetFlow, transport: TransportFlow) {
        let mut flows = self.flows.lock().unwrap();
        flows.entry(net).or_default().insert(transport);
    }

    /// Removes a flow; a no-op if it is not present.
    pub fn del(&self, net: &NetFlow, transport: &TransportFlow) {
        let mut flows = self.flows.lock().unwrap();
        if let Some(transports) = flows.get_mut(net) {
            transports.remove(transport);
            if transports.is_empty() {
                flows.remove(net);
            }
        }
    }

    /// Returns true if the flow is currently marked as SMC-bearing.
    pub fn contains(&self, net: &NetFlow, transport: &TransportFlow) -> bool {
        let flows = self.flows.lock().unwrap();
        flows
            .get(net)
            .is_some_and(|transports| transports.contains(transport))
    }
}

#[cfg(test)]
mod tests {
    use std::{net::Ipv4Addr, sync::Arc, thread};

    use super::*;

    fn flow(a: u8, b: u8, sport: u16, dport: u16) -> (NetFlow, TransportFlow) {
        (
            NetFlow {
                src: IpAddr::V4(Ipv4Addr::new(10, 0, 0, a)),
                dst: IpAddr::V4(Ipv4Addr::new(10, 0, 0, b)),
            },
            TransportFlow {
                src: sport,
                dst: dport,
            },
        )
    }

    #[test]
    fn add_del_contains() {
        let table = FlowTable::new();
        let (net, transport) = flow(1, 2, 1234, 5678);

        assert!(!table.contains(&net, &transport));
        table.add(net, transport);
        assert!(table.contains(&net, &transport));

        // same endpoints, other ports, is a different flow
        let other = TransportFlow {
            src: 1234,
            dst: 5679,
        };
        assert!(!table.contains(&net, &other));

        table.del(&net, &transport);
        assert!(!table.contains(&net, &transport));

        // delete on a missing entry is harmless
        table.del(&net, &transport);
        assert!(!table.contains(&net, &transport));
    }

    #[test]
    fn add_is_idempotent() {
        let table = FlowTable::new();
        let (net, transport) = flow(1, 2, 1234, 5678);
        table.add(net, transport);
        table.add(net, transport);
        table.del(&net, &transport);
        assert!(!table.contains(&net, &transport));
    }

    #[test]
    fn concurrent_access_on_distinct_keys() {
        let table = Arc::new(FlowTable::new());
        let mut handles = Vec::new();
        for i in 0..8u16 {
            let table = Arc::clone(&table);
            handles.push(thread::spawn(move || {
                let (net, transport) = flow(1, 2, 1000 + i, 2000 + i);
                for _ in 0..100 {
                    table.add(net, transport);
                    assert!(table.contains(&net, &transport));
                    table.del(&net, &transport);
                    assert!(!table.contains(&net, &transport));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
    }
}
