//! Probe naming, payload format and prefix reconciliation.
//!
//! A probe Interest is `<probe prefix>/<peer ip>/<my ip>/probe`. The answer
//! lists the prefixes the answering node can reach through faces other than
//! the requester's: the decimal count on the first line, then one prefix
//! URI per line.

use std::collections::{BTreeSet, HashSet};

use bytes::Bytes;
use ndn_mesh_common::{Error, FibEntry, Name, Result};

const PROBE_COMPONENT: &str = "probe";

/// Name a probe of `peer_ip` sent from `my_ip`
pub fn probe_name(probe_prefix: &Name, peer_ip: &str, my_ip: &str) -> Name {
    probe_prefix
        .append_str(peer_ip)
        .append_str(my_ip)
        .append_str(PROBE_COMPONENT)
}

/// Prefix on which the node at `ip` listens for probes
pub fn peer_prefix(probe_prefix: &Name, ip: &str) -> Name {
    probe_prefix.append_str(ip)
}

fn component_text(name: &Name, position: usize) -> Option<String> {
    name.get_from_end(position)
        .and_then(|component| String::from_utf8(component.as_bytes().to_vec()).ok())
}

/// Address of the node that sent the probe `name`
pub fn requester_address(name: &Name) -> Option<String> {
    component_text(name, 2)
}

/// Address of the node the probe `name` is meant for
pub fn probed_address(name: &Name) -> Option<String> {
    component_text(name, 3)
}

/// Whether `name` lives under `/localhost` or `/localhop`
pub fn is_scoped(name: &Name) -> bool {
    name.get(0)
        .map(|component| {
            let first = &component.as_bytes()[..];
            first == b"localhost" || first == b"localhop"
        })
        .unwrap_or(false)
}

pub fn encode_payload(prefixes: &[Name]) -> Bytes {
    let mut payload = prefixes.len().to_string();
    for prefix in prefixes {
        payload.push('\n');
        payload.push_str(&prefix.to_uri());
    }
    Bytes::from(payload)
}

pub fn parse_payload(content: &[u8]) -> Result<Vec<Name>> {
    let text = std::str::from_utf8(content)
        .map_err(|e| Error::Encoding(format!("Probe payload is not UTF-8: {}", e)))?;
    let mut lines = text.split('\n');

    let count: usize = lines
        .next()
        .map(str::trim)
        .unwrap_or("")
        .parse()
        .map_err(|e| Error::Encoding(format!("Bad prefix count in probe payload: {}", e)))?;

    let prefixes = lines
        .take(count)
        .map(|line| Name::from_uri(line.trim()))
        .collect::<Result<Vec<_>>>()?;
    if prefixes.len() != count {
        return Err(Error::Encoding(format!(
            "Probe payload announces {} prefixes but carries {}",
            count,
            prefixes.len()
        )));
    }
    Ok(prefixes)
}

/// Unscoped FIB prefixes with a next hop on `face_id`
pub fn routed_prefixes(fib: &[FibEntry], face_id: u64) -> BTreeSet<Name> {
    fib.iter()
        .filter(|entry| !is_scoped(&entry.prefix) && entry.has_next_hop(face_id))
        .map(|entry| entry.prefix.clone())
        .collect()
}

/// Unscoped FIB prefixes with a next hop on any of `face_ids`
pub fn advertised_prefixes(fib: &[FibEntry], face_ids: &HashSet<u64>) -> Vec<Name> {
    fib.iter()
        .filter(|entry| !is_scoped(&entry.prefix))
        .filter(|entry| entry.next_hops.iter().any(|hop| face_ids.contains(&hop.face_id)))
        .map(|entry| entry.prefix.clone())
        .collect()
}

/// Route changes that align a peer's face with what it advertises
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub register: Vec<Name>,
    pub unregister: Vec<Name>,
}

impl Reconciliation {
    pub fn is_empty(&self) -> bool {
        self.register.is_empty() && self.unregister.is_empty()
    }
}

pub fn reconcile(fib: &[FibEntry], face_id: u64, advertised: &[Name]) -> Reconciliation {
    let routed = routed_prefixes(fib, face_id);
    let advertised: BTreeSet<Name> = advertised
        .iter()
        .filter(|prefix| !is_scoped(prefix))
        .cloned()
        .collect();

    Reconciliation {
        register: advertised.difference(&routed).cloned().collect(),
        unregister: routed.difference(&advertised).cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndn_mesh_common::NextHopRecord;

    fn name(uri: &str) -> Name {
        Name::from_uri(uri).unwrap()
    }

    fn entry(prefix: &str, faces: &[u64]) -> FibEntry {
        FibEntry {
            prefix: name(prefix),
            next_hops: faces
                .iter()
                .map(|face_id| NextHopRecord {
                    face_id: *face_id,
                    cost: 0,
                })
                .collect(),
        }
    }

    #[test]
    fn test_probe_name_layout() {
        let prefix = name("/localhop/wifidirect");
        let probe = probe_name(&prefix, "192.168.49.1", "192.168.49.20");
        assert_eq!(
            probe.to_uri(),
            "/localhop/wifidirect/192.168.49.1/192.168.49.20/probe"
        );
        assert_eq!(requester_address(&probe).as_deref(), Some("192.168.49.20"));
        assert_eq!(probed_address(&probe).as_deref(), Some("192.168.49.1"));
        assert_eq!(requester_address(&name("/probe")), None);
    }

    #[test]
    fn test_payload_format() {
        let payload = encode_payload(&[name("/a/b"), name("/c")]);
        assert_eq!(payload.as_ref(), b"2\n/a/b\n/c");
        assert_eq!(parse_payload(&payload).unwrap(), vec![name("/a/b"), name("/c")]);

        assert_eq!(encode_payload(&[]).as_ref(), b"0");
        assert!(parse_payload(b"0").unwrap().is_empty());
    }

    #[test]
    fn test_short_payload_is_rejected() {
        assert!(parse_payload(b"3\n/a\n/b").is_err());
        assert!(parse_payload(b"two\n/a\n/b").is_err());
        assert!(parse_payload(b"").is_err());
    }

    #[test]
    fn test_reconcile_registers_new_and_drops_stale() {
        let fib = vec![
            entry("/B", &[300]),
            entry("/C", &[300, 301]),
            entry("/D", &[301]),
            entry("/localhop/wifidirect/10.0.0.2", &[300]),
            entry("/localhost/nfd", &[1]),
        ];
        let advertised = vec![name("/A"), name("/B"), name("/localhost/x"), name("/localhop/y")];

        let changes = reconcile(&fib, 300, &advertised);
        assert_eq!(changes.register, vec![name("/A")]);
        assert_eq!(changes.unregister, vec![name("/C")]);
    }

    #[test]
    fn test_reconcile_nothing_to_do() {
        let fib = vec![entry("/B", &[300])];
        assert!(reconcile(&fib, 300, &[name("/B")]).is_empty());
    }

    #[test]
    fn test_advertised_excludes_requester_face() {
        let fib = vec![
            entry("/mine", &[260]),
            entry("/from-requester", &[300]),
            entry("/both", &[300, 301]),
            entry("/localhop/wifidirect/10.0.0.1", &[260]),
        ];
        let faces: HashSet<u64> = [1, 260, 301].into_iter().collect();
        assert_eq!(
            advertised_prefixes(&fib, &faces),
            vec![name("/mine"), name("/both")]
        );
    }
}
