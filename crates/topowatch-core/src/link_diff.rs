// ── Link diff ──
//
// Pure comparison of two link snapshots (baseline vs. observed).
// Every link is reduced to a canonical `ip1:port1-ip2:port2` identity
// so `A→B` and `B→A` observations collide.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::net::IpAddr;

use serde::Serialize;
use strum::Display;

// ── Endpoint ────────────────────────────────────────────────────────

/// One side of a link: device IP plus port (interface id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Endpoint {
    pub ip: String,
    pub port: i64,
}

impl Endpoint {
    pub fn new(ip: impl Into<String>, port: i64) -> Self {
        Self {
            ip: ip.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// Total order used for canonicalisation.
///
/// Parseable addresses sort by address (every IPv4 before every IPv6,
/// then byte order) and come before unparseable strings, which sort
/// lexically. Ties on the address fall back to the port.
fn endpoint_order(a: &Endpoint, b: &Endpoint) -> Ordering {
    let by_ip = match (a.ip.parse::<IpAddr>(), b.ip.parse::<IpAddr>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.ip.cmp(&b.ip),
    };
    by_ip.then(a.port.cmp(&b.port))
}

// ── DiffLink ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
pub enum InvalidReason {
    InvalidIpFormat,
    InvalidPort,
    SameIp,
}

/// A link in canonical form: `from` is always the smaller endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct DiffLink {
    from: Endpoint,
    to: Endpoint,
}

impl DiffLink {
    pub fn new(ip1: &str, port1: i64, ip2: &str, port2: i64) -> Self {
        Self::from_endpoints(Endpoint::new(ip1, port1), Endpoint::new(ip2, port2))
    }

    pub fn from_endpoints(a: Endpoint, b: Endpoint) -> Self {
        if endpoint_order(&a, &b) == Ordering::Greater {
            Self { from: b, to: a }
        } else {
            Self { from: a, to: b }
        }
    }

    pub fn from_endpoint(&self) -> &Endpoint {
        &self.from
    }

    pub fn to_endpoint(&self) -> &Endpoint {
        &self.to
    }

    pub fn endpoints(&self) -> [&Endpoint; 2] {
        [&self.from, &self.to]
    }

    /// The endpoint opposite `endpoint`, if `endpoint` belongs to this link.
    pub fn peer_of(&self, endpoint: &Endpoint) -> Option<&Endpoint> {
        if *endpoint == self.from {
            Some(&self.to)
        } else if *endpoint == self.to {
            Some(&self.from)
        } else {
            None
        }
    }

    pub fn validate(&self) -> Result<(), InvalidReason> {
        let (Ok(ip1), Ok(ip2)) = (self.from.ip.parse::<IpAddr>(), self.to.ip.parse::<IpAddr>())
        else {
            return Err(InvalidReason::InvalidIpFormat);
        };
        if self.from.port <= 0 || self.to.port <= 0 {
            return Err(InvalidReason::InvalidPort);
        }
        if ip1 == ip2 {
            return Err(InvalidReason::SameIp);
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

impl fmt::Display for DiffLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.from, self.to)
    }
}

// ── Diff result ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidLink {
    pub link: DiffLink,
    pub reason: InvalidReason,
}

/// Classification of every input link, keyed by canonical identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkDiff {
    pub unchanged: BTreeMap<String, DiffLink>,
    pub removed: BTreeMap<String, DiffLink>,
    pub new: BTreeMap<String, DiffLink>,
    /// Subset of `new` whose endpoint was claimed by a baseline link.
    pub rewired: BTreeMap<String, DiffLink>,
    pub invalid_baseline: BTreeMap<String, InvalidLink>,
    pub invalid_actual: BTreeMap<String, InvalidLink>,
    /// Endpoint -> every baseline link claiming it (only endpoints with 2+ claimants).
    pub baseline_port_conflicts: BTreeMap<String, Vec<DiffLink>>,
    /// Endpoint -> every observed link claiming it (only endpoints with 2+ claimants).
    pub actual_port_conflicts: BTreeMap<String, Vec<DiffLink>>,
}

impl LinkDiff {
    pub fn is_rewired(&self, key: &str) -> bool {
        self.rewired.contains_key(key)
    }
}

impl fmt::Display for LinkDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sections: [(&str, Vec<&String>); 6] = [
            ("Unchanged", self.unchanged.keys().collect()),
            ("Removed", self.removed.keys().collect()),
            ("New", self.new.keys().collect()),
            ("Rewired", self.rewired.keys().collect()),
            ("Invalid baseline", self.invalid_baseline.keys().collect()),
            ("Invalid actual", self.invalid_actual.keys().collect()),
        ];
        for (title, keys) in sections {
            writeln!(f, "{title} links:")?;
            for key in keys {
                writeln!(f, "  {key}")?;
            }
        }
        Ok(())
    }
}

/// Split links into valid (keyed by identity) and invalid.
fn partition(
    links: impl IntoIterator<Item = DiffLink>,
) -> (BTreeMap<String, DiffLink>, BTreeMap<String, InvalidLink>) {
    let mut valid = BTreeMap::new();
    let mut invalid = BTreeMap::new();
    for link in links {
        let key = link.to_string();
        match link.validate() {
            Ok(()) => {
                valid.insert(key, link);
            }
            Err(reason) => {
                invalid.insert(key, InvalidLink { link, reason });
            }
        }
    }
    (valid, invalid)
}

/// Endpoint -> links claiming it, for every endpoint in `links`.
fn endpoint_claims(links: &BTreeMap<String, DiffLink>) -> BTreeMap<String, Vec<DiffLink>> {
    let mut claims: BTreeMap<String, Vec<DiffLink>> = BTreeMap::new();
    for link in links.values() {
        for endpoint in link.endpoints() {
            claims
                .entry(endpoint.to_string())
                .or_default()
                .push(link.clone());
        }
    }
    claims
}

fn conflicts(claims: &BTreeMap<String, Vec<DiffLink>>) -> BTreeMap<String, Vec<DiffLink>> {
    claims
        .iter()
        .filter(|(_, links)| links.len() > 1)
        .map(|(ep, links)| (ep.clone(), links.clone()))
        .collect()
}

/// Compare baseline links against observed links.
///
/// Invalid links (unparseable IP, port <= 0, both ends on one IP) are
/// reported per source and excluded from every other category.
pub fn compute_link_diff(
    baseline: impl IntoIterator<Item = DiffLink>,
    actual: impl IntoIterator<Item = DiffLink>,
) -> LinkDiff {
    let (baseline, invalid_baseline) = partition(baseline);
    let (actual, invalid_actual) = partition(actual);

    let baseline_claims = endpoint_claims(&baseline);
    let actual_claims = endpoint_claims(&actual);

    let mut diff = LinkDiff {
        invalid_baseline,
        invalid_actual,
        baseline_port_conflicts: conflicts(&baseline_claims),
        actual_port_conflicts: conflicts(&actual_claims),
        ..LinkDiff::default()
    };

    for (key, link) in &baseline {
        if actual.contains_key(key) {
            diff.unchanged.insert(key.clone(), link.clone());
        } else {
            diff.removed.insert(key.clone(), link.clone());
        }
    }

    let baseline_endpoints: BTreeSet<&String> = baseline_claims.keys().collect();
    for (key, link) in actual {
        if baseline.contains_key(&key) {
            continue;
        }
        let moved = link
            .endpoints()
            .iter()
            .any(|ep| baseline_endpoints.contains(&ep.to_string()));
        if moved {
            diff.rewired.insert(key.clone(), link.clone());
        }
        diff.new.insert(key, link);
    }

    diff
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn keys<V>(map: &BTreeMap<String, V>) -> Vec<&str> {
        map.keys().map(String::as_str).collect()
    }

    #[test]
    fn canonical_identity_ignores_direction() {
        let cases = [
            ("192.168.127.1", 1, "192.168.127.2", 1),
            ("192.168.127.9", 3, "192.168.127.10", 7),
            ("10.0.0.1", 5, "10.0.0.1", 2),
            ("fe80::1", 1, "192.168.1.1", 2),
            ("", 1, "192.168.130.1", 1),
            ("garbage", 4, "also-garbage", 4),
        ];
        for (ip1, p1, ip2, p2) in cases {
            assert_eq!(
                DiffLink::new(ip1, p1, ip2, p2).to_string(),
                DiffLink::new(ip2, p2, ip1, p1).to_string(),
                "{ip1}:{p1} / {ip2}:{p2}"
            );
        }
    }

    #[test]
    fn smaller_address_is_endpoint_one() {
        // Byte order, not string order: .9 < .10
        let link = DiffLink::new("192.168.127.10", 1, "192.168.127.9", 2);
        assert_eq!(link.to_string(), "192.168.127.9:2-192.168.127.10:1");

        let mixed = DiffLink::new("fe80::1", 1, "192.168.1.1", 2);
        assert_eq!(mixed.from_endpoint().ip, "192.168.1.1");
    }

    #[test]
    fn peer_of_returns_opposite_end() {
        let link = DiffLink::new("10.0.0.2", 2, "10.0.0.1", 1);
        let a = Endpoint::new("10.0.0.1", 1);
        let b = Endpoint::new("10.0.0.2", 2);
        assert_eq!(link.peer_of(&a), Some(&b));
        assert_eq!(link.peer_of(&b), Some(&a));
        assert_eq!(link.peer_of(&Endpoint::new("10.0.0.3", 1)), None);
    }

    #[test]
    fn validation_reasons() {
        assert_eq!(
            DiffLink::new("", 1, "192.168.130.1", 1).validate(),
            Err(InvalidReason::InvalidIpFormat)
        );
        assert_eq!(
            DiffLink::new("192.168.130.2", 1, "192.168.130.2", 2).validate(),
            Err(InvalidReason::SameIp)
        );
        assert_eq!(
            DiffLink::new("192.168.130.4", 0, "192.168.130.5", 1).validate(),
            Err(InvalidReason::InvalidPort)
        );
        assert!(DiffLink::new("2001:db8::1", 1, "2001:db8::2", 1).is_valid());
    }

    fn fixture() -> LinkDiff {
        let baseline = vec![
            DiffLink::new("192.168.127.1", 1, "192.168.127.2", 1),
            DiffLink::new("192.168.127.2", 2, "192.168.127.3", 2),
            DiffLink::new("192.168.127.3", 3, "192.168.127.4", 3),
            // invalid
            DiffLink::new("", 1, "192.168.130.1", 1),
            DiffLink::new("192.168.130.2", 1, "192.168.130.2", 1),
            DiffLink::new("invalidBaselineIP", 1, "192.168.130.3", 1),
            DiffLink::new("192.168.130.4", 0, "192.168.130.4", 1),
        ];
        let actual = vec![
            DiffLink::new("192.168.127.1", 1, "192.168.127.2", 1),
            DiffLink::new("192.168.127.2", 2, "192.168.127.3", 8),
            DiffLink::new("192.168.127.4", 4, "192.168.127.5", 4),
            // invalid
            DiffLink::new("", 1, "192.168.140.1", 1),
            DiffLink::new("192.168.140.2", 4, "192.168.140.2", 1),
            DiffLink::new("invalidActualIP", 4, "192.168.127.3", 4),
            DiffLink::new("192.168.140.4", 0, "192.168.140.4", 4),
        ];
        compute_link_diff(baseline, actual)
    }

    #[test]
    fn classifies_fixture_topology() {
        let diff = fixture();
        assert_eq!(keys(&diff.unchanged), vec!["192.168.127.1:1-192.168.127.2:1"]);
        assert_eq!(
            keys(&diff.removed),
            vec![
                "192.168.127.2:2-192.168.127.3:2",
                "192.168.127.3:3-192.168.127.4:3"
            ]
        );
        assert_eq!(
            keys(&diff.new),
            vec![
                "192.168.127.2:2-192.168.127.3:8",
                "192.168.127.4:4-192.168.127.5:4"
            ]
        );
        assert_eq!(keys(&diff.rewired), vec!["192.168.127.2:2-192.168.127.3:8"]);
    }

    #[test]
    fn invalid_links_are_reported_per_source_and_excluded() {
        let diff = fixture();
        assert_eq!(diff.invalid_baseline.len(), 4);
        assert_eq!(diff.invalid_actual.len(), 4);

        let reasons: Vec<InvalidReason> =
            diff.invalid_actual.values().map(|l| l.reason).collect();
        assert!(reasons.contains(&InvalidReason::InvalidIpFormat));
        assert!(reasons.contains(&InvalidReason::SameIp));
        assert!(reasons.contains(&InvalidReason::InvalidPort));

        // `invalidActualIP` touches 192.168.127.3:4, which must not leak into `new`.
        assert_eq!(diff.new.len() + diff.unchanged.len(), 3);
        for key in diff.invalid_actual.keys() {
            assert!(!diff.new.contains_key(key));
            assert!(!diff.unchanged.contains_key(key));
        }
    }

    #[test]
    fn port_conflicts_list_every_claimant() {
        let baseline = vec![
            DiffLink::new("10.0.0.1", 1, "10.0.0.2", 1),
            DiffLink::new("10.0.0.1", 1, "10.0.0.3", 1),
        ];
        let actual = vec![DiffLink::new("10.0.0.1", 2, "10.0.0.2", 2)];
        let diff = compute_link_diff(baseline, actual);

        let claimants = diff.baseline_port_conflicts.get("10.0.0.1:1").map(Vec::len);
        assert_eq!(claimants, Some(2));
        assert!(diff.actual_port_conflicts.is_empty());
    }

    #[test]
    fn new_link_on_free_ports_is_not_rewired() {
        let diff = compute_link_diff(
            vec![DiffLink::new("10.0.0.1", 1, "10.0.0.2", 1)],
            vec![DiffLink::new("10.0.0.3", 1, "10.0.0.4", 1)],
        );
        assert_eq!(diff.new.len(), 1);
        assert!(diff.rewired.is_empty());
    }
}
