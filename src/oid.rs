//! OID parsing and a best-effort name resolver
//!
//! The resolver knows the MIB-2 system group, a handful of interface columns
//! and the transmitter telemetry objects understood by the normalizer. It is
//! a convenience for logs and the test-device response, not a MIB compiler.

use crate::poller::normalizer::MetricKind;
use crate::snmp::SnmpError;

/// Well-known object prefixes (without instance suffix)
const KNOWN_OBJECTS: &[(&str, &str)] = &[
    ("1.3.6.1.2.1.1.1", "sysDescr"),
    ("1.3.6.1.2.1.1.2", "sysObjectID"),
    ("1.3.6.1.2.1.1.3", "sysUpTime"),
    ("1.3.6.1.2.1.1.4", "sysContact"),
    ("1.3.6.1.2.1.1.5", "sysName"),
    ("1.3.6.1.2.1.1.6", "sysLocation"),
    ("1.3.6.1.2.1.1.7", "sysServices"),
    ("1.3.6.1.2.1.2.1", "ifNumber"),
    ("1.3.6.1.2.1.2.2.1.2", "ifDescr"),
    ("1.3.6.1.2.1.2.2.1.8", "ifOperStatus"),
];

/// Parse a dotted-numeric OID such as `1.3.6.1.2.1.1.3.0`
///
/// A single leading dot is tolerated. At least two arcs are required.
pub fn parse_oid(s: &str) -> Result<Vec<u64>, SnmpError> {
    let trimmed = s.trim();
    let body = trimmed.strip_prefix('.').unwrap_or(trimmed);

    if body.is_empty() {
        return Err(SnmpError::InvalidOid(format!("empty OID '{s}'")));
    }

    let arcs = body
        .split('.')
        .map(|part| part.parse::<u64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| SnmpError::InvalidOid(format!("invalid OID '{s}': {e}")))?;

    if arcs.len() < 2 {
        return Err(SnmpError::InvalidOid(format!(
            "OID '{s}' needs at least two arcs"
        )));
    }

    Ok(arcs)
}

/// Normalize an OID string to its canonical dotted form
pub fn canonical(s: &str) -> String {
    let trimmed = s.trim();
    trimmed.strip_prefix('.').unwrap_or(trimmed).to_string()
}

/// Resolve a symbolic name for an OID, if one is known
///
/// Exact transmitter telemetry OIDs resolve to their metric name. Other OIDs
/// resolve by the longest known object prefix, with the instance suffix
/// appended (`sysUpTime.0`, `ifDescr.3`).
pub fn resolve_name(oid: &str) -> Option<String> {
    let oid = canonical(oid);

    if let Some(kind) = MetricKind::from_oid(&oid) {
        return Some(kind.name().to_string());
    }

    KNOWN_OBJECTS
        .iter()
        .filter(|(prefix, _)| {
            oid.len() > prefix.len()
                && oid.starts_with(prefix)
                && oid.as_bytes()[prefix.len()] == b'.'
        })
        .max_by_key(|(prefix, _)| prefix.len())
        .map(|(prefix, name)| format!("{name}{}", &oid[prefix.len()..]))
}
