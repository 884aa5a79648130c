//! Deterministic entry encoding and chain digests.
//!
//! The canonical form is a byte string, not JSON text: a magic prefix, then
//! every hashed field in a fixed order as `name` followed by a tag. Absent
//! optionals carry tag `0x00`; present values carry `0x01` and a
//! length-prefixed body. An empty string and a missing value therefore
//! never encode alike, and a JSON `null` payload differs from no payload.
//!
//! JSON payloads are rendered with object keys sorted at every depth, so the
//! encoding does not depend on how a caller built its maps.

use custody_core::entities::AuditEntry;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::AuditError;
use crate::helpers::format_datetime;

/// Leading bytes of every canonical encoding.
const MAGIC: &[u8] = b"custody.entry.v1\0";

/// Deepest JSON nesting accepted in a payload.
pub const MAX_JSON_DEPTH: usize = 64;

const ABSENT: u8 = 0x00;
const PRESENT: u8 = 0x01;

/// Render `value` as canonical JSON: no whitespace, object keys sorted.
///
/// # Errors
///
/// Returns `AuditError::Encoding` when nesting exceeds [`MAX_JSON_DEPTH`].
pub fn canonical_json(value: &Value) -> Result<String, AuditError> {
    let mut out = String::new();
    write_json(value, 0, &mut out)?;
    Ok(out)
}

fn write_json(value: &Value, depth: usize, out: &mut String) -> Result<(), AuditError> {
    if depth > MAX_JSON_DEPTH {
        return Err(AuditError::Encoding(format!(
            "payload nesting exceeds {MAX_JSON_DEPTH} levels"
        )));
    }
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => push_json_string(s, out)?,
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_json(item, depth + 1, out)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort_unstable();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                push_json_string(key, out)?;
                out.push(':');
                write_json(&map[key.as_str()], depth + 1, out)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

fn push_json_string(s: &str, out: &mut String) -> Result<(), AuditError> {
    let quoted = serde_json::to_string(s).map_err(|e| AuditError::Encoding(e.to_string()))?;
    out.push_str(&quoted);
    Ok(())
}

/// Check an entry's payloads before any lock is taken.
///
/// Returns the combined canonical size in bytes.
///
/// # Errors
///
/// Returns `AuditError::Encoding` when a payload is too deep or the combined
/// canonical size exceeds `max_bytes`.
pub fn check_payloads(payloads: &[Option<&Value>], max_bytes: usize) -> Result<usize, AuditError> {
    let mut total = 0usize;
    for value in payloads.iter().flatten() {
        total += canonical_json(value)?.len();
    }
    if total > max_bytes {
        return Err(AuditError::Encoding(format!(
            "payload is {total} bytes, limit is {max_bytes}"
        )));
    }
    Ok(total)
}

/// Canonical bytes of every hashed field of `entry`.
///
/// `prev_hash` and `hash` are excluded: the previous hash enters through
/// [`digest`], and the entry's own hash is the output.
///
/// # Errors
///
/// Returns `AuditError::Encoding` when a payload cannot be canonicalized.
pub fn canonicalize(entry: &AuditEntry) -> Result<Vec<u8>, AuditError> {
    let mut enc = Encoder::default();
    enc.text("entry_id", Some(entry.entry_id.as_str()));
    enc.text("tenant_id", entry.tenant_id.as_deref());
    enc.text("scope", Some(entry.scope.as_str()));
    enc.text("action", Some(entry.action.as_str()));
    enc.text("action_kind", Some(entry.action_kind.as_str()));
    enc.text("sensitivity_level", Some(entry.sensitivity_level.as_str()));
    enc.text("actor_id", Some(entry.actor_id.as_str()));
    enc.text("actor_role", Some(entry.actor_role.as_str()));
    enc.text("auth_method", Some(entry.auth_method.as_str()));
    enc.text("resource_type", Some(entry.resource_type.as_str()));
    enc.text("resource_id", entry.resource_id.as_deref());
    enc.json("context", entry.context.as_ref())?;
    enc.json("before", entry.before.as_ref())?;
    enc.json("after", entry.after.as_ref())?;
    enc.text("created_at", Some(format_datetime(&entry.created_at).as_str()));
    Ok(enc.finish())
}

/// `SHA-256(prev_hash bytes || canonical)` as lowercase hex.
///
/// # Errors
///
/// Returns `AuditError::Encoding` if `prev_hash` is not 32 bytes of hex.
pub fn digest(prev_hash: &str, canonical: &[u8]) -> Result<String, AuditError> {
    let prev = hex::decode(prev_hash)
        .map_err(|e| AuditError::Encoding(format!("prev_hash is not hex: {e}")))?;
    if prev.len() != 32 {
        return Err(AuditError::Encoding(format!(
            "prev_hash must be 32 bytes, got {}",
            prev.len()
        )));
    }
    let mut hasher = Sha256::new();
    hasher.update(&prev);
    hasher.update(canonical);
    Ok(hex::encode(hasher.finalize()))
}

/// Hash of `entry` recomputed from its stored fields and stored `prev_hash`.
///
/// # Errors
///
/// Returns `AuditError::Encoding` if the entry cannot be canonicalized.
pub fn entry_hash(entry: &AuditEntry) -> Result<String, AuditError> {
    digest(&entry.prev_hash, &canonicalize(entry)?)
}

#[derive(Default)]
struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn field(&mut self, name: &str, body: Option<&[u8]>) {
        if self.buf.is_empty() {
            self.buf.extend_from_slice(MAGIC);
        }
        self.len_prefixed(name.as_bytes());
        match body {
            None => self.buf.push(ABSENT),
            Some(bytes) => {
                self.buf.push(PRESENT);
                self.len_prefixed(bytes);
            }
        }
    }

    fn len_prefixed(&mut self, bytes: &[u8]) {
        // Fields are bounded by the payload limit, far below u32::MAX.
        let len = u32::try_from(bytes.len()).unwrap_or(u32::MAX);
        self.buf.extend_from_slice(&len.to_be_bytes());
        self.buf.extend_from_slice(bytes);
    }

    fn text(&mut self, name: &str, value: Option<&str>) {
        self.field(name, value.map(str::as_bytes));
    }

    fn json(&mut self, name: &str, value: Option<&Value>) -> Result<(), AuditError> {
        let rendered = value.map(canonical_json).transpose()?;
        self.field(name, rendered.as_deref().map(str::as_bytes));
        Ok(())
    }

    fn finish(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use custody_core::entities::SENTINEL_HASH;
    use custody_core::enums::{ActionKind, AuditScope, Sensitivity};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use serde_json::json;

    use super::*;

    fn entry() -> AuditEntry {
        AuditEntry {
            entry_id: "aud-1".into(),
            tenant_id: Some("t-1".into()),
            scope: AuditScope::Admin,
            action: "booking.cancel".into(),
            action_kind: ActionKind::Write,
            sensitivity_level: Sensitivity::High,
            actor_id: "u-1".into(),
            actor_role: "admin".into(),
            auth_method: "password".into(),
            resource_type: "booking".into(),
            resource_id: Some("b-9".into()),
            context: Some(json!({"ip": "10.0.0.1"})),
            before: Some(json!({"status": "confirmed"})),
            after: Some(json!({"status": "cancelled"})),
            created_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
            prev_hash: SENTINEL_HASH.into(),
            hash: String::new(),
        }
    }

    #[test]
    fn canonical_json_sorts_keys_at_every_depth() {
        let a: Value = serde_json::from_str(r#"{"b":1,"a":{"y":[{"q":1,"p":2}],"x":null}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":{"x":null,"y":[{"p":2,"q":1}]},"b":1}"#).unwrap();
        assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
        assert_eq!(
            canonical_json(&a).unwrap(),
            r#"{"a":{"x":null,"y":[{"p":2,"q":1}]},"b":1}"#
        );
    }

    #[test]
    fn canonical_json_escapes_strings() {
        let v = json!({"k\"ey": "line\nbreak"});
        assert_eq!(canonical_json(&v).unwrap(), r#"{"k\"ey":"line\nbreak"}"#);
    }

    #[test]
    fn canonicalization_is_order_independent() {
        let mut reordered = entry();
        reordered.context = Some(
            serde_json::from_str(r#"{"z": true, "ip": "10.0.0.1", "a": [1, 2]}"#).unwrap(),
        );
        let mut original = entry();
        original.context = Some(
            serde_json::from_str(r#"{"a": [1, 2], "ip": "10.0.0.1", "z": true}"#).unwrap(),
        );
        assert_eq!(
            canonicalize(&reordered).unwrap(),
            canonicalize(&original).unwrap()
        );
    }

    #[test]
    fn absent_differs_from_empty_and_null() {
        let mut absent = entry();
        absent.resource_id = None;
        let mut empty = entry();
        empty.resource_id = Some(String::new());
        assert_ne!(canonicalize(&absent).unwrap(), canonicalize(&empty).unwrap());

        let mut no_payload = entry();
        no_payload.before = None;
        let mut null_payload = entry();
        null_payload.before = Some(Value::Null);
        assert_ne!(
            canonicalize(&no_payload).unwrap(),
            canonicalize(&null_payload).unwrap()
        );
    }

    #[test]
    fn field_boundaries_are_unambiguous() {
        let mut a = entry();
        a.actor_id = "u-1a".into();
        a.actor_role = "dmin".into();
        let mut b = entry();
        b.actor_id = "u-1".into();
        b.actor_role = "admin".into();
        assert_ne!(canonicalize(&a).unwrap(), canonicalize(&b).unwrap());
    }

    #[rstest]
    #[case::action(|e: &mut AuditEntry| e.action = "booking.refund".into())]
    #[case::tenant(|e: &mut AuditEntry| e.tenant_id = None)]
    #[case::payload(|e: &mut AuditEntry| e.after = Some(json!({"status": "open"})))]
    #[case::timestamp(|e: &mut AuditEntry| e.created_at += chrono::Duration::microseconds(1))]
    #[case::sensitivity(|e: &mut AuditEntry| e.sensitivity_level = Sensitivity::Low)]
    fn every_field_changes_the_hash(#[case] mutate: fn(&mut AuditEntry)) {
        let original = entry_hash(&entry()).unwrap();
        let mut changed = entry();
        mutate(&mut changed);
        assert_ne!(entry_hash(&changed).unwrap(), original);
    }

    #[test]
    fn digest_depends_on_prev_hash() {
        let bytes = canonicalize(&entry()).unwrap();
        let a = digest(SENTINEL_HASH, &bytes).unwrap();
        let b = digest(&"ab".repeat(32), &bytes).unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn digest_rejects_malformed_prev_hash() {
        assert!(matches!(digest("xyz", b""), Err(AuditError::Encoding(_))));
        assert!(matches!(digest("abcd", b""), Err(AuditError::Encoding(_))));
    }

    #[test]
    fn depth_limit_is_enforced() {
        let mut deep = json!(1);
        for _ in 0..=MAX_JSON_DEPTH {
            deep = json!([deep]);
        }
        assert!(matches!(canonical_json(&deep), Err(AuditError::Encoding(_))));

        let mut ok = json!(1);
        for _ in 0..MAX_JSON_DEPTH {
            ok = json!([ok]);
        }
        assert!(canonical_json(&ok).is_ok());
    }

    #[test]
    fn payload_size_limit_is_enforced() {
        let big = json!({"blob": "x".repeat(100)});
        assert!(check_payloads(&[Some(&big)], 1024).is_ok());
        let err = check_payloads(&[Some(&big), Some(&big)], 150).unwrap_err();
        assert!(err.to_string().contains("limit is 150"), "{err}");
        assert_eq!(check_payloads(&[None, None], 0).unwrap(), 0);
    }
}
