//! Normalization of ledger query payloads.
//!
//! [`decode_records`] reports exactly why a payload is unusable.
//! [`parse_records`] is the total counterpart used by the gateway: it maps
//! every [`MalformedPayload`] to an empty list and logs a warning.
//! [`parse_record`] does the same for single-record queries.
//!
//! This is the only place in the crate where a failure is turned into a
//! value. Transport and chaincode failures of a query still propagate as
//! [`FabricError::LedgerRead`](crate::FabricError::LedgerRead); only
//! payloads that arrived but cannot be read as a list are absorbed.

use serde_json::Value;
use thiserror::Error;

/// Why a payload could not be read as a list of records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedPayload {
    /// The bytes are not valid JSON.
    #[error("payload is not valid JSON: {0}")]
    Undecodable(String),

    /// The payload is valid JSON but not an array. `null` lands here.
    #[error("payload is a JSON {found}, not an array")]
    NotASequence {
        /// JSON type that was found.
        found: &'static str,
    },
}

/// Decodes `bytes` as an ordered list of records.
///
/// # Errors
///
/// Returns [`MalformedPayload`] if the bytes are not JSON or not an array.
pub fn decode_records(bytes: &[u8]) -> Result<Vec<Value>, MalformedPayload> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| MalformedPayload::Undecodable(e.to_string()))?;
    match value {
        Value::Array(records) => Ok(records),
        other => Err(MalformedPayload::NotASequence { found: json_type(&other) }),
    }
}

/// Decodes `bytes` as an ordered list of records, never failing.
///
/// Malformed payloads yield an empty list.
#[must_use]
pub fn parse_records(bytes: &[u8]) -> Vec<Value> {
    match decode_records(bytes) {
        Ok(records) => records,
        Err(reason) => {
            tracing::warn!(
                %reason,
                payload_len = bytes.len(),
                "malformed ledger payload, returning empty result"
            );
            Vec::new()
        },
    }
}

/// Decodes `bytes` as a single record, never failing.
///
/// Anything other than a JSON object yields `None`.
#[must_use]
pub fn parse_record(bytes: &[u8]) -> Option<Value> {
    match serde_json::from_slice::<Value>(bytes) {
        Ok(record @ Value::Object(_)) => Some(record),
        Ok(other) => {
            tracing::warn!(
                found = json_type(&other),
                "ledger payload is not a record, returning none"
            );
            None
        },
        Err(e) => {
            tracing::warn!(
                error = %e,
                payload_len = bytes.len(),
                "malformed ledger payload, returning none"
            );
            None
        },
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_parse_examples() {
        assert!(parse_records(b"[]").is_empty());
        assert!(parse_records(b"not json").is_empty());
        assert!(parse_records(br#"{"a":1}"#).is_empty());
        assert_eq!(parse_records(br#"[{"id":"c1"}]"#), vec![json!({ "id": "c1" })]);
    }

    #[test]
    fn test_parse_preserves_order() {
        let records = parse_records(br#"[{"id":"c2"},{"id":"c1"},{"id":"c3"}]"#);
        let ids: Vec<_> = records.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, ["c2", "c1", "c3"]);
    }

    #[test]
    fn test_parse_never_panics_on_odd_bytes() {
        let inputs: [&[u8]; 7] =
            [b"", b"\xff\xfe", b"[", b"null", b"42", b"\"[]\"", b"  [ 1 , 2 ] "];
        for input in inputs {
            let _ = parse_records(input);
        }
        assert_eq!(parse_records(b"  [ 1 , 2 ] "), vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_parse_single_record() {
        assert_eq!(parse_record(br#"{"claimId":"c1"}"#), Some(json!({ "claimId": "c1" })));
        assert_eq!(parse_record(b""), None);
        assert_eq!(parse_record(b"null"), None);
        assert_eq!(parse_record(b"[]"), None);
    }

    #[test]
    fn test_decode_distinguishes_reasons() {
        assert!(matches!(decode_records(b"not json"), Err(MalformedPayload::Undecodable(_))));
        assert_eq!(decode_records(b"null"), Err(MalformedPayload::NotASequence { found: "null" }));
        assert_eq!(
            decode_records(br#"{"a":1}"#),
            Err(MalformedPayload::NotASequence { found: "object" })
        );
    }

    mod proptests {
        use proptest::prelude::*;

        use super::*;

        fn arb_record() -> impl Strategy<Value = Value> {
            proptest::collection::btree_map("[a-zA-Z]{1,8}", "[ -~]{0,16}", 0..6).prop_map(|m| {
                Value::Object(m.into_iter().map(|(k, v)| (k, Value::String(v))).collect())
            })
        }

        proptest! {
            /// Arbitrary bytes never make the parser fail or panic.
            #[test]
            fn parse_records_is_total(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
                let records = parse_records(&bytes);
                if decode_records(&bytes).is_err() {
                    prop_assert!(records.is_empty());
                }
            }

            /// A well-formed array yields every record, in order.
            #[test]
            fn parse_records_keeps_every_record(
                records in proptest::collection::vec(arb_record(), 0..20),
            ) {
                let payload = serde_json::to_vec(&records).expect("serialize");
                prop_assert_eq!(parse_records(&payload), records);
            }
        }
    }
}
