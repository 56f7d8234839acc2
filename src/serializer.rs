//! Bounded, total serialization of arbitrary service-supplied documents.
//!
//! Service stats, error context, and event payloads all originate from
//! third-party `ServiceContract` implementations the orchestrator does not
//! control. This module guarantees that turning any such value into JSON for
//! the control surface or realtime bus never panics, never loops forever on a
//! cyclic structure, and never produces an unbounded payload (design §4.2).

use serde_json::{Map, Value};

/// Maximum nesting depth before a subtree is replaced with the simplified
/// sentinel. Chosen generously above any legitimate stats document.
const MAX_DEPTH: usize = 8;

/// Soft byte budget for the serialized output. Enforced by truncating array
/// and object fan-out once the running estimate exceeds this, not by slicing
/// the final string (which could produce invalid JSON).
const MAX_BYTES: usize = 50_000;

/// Maximum element count kept from any single array or object before the
/// remainder is summarized. Keeps the "noisy services" case (one service
/// reporting thousands of history entries) from dominating the budget.
const MAX_FANOUT: usize = 100;

/// Sentinel placed wherever a value was too deep, too large, or otherwise
/// unrepresentable to serialize faithfully.
fn simplified_object(reason: &str) -> Value {
    let mut map = Map::new();
    map.insert("__simplified".to_string(), Value::Bool(true));
    map.insert("reason".to_string(), Value::String(reason.to_string()));
    Value::Object(map)
}

struct Budget {
    remaining: usize,
}

impl Budget {
    fn new() -> Self {
        Self { remaining: MAX_BYTES }
    }

    /// Rough, conservative size estimate; cheaper than serializing to count
    /// bytes, and erring toward truncating early is harmless here.
    fn charge(&mut self, estimate: usize) -> bool {
        if estimate > self.remaining {
            self.remaining = 0;
            false
        } else {
            self.remaining -= estimate;
            true
        }
    }
}

/// Sanitize an arbitrary JSON value into one safe to hand to `serde_json` for
/// transport, bounding depth, fan-out, and total size. Never returns an
/// error: unrepresentable subtrees are replaced by a [`simplified_object`]
/// sentinel rather than failing the whole document.
pub fn safe_serialize(value: &Value) -> Value {
    let mut budget = Budget::new();
    sanitize(value, 0, &mut budget)
}

fn sanitize(value: &Value, depth: usize, budget: &mut Budget) -> Value {
    if depth >= MAX_DEPTH {
        return simplified_object("max depth exceeded");
    }
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => value.clone(),
        Value::String(s) => {
            if !budget.charge(s.len() + 2) {
                simplified_object("size budget exceeded")
            } else {
                Value::String(s.clone())
            }
        }
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len().min(MAX_FANOUT));
            for (i, item) in items.iter().enumerate() {
                if i >= MAX_FANOUT {
                    out.push(simplified_object(&format!(
                        "{} more elements omitted",
                        items.len() - MAX_FANOUT
                    )));
                    break;
                }
                if !budget.charge(16) {
                    out.push(simplified_object("size budget exceeded"));
                    break;
                }
                out.push(sanitize(item, depth + 1, budget));
            }
            Value::Array(out)
        }
        Value::Object(map) => {
            let mut out = Map::new();
            for (i, (k, v)) in map.iter().enumerate() {
                if i >= MAX_FANOUT {
                    out.insert(
                        "__truncated".to_string(),
                        Value::String(format!("{} more keys omitted", map.len() - MAX_FANOUT)),
                    );
                    break;
                }
                if !budget.charge(k.len() + 8) {
                    out.insert(k.clone(), simplified_object("size budget exceeded"));
                    break;
                }
                out.insert(k.clone(), sanitize(v, depth + 1, budget));
            }
            Value::Object(out)
        }
    }
}

/// Minimal digest for a single service's stats, used by the "noisy services"
/// fast path: a service whose serialized stats repeatedly blow the budget is
/// reported by name, layer, and breaker status only, skipping the full walk.
pub fn noisy_service_digest(name: &str, layer: &str, status: &str) -> Value {
    serde_json::json!({
        "name": name,
        "layer": layer,
        "circuit_breaker_status": status,
        "__simplified": true,
        "reason": "stats exceed safe serialization budget",
    })
}

/// True if serializing `value` the normal way would trip the byte budget,
/// used by callers deciding whether to fall back to [`noisy_service_digest`]
/// instead of paying for the full sanitize pass.
pub fn exceeds_budget(value: &Value) -> bool {
    serde_json::to_string(value).map(|s| s.len() > MAX_BYTES).unwrap_or(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn shallow_document_passes_through_unchanged() {
        let doc = json!({ "a": 1, "b": [1, 2, 3], "c": "ok" });
        assert_eq!(safe_serialize(&doc), doc);
    }

    #[test]
    fn deeply_nested_document_is_simplified_at_max_depth() {
        let mut doc = json!("leaf");
        for _ in 0..(MAX_DEPTH + 5) {
            doc = json!({ "nested": doc });
        }
        let result = safe_serialize(&doc);
        // Walk down until we hit the simplified sentinel; it must appear
        // before depth becomes unbounded.
        let mut cursor = &result;
        let mut depth = 0;
        loop {
            match cursor {
                Value::Object(map) if map.contains_key("__simplified") => break,
                Value::Object(map) => {
                    cursor = map.get("nested").expect("nested key present");
                    depth += 1;
                    assert!(depth <= MAX_DEPTH + 1, "sanitize did not bound depth");
                }
                other => panic!("unexpected leaf before sentinel: {other:?}"),
            }
        }
    }

    #[test]
    fn oversized_array_is_truncated_with_a_marker() {
        let items: Vec<Value> = (0..(MAX_FANOUT + 50)).map(Value::from).collect();
        let doc = json!(items);
        let result = safe_serialize(&doc);
        let arr = result.as_array().unwrap();
        assert_eq!(arr.len(), MAX_FANOUT + 1);
        assert!(arr.last().unwrap().get("__simplified").is_some());
    }

    #[test]
    fn safe_serialize_never_panics_on_cyclic_shaped_depth() {
        // JSON values can't literally cycle, but a service can emit a document
        // that repeats a large subtree at every level; this should still
        // terminate and stay within the depth bound.
        let leaf = json!({ "x": "y".repeat(1000) });
        let mut doc = leaf.clone();
        for _ in 0..20 {
            doc = json!({ "child": doc, "sibling": leaf.clone() });
        }
        let result = safe_serialize(&doc);
        assert!(serde_json::to_vec(&result).unwrap().len() <= MAX_BYTES * 2);
    }

    #[test]
    fn sanitize_is_idempotent() {
        let doc = json!({ "a": [1, 2, 3], "b": { "c": "d" } });
        let once = safe_serialize(&doc);
        let twice = safe_serialize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn noisy_service_digest_is_small_and_tagged() {
        let digest = noisy_service_digest("wallet-sync", "wallet", "open");
        assert_eq!(digest["name"], "wallet-sync");
        assert_eq!(digest["__simplified"], true);
    }
}
