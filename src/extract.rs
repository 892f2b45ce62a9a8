use serde_json::Value;

/// Field the API normally stores the ranking list under.
pub const CANONICAL_FIELD: &str = "team_ranking_data";

/// Keys that mark a list element as a plausible ranking record when the
/// canonical field is absent or the payload carries extra list fields.
pub const MARKER_KEYS: &[&str] = &["name", "id", "team", "rank"];

type Strategy = fn(&Value) -> Option<Vec<Value>>;

/// Extraction strategies in priority order. Results are unioned: a payload
/// where both the canonical field and another marker-matching list field are
/// present feeds both into the same aggregate (identity collisions are left
/// for the ingestion pipeline's dedup to resolve).
const STRATEGIES: &[Strategy] = &[canonical_list, marker_sniff];

/// Pull the ranking records out of one page payload.
///
/// Tolerates payloads with no matching field (empty result) and malformed or
/// heterogeneous list contents (non-object elements dropped).
pub fn extract_records(payload: &Value) -> Vec<Value> {
    let mut records = Vec::new();
    for strategy in STRATEGIES {
        if let Some(found) = strategy(payload) {
            records.extend(found);
        }
    }
    records
}

fn canonical_list(payload: &Value) -> Option<Vec<Value>> {
    let list = payload.get(CANONICAL_FIELD)?.as_array()?;
    Some(only_objects(list))
}

fn marker_sniff(payload: &Value) -> Option<Vec<Value>> {
    let obj = payload.as_object()?;
    let mut found = Vec::new();

    for (key, value) in obj {
        if key == CANONICAL_FIELD {
            continue;
        }
        let Some(list) = value.as_array() else {
            continue;
        };
        let Some(first) = list.first().and_then(Value::as_object) else {
            continue;
        };
        if MARKER_KEYS.iter().any(|k| first.contains_key(*k)) {
            found.extend(only_objects(list));
        }
    }

    if found.is_empty() {
        None
    } else {
        Some(found)
    }
}

fn only_objects(list: &[Value]) -> Vec<Value> {
    list.iter().filter(|v| v.is_object()).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_field() {
        let payload = json!({
            "pagination": {"total_pages": 3},
            "team_ranking_data": [{"id": 1, "team_name": "Strikers"}],
        });
        let records = extract_records(&payload);
        assert_eq!(records, vec![json!({"id": 1, "team_name": "Strikers"})]);
    }

    #[test]
    fn marker_fallback_without_canonical_field() {
        let payload = json!({"foo": [{"id": 1, "name": "A"}]});
        assert_eq!(extract_records(&payload), vec![json!({"id": 1, "name": "A"})]);
    }

    #[test]
    fn non_mapping_elements_do_not_match() {
        let payload = json!({"bar": [1, 2, 3]});
        assert!(extract_records(&payload).is_empty());
    }

    #[test]
    fn unions_canonical_and_sniffed_fields() {
        let payload = json!({
            "team_ranking_data": [{"id": 1}],
            "state_ranking_data": [{"rank": 4, "id": 2}],
        });
        let records = extract_records(&payload);
        assert_eq!(records.len(), 2);
        assert!(records.contains(&json!({"id": 1})));
        assert!(records.contains(&json!({"rank": 4, "id": 2})));
    }

    #[test]
    fn heterogeneous_list_drops_malformed_elements() {
        let payload = json!({"foo": [{"id": 1}, "junk", 7, {"id": 2}]});
        let records = extract_records(&payload);
        assert_eq!(records, vec![json!({"id": 1}), json!({"id": 2})]);
    }

    #[test]
    fn empty_list_and_unmarked_objects_yield_nothing() {
        assert!(extract_records(&json!({"foo": []})).is_empty());
        assert!(extract_records(&json!({"foo": [{"color": "red"}]})).is_empty());
        assert!(extract_records(&json!({"pagination": {"total_pages": 1}})).is_empty());
        assert!(extract_records(&json!("not an object")).is_empty());
    }

    #[test]
    fn sample_page_fixture() {
        let raw = std::fs::read_to_string("tests/fixtures/sample_page.json").unwrap();
        let payload: Value = serde_json::from_str(&raw).unwrap();
        let records = extract_records(&payload);
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.get("id").is_some()));
    }
}
