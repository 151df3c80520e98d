//! Resolves the configured JSON paths of a feed against one response body.

use crate::config::StoreMapping;
use crate::error::FeedError;
use serde_json::Value;

/// A value extracted from a feed response, classified by the shape of the
/// underlying JSON node. Arrays become `List`, everything else `Scalar` —
/// this classification, not the mapping's declared `is_list` flag, decides
/// how the value store writes it.
#[derive(Debug, Clone, PartialEq)]
pub enum Extracted {
    Scalar(Value),
    List(Vec<Value>),
}

/// Resolves every mapping path against the body in a single parse.
///
/// A path matching nothing yields `Scalar(Value::Null)` rather than an
/// error; all mappings see a consistent snapshot of the one response body.
pub fn extract_many(
    body: &[u8],
    mappings: &[StoreMapping],
) -> Result<Vec<(String, Extracted)>, FeedError> {
    let root: Value =
        serde_json::from_slice(body).map_err(|e| FeedError::InvalidBody(e.to_string()))?;

    Ok(mappings
        .iter()
        .map(|m| (m.name.clone(), classify(lookup_path(&root, &m.path))))
        .collect())
}

/// Walks a dot-separated path of object keys and numeric array indices.
/// An empty path addresses the root node itself (top-level array responses).
fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(root);
    }
    let mut node = root;
    for segment in path.split('.') {
        node = match node {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(node)
}

fn classify(node: Option<&Value>) -> Extracted {
    match node {
        Some(Value::Array(items)) => Extracted::List(items.clone()),
        Some(value) => Extracted::Scalar(value.clone()),
        None => Extracted::Scalar(Value::Null),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn mapping(name: &str, path: &str) -> StoreMapping {
        StoreMapping {
            name: name.to_string(),
            path: path.to_string(),
            is_list: false,
            window_size: None,
        }
    }

    #[test]
    fn extracts_scalars_and_lists_from_one_body() {
        let body = br#"{"a": 1, "b": [1, 2, 3, 4, 5]}"#;
        let mappings = [mapping("a", "a"), mapping("b", "b")];

        let results = extract_many(body, &mappings).unwrap();
        assert_eq!(results[0], ("a".to_string(), Extracted::Scalar(json!(1))));
        assert_eq!(
            results[1],
            (
                "b".to_string(),
                Extracted::List(vec![json!(1), json!(2), json!(3), json!(4), json!(5)])
            )
        );
    }

    #[test]
    fn walks_nested_paths_and_array_indices() {
        let body = br#"{"main": {"temp": 21.5}, "hourly": [{"temp": 20}, {"temp": 22}]}"#;
        let mappings = [mapping("temp", "main.temp"), mapping("later", "hourly.1.temp")];

        let results = extract_many(body, &mappings).unwrap();
        assert_eq!(results[0].1, Extracted::Scalar(json!(21.5)));
        assert_eq!(results[1].1, Extracted::Scalar(json!(22)));
    }

    #[test]
    fn missing_path_yields_null_scalar_not_error() {
        let body = br#"{"a": 1}"#;
        let mappings = [
            mapping("gone", "b.c.d"),
            mapping("index", "a.3"),
            mapping("deep", "a.b"),
        ];

        let results = extract_many(body, &mappings).unwrap();
        for (_, extracted) in results {
            assert_eq!(extracted, Extracted::Scalar(Value::Null));
        }
    }

    #[test]
    fn empty_path_addresses_the_root() {
        let body = br#"[10, 20, 30]"#;
        let results = extract_many(body, &[mapping("top", "")]).unwrap();
        assert_eq!(
            results[0].1,
            Extracted::List(vec![json!(10), json!(20), json!(30)])
        );
    }

    #[test]
    fn invalid_body_is_an_error() {
        let err = extract_many(b"not json", &[mapping("a", "a")]).unwrap_err();
        assert!(matches!(err, FeedError::InvalidBody(_)));
    }

    #[test]
    fn shape_is_decided_by_the_response_not_the_flag() {
        // Declared non-list, but the path resolves to an array.
        let body = br#"{"vals": [7, 8]}"#;
        let results = extract_many(body, &[mapping("vals", "vals")]).unwrap();
        assert_eq!(results[0].1, Extracted::List(vec![json!(7), json!(8)]));
    }
}
