//! Composite IDs for sub-resources addressed by parent and name
//!
//! `loadBalancers/{id}/backendSets/{name}` style: key segments alternate
//! with values. Only `/` and `%` are escaped in values, so a backend named
//! `10.0.0.3:8080` reads the same in the id. Decoding accepts any
//! percent-escaping.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum IdError {
    #[error("ID '{id}' should have {expected} segments, found {found}")]
    SegmentCount {
        id: String,
        expected: usize,
        found: usize,
    },

    #[error("ID '{id}' has '{found}' where '{expected}' was expected")]
    UnexpectedKey {
        id: String,
        expected: String,
        found: String,
    },

    #[error("ID '{id}' has an empty value for '{key}'")]
    EmptyValue { id: String, key: String },

    #[error("ID '{id}' is not valid UTF-8 once unescaped")]
    Encoding { id: String },
}

fn escape(value: &str) -> String {
    value.replace('%', "%25").replace('/', "%2F")
}

pub fn encode(parts: &[(&str, &str)]) -> String {
    parts
        .iter()
        .map(|(key, value)| format!("{}/{}", key, escape(value)))
        .collect::<Vec<_>>()
        .join("/")
}

/// Values of `id` in the order of `keys`.
pub fn decode(id: &str, keys: &[&str]) -> Result<Vec<String>, IdError> {
    let segments: Vec<&str> = id.split('/').collect();
    if segments.len() != keys.len() * 2 {
        return Err(IdError::SegmentCount {
            id: id.to_string(),
            expected: keys.len() * 2,
            found: segments.len(),
        });
    }

    segments
        .chunks(2)
        .zip(keys)
        .map(|(pair, key)| {
            if pair[0] != *key {
                return Err(IdError::UnexpectedKey {
                    id: id.to_string(),
                    expected: key.to_string(),
                    found: pair[0].to_string(),
                });
            }
            if pair[1].is_empty() {
                return Err(IdError::EmptyValue {
                    id: id.to_string(),
                    key: key.to_string(),
                });
            }
            urlencoding::decode(pair[1])
                .map(|value| value.into_owned())
                .map_err(|_| IdError::Encoding { id: id.to_string() })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BACKEND_KEYS: [&str; 3] = ["loadBalancers", "backendSets", "backends"];

    #[test]
    fn backend_set_id_layout() {
        let id = encode(&[
            ("loadBalancers", "ocid1.loadbalancer.oc1..lb"),
            ("backendSets", "web"),
        ]);
        assert_eq!(id, "loadBalancers/ocid1.loadbalancer.oc1..lb/backendSets/web");
        assert_eq!(
            decode(&id, &["loadBalancers", "backendSets"]).unwrap(),
            vec!["ocid1.loadbalancer.oc1..lb", "web"]
        );
    }

    #[test]
    fn values_are_escaped() {
        let id = encode(&[
            ("loadBalancers", "lb1"),
            ("backendSets", "a/b"),
            ("backends", "10.0.0.3:8080"),
        ]);
        assert_eq!(id, "loadBalancers/lb1/backendSets/a%2Fb/backends/10.0.0.3:8080");
        assert_eq!(
            decode(&id, &BACKEND_KEYS).unwrap(),
            vec!["lb1", "a/b", "10.0.0.3:8080"]
        );

        let id = encode(&[("loadBalancers", "lb1"), ("backendSets", "100%2F")]);
        assert_eq!(
            decode(&id, &["loadBalancers", "backendSets"]).unwrap(),
            vec!["lb1", "100%2F"]
        );
    }

    #[test]
    fn fully_escaped_ids_still_decode() {
        assert_eq!(
            decode("loadBalancers/lb1/backendSets/web/backends/10.0.0.3%3A8080", &BACKEND_KEYS).unwrap(),
            vec!["lb1", "web", "10.0.0.3:8080"]
        );
    }

    #[test]
    fn wrong_shapes_are_rejected() {
        assert!(matches!(
            decode("ocid1.loadbalancer.oc1..lb", &BACKEND_KEYS),
            Err(IdError::SegmentCount { expected: 6, found: 1, .. })
        ));
        assert!(matches!(
            decode("loadBalancers/lb1/listeners/web", &["loadBalancers", "backendSets"]),
            Err(IdError::UnexpectedKey { .. })
        ));
        assert!(matches!(
            decode("loadBalancers//backendSets/web", &["loadBalancers", "backendSets"]),
            Err(IdError::EmptyValue { .. })
        ));
    }
}
