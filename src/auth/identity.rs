// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Verified external identity.

use serde_json::{Map, Value};

/// Claims of a validated external token.
///
/// Claim keys are not unique: array-valued claims become one entry per
/// element, in source order. Lives for a single request and is read-only once
/// built.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExternalIdentity {
    issuer: String,
    claims: Vec<(String, String)>,
}

impl ExternalIdentity {
    pub fn new(issuer: impl Into<String>, claims: Vec<(String, String)>) -> Self {
        Self {
            issuer: issuer.into(),
            claims,
        }
    }

    /// Build from a decoded JWT payload. The issuer is taken from `iss`.
    pub fn from_json_claims(payload: &Map<String, Value>) -> Self {
        let mut claims = Vec::with_capacity(payload.len());
        for (key, value) in payload {
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items {
                        if let Some(v) = scalar(item) {
                            claims.push((key.clone(), v));
                        }
                    }
                }
                other => {
                    if let Some(v) = scalar(other) {
                        claims.push((key.clone(), v));
                    }
                }
            }
        }

        let issuer = payload
            .get("iss")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        Self { issuer, claims }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// First value recorded under `key`.
    pub fn first<'a>(&'a self, key: &'a str) -> Option<&'a str> {
        self.all(key).next()
    }

    /// Every value recorded under `key`, in source order.
    pub fn all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.claims
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn claims(&self) -> &[(String, String)] {
        &self.claims
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        // Nested structures are kept as compact JSON.
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn arrays_become_repeated_claims() {
        let payload = json!({
            "iss": "https://x.auth0.com/",
            "sub": "abc123",
            "roles": ["admin", "editor", "admin"],
            "email_verified": true,
            "exp": 1700000000,
            "nickname": null,
        });
        let identity = ExternalIdentity::from_json_claims(payload.as_object().unwrap());

        assert_eq!(identity.issuer(), "https://x.auth0.com/");
        assert_eq!(identity.first("sub"), Some("abc123"));
        assert_eq!(
            identity.all("roles").collect::<Vec<_>>(),
            vec!["admin", "editor", "admin"]
        );
        assert_eq!(identity.first("email_verified"), Some("true"));
        assert_eq!(identity.first("exp"), Some("1700000000"));
        assert_eq!(identity.first("nickname"), None);
    }

    #[test]
    fn missing_issuer_is_empty() {
        let payload = json!({ "sub": "abc" });
        let identity = ExternalIdentity::from_json_claims(payload.as_object().unwrap());
        assert_eq!(identity.issuer(), "");
    }

    #[test]
    fn nested_objects_are_stringified() {
        let payload = json!({ "app_metadata": { "tier": "gold" } });
        let identity = ExternalIdentity::from_json_claims(payload.as_object().unwrap());
        assert_eq!(identity.first("app_metadata"), Some(r#"{"tier":"gold"}"#));
    }
}
