//! Inbound creation requests: the developer describes *what* they need,
//! never *where* it runs.

use std::collections::HashMap;

use atlas_core::AtlasError;
use chrono::{DateTime, Duration, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Keys a developer may never set directly — the control plane decides
/// them.
const FORBIDDEN_FIELDS: [&str; 5] = ["provider", "region", "runtimeCluster", "runtime_cluster", "network"];

/// Deadline applied when a request carries no `deadline_seconds`.
const DEFAULT_DEADLINE_SECONDS: i64 = 120;

fn name_pattern() -> Regex {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("static pattern is valid")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRequest {
    pub name: String,
    pub namespace: String,
    pub cell: String,
    pub tier: String,
    pub environment: String,
    pub ha: bool,
    pub product: String,
    pub params: HashMap<String, Value>,
    /// The wall-clock instant by which the saga must finish; a step that
    /// is still running (or about to start) past this point returns a
    /// timeout instead of completing.
    pub deadline: DateTime<Utc>,
}

impl CreateRequest {
    /// Parse and validate a raw request body. Rejects the developer
    /// contract violation (forbidden placement fields) and malformed
    /// name/namespace before any scheduling is attempted.
    pub fn from_body(product: &str, body: &Value) -> Result<Self, AtlasError> {
        let object = body
            .as_object()
            .ok_or_else(|| AtlasError::validation("request body must be a JSON object"))?;

        for forbidden in FORBIDDEN_FIELDS {
            if object.contains_key(forbidden) {
                return Err(AtlasError::validation(format!(
                    "developer contract violation: '{forbidden}' may not be set by the caller"
                )));
            }
        }

        let name = object
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| AtlasError::validation("missing required field 'name'"))?
            .to_string();
        let namespace = object
            .get("namespace")
            .and_then(Value::as_str)
            .ok_or_else(|| AtlasError::validation("missing required field 'namespace'"))?
            .to_string();
        let cell = object
            .get("cell")
            .and_then(Value::as_str)
            .ok_or_else(|| AtlasError::validation("missing required field 'cell'"))?
            .to_string();
        let tier = object
            .get("tier")
            .and_then(Value::as_str)
            .ok_or_else(|| AtlasError::validation("missing required field 'tier'"))?
            .to_string();
        let environment = object
            .get("environment")
            .and_then(Value::as_str)
            .ok_or_else(|| AtlasError::validation("missing required field 'environment'"))?
            .to_string();
        let ha = object.get("ha").and_then(Value::as_bool).unwrap_or(false);
        let deadline_seconds = object
            .get("deadline_seconds")
            .and_then(Value::as_i64)
            .unwrap_or(DEFAULT_DEADLINE_SECONDS);
        if deadline_seconds <= 0 {
            return Err(AtlasError::validation("'deadline_seconds' must be positive"));
        }

        let pattern = name_pattern();
        if !pattern.is_match(&name) {
            return Err(AtlasError::validation(format!("'{name}' is not a valid resource name")));
        }
        if !pattern.is_match(&namespace) {
            return Err(AtlasError::validation(format!("'{namespace}' is not a valid namespace")));
        }

        let reserved = ["name", "namespace", "cell", "tier", "environment", "ha", "deadline_seconds"];
        let params = object
            .iter()
            .filter(|(key, _)| !reserved.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            name,
            namespace,
            cell,
            tier,
            environment,
            ha,
            product: product.to_string(),
            params,
            deadline: Utc::now() + Duration::seconds(deadline_seconds),
        })
    }

    /// Apply a name suffix for multi-cloud fan-out, keeping every other
    /// field identical.
    pub fn with_name_suffix(&self, suffix: &str) -> Self {
        let mut clone = self.clone();
        clone.name = format!("{}-{}", self.name, suffix);
        clone
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn rejects_forbidden_placement_fields() {
        let body = json!({
            "name": "orders-db", "namespace": "orders", "cell": "cell-us",
            "tier": "medium", "environment": "production", "provider": "aws"
        });
        assert!(CreateRequest::from_body("mysql", &body).is_err());
    }

    #[test]
    fn rejects_invalid_name() {
        let body = json!({
            "name": "Orders_DB", "namespace": "orders", "cell": "cell-us",
            "tier": "medium", "environment": "production"
        });
        assert!(CreateRequest::from_body("mysql", &body).is_err());
    }

    #[test]
    fn accepts_a_well_formed_request() {
        let body = json!({
            "name": "orders-db", "namespace": "orders", "cell": "cell-us",
            "tier": "medium", "environment": "production", "ha": false,
            "size": "medium", "storage_gb": 50
        });
        let request = CreateRequest::from_body("mysql", &body).unwrap();
        assert_eq!(request.name, "orders-db");
        assert_eq!(request.params.get("size").unwrap(), "medium");
    }
}
