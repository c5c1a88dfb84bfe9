//! Declarative resource document construction: turns a scheduling
//! decision and a product definition into the claim the provisioner
//! applies.

use std::collections::HashMap;

use atlas_products::ProductDefinition;
use atlas_provisioner::{ResourceDocument, ResourceIdentity};
use atlas_scheduler::Decision;
use serde_json::{json, Value};

use crate::request::CreateRequest;

const LABEL_PREFIX: &str = "atlas.io";

/// Build the document `apply_claim` hands to the provisioner: labels and
/// an annotation under the platform's label prefix, a spec carrying the
/// merged parameters (including the fields the scheduler decided), a
/// `compositionSelector`, and a connection-secret reference.
pub fn build_claim(
    product: &ProductDefinition,
    request: &CreateRequest,
    decision: &Decision,
) -> Result<ResourceDocument, serde_json::Error> {
    let identity = ResourceIdentity::new(
        product.api_version.clone(),
        product.kind.clone(),
        request.namespace.clone(),
        request.name.clone(),
    );

    let mut labels = HashMap::new();
    labels.insert(format!("{LABEL_PREFIX}/cell"), request.cell.clone());
    labels.insert(format!("{LABEL_PREFIX}/environment"), request.environment.clone());
    labels.insert(format!("{LABEL_PREFIX}/tier"), request.tier.clone());
    labels.insert(format!("{LABEL_PREFIX}/product"), product.name.clone());

    let mut annotations = HashMap::new();
    annotations.insert(
        format!("{LABEL_PREFIX}/placement-reason"),
        serde_json::to_string(&decision.reason)?,
    );

    let shaped = product.shape_params(&request.params);
    let mut parameters = match shaped {
        Value::Object(map) => map,
        other => {
            let mut map = serde_json::Map::new();
            map.insert("value".to_string(), other);
            map
        }
    };
    parameters.insert("provider".to_string(), json!(decision.provider));
    parameters.insert("region".to_string(), json!(decision.region));
    parameters.insert("runtimeCluster".to_string(), json!(decision.runtime_cluster));
    parameters.insert("network".to_string(), json!(decision.network));

    let connection_secret_name = format!("{}{}", request.name, product.connection_secret_suffix);

    let spec = json!({
        "parameters": parameters,
        "compositionSelector": {
            "matchLabels": {
                "provider": decision.provider,
                "class": product.composition_class,
            }
        },
        "connectionSecretRef": { "name": connection_secret_name },
    });

    Ok(ResourceDocument {
        identity,
        labels,
        annotations,
        spec,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use atlas_products::{ParamType, ParameterSpec};
    use atlas_scheduler::decision::{CandidateScore, Reason};
    use atlas_policy::DimensionMap;
    use std::collections::HashMap as StdHashMap;

    fn product() -> ProductDefinition {
        ProductDefinition {
            name: "mysql".to_string(),
            display_name: "MySQL".to_string(),
            description: "".to_string(),
            api_version: "platform.atlas.io/v1alpha1".to_string(),
            kind: "MySQLInstance".to_string(),
            composition_group: "database.atlas.io".to_string(),
            composition_class: "mysql-standard".to_string(),
            connection_secret_suffix: "-conn".to_string(),
            parameters: vec![ParameterSpec::new("size", true, ParamType::String)],
            param_mapper: None,
        }
    }

    fn decision() -> Decision {
        let score = CandidateScore {
            provider: "aws".to_string(),
            region: "us-east-1".to_string(),
            runtime_cluster: "eks-payments-use1-primary".to_string(),
            network: "vpc-aws-payments-use1".to_string(),
            subscores: DimensionMap::new(0.9, 0.9, 0.9, 0.6),
            total_score: 0.85,
        };
        Decision {
            provider: "aws".to_string(),
            region: "us-east-1".to_string(),
            runtime_cluster: "eks-payments-use1-primary".to_string(),
            network: "vpc-aws-payments-use1".to_string(),
            reason: Reason {
                tier: "medium".to_string(),
                rto_minutes: 120,
                rpo_minutes: 15,
                effective_gates: vec![],
                effective_weights: DimensionMap::new(0.25, 0.25, 0.25, 0.25),
                selected: score.clone(),
                top_three: vec![score],
                candidates_evaluated: 3,
                candidates_healthy: 3,
                candidates_passed_gate: 3,
                unhealthy_skipped: vec![],
                experiment: None,
                failover: None,
            },
        }
    }

    #[test]
    fn claim_carries_decided_placement_fields() {
        let request = CreateRequest {
            name: "orders-db".to_string(),
            namespace: "orders".to_string(),
            cell: "cell-us".to_string(),
            tier: "medium".to_string(),
            environment: "production".to_string(),
            ha: false,
            product: "mysql".to_string(),
            params: StdHashMap::new(),
            deadline: chrono::Utc::now() + chrono::Duration::seconds(120),
        };
        let claim = build_claim(&product(), &request, &decision()).unwrap();
        assert_eq!(claim.identity.name, "orders-db");
        assert_eq!(claim.spec["parameters"]["provider"], "aws");
        assert_eq!(claim.spec["connectionSecretRef"]["name"], "orders-db-conn");
        assert!(claim.annotations.contains_key("atlas.io/placement-reason"));
    }

    #[test]
    fn claim_consults_the_product_s_param_mapper_when_present() {
        let mut product = product();
        product.param_mapper = Some(std::sync::Arc::new(|params| {
            let size = params.get("size").cloned().unwrap_or(serde_json::Value::Null);
            serde_json::json!({ "sizing": { "tier": size } })
        }));
        let mut request = CreateRequest {
            name: "orders-db".to_string(),
            namespace: "orders".to_string(),
            cell: "cell-us".to_string(),
            tier: "medium".to_string(),
            environment: "production".to_string(),
            ha: false,
            product: "mysql".to_string(),
            params: StdHashMap::new(),
            deadline: chrono::Utc::now() + chrono::Duration::seconds(120),
        };
        request.params.insert("size".to_string(), serde_json::json!("large"));

        let claim = build_claim(&product, &request, &decision()).unwrap();
        assert_eq!(claim.spec["parameters"]["sizing"]["tier"], "large");
        assert!(claim.spec["parameters"].get("size").is_none());
        assert_eq!(claim.spec["parameters"]["provider"], "aws");
    }
}
