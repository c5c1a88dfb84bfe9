//! Product catalog: parameter schemas the saga's `validate` step checks
//! requests against, and the metadata `apply_claim` uses to build a
//! declarative resource document.
//!
//! Products are data, not code: adding a new one means registering a
//! [`ProductDefinition`], never writing a new code path.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Bespoke parameter shaping for a product whose claim can't be built by
/// flatly copying the request's params onto the spec. Takes the caller's
/// params and returns the value that goes under `spec.parameters` in
/// their place.
pub type ParamMapper = Arc<dyn Fn(&HashMap<String, Value>) -> Value + Send + Sync>;

/// The declared type of a product parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Int,
    Bool,
    Choice,
}

/// One entry in a product's parameter schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    pub required: bool,
    pub param_type: ParamType,
    pub choices: Option<Vec<String>>,
    pub min_value: Option<i64>,
    pub max_value: Option<i64>,
    pub default: Option<Value>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, required: bool, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            required,
            param_type,
            choices: None,
            min_value: None,
            max_value: None,
            default: None,
        }
    }

    pub fn choices(mut self, choices: &[&str]) -> Self {
        self.choices = Some(choices.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn range(mut self, min: i64, max: i64) -> Self {
        self.min_value = Some(min);
        self.max_value = Some(max);
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Validate a single supplied value, returning a human-readable
    /// violation on failure.
    fn validate(&self, value: Option<&Value>) -> Result<(), String> {
        let value = match value {
            Some(v) => v,
            None => {
                if self.required {
                    return Err(format!("missing required parameter '{}'", self.name));
                }
                return Ok(());
            }
        };

        match self.param_type {
            ParamType::String => {
                if !value.is_string() {
                    return Err(format!("parameter '{}' must be a string", self.name));
                }
            }
            ParamType::Bool => {
                if !value.is_boolean() {
                    return Err(format!("parameter '{}' must be a boolean", self.name));
                }
            }
            ParamType::Int => {
                let n = value
                    .as_i64()
                    .ok_or_else(|| format!("parameter '{}' must be an integer", self.name))?;
                if let Some(min) = self.min_value {
                    if n < min {
                        return Err(format!(
                            "parameter '{}' is {} which is below the minimum {}",
                            self.name, n, min
                        ));
                    }
                }
                if let Some(max) = self.max_value {
                    if n > max {
                        return Err(format!(
                            "parameter '{}' is {} which exceeds the maximum {}",
                            self.name, n, max
                        ));
                    }
                }
            }
            ParamType::Choice => {
                let s = value
                    .as_str()
                    .ok_or_else(|| format!("parameter '{}' must be a string", self.name))?;
                let choices = self.choices.as_deref().unwrap_or(&[]);
                if !choices.iter().any(|c| c == s) {
                    return Err(format!(
                        "parameter '{}' value '{}' is not one of {:?}",
                        self.name, s, choices
                    ));
                }
            }
        }

        Ok(())
    }
}

/// A catalog entry: what a product is called, how its resource document
/// is shaped, and which parameters it accepts.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProductDefinition {
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub api_version: String,
    pub kind: String,
    pub composition_group: String,
    pub composition_class: String,
    pub parameters: Vec<ParameterSpec>,
    pub connection_secret_suffix: String,
    /// Used in place of the generic flat parameter copy when set; most
    /// products leave this `None` and get the flat copy.
    #[serde(skip)]
    pub param_mapper: Option<ParamMapper>,
}

impl fmt::Debug for ProductDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProductDefinition")
            .field("name", &self.name)
            .field("display_name", &self.display_name)
            .field("description", &self.description)
            .field("api_version", &self.api_version)
            .field("kind", &self.kind)
            .field("composition_group", &self.composition_group)
            .field("composition_class", &self.composition_class)
            .field("parameters", &self.parameters)
            .field("connection_secret_suffix", &self.connection_secret_suffix)
            .field("param_mapper", &self.param_mapper.is_some())
            .finish()
    }
}

impl ProductDefinition {
    /// Validate a parameter bag, returning the concatenated list of
    /// violations (empty if the bag satisfies every declared parameter).
    pub fn validate_params(&self, params: &HashMap<String, Value>) -> Vec<String> {
        self.parameters
            .iter()
            .filter_map(|spec| spec.validate(params.get(&spec.name)).err())
            .collect()
    }

    /// Build the `spec.parameters` value for a request: the mapper's
    /// output if this product declares one, otherwise a flat copy of the
    /// caller's params plus whatever the scheduler decided.
    pub fn shape_params(&self, params: &HashMap<String, Value>) -> Value {
        match &self.param_mapper {
            Some(mapper) => mapper(params),
            None => Value::Object(params.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        }
    }
}

fn mysql_product() -> ProductDefinition {
    ProductDefinition {
        name: "mysql".to_string(),
        display_name: "MySQL Database".to_string(),
        description: "A managed MySQL instance placed by the scheduler".to_string(),
        api_version: "platform.atlas.io/v1alpha1".to_string(),
        kind: "MySQLInstance".to_string(),
        composition_group: "database.atlas.io".to_string(),
        composition_class: "mysql-standard".to_string(),
        connection_secret_suffix: "-conn".to_string(),
        parameters: vec![
            ParameterSpec::new("size", true, ParamType::Choice)
                .choices(&["small", "medium", "large"]),
            ParameterSpec::new("storage_gb", true, ParamType::Int).range(10, 16384),
            ParameterSpec::new("ha", false, ParamType::Bool).default_value(Value::Bool(false)),
        ],
        param_mapper: None,
    }
}

fn webapp_product() -> ProductDefinition {
    ProductDefinition {
        name: "webapp".to_string(),
        display_name: "Web Application".to_string(),
        description: "A stateless web application placed by the scheduler".to_string(),
        api_version: "platform.atlas.io/v1alpha1".to_string(),
        kind: "WebApplication".to_string(),
        composition_group: "workload.atlas.io".to_string(),
        composition_class: "webapp-standard".to_string(),
        connection_secret_suffix: "-conn".to_string(),
        parameters: vec![
            ParameterSpec::new("image", true, ParamType::String),
            ParameterSpec::new("replicas", false, ParamType::Int)
                .range(1, 50)
                .default_value(Value::from(2)),
        ],
        // The claim nests scaling under its own object instead of a flat
        // `replicas` key; every other param passes through unchanged.
        param_mapper: Some(Arc::new(|params| {
            let mut shaped: serde_json::Map<String, Value> = params
                .iter()
                .filter(|(k, _)| k.as_str() != "replicas")
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let replicas = params.get("replicas").cloned().unwrap_or_else(|| Value::from(2));
            shaped.insert("scaling".to_string(), serde_json::json!({ "replicas": replicas }));
            Value::Object(shaped)
        })),
    }
}

/// The product catalog. Registration is runtime-mutable (so tests can add
/// fixtures) but lookups never block on a writer for long: the table is a
/// plain `RwLock<HashMap<..>>`, matching the discipline other read-mostly
/// tables in this workspace use.
pub struct ProductRegistry {
    products: RwLock<HashMap<String, ProductDefinition>>,
}

impl ProductRegistry {
    pub fn new() -> Self {
        Self {
            products: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_defaults() -> Self {
        let registry = Self::new();
        registry.register(mysql_product());
        registry.register(webapp_product());
        registry
    }

    pub fn register(&self, product: ProductDefinition) {
        self.products
            .write()
            .expect("products lock poisoned")
            .insert(product.name.clone(), product);
    }

    pub fn get(&self, name: &str) -> Option<ProductDefinition> {
        self.products.read().expect("products lock poisoned").get(name).cloned()
    }

    pub fn list(&self) -> Vec<ProductDefinition> {
        self.products
            .read()
            .expect("products lock poisoned")
            .values()
            .cloned()
            .collect()
    }
}

impl Default for ProductRegistry {
    fn default() -> Self {
        Self::new()
    }
}
