use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Method names every unit carries for the registry itself. They are
/// part of the capability contract and never become tools.
pub const RESERVED_METHODS: [&str; 4] = ["name", "tools", "call", "cleanup"];

/// Wire-level parameter type vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Integer => "integer",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Array => "array",
            ParamKind::Object => "object",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    pub fn required(name: &str, kind: ParamKind) -> ParamSpec {
        ParamSpec {
            name: name.to_string(),
            kind,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: &str, kind: ParamKind) -> ParamSpec {
        ParamSpec {
            name: name.to_string(),
            kind,
            required: false,
            default: None,
        }
    }

    pub fn with_default(mut self, value: Value) -> ParamSpec {
        self.required = false;
        self.default = Some(value);
        self
    }
}

/// Declared signature of one tool. `name` is the method-level name; the
/// registry qualifies it with the owning unit's prefix. Descriptors carry
/// signature metadata only, never behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

impl ToolDescriptor {
    pub fn new(name: &str, description: &str) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: description.to_string(),
            params: Vec::new(),
        }
    }

    pub fn param(mut self, param: ParamSpec) -> ToolDescriptor {
        self.params.push(param);
        self
    }

    /// JSON-schema object for the wire (`tools/list`).
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();
        for p in &self.params {
            let mut prop = Map::new();
            prop.insert("type".to_string(), Value::String(p.kind.as_str().to_string()));
            if let Some(d) = &p.default {
                prop.insert("default".to_string(), d.clone());
            }
            properties.insert(p.name.clone(), Value::Object(prop));
            if p.required {
                required.push(Value::String(p.name.clone()));
            }
        }
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// One-line signature for the prompt catalog.
    pub fn signature(&self) -> String {
        let params: Vec<String> = self
            .params
            .iter()
            .map(|p| {
                if p.required {
                    format!("{}: {}", p.name, p.kind.as_str())
                } else {
                    let default = p
                        .default
                        .as_ref()
                        .map(|d| d.to_string())
                        .unwrap_or_else(|| "null".to_string());
                    format!("{}: {} = {}", p.name, p.kind.as_str(), default)
                }
            })
            .collect();
        format!("{}({}) -> object", self.name, params.join(", "))
    }
}

/// The capability contract a tool unit implements. Units register with
/// the registry builder at startup; their declared descriptors are the
/// only signature source for live units.
#[async_trait]
pub trait ToolUnit: Send + Sync {
    /// Unit name, used as the `<unit>_<method>` qualification prefix.
    fn name(&self) -> &str;

    /// Declared tool signatures.
    fn tools(&self) -> Vec<ToolDescriptor>;

    /// Invoke a tool by its method-level name.
    async fn call(&self, method: &str, args: Map<String, Value>) -> Result<Value>;

    /// Best-effort resource release. Runs under the registry's cleanup
    /// timeout.
    async fn cleanup(&self) {}
}
