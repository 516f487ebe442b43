use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::registry::unit::{ParamKind, ParamSpec, ToolDescriptor, ToolUnit};

const HTTP_TIMEOUT_SECS: u64 = 30;
const HTTP_BODY_CAP_CHARS: usize = 10_000;
const MAX_SLEEP_SECS: f64 = 86_400.0;

/// Shared value store scoped to one registry instance. Values written by
/// `store_value` back the `${stored.*}` interpolation context.
#[derive(Debug, Clone, Default)]
pub struct ValueStore {
    inner: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl ValueStore {
    pub fn new() -> ValueStore {
        ValueStore::default()
    }

    pub fn set(&self, name: &str, value: Value) {
        self.locked().insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.locked().get(name).cloned()
    }

    /// Current contents as an interpolation context fragment.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.locked()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    fn locked(&self) -> MutexGuard<'_, BTreeMap<String, Value>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The fixed built-in tool set every registry carries. Built-in names are
/// not unit-qualified on the wire.
pub struct BuiltinUnit {
    store: ValueStore,
    http: reqwest::Client,
}

impl BuiltinUnit {
    pub fn new(store: ValueStore) -> BuiltinUnit {
        BuiltinUnit {
            store,
            http: reqwest::Client::new(),
        }
    }

    async fn store_value(&self, args: &Map<String, Value>) -> Result<Value> {
        let name = require_str(args, "name")?;
        let value = args.get("value").cloned().unwrap_or(Value::Null);
        let value_type = json_type_name(&value);
        self.store.set(&name, value);
        Ok(json!({"stored": true, "name": name, "value_type": value_type}))
    }

    async fn get_value(&self, args: &Map<String, Value>) -> Result<Value> {
        let name = require_str(args, "name")?;
        match self.store.get(&name) {
            Some(value) => Ok(json!({"name": name, "value": value})),
            None => bail!("no stored value named '{}'", name),
        }
    }

    async fn sleep(&self, args: &Map<String, Value>) -> Result<Value> {
        let seconds = require_f64(args, "seconds")?;
        if !seconds.is_finite() || seconds < 0.0 {
            bail!("seconds must be a non-negative number");
        }
        if seconds > MAX_SLEEP_SECS {
            bail!("seconds must be at most {}", MAX_SLEEP_SECS);
        }
        tokio::time::sleep(Duration::from_secs_f64(seconds)).await;
        Ok(json!({"slept": seconds}))
    }

    async fn http_get(&self, args: &Map<String, Value>) -> Result<Value> {
        let url = require_str(args, "url")?;
        let mut req = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS));
        for (k, v) in string_entries(args, "headers")? {
            req = req.header(k, v);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("http get {}", url))?;
        response_payload(resp).await
    }

    async fn http_post(&self, args: &Map<String, Value>) -> Result<Value> {
        let url = require_str(args, "url")?;
        let data = args.get("data").cloned().unwrap_or_else(|| json!({}));
        let mut req = self
            .http
            .post(&url)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .json(&data);
        for (k, v) in string_entries(args, "headers")? {
            req = req.header(k, v);
        }
        let resp = req
            .send()
            .await
            .with_context(|| format!("http post {}", url))?;
        response_payload(resp).await
    }

    async fn assert_equals(&self, args: &Map<String, Value>) -> Result<Value> {
        let actual = args.get("actual").cloned().unwrap_or(Value::Null);
        let expected = args.get("expected").cloned().unwrap_or(Value::Null);
        let passed = actual == expected;
        Ok(json!({
            "passed": passed,
            "actual": actual,
            "expected": expected,
            "message": assertion_message(args, passed),
        }))
    }

    async fn assert_true(&self, args: &Map<String, Value>) -> Result<Value> {
        let condition = args
            .get("condition")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Ok(json!({
            "passed": condition,
            "message": assertion_message(args, condition),
        }))
    }

    async fn assert_contains(&self, args: &Map<String, Value>) -> Result<Value> {
        let container = args.get("container").cloned().unwrap_or(Value::Null);
        let item = args.get("item").cloned().unwrap_or(Value::Null);
        let passed = match &container {
            Value::String(s) => match &item {
                Value::String(i) => s.contains(i.as_str()),
                _ => bail!("item must be a string when container is a string"),
            },
            Value::Array(xs) => xs.contains(&item),
            // Object containment checks keys, matching mapping semantics.
            Value::Object(m) => item.as_str().map(|k| m.contains_key(k)).unwrap_or(false),
            _ => bail!("container must be a string, array, or object"),
        };
        Ok(json!({
            "passed": passed,
            "message": assertion_message(args, passed),
        }))
    }

    async fn compare_values(&self, args: &Map<String, Value>) -> Result<Value> {
        let value1 = args.get("value1").cloned().unwrap_or(Value::Null);
        let value2 = args.get("value2").cloned().unwrap_or(Value::Null);
        let tolerance = args
            .get("tolerance")
            .and_then(Value::as_f64)
            .unwrap_or(0.0);
        if let (Some(a), Some(b)) = (value1.as_f64(), value2.as_f64()) {
            if tolerance > 0.0 {
                let difference = (a - b).abs();
                let diff_fraction = if b == 0.0 {
                    if a != 0.0 {
                        f64::INFINITY
                    } else {
                        0.0
                    }
                } else {
                    difference / b.abs()
                };
                return Ok(json!({
                    "equal": diff_fraction <= tolerance,
                    "value1": value1,
                    "value2": value2,
                    "difference": difference,
                    "difference_percent": diff_fraction * 100.0,
                    "tolerance_percent": tolerance * 100.0,
                }));
            }
        }
        Ok(json!({
            "equal": value1 == value2,
            "value1": value1,
            "value2": value2,
        }))
    }
}

#[async_trait]
impl ToolUnit for BuiltinUnit {
    fn name(&self) -> &str {
        "builtin"
    }

    fn tools(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor::new("store_value", "Store a value for later ${stored.*} references.")
                .param(ParamSpec::required("name", ParamKind::String))
                .param(ParamSpec::required("value", ParamKind::String)),
            ToolDescriptor::new("get_value", "Retrieve a previously stored value.")
                .param(ParamSpec::required("name", ParamKind::String)),
            ToolDescriptor::new("sleep", "Wait for specified seconds.")
                .param(ParamSpec::required("seconds", ParamKind::Number)),
            ToolDescriptor::new("http_get", "Make HTTP GET request.")
                .param(ParamSpec::required("url", ParamKind::String))
                .param(ParamSpec::optional("headers", ParamKind::Object)),
            ToolDescriptor::new("http_post", "Make HTTP POST request.")
                .param(ParamSpec::required("url", ParamKind::String))
                .param(ParamSpec::optional("data", ParamKind::Object))
                .param(ParamSpec::optional("headers", ParamKind::Object)),
            ToolDescriptor::new("assert_equals", "Assert that two values are equal.")
                .param(ParamSpec::required("actual", ParamKind::String))
                .param(ParamSpec::required("expected", ParamKind::String))
                .param(ParamSpec::optional("message", ParamKind::String).with_default(json!(""))),
            ToolDescriptor::new("assert_true", "Assert that a condition is true.")
                .param(ParamSpec::required("condition", ParamKind::Boolean))
                .param(ParamSpec::optional("message", ParamKind::String).with_default(json!(""))),
            ToolDescriptor::new("assert_contains", "Assert that a container contains an item.")
                .param(ParamSpec::required("container", ParamKind::String))
                .param(ParamSpec::required("item", ParamKind::String))
                .param(ParamSpec::optional("message", ParamKind::String).with_default(json!(""))),
            ToolDescriptor::new(
                "compare_values",
                "Compare two values with optional tolerance for numbers.",
            )
            .param(ParamSpec::required("value1", ParamKind::String))
            .param(ParamSpec::required("value2", ParamKind::String))
            .param(ParamSpec::optional("tolerance", ParamKind::Number).with_default(json!(0.0))),
        ]
    }

    async fn call(&self, method: &str, args: Map<String, Value>) -> Result<Value> {
        match method {
            "store_value" => self.store_value(&args).await,
            "get_value" => self.get_value(&args).await,
            "sleep" => self.sleep(&args).await,
            "http_get" => self.http_get(&args).await,
            "http_post" => self.http_post(&args).await,
            "assert_equals" => self.assert_equals(&args).await,
            "assert_true" => self.assert_true(&args).await,
            "assert_contains" => self.assert_contains(&args).await,
            "compare_values" => self.compare_values(&args).await,
            other => bail!("unknown tool '{}'", other),
        }
    }
}

fn require_str(args: &Map<String, Value>, key: &str) -> Result<String> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| anyhow!("missing or non-string argument '{}'", key))
}

fn require_f64(args: &Map<String, Value>, key: &str) -> Result<f64> {
    args.get(key)
        .and_then(Value::as_f64)
        .ok_or_else(|| anyhow!("missing or non-numeric argument '{}'", key))
}

fn string_entries(args: &Map<String, Value>, key: &str) -> Result<Vec<(String, String)>> {
    let Some(map) = args.get(key) else {
        return Ok(Vec::new());
    };
    if map.is_null() {
        return Ok(Vec::new());
    }
    let Some(map) = map.as_object() else {
        bail!("argument '{}' must be an object", key);
    };
    let mut out = Vec::new();
    for (k, v) in map {
        match v.as_str() {
            Some(s) => out.push((k.clone(), s.to_string())),
            None => bail!("header '{}' must be a string", k),
        }
    }
    Ok(out)
}

fn assertion_message(args: &Map<String, Value>, passed: bool) -> String {
    if passed {
        "Assertion passed".to_string()
    } else {
        args.get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    }
}

async fn response_payload(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status().as_u16();
    let headers: Map<String, Value> = resp
        .headers()
        .iter()
        .map(|(k, v)| {
            (
                k.as_str().to_string(),
                Value::String(String::from_utf8_lossy(v.as_bytes()).to_string()),
            )
        })
        .collect();
    let body = resp.text().await.context("read response body")?;
    let body: String = body.chars().take(HTTP_BODY_CAP_CHARS).collect();
    Ok(json!({
        "status_code": status,
        "body": body,
        "headers": headers,
    }))
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
