//! Scenario definitions handed to the load engine.
//!
//! A definition is rebuilt from every start request, validated as a whole, and written
//! where the engine reads it at launch. Nothing here is versioned or retained.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{CoreError, CoreResult};

const DEFAULT_STEP_NAME: &str = "Unnamed Scenario";
const DEFAULT_METHOD: &str = "GET";
const DEFAULT_ENDPOINT: &str = "/";

/// One weighted request template executed by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioStep {
    pub name: String,
    pub method: String,
    /// Path template appended to the run's target URL.
    pub endpoint: String,
    /// Structured request body; an empty object when none was supplied.
    pub payload: Value,
    /// Relative selection frequency, always `>= 1`.
    pub weight: u32,
    pub headers: BTreeMap<String, String>,
}

/// The artifact the engine reads: `{"scenarios": [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    pub scenarios: Vec<ScenarioStep>,
}

/// A step as submitted by a client, before defaults and validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScenarioStepInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// JSON text, or an already-structured body.
    #[serde(default)]
    pub payload: Option<Value>,
    /// Integer, or numeric text.
    #[serde(default)]
    pub weight: Option<Value>,
    #[serde(default)]
    pub headers: Option<BTreeMap<String, String>>,
}

impl ScenarioDefinition {
    /// Validates client input and applies defaults.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Validation`] when no step is given or when any textual payload
    /// is not valid JSON. The whole definition is rejected in that case.
    pub fn from_inputs(inputs: Vec<ScenarioStepInput>) -> CoreResult<Self> {
        if inputs.is_empty() {
            return Err(CoreError::validation("at least one scenario is required"));
        }

        let scenarios = inputs
            .into_iter()
            .map(ScenarioStep::from_input)
            .collect::<CoreResult<Vec<_>>>()?;

        Ok(Self { scenarios })
    }

    /// Pretty-printed JSON document, as written to disk.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Serialization`] if serialization fails.
    pub fn to_json_pretty(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl ScenarioStep {
    fn from_input(input: ScenarioStepInput) -> CoreResult<Self> {
        let name = non_empty(input.name).unwrap_or_else(|| DEFAULT_STEP_NAME.to_string());
        let payload = parse_payload(&name, input.payload)?;

        Ok(Self {
            method: non_empty(input.method)
                .map(|m| m.to_ascii_uppercase())
                .unwrap_or_else(|| DEFAULT_METHOD.to_string()),
            endpoint: non_empty(input.endpoint).unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
            payload,
            weight: parse_weight(input.weight.as_ref()),
            headers: input.headers.unwrap_or_default(),
            name,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_payload(step_name: &str, payload: Option<Value>) -> CoreResult<Value> {
    match payload {
        None | Some(Value::Null) => Ok(Value::Object(Map::new())),
        Some(Value::String(text)) if text.trim().is_empty() => Ok(Value::Object(Map::new())),
        Some(Value::String(text)) => serde_json::from_str(&text).map_err(|err| {
            CoreError::validation(format!(
                "invalid JSON payload for scenario \"{step_name}\": {err}"
            ))
        }),
        Some(structured) => Ok(structured),
    }
}

fn parse_weight(weight: Option<&Value>) -> u32 {
    let numeric = match weight {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    match numeric {
        Some(w) if w.is_finite() && w >= 1.0 => w.min(f64::from(u32::MAX)) as u32,
        _ => 1,
    }
}
