//! Helpers over the untyped JSON value.

use serde_json::Value;

use crate::errors::EngineError;

const SHORT_DISPLAY_LIMIT: usize = 80;

pub trait ValueExt {
    /// Name of the JSON kind, for diagnostics.
    fn kind_name(&self) -> &'static str;

    fn require_f64(&self) -> Result<f64, EngineError>;

    fn require_str(&self) -> Result<&str, EngineError>;

    /// Compact JSON rendering, truncated for log lines.
    fn short_display(&self) -> String;
}

impl ValueExt for Value {
    fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    fn require_f64(&self) -> Result<f64, EngineError> {
        self.as_f64().ok_or(EngineError::UnexpectedValue {
            expected: "number",
            actual: self.kind_name(),
        })
    }

    fn require_str(&self) -> Result<&str, EngineError> {
        self.as_str().ok_or(EngineError::UnexpectedValue {
            expected: "string",
            actual: self.kind_name(),
        })
    }

    fn short_display(&self) -> String {
        let rendered = self.to_string();
        if rendered.chars().count() <= SHORT_DISPLAY_LIMIT {
            return rendered;
        }
        let mut truncated: String = rendered.chars().take(SHORT_DISPLAY_LIMIT).collect();
        truncated.push_str("...");
        truncated
    }
}
