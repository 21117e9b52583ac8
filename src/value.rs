//! Items flowing through text-described pipelines.

use std::fmt;

use crate::error::{PipelineError, Result};

/// A dynamically typed pipeline item.
///
/// Most stages see lines of text; `cut` produces field lists and `join`
/// turns them back into text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Fields(Vec<String>),
}

impl Value {
    /// Unwrap text, failing `stage` if the item is a field list.
    pub fn into_text(self, stage: &str) -> Result<String> {
        match self {
            Value::Text(text) => Ok(text),
            Value::Fields(fields) => Err(PipelineError::runtime(
                stage,
                format!("expected a line of text, got fields {fields:?}"),
            )),
        }
    }

    /// Unwrap a field list, failing `stage` if the item is text.
    pub fn into_fields(self, stage: &str) -> Result<Vec<String>> {
        match self {
            Value::Fields(fields) => Ok(fields),
            Value::Text(text) => Err(PipelineError::runtime(
                stage,
                format!("expected fields, got text {text:?}"),
            )),
        }
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Value::Text(text)
    }
}

impl From<Vec<String>> for Value {
    fn from(fields: Vec<String>) -> Self {
        Value::Fields(fields)
    }
}

/// Text prints as-is; fields print as a bracketed list.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(text) => f.write_str(text),
            Value::Fields(fields) => write!(f, "{fields:?}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_into_text() {
        assert_eq!(Value::Text("a".into()).into_text("grep").unwrap(), "a");
        let err = Value::Fields(vec!["a".into()]).into_text("grep").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StageRuntime);
        assert!(err.to_string().starts_with("grep:"));
    }

    #[test]
    fn test_into_fields() {
        let fields = Value::Fields(vec!["a".into(), "b".into()])
            .into_fields("join")
            .unwrap();
        assert_eq!(fields, vec!["a", "b"]);
        assert!(Value::Text("a b".into()).into_fields("join").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Text("line\n".into()).to_string(), "line\n");
        assert_eq!(
            Value::Fields(vec!["x".into(), "y".into()]).to_string(),
            r#"["x", "y"]"#
        );
    }
}
