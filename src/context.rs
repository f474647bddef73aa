//! Per-run execution settings and the variables handed to every script.
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Scalar variable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VarValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl VarValue {
    /// Infer a typed value from command-line text.
    pub fn infer(raw: &str) -> Self {
        match raw {
            "true" => return Self::Bool(true),
            "false" => return Self::Bool(false),
            _ => {}
        }
        if let Ok(value) = raw.parse::<i64>() {
            return Self::Int(value);
        }
        if let Ok(value) = raw.parse::<f64>() {
            if value.is_finite() {
                return Self::Float(value);
            }
        }
        Self::String(raw.to_string())
    }
}

impl fmt::Display for VarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::String(value) => f.write_str(value),
        }
    }
}

pub type Variables = BTreeMap<String, VarValue>;

/// Parse a `NAME=VALUE` assignment.
pub fn parse_var_assignment(raw: &str) -> Result<(String, VarValue)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("variable {raw:?} must be NAME=VALUE"))?;
    let name = name.trim();
    if name.is_empty() || name.contains('\0') {
        return Err(anyhow!("variable {raw:?} has an empty or invalid name"));
    }
    Ok((name.to_string(), VarValue::infer(value)))
}

/// Parse a list of assignments; later entries win.
pub fn parse_var_assignments(raw: &[String]) -> Result<Variables> {
    let mut vars = Variables::new();
    for entry in raw {
        let (name, value) = parse_var_assignment(entry)?;
        vars.insert(name, value);
    }
    Ok(vars)
}

/// Settings shared by every script in one run.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    pub variables: Variables,
    /// Extra positional arguments forwarded to each script.
    pub args: Vec<String>,
    pub dry_run: bool,
    pub parallel: bool,
    /// Maximum scripts in flight when `parallel` is set; `<= 0` is unbounded.
    pub max_concurrency: i64,
    pub stop_on_failure: bool,
}

impl ExecutionContext {
    /// Worker count for `total` scripts under this context's concurrency cap.
    pub fn worker_count(&self, total: usize) -> usize {
        if !self.parallel || total == 0 {
            return 1;
        }
        match usize::try_from(self.max_concurrency) {
            Ok(cap) if cap > 0 => cap.min(total),
            _ => total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_scalar_types() {
        assert_eq!(VarValue::infer("true"), VarValue::Bool(true));
        assert_eq!(VarValue::infer("42"), VarValue::Int(42));
        assert_eq!(VarValue::infer("-1.5"), VarValue::Float(-1.5));
        assert_eq!(VarValue::infer("inf"), VarValue::String("inf".to_string()));
        assert_eq!(VarValue::infer("v1.2"), VarValue::String("v1.2".to_string()));
    }

    #[test]
    fn assignment_keeps_equals_in_value() {
        let (name, value) = parse_var_assignment("URL=http://x?a=b").expect("parse");
        assert_eq!(name, "URL");
        assert_eq!(value, VarValue::String("http://x?a=b".to_string()));
        assert!(parse_var_assignment("novalue").is_err());
        assert!(parse_var_assignment("=1").is_err());
    }

    #[test]
    fn variables_round_trip_through_json() {
        let vars = parse_var_assignments(&[
            "flag=false".to_string(),
            "count=3".to_string(),
            "ratio=0.25".to_string(),
            "name=edge".to_string(),
        ])
        .expect("parse");
        let json = serde_json::to_string(&vars).expect("serialize");
        let back: Variables = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, vars);
    }

    #[test]
    fn worker_count_treats_non_positive_as_unbounded() {
        let mut ctx = ExecutionContext {
            parallel: true,
            max_concurrency: 2,
            ..Default::default()
        };
        assert_eq!(ctx.worker_count(5), 2);
        assert_eq!(ctx.worker_count(1), 1);
        ctx.max_concurrency = 0;
        assert_eq!(ctx.worker_count(5), 5);
        ctx.max_concurrency = -3;
        assert_eq!(ctx.worker_count(5), 5);
        ctx.parallel = false;
        assert_eq!(ctx.worker_count(5), 1);
    }
}
