//! Threshold declarations

use serde::{Deserialize, Serialize};

/// One threshold expression or a list of them for the same metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThresholdExprs {
    One(String),
    Many(Vec<String>),
}

impl ThresholdExprs {
    pub fn expressions(&self) -> Vec<&str> {
        match self {
            ThresholdExprs::One(expr) => vec![expr.as_str()],
            ThresholdExprs::Many(exprs) => exprs.iter().map(String::as_str).collect(),
        }
    }
}
