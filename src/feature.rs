//! Feature expressions: per-record values compared by queries.
//!
//! A [`Feature`] is a small immutable tree of literals, field references,
//! arithmetic and `max`/`min`. It is evaluated against one record at a time.
//! Embeddings build their named features (a like/dislike ratio, say) out of
//! the same nodes.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

use crate::error::{QuarryError, Result};
use crate::path::{FieldPath, IndexAssignment};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Power,
}

impl Operator {
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "+" => Some(Operator::Add),
            "-" => Some(Operator::Subtract),
            "*" => Some(Operator::Multiply),
            "/" => Some(Operator::Divide),
            "^" => Some(Operator::Power),
            _ => None,
        }
    }
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Add => "+",
            Operator::Subtract => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
            Operator::Power => "^",
        }
    }
    fn apply(&self, left: Scalar, right: Scalar) -> Result<Scalar> {
        match (self, left, right) {
            (Operator::Add, Scalar::Text(l), Scalar::Text(r)) => Ok(Scalar::Text(l + &r)),
            (Operator::Divide, Scalar::Number(_), Scalar::Number(r)) if r == 0.0 => {
                Err(QuarryError::TypeMismatch(String::from("division by zero")))
            }
            (op, Scalar::Number(l), Scalar::Number(r)) => Ok(Scalar::Number(match op {
                Operator::Add => l + r,
                Operator::Subtract => l - r,
                Operator::Multiply => l * r,
                Operator::Divide => l / r,
                Operator::Power => l.powf(r),
            })),
            (op, l, r) => Err(QuarryError::TypeMismatch(format!(
                "cannot apply '{}' to {} and {}",
                op.symbol(),
                l.kind(),
                r.kind()
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
    Equal,
}

impl Comparator {
    /// `=` and `==` are the same comparator.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        match symbol {
            "<" => Some(Comparator::Less),
            ">" => Some(Comparator::Greater),
            "<=" => Some(Comparator::LessOrEqual),
            ">=" => Some(Comparator::GreaterOrEqual),
            "=" | "==" => Some(Comparator::Equal),
            _ => None,
        }
    }
    pub fn holds(&self, left: &Scalar, right: &Scalar) -> Result<bool> {
        if *self == Comparator::Equal {
            return Ok(left == right);
        }
        let ordering = left.order(right)?;
        Ok(match self {
            Comparator::Less => ordering == Ordering::Less,
            Comparator::Greater => ordering == Ordering::Greater,
            Comparator::LessOrEqual => ordering != Ordering::Greater,
            Comparator::GreaterOrEqual => ordering != Ordering::Less,
            Comparator::Equal => ordering == Ordering::Equal,
        })
    }
}

/// The value of a feature for one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Number(f64),
    Text(String),
    Bool(bool),
    Null,
    /// Lists and objects only take part in equality.
    Structured(Value),
}

impl Scalar {
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Number(n) => n.as_f64().map(Scalar::Number).unwrap_or(Scalar::Null),
            Value::String(s) => Scalar::Text(s.clone()),
            Value::Bool(b) => Scalar::Bool(*b),
            Value::Null => Scalar::Null,
            other => Scalar::Structured(other.clone()),
        }
    }
    fn kind(&self) -> &'static str {
        match self {
            Scalar::Number(_) => "a number",
            Scalar::Text(_) => "a string",
            Scalar::Bool(_) => "a boolean",
            Scalar::Null => "null",
            Scalar::Structured(_) => "a structured value",
        }
    }
    fn order(&self, other: &Scalar) -> Result<Ordering> {
        match (self, other) {
            (Scalar::Number(l), Scalar::Number(r)) => l
                .partial_cmp(r)
                .ok_or_else(|| QuarryError::TypeMismatch(String::from("NaN cannot be ordered"))),
            (Scalar::Text(l), Scalar::Text(r)) => Ok(l.cmp(r)),
            (Scalar::Bool(l), Scalar::Bool(r)) => Ok(l.cmp(r)),
            (l, r) => Err(QuarryError::TypeMismatch(format!("cannot order {} against {}", l.kind(), r.kind()))),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Scalar::Number(n) => write!(f, "{}", n),
            Scalar::Text(s) => write!(f, "{}", s),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Null => Ok(()),
            Scalar::Structured(v) => write!(f, "{}", v),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Feature {
    Number(f64),
    Text(String),
    Field(FieldPath),
    Binary {
        op: Operator,
        left: Box<Feature>,
        right: Box<Feature>,
    },
    Max(Vec<Feature>),
    Min(Vec<Feature>),
}

impl Feature {
    pub fn field(path: &str) -> Result<Self> {
        Ok(Feature::Field(FieldPath::parse(path)?))
    }
    pub fn binary(op: Operator, left: Feature, right: Feature) -> Self {
        Feature::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }
    pub fn evaluate(&self, record: &Value) -> Result<Scalar> {
        match self {
            Feature::Number(n) => Ok(Scalar::Number(*n)),
            Feature::Text(s) => Ok(Scalar::Text(s.clone())),
            Feature::Field(path) => Ok(Scalar::from_value(path.resolve(record, &IndexAssignment::new())?)),
            Feature::Binary { op, left, right } => op.apply(left.evaluate(record)?, right.evaluate(record)?),
            Feature::Max(features) => extremum(features, record, Ordering::Greater),
            Feature::Min(features) => extremum(features, record, Ordering::Less),
        }
    }
}

fn extremum(features: &[Feature], record: &Value, wanted: Ordering) -> Result<Scalar> {
    let mut best: Option<Scalar> = None;
    for feature in features {
        let candidate = feature.evaluate(record)?;
        best = match best {
            Some(current) if candidate.order(&current)? != wanted => Some(current),
            _ => Some(candidate),
        };
    }
    best.ok_or_else(|| QuarryError::TypeMismatch(String::from("max/min needs at least one argument")))
}
