use std::fmt;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize, Serializer};

/// Comparison operator attached to a subscription condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "<")]
    Less,
    #[serde(rename = "<=")]
    LessOrEqual,
    #[serde(rename = ">")]
    Greater,
    #[serde(rename = ">=")]
    GreaterOrEqual,
}

impl Operator {
    /// Full operator set, equality included.
    pub const ALL: [Operator; 6] = [
        Operator::Equal,
        Operator::NotEqual,
        Operator::Less,
        Operator::LessOrEqual,
        Operator::Greater,
        Operator::GreaterOrEqual,
    ];

    /// Every operator except [`Operator::Equal`].
    pub const NON_EQUALITY: [Operator; 5] = [
        Operator::NotEqual,
        Operator::Less,
        Operator::LessOrEqual,
        Operator::Greater,
        Operator::GreaterOrEqual,
    ];

    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::Equal => "=",
            Operator::NotEqual => "!=",
            Operator::Less => "<",
            Operator::LessOrEqual => "<=",
            Operator::Greater => ">",
            Operator::GreaterOrEqual => ">=",
        }
    }

    pub fn is_equality(&self) -> bool {
        matches!(self, Operator::Equal)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Value drawn from a field's domain.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Int(i64),
    Float { value: f64, scale: u32 },
    Text(String),
    Date { value: NaiveDate, format: Arc<str> },
}

impl FieldValue {
    /// Text and dates are quoted in the compact text form.
    fn is_quoted(&self) -> bool {
        matches!(self, FieldValue::Text(_) | FieldValue::Date { .. })
    }

    fn rounded(value: f64, scale: u32) -> f64 {
        let factor = 10_f64.powi(scale as i32);
        (value * factor).round() / factor
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Int(value) => write!(f, "{value}"),
            FieldValue::Float { value, scale } => {
                let scale = *scale as usize;
                write!(f, "{value:.scale$}")
            }
            FieldValue::Text(value) => f.write_str(value),
            FieldValue::Date { value, format } => write!(f, "{}", value.format(format)),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            FieldValue::Int(value) => serializer.serialize_i64(*value),
            FieldValue::Float { value, scale } => {
                serializer.serialize_f64(Self::rounded(*value, *scale))
            }
            FieldValue::Text(value) => serializer.serialize_str(value),
            FieldValue::Date { .. } => serializer.collect_str(self),
        }
    }
}

/// One `(field, operator, value)` condition of a subscription.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    pub value: FieldValue,
    pub is_average: bool,
}

/// A subscription: a non-empty conjunction of conditions in schema order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Subscription {
    conditions: Vec<Condition>,
}

impl Subscription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn condition(&self, field: &str) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|condition| condition.field == field)
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn clear(&mut self) {
        self.conditions.clear();
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, condition) in self.conditions.iter().enumerate() {
            if index > 0 {
                f.write_str(";")?;
            }
            let field = if condition.is_average {
                format!("avg_{}", condition.field)
            } else {
                condition.field.clone()
            };
            write!(f, "({field},{},", condition.operator)?;
            write_value(f, &condition.value)?;
            f.write_str(")")?;
        }
        f.write_str("}")
    }
}

/// A publication value for one schema field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub field: String,
    pub value: FieldValue,
}

/// A publication: one value for every schema field.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Publication {
    assignments: Vec<Assignment>,
}

impl Publication {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, assignment: Assignment) {
        self.assignments.push(assignment);
    }

    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

impl fmt::Display for Publication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (index, assignment) in self.assignments.iter().enumerate() {
            if index > 0 {
                f.write_str(";")?;
            }
            write!(f, "({},", assignment.field)?;
            write_value(f, &assignment.value)?;
            f.write_str(")")?;
        }
        f.write_str("}")
    }
}

/// Any record handed to a sink.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Record {
    Subscription(Subscription),
    Publication(Publication),
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Subscription(subscription) => fmt::Display::fmt(subscription, f),
            Record::Publication(publication) => fmt::Display::fmt(publication, f),
        }
    }
}

fn write_value(f: &mut fmt::Formatter<'_>, value: &FieldValue) -> fmt::Result {
    if value.is_quoted() {
        write!(f, "\"{value}\"")
    } else {
        write!(f, "{value}")
    }
}
