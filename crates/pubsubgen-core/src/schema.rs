use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default number of decimals rendered for `float_range` values.
pub const DEFAULT_FLOAT_SCALE: u32 = 2;
/// Default `chrono` format used to render `date_range` values.
pub const DEFAULT_DATE_FORMAT: &str = "%d.%m.%Y";

/// Ordered attribute schema shared by every generated record.
///
/// Field order is the scan order of the subscription solver; it does not
/// affect the final statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Schema {
    pub fields: Vec<FieldSpec>,
}

/// A named attribute and the value domain it draws from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct FieldSpec {
    pub name: String,
    pub domain: DomainSpec,
}

/// Value domain of a field. Values are produced by the generate crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomainSpec {
    /// Uniform integer in `min..=max`.
    IntRange { min: i64, max: i64 },
    /// Uniform float in `min..=max`, rendered with `scale` decimals.
    FloatRange {
        min: f64,
        max: f64,
        #[serde(default = "default_float_scale")]
        scale: u32,
    },
    /// One of a fixed list of labels.
    OneOf { values: Vec<String> },
    /// Uniform calendar date between two `YYYY-MM-DD` bounds (inclusive).
    DateRange {
        min: String,
        max: String,
        #[serde(default = "default_date_format")]
        format: String,
    },
}

impl DomainSpec {
    /// Numeric domains may carry the `is_average` subscription flag.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            DomainSpec::IntRange { .. } | DomainSpec::FloatRange { .. }
        )
    }
}

fn default_float_scale() -> u32 {
    DEFAULT_FLOAT_SCALE
}

fn default_date_format() -> String {
    DEFAULT_DATE_FORMAT.to_string()
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// The weather-station schema used by default for fixtures.
    pub fn weather() -> Self {
        let labels = |values: &[&str]| values.iter().map(|v| v.to_string()).collect();
        Self::new(vec![
            FieldSpec::new("station", DomainSpec::IntRange { min: 1, max: 100 }),
            FieldSpec::new(
                "city",
                DomainSpec::OneOf {
                    values: labels(&["Bucharest", "Cluj", "Timisoara", "Iasi", "Constanta"]),
                },
            ),
            FieldSpec::new("temp", DomainSpec::IntRange { min: -30, max: 50 }),
            FieldSpec::new(
                "rain",
                DomainSpec::FloatRange {
                    min: 0.0,
                    max: 100.0,
                    scale: DEFAULT_FLOAT_SCALE,
                },
            ),
            FieldSpec::new("wind", DomainSpec::IntRange { min: 0, max: 100 }),
            FieldSpec::new(
                "direction",
                DomainSpec::OneOf {
                    values: labels(&["N", "NE", "E", "SE", "S", "SW", "W", "NW"]),
                },
            ),
            FieldSpec::new(
                "date",
                DomainSpec::DateRange {
                    min: "2025-01-01".to_string(),
                    max: "2025-12-31".to_string(),
                    format: DEFAULT_DATE_FORMAT.to_string(),
                },
            ),
        ])
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, index: usize) -> Option<&FieldSpec> {
        self.fields.get(index)
    }

    /// Position of a field in scan order.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::weather()
    }
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, domain: DomainSpec) -> Self {
        Self {
            name: name.into(),
            domain,
        }
    }
}
