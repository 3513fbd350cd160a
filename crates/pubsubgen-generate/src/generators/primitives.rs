use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use pubsubgen_core::{FieldValue, parse_date_bound};
use rand::seq::IndexedRandom;
use rand::{Rng, RngCore};

use crate::generators::ValueGenerator;

/// Uniform integer in `min..=max`.
#[derive(Debug, Clone)]
pub struct IntRangeGenerator {
    min: i64,
    max: i64,
}

impl IntRangeGenerator {
    pub fn new(min: i64, max: i64) -> Result<Self, String> {
        if min > max {
            return Err(format!("int_range min {min} must be <= max {max}"));
        }
        Ok(Self { min, max })
    }
}

impl ValueGenerator for IntRangeGenerator {
    fn id(&self) -> &'static str {
        "int_range"
    }

    fn generate(&self, rng: &mut dyn RngCore) -> FieldValue {
        FieldValue::Int(rng.random_range(self.min..=self.max))
    }
}

/// Uniform float in `min..=max`, carried with its display scale.
#[derive(Debug, Clone)]
pub struct FloatRangeGenerator {
    min: f64,
    max: f64,
    scale: u32,
}

impl FloatRangeGenerator {
    pub fn new(min: f64, max: f64, scale: u32) -> Result<Self, String> {
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(format!(
                "float_range bounds must be finite with min <= max, got {min}..={max}"
            ));
        }
        Ok(Self { min, max, scale })
    }
}

impl ValueGenerator for FloatRangeGenerator {
    fn id(&self) -> &'static str {
        "float_range"
    }

    fn generate(&self, rng: &mut dyn RngCore) -> FieldValue {
        FieldValue::Float {
            value: rng.random_range(self.min..=self.max),
            scale: self.scale,
        }
    }
}

/// Uniform pick from a fixed label list.
#[derive(Debug, Clone)]
pub struct OneOfGenerator {
    values: Vec<String>,
}

impl OneOfGenerator {
    pub fn new(values: Vec<String>) -> Result<Self, String> {
        if values.is_empty() {
            return Err("one_of requires at least one value".to_string());
        }
        Ok(Self { values })
    }
}

impl ValueGenerator for OneOfGenerator {
    fn id(&self) -> &'static str {
        "one_of"
    }

    fn generate(&self, rng: &mut dyn RngCore) -> FieldValue {
        let value = self.values.choose(rng).cloned().unwrap_or_default();
        FieldValue::Text(value)
    }
}

/// Uniform calendar date between two inclusive bounds.
#[derive(Debug, Clone)]
pub struct DateRangeGenerator {
    min: NaiveDate,
    span_days: i64,
    format: Arc<str>,
}

impl DateRangeGenerator {
    pub fn new(min: &str, max: &str, format: &str) -> Result<Self, String> {
        let parse = |value: &str| {
            parse_date_bound(value)
                .ok_or_else(|| format!("invalid date '{value}', expected YYYY-MM-DD"))
        };
        let min = parse(min)?;
        let max = parse(max)?;
        if min > max {
            return Err(format!("date_range min {min} must be <= max {max}"));
        }
        Ok(Self {
            min,
            span_days: (max - min).num_days(),
            format: Arc::from(format),
        })
    }
}

impl ValueGenerator for DateRangeGenerator {
    fn id(&self) -> &'static str {
        "date_range"
    }

    fn generate(&self, rng: &mut dyn RngCore) -> FieldValue {
        let offset = rng.random_range(0..=self.span_days);
        FieldValue::Date {
            value: self.min + Duration::days(offset),
            format: Arc::clone(&self.format),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    #[test]
    fn int_range_stays_within_bounds() {
        let generator = IntRangeGenerator::new(-30, 50).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        for _ in 0..500 {
            let FieldValue::Int(value) = generator.generate(&mut rng) else {
                panic!("expected int");
            };
            assert!((-30..=50).contains(&value));
        }
    }

    #[test]
    fn float_range_keeps_scale() {
        let generator = FloatRangeGenerator::new(0.0, 100.0, 2).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let FieldValue::Float { value, scale } = generator.generate(&mut rng) else {
            panic!("expected float");
        };
        assert_eq!(scale, 2);
        assert!((0.0..=100.0).contains(&value));
    }

    #[test]
    fn one_of_picks_listed_labels() {
        let labels = vec!["N".to_string(), "S".to_string()];
        let generator = OneOfGenerator::new(labels.clone()).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..50 {
            let FieldValue::Text(value) = generator.generate(&mut rng) else {
                panic!("expected text");
            };
            assert!(labels.contains(&value));
        }
    }

    #[test]
    fn date_range_formats_within_bounds() {
        let generator = DateRangeGenerator::new("2025-02-01", "2025-02-03", "%d.%m.%Y").unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(4);
        for _ in 0..50 {
            let value = generator.generate(&mut rng).to_string();
            assert!(
                ["01.02.2025", "02.02.2025", "03.02.2025"].contains(&value.as_str()),
                "{value}"
            );
        }
    }

    #[test]
    fn rejects_empty_domains() {
        assert!(IntRangeGenerator::new(5, 1).is_err());
        assert!(FloatRangeGenerator::new(f64::NAN, 1.0, 2).is_err());
        assert!(OneOfGenerator::new(Vec::new()).is_err());
        assert!(DateRangeGenerator::new("2025-13-01", "2025-12-31", "%d").is_err());
    }
}
