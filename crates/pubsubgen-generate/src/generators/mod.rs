use std::fmt;

use pubsubgen_core::{DomainSpec, FieldValue, Schema};
use rand::RngCore;
use tracing::debug;

use crate::errors::{GenerationError, Result};

mod primitives;

pub use primitives::{DateRangeGenerator, FloatRangeGenerator, IntRangeGenerator, OneOfGenerator};

/// Produces values for one field domain.
pub trait ValueGenerator: fmt::Debug + Send + Sync {
    fn id(&self) -> &'static str;

    fn generate(&self, rng: &mut dyn RngCore) -> FieldValue;
}

/// Build the generator for a domain, rejecting domains that cannot produce
/// a value.
pub fn build_generator(field: &str, domain: &DomainSpec) -> Result<Box<dyn ValueGenerator>> {
    let invalid = |message: String| GenerationError::InvalidDomain {
        field: field.to_string(),
        message,
    };

    let generator: Box<dyn ValueGenerator> = match domain {
        DomainSpec::IntRange { min, max } => {
            Box::new(IntRangeGenerator::new(*min, *max).map_err(invalid)?)
        }
        DomainSpec::FloatRange { min, max, scale } => {
            Box::new(FloatRangeGenerator::new(*min, *max, *scale).map_err(invalid)?)
        }
        DomainSpec::OneOf { values } => {
            Box::new(OneOfGenerator::new(values.clone()).map_err(invalid)?)
        }
        DomainSpec::DateRange { min, max, format } => {
            Box::new(DateRangeGenerator::new(min, max, format).map_err(invalid)?)
        }
    };
    Ok(generator)
}

/// A schema field paired with its value generator.
#[derive(Debug)]
pub struct FieldGenerator {
    pub name: String,
    pub numeric: bool,
    pub generator: Box<dyn ValueGenerator>,
}

/// Value generators for every field of a schema, in schema order.
#[derive(Debug)]
pub struct FieldGenerators {
    fields: Vec<FieldGenerator>,
}

impl FieldGenerators {
    pub fn from_schema(schema: &Schema) -> Result<Self> {
        pubsubgen_core::validate_schema(schema).map_err(pubsubgen_plan::PlanError::from)?;
        let fields = schema
            .fields
            .iter()
            .map(|field| {
                let generator = build_generator(&field.name, &field.domain)?;
                debug!(field = %field.name, generator = generator.id(), "field generator built");
                Ok(FieldGenerator {
                    name: field.name.clone(),
                    numeric: field.domain.is_numeric(),
                    generator,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fields })
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&FieldGenerator> {
        self.fields.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldGenerator> {
        self.fields.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|field| field.name.as_str())
    }

    /// Generator ids in schema order.
    pub fn ids(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|field| field.generator.id())
    }
}
