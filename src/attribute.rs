//! Attribute schema: the domain of each column of a dataset

use crate::error::{MiningError, MiningResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Numeric column with the observed `[min, max]` range
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousAttribute {
    name: String,
    id: usize,
    min: f64,
    max: f64,
}

impl ContinuousAttribute {
    pub fn new(name: impl Into<String>, id: usize, min: f64, max: f64) -> Self {
        Self {
            name: name.into(),
            id,
            min,
            max,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    /// Min-max normalization of `v` into `[0, 1]`.
    ///
    /// A constant column (`max <= min`) has no spread to normalize against, so
    /// every value maps to 0.
    pub fn scaled(&self, v: f64) -> f64 {
        let range = self.max - self.min;
        if range <= 0.0 {
            return 0.0;
        }
        (v - self.min) / range
    }
}

/// Categorical column with its lexicographically sorted domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscreteAttribute {
    name: String,
    id: usize,
    values: BTreeSet<String>,
}

impl DiscreteAttribute {
    /// Build a discrete attribute; the domain must not be empty
    pub fn new<I, S>(name: impl Into<String>, id: usize, values: I) -> MiningResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        let values: BTreeSet<String> = values.into_iter().map(Into::into).collect();
        if values.is_empty() {
            return Err(MiningError::Validation(format!(
                "discrete attribute '{}' has an empty domain",
                name
            )));
        }
        Ok(Self { name, id, values })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Domain values in ascending order
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.values.iter().map(String::as_str)
    }

    pub fn number_of_distinct_values(&self) -> usize {
        self.values.len()
    }

    pub fn contains(&self, value: &str) -> bool {
        self.values.contains(value)
    }
}

/// A column of the schema. Shared read-only by every item on that column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Attribute {
    Continuous(Arc<ContinuousAttribute>),
    Discrete(Arc<DiscreteAttribute>),
}

impl Attribute {
    pub fn name(&self) -> &str {
        match self {
            Self::Continuous(a) => a.name(),
            Self::Discrete(a) => a.name(),
        }
    }

    /// Column position in the dataset
    pub fn id(&self) -> usize {
        match self {
            Self::Continuous(a) => a.id(),
            Self::Discrete(a) => a.id(),
        }
    }

    pub fn is_continuous(&self) -> bool {
        matches!(self, Self::Continuous(_))
    }
}

impl From<ContinuousAttribute> for Attribute {
    fn from(a: ContinuousAttribute) -> Self {
        Self::Continuous(Arc::new(a))
    }
}

impl From<DiscreteAttribute> for Attribute {
    fn from(a: DiscreteAttribute) -> Self {
        Self::Discrete(Arc::new(a))
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
