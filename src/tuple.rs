//! Items (attribute-value pairs) and tuples with the mixed-type distance

use crate::attribute::{Attribute, ContinuousAttribute, DiscreteAttribute};
use crate::data::{Dataset, Value};
use crate::error::{MiningError, MiningResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Numeric value on a continuous attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContinuousItem {
    attribute: Arc<ContinuousAttribute>,
    value: f64,
}

impl ContinuousItem {
    pub fn new(attribute: Arc<ContinuousAttribute>, value: f64) -> Self {
        Self { attribute, value }
    }

    pub fn attribute(&self) -> &ContinuousAttribute {
        &self.attribute
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Absolute difference of the min-max scaled values
    pub fn distance(&self, other: &ContinuousItem) -> f64 {
        (self.attribute.scaled(self.value) - other.attribute.scaled(other.value)).abs()
    }
}

/// Categorical value on a discrete attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscreteItem {
    attribute: Arc<DiscreteAttribute>,
    value: String,
}

impl DiscreteItem {
    pub fn new(attribute: Arc<DiscreteAttribute>, value: impl Into<String>) -> Self {
        Self {
            attribute,
            value: value.into(),
        }
    }

    pub fn attribute(&self) -> &DiscreteAttribute {
        &self.attribute
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// 0 when equal, 1 otherwise
    pub fn distance(&self, other: &DiscreteItem) -> f64 {
        if self.value == other.value {
            0.0
        } else {
            1.0
        }
    }
}

/// One cell of a tuple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    Continuous(ContinuousItem),
    Discrete(DiscreteItem),
}

impl Item {
    /// Pair `value` with `attribute`, checking that the kinds agree
    pub fn new(attribute: &Attribute, value: &Value) -> MiningResult<Self> {
        match (attribute, value) {
            (Attribute::Continuous(a), Value::Number(v)) => {
                Ok(Self::Continuous(ContinuousItem::new(Arc::clone(a), *v)))
            }
            (Attribute::Discrete(a), Value::Text(s)) => {
                Ok(Self::Discrete(DiscreteItem::new(Arc::clone(a), s.clone())))
            }
            (attribute, value) => Err(MiningError::DataSource(format!(
                "value '{}' does not match the kind of attribute '{}'",
                value,
                attribute.name()
            ))),
        }
    }

    pub fn attribute(&self) -> Attribute {
        match self {
            Self::Continuous(item) => Attribute::Continuous(Arc::clone(&item.attribute)),
            Self::Discrete(item) => Attribute::Discrete(Arc::clone(&item.attribute)),
        }
    }

    pub fn value(&self) -> Value {
        match self {
            Self::Continuous(item) => Value::Number(item.value),
            Self::Discrete(item) => Value::Text(item.value.clone()),
        }
    }

    /// Distance to an item on the same column.
    ///
    /// Items of different kinds never share a column; they are treated as
    /// maximally distant.
    pub fn distance(&self, other: &Item) -> f64 {
        match (self, other) {
            (Self::Continuous(a), Self::Continuous(b)) => a.distance(b),
            (Self::Discrete(a), Self::Discrete(b)) => a.distance(b),
            _ => 1.0,
        }
    }

    /// Replace the value with the prototype of this column over `rows`
    pub fn update(&mut self, data: &Dataset, rows: &BTreeSet<usize>) {
        match self {
            Self::Continuous(item) => {
                item.value = data.continuous_prototype(&item.attribute, rows);
            }
            Self::Discrete(item) => {
                item.value = data.discrete_prototype(&item.attribute, rows);
            }
        }
    }
}

impl fmt::Display for Item {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continuous(item) => write!(f, "{}", item.value),
            Self::Discrete(item) => f.write_str(&item.value),
        }
    }
}

/// Fixed-length sequence of items, one per schema attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    items: Vec<Item>,
}

impl Tuple {
    pub fn new(items: Vec<Item>) -> Self {
        Self { items }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Item> {
        self.items.get(i)
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Sum of the per-position item distances
    pub fn distance(&self, other: &Tuple) -> f64 {
        self.items
            .iter()
            .zip(other.items.iter())
            .map(|(a, b)| a.distance(b))
            .sum()
    }

    /// Mean distance to the dataset rows in `rows`; 0 for an empty set.
    pub fn avg_distance(&self, data: &Dataset, rows: &BTreeSet<usize>) -> f64 {
        if rows.is_empty() {
            return 0.0;
        }
        let total: f64 = rows
            .iter()
            .filter_map(|&row| data.tuple(row))
            .map(|tuple| self.distance(&tuple))
            .sum();
        total / rows.len() as f64
    }

    /// Recompute every item as the prototype of its column over `rows`
    pub fn update(&mut self, data: &Dataset, rows: &BTreeSet<usize>) {
        for item in &mut self.items {
            item.update(data, rows);
        }
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, item) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{}", item)?;
        }
        Ok(())
    }
}
