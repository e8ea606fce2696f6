//! In-memory dataset: schema construction, centroid sampling and prototypes

use crate::attribute::{Attribute, ContinuousAttribute, DiscreteAttribute};
use crate::error::{MiningError, MiningResult};
use crate::source::{Aggregate, ColumnKind, DataSource, Table};
use crate::tuple::{Item, Tuple};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::debug;

/// A single cell as delivered by the data source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    Text(String),
}

impl Value {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Number(_) => None,
            Self::Text(s) => Some(s),
        }
    }
}

// Numbers sort before text; numbers use the IEEE total order.
impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
            (Self::Text(a), Self::Text(b)) => a.cmp(b),
            (Self::Number(_), Self::Text(_)) => Ordering::Less,
            (Self::Text(_), Self::Number(_)) => Ordering::Greater,
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{}", v),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Distinct, sorted rows of a table together with their attribute schema.
///
/// Immutable once built; every row is value-distinct from every other.
#[derive(Debug, Clone)]
pub struct Dataset {
    rows: Vec<Vec<Value>>,
    schema: Vec<Attribute>,
}

impl Dataset {
    /// Load `table` through the data source and derive its schema
    ///
    /// # Errors
    /// * `EmptySet` if the table has no rows
    /// * `NoValue` if a min/max/distinct computation yields nothing
    /// * `Connection` / `DataSource` as reported by the source
    pub fn load(source: &dyn DataSource, table: &str) -> MiningResult<Self> {
        let loaded = source.load_table(table)?;
        if loaded.rows().is_empty() {
            return Err(MiningError::EmptySet(table.to_string()));
        }

        let mut schema = Vec::with_capacity(loaded.columns().len());
        for (id, column) in loaded.columns().iter().enumerate() {
            let attribute = match column.kind {
                ColumnKind::Numeric => {
                    let min = source.aggregate(table, &column.name, Aggregate::Min)?;
                    let max = source.aggregate(table, &column.name, Aggregate::Max)?;
                    ContinuousAttribute::new(column.name.clone(), id, min, max).into()
                }
                ColumnKind::Categorical => {
                    let values = source.distinct_values(table, &column.name)?;
                    if values.is_empty() {
                        return Err(MiningError::NoValue {
                            table: table.to_string(),
                            column: column.name.clone(),
                        });
                    }
                    DiscreteAttribute::new(column.name.clone(), id, values)?.into()
                }
            };
            schema.push(attribute);
        }

        debug!(table, attributes = schema.len(), "schema derived");
        Self::from_parts(schema, loaded.into_rows())
    }

    /// Build a dataset straight from a table, computing aggregates locally
    pub fn from_table(name: &str, table: Table) -> MiningResult<Self> {
        if table.rows().is_empty() {
            return Err(MiningError::EmptySet(name.to_string()));
        }
        let no_value = |column: &str| MiningError::NoValue {
            table: name.to_string(),
            column: column.to_string(),
        };

        let mut schema = Vec::with_capacity(table.columns().len());
        for (id, column) in table.columns().iter().enumerate() {
            let attribute = match column.kind {
                ColumnKind::Numeric => {
                    let min = table
                        .aggregate(&column.name, Aggregate::Min)
                        .ok_or_else(|| no_value(&column.name))?;
                    let max = table
                        .aggregate(&column.name, Aggregate::Max)
                        .ok_or_else(|| no_value(&column.name))?;
                    ContinuousAttribute::new(column.name.clone(), id, min, max).into()
                }
                ColumnKind::Categorical => {
                    let values = table.distinct_values(&column.name);
                    if values.is_empty() {
                        return Err(no_value(&column.name));
                    }
                    DiscreteAttribute::new(column.name.clone(), id, values)?.into()
                }
            };
            schema.push(attribute);
        }
        Self::from_parts(schema, table.into_rows())
    }

    /// Assemble a dataset from a schema and raw rows.
    ///
    /// Rows are type-checked against the schema, then sorted and de-duplicated.
    pub fn from_parts(schema: Vec<Attribute>, mut rows: Vec<Vec<Value>>) -> MiningResult<Self> {
        if schema.is_empty() {
            return Err(MiningError::DataSource("no column of a supported type".to_string()));
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != schema.len() {
                return Err(MiningError::DataSource(format!(
                    "row {} has {} values, schema has {} attributes",
                    i,
                    row.len(),
                    schema.len()
                )));
            }
            for (attribute, value) in schema.iter().zip(row) {
                Item::new(attribute, value)?;
            }
        }

        rows.sort();
        rows.dedup();

        Ok(Self { rows, schema })
    }

    pub fn number_of_tuples(&self) -> usize {
        self.rows.len()
    }

    pub fn number_of_attributes(&self) -> usize {
        self.schema.len()
    }

    pub fn schema(&self) -> &[Attribute] {
        &self.schema
    }

    pub fn row(&self, row: usize) -> Option<&[Value]> {
        self.rows.get(row).map(Vec::as_slice)
    }

    pub fn attribute_value(&self, row: usize, column: usize) -> Option<&Value> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// The items of `row`, in schema order
    pub fn tuple(&self, row: usize) -> Option<Tuple> {
        let values = self.rows.get(row)?;
        let items = self
            .schema
            .iter()
            .zip(values)
            .map(|(attribute, value)| Item::new(attribute, value).ok())
            .collect::<Option<Vec<_>>>()?;
        Some(Tuple::new(items))
    }

    /// Draw `k` row indices whose rows are pairwise value-distinct.
    ///
    /// Candidates are drawn uniformly and rejected when an accepted row holds
    /// the same values. Rows are de-duplicated at construction, so at least
    /// `number_of_tuples` value-distinct rows always exist and the draw
    /// terminates for every valid `k`.
    pub fn sample<R: Rng + ?Sized>(&self, k: usize, rng: &mut R) -> MiningResult<Vec<usize>> {
        let n = self.number_of_tuples();
        if k == 0 || k > n {
            return Err(MiningError::OutOfRangeSampleSize {
                k: k as i64,
                tuples: n,
            });
        }

        let mut chosen: Vec<usize> = Vec::with_capacity(k);
        while chosen.len() < k {
            let candidate = rng.gen_range(0..n);
            if !chosen.iter().any(|&c| self.rows_equal(c, candidate)) {
                chosen.push(candidate);
            }
        }
        Ok(chosen)
    }

    fn rows_equal(&self, a: usize, b: usize) -> bool {
        self.rows[a] == self.rows[b]
    }

    /// Representative value of `attribute` over `rows`: mean or mode
    pub fn prototype(&self, attribute: &Attribute, rows: &BTreeSet<usize>) -> Value {
        match attribute {
            Attribute::Continuous(a) => Value::Number(self.continuous_prototype(a, rows)),
            Attribute::Discrete(a) => Value::Text(self.discrete_prototype(a, rows)),
        }
    }

    /// Arithmetic mean of the column over `rows`. NaN for an empty set.
    pub fn continuous_prototype(&self, attribute: &ContinuousAttribute, rows: &BTreeSet<usize>) -> f64 {
        let (total, count) = rows
            .iter()
            .filter_map(|&row| self.attribute_value(row, attribute.id()))
            .filter_map(Value::as_number)
            .fold((0.0, 0usize), |(sum, n), v| (sum + v, n + 1));
        total / count as f64
    }

    /// Most frequent domain value over `rows`.
    ///
    /// Domain values are visited in sorted order and only a strictly higher
    /// count replaces the current winner. Empty string when nothing occurs.
    pub fn discrete_prototype(&self, attribute: &DiscreteAttribute, rows: &BTreeSet<usize>) -> String {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for value in rows
            .iter()
            .filter_map(|&row| self.attribute_value(row, attribute.id()))
            .filter_map(Value::as_text)
        {
            *counts.entry(value).or_insert(0) += 1;
        }

        let mut most_frequent = "";
        let mut best = 0;
        for value in attribute.values() {
            let frequency = counts.get(value).copied().unwrap_or(0);
            if frequency > best {
                most_frequent = value;
                best = frequency;
            }
        }
        most_frequent.to_string()
    }
}

impl fmt::Display for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let header: Vec<&str> = self.schema.iter().map(Attribute::name).collect();
        writeln!(f, "{}", header.join(", "))?;
        for (i, row) in self.rows.iter().enumerate() {
            write!(f, "{}: ", i + 1)?;
            for value in row {
                write!(f, "{} ", value)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
