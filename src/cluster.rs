//! Clusters and the fixed-size cluster set

use crate::data::Dataset;
use crate::error::{MiningError, MiningResult};
use crate::tuple::Tuple;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt::{self, Write};

/// A centroid and the row indices currently assigned to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    centroid: Tuple,
    members: BTreeSet<usize>,
}

impl Cluster {
    pub fn new(centroid: Tuple) -> Self {
        Self {
            centroid,
            members: BTreeSet::new(),
        }
    }

    pub fn centroid(&self) -> &Tuple {
        &self.centroid
    }

    pub fn members(&self) -> &BTreeSet<usize> {
        &self.members
    }

    /// Returns `true` if the row was not already a member
    pub fn add(&mut self, row: usize) -> bool {
        self.members.insert(row)
    }

    pub fn contains(&self, row: usize) -> bool {
        self.members.contains(&row)
    }

    pub fn remove(&mut self, row: usize) {
        self.members.remove(&row);
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Recompute the centroid from the current members.
    ///
    /// An empty cluster keeps its centroid: the prototype of no rows is undefined.
    pub fn compute_centroid(&mut self, data: &Dataset) {
        if self.members.is_empty() {
            return;
        }
        self.centroid.update(data, &self.members);
    }

    /// Centroid, every member with its distance, and the mean distance
    pub fn report(&self, data: &Dataset) -> String {
        let mut out = format!("Centroid = ( {} )\nTuples:\n", self.centroid);
        for &row in &self.members {
            let Some(tuple) = data.tuple(row) else {
                continue;
            };
            let _ = writeln!(out, "[ {} ] dist = {}", tuple, self.centroid.distance(&tuple));
        }
        let _ = writeln!(out, "AvgDistance = {}", self.centroid.avg_distance(data, &self.members));
        out
    }
}

impl fmt::Display for Cluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Centroid = ({} )", self.centroid)
    }
}

/// The k clusters of one k-means run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterSet {
    k: usize,
    clusters: Vec<Cluster>,
}

impl ClusterSet {
    /// An empty set that will hold `k` clusters once initialized
    pub fn new(k: usize) -> Self {
        Self {
            k,
            clusters: Vec::with_capacity(k),
        }
    }

    pub fn k(&self) -> usize {
        self.k
    }

    pub fn clusters(&self) -> &[Cluster] {
        &self.clusters
    }

    pub fn get(&self, i: usize) -> Option<&Cluster> {
        self.clusters.get(i)
    }

    pub(crate) fn get_mut(&mut self, i: usize) -> Option<&mut Cluster> {
        self.clusters.get_mut(i)
    }

    /// Seed one cluster per sampled row, in sampling order.
    ///
    /// Each seed row starts as the sole member of its own cluster: it is the
    /// only row at distance 0 from that centroid. On failure the set is left
    /// empty.
    pub fn initialize_centroids<R: Rng + ?Sized>(&mut self, data: &Dataset, rng: &mut R) -> MiningResult<()> {
        self.clusters.clear();
        let seeds = data.sample(self.k, rng)?;
        let mut clusters = Vec::with_capacity(seeds.len());
        for row in seeds {
            let centroid = data
                .tuple(row)
                .ok_or_else(|| MiningError::DataSource(format!("sampled row {} out of range", row)))?;
            let mut cluster = Cluster::new(centroid);
            cluster.add(row);
            clusters.push(cluster);
        }
        self.clusters = clusters;
        Ok(())
    }

    /// Index of the cluster whose centroid is closest to `tuple`; the lowest
    /// index wins ties. `None` before initialization.
    pub fn nearest_cluster(&self, tuple: &Tuple) -> Option<usize> {
        let mut nearest: Option<(usize, f64)> = None;
        for (i, cluster) in self.clusters.iter().enumerate() {
            let distance = tuple.distance(cluster.centroid());
            match nearest {
                Some((_, best)) if distance >= best => {}
                _ => nearest = Some((i, distance)),
            }
        }
        nearest.map(|(i, _)| i)
    }

    /// Index of the cluster currently holding `row`, if any
    pub fn current_cluster(&self, row: usize) -> Option<usize> {
        self.clusters.iter().position(|c| c.contains(row))
    }

    pub fn update_centroids(&mut self, data: &Dataset) {
        for cluster in &mut self.clusters {
            cluster.compute_centroid(data);
        }
    }

    /// Full textual report: centroids, members and distances
    pub fn report(&self, data: &Dataset) -> String {
        let mut out = String::new();
        for (i, cluster) in self.clusters.iter().enumerate() {
            let _ = writeln!(out, "{}: {}", i, cluster.report(data));
        }
        out
    }

    /// Structural checks applied to a model read back from storage
    pub(crate) fn validate(&self) -> MiningResult<()> {
        if self.k == 0 || self.clusters.len() != self.k {
            return Err(MiningError::CorruptModel(format!(
                "expected {} clusters, found {}",
                self.k,
                self.clusters.len()
            )));
        }
        let width = self.clusters[0].centroid().len();
        if width == 0 || self.clusters.iter().any(|c| c.centroid().len() != width) {
            return Err(MiningError::CorruptModel("inconsistent centroid width".to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for ClusterSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, cluster) in self.clusters.iter().enumerate() {
            writeln!(f, "{}: {}", i, cluster)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Value;
    use crate::source::{Column, ColumnKind, Table};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn numbers(values: &[f64]) -> Dataset {
        let table = Table::new(
            vec![Column::new("x", ColumnKind::Numeric)],
            values.iter().map(|&v| vec![Value::Number(v)]).collect(),
        );
        Dataset::from_table("numbers", table).unwrap()
    }

    #[test]
    fn test_add_remove_membership() {
        let data = numbers(&[1.0, 2.0]);
        let mut cluster = Cluster::new(data.tuple(0).unwrap());
        assert!(cluster.add(1));
        assert!(!cluster.add(1));
        assert!(cluster.contains(1));
        cluster.remove(1);
        assert!(cluster.is_empty());
    }

    #[test]
    fn test_initialize_fails_without_creating_clusters() {
        let data = numbers(&[1.0, 2.0, 3.0]);
        let mut rng = StdRng::seed_from_u64(1);
        let mut set = ClusterSet::new(4);
        assert!(set.initialize_centroids(&data, &mut rng).is_err());
        assert!(set.clusters().is_empty());

        let mut set = ClusterSet::new(0);
        assert!(set.initialize_centroids(&data, &mut rng).is_err());
        assert!(set.clusters().is_empty());
    }

    #[test]
    fn test_nearest_cluster_prefers_lowest_index_on_ties() {
        let data = numbers(&[0.0, 5.0, 10.0]);
        let mut set = ClusterSet::new(2);
        set.clusters = vec![
            Cluster::new(data.tuple(0).unwrap()),
            Cluster::new(data.tuple(2).unwrap()),
        ];
        let middle = data.tuple(1).unwrap();
        assert_eq!(set.nearest_cluster(&middle), Some(0));
        assert_eq!(set.nearest_cluster(&data.tuple(2).unwrap()), Some(1));
    }

    #[test]
    fn test_seed_rows_start_in_their_own_cluster() {
        let data = numbers(&[0.0, 10.0, 20.0]);
        let mut rng = StdRng::seed_from_u64(3);
        let mut set = ClusterSet::new(2);
        set.initialize_centroids(&data, &mut rng).unwrap();

        assert_eq!(set.clusters().len(), 2);
        for (i, cluster) in set.clusters().iter().enumerate() {
            assert_eq!(cluster.len(), 1);
            let seed = *cluster.members().iter().next().unwrap();
            assert_eq!(set.current_cluster(seed), Some(i));
            assert_eq!(cluster.centroid(), &data.tuple(seed).unwrap());
        }
    }

    #[test]
    fn test_current_cluster_lookup() {
        let data = numbers(&[0.0, 10.0]);
        let mut set = ClusterSet::new(2);
        set.clusters = vec![
            Cluster::new(data.tuple(0).unwrap()),
            Cluster::new(data.tuple(1).unwrap()),
        ];
        assert_eq!(set.current_cluster(0), None);
        set.get_mut(1).unwrap().add(0);
        assert_eq!(set.current_cluster(0), Some(1));
    }

    #[test]
    fn test_update_centroids_uses_mean() {
        let data = numbers(&[1.0, 2.0, 3.0, 12.0]);
        let mut set = ClusterSet::new(1);
        set.clusters = vec![Cluster::new(data.tuple(3).unwrap())];
        for row in 0..3 {
            set.get_mut(0).unwrap().add(row);
        }
        set.update_centroids(&data);
        assert_eq!(set.get(0).unwrap().centroid().to_string(), "2");
    }

    #[test]
    fn test_empty_cluster_keeps_centroid() {
        let data = numbers(&[1.0, 9.0]);
        let mut set = ClusterSet::new(1);
        set.clusters = vec![Cluster::new(data.tuple(1).unwrap())];
        set.update_centroids(&data);
        assert_eq!(set.get(0).unwrap().centroid().to_string(), "9");
    }

    #[test]
    fn test_summary_and_report_formats() {
        let data = numbers(&[1.0, 3.0]);
        let mut set = ClusterSet::new(1);
        set.clusters = vec![Cluster::new(data.tuple(0).unwrap())];
        set.get_mut(0).unwrap().add(0);
        set.get_mut(0).unwrap().add(1);

        assert_eq!(set.to_string(), "0: Centroid = (1 )\n");
        let report = set.report(&data);
        assert!(report.starts_with("0: Centroid = ( 1 )\nTuples:\n"));
        assert!(report.contains("[ 3 ] dist = 1"));
        assert!(report.contains("AvgDistance = 0.5"));
    }
}
