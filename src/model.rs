//! K-Means engine: initialization, the assign/update loop, and model persistence

use crate::cluster::ClusterSet;
use crate::data::Dataset;
use crate::error::{MiningError, MiningResult};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

const MODEL_MAGIC: [u8; 4] = *b"KMCS";
const MODEL_VERSION: u32 = 1;

/// Tuning knobs for a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MinerOptions {
    /// Fixed seed for centroid sampling; fresh entropy when `None`
    pub seed: Option<u64>,
    /// Stop after this many iterations even if membership still changes
    pub max_iterations: Option<usize>,
}

impl MinerOptions {
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        }
    }
}

/// Where a miner is in its run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinerState {
    Uninitialized,
    Iterating,
    Converged,
}

/// On-disk form of a model
#[derive(Debug, Serialize, Deserialize)]
struct ModelFile {
    magic: [u8; 4],
    version: u32,
    saved_at: DateTime<Utc>,
    clusters: ClusterSet,
}

/// Runs k-means over a dataset and owns the resulting cluster set
#[derive(Debug, Clone)]
pub struct KMeansMiner {
    clusters: ClusterSet,
    state: MinerState,
    options: MinerOptions,
}

impl KMeansMiner {
    pub fn new(k: usize) -> Self {
        Self::with_options(k, MinerOptions::default())
    }

    pub fn with_options(k: usize, options: MinerOptions) -> Self {
        Self {
            clusters: ClusterSet::new(k),
            state: MinerState::Uninitialized,
            options,
        }
    }

    pub fn clusters(&self) -> &ClusterSet {
        &self.clusters
    }

    pub fn state(&self) -> MinerState {
        self.state
    }

    /// Cluster `data`, drawing the random seeds from the configured options.
    pub fn kmeans(&mut self, data: &Dataset) -> MiningResult<usize> {
        let mut rng = self.options.rng();
        self.kmeans_with_rng(data, &mut rng)
    }

    /// Cluster `data` and return the number of assign/update iterations.
    ///
    /// The loop stops once a full assignment pass moves no row, or when the
    /// optional iteration cap is reached.
    ///
    /// # Errors
    /// * `OutOfRangeSampleSize` if `k` is not within `1..=data.number_of_tuples()`
    pub fn kmeans_with_rng<R: Rng + ?Sized>(&mut self, data: &Dataset, rng: &mut R) -> MiningResult<usize> {
        self.clusters = ClusterSet::new(self.clusters.k());
        self.state = MinerState::Uninitialized;

        self.clusters.initialize_centroids(data, rng)?;
        self.state = MinerState::Iterating;

        let mut iterations = 0;
        loop {
            iterations += 1;

            let changed = self.assign(data);
            self.clusters.update_centroids(data);
            debug!(iteration = iterations, changed, "k-means pass complete");

            if !changed {
                self.state = MinerState::Converged;
                break;
            }
            if let Some(cap) = self.options.max_iterations {
                if iterations >= cap {
                    warn!(iterations, "iteration cap reached before convergence");
                    break;
                }
            }
        }

        info!(
            k = self.clusters.k(),
            tuples = data.number_of_tuples(),
            iterations,
            "k-means finished"
        );
        Ok(iterations)
    }

    /// Move every row to its nearest cluster; `true` if any membership changed
    fn assign(&mut self, data: &Dataset) -> bool {
        let mut changed = false;
        for row in 0..data.number_of_tuples() {
            let Some(tuple) = data.tuple(row) else {
                continue;
            };
            let Some(nearest) = self.clusters.nearest_cluster(&tuple) else {
                continue;
            };
            let previous = self.clusters.current_cluster(row);

            let added = self
                .clusters
                .get_mut(nearest)
                .map(|cluster| cluster.add(row))
                .unwrap_or(false);
            if added {
                changed = true;
                if let Some(old) = previous {
                    if let Some(cluster) = self.clusters.get_mut(old) {
                        cluster.remove(row);
                    }
                }
            }
        }
        changed
    }

    /// Write the whole cluster set to `path` as one unit, through a uniquely
    /// named temporary file in the same directory
    pub fn save(&self, path: impl AsRef<Path>) -> MiningResult<()> {
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        self.save_to(tmp.as_file_mut())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| e.error)?;
        info!(path = %path.display(), "model saved");
        Ok(())
    }

    /// Serialize the cluster set into `writer`
    pub fn save_to<W: Write>(&self, writer: &mut W) -> MiningResult<()> {
        let model = ModelFile {
            magic: MODEL_MAGIC,
            version: MODEL_VERSION,
            saved_at: Utc::now(),
            clusters: self.clusters.clone(),
        };
        let bytes = bincode::serialize(&model)?;
        writer.write_all(&bytes)?;
        Ok(())
    }

    /// Restore a miner from a model file written by [`KMeansMiner::save`]
    pub fn load(path: impl AsRef<Path>) -> MiningResult<Self> {
        let mut file = fs::File::open(path.as_ref())?;
        Self::load_from(&mut file)
    }

    /// Decode a model from `reader`.
    ///
    /// Read failures are `Io`; anything that does not decode into a valid
    /// cluster set is `CorruptModel`.
    pub fn load_from<R: Read>(reader: &mut R) -> MiningResult<Self> {
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;

        let model: ModelFile = bincode::deserialize(&bytes)?;
        if model.magic != MODEL_MAGIC {
            return Err(MiningError::CorruptModel("not a k-means model".to_string()));
        }
        if model.version != MODEL_VERSION {
            return Err(MiningError::CorruptModel(format!(
                "unsupported model version {}",
                model.version
            )));
        }
        model.clusters.validate()?;
        debug!(saved_at = %model.saved_at, k = model.clusters.k(), "model decoded");

        Ok(Self {
            clusters: model.clusters,
            state: MinerState::Converged,
            options: MinerOptions::default(),
        })
    }
}
