use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{AppError, Result};
use crate::models::Algorithm;

use super::implicit::ImplicitModel;
use super::rating::RatingModel;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FactorModel {
    Rating(RatingModel),
    Implicit(ImplicitModel),
}

impl FactorModel {
    pub fn knows_user(&self, user_id: i64) -> bool {
        match self {
            FactorModel::Rating(model) => model.knows_user(user_id),
            FactorModel::Implicit(model) => model.knows_user(user_id),
        }
    }

    /// Scores `candidates` for `user_id`, best first. Scores only order
    /// items within one model and are not comparable across models.
    pub fn rank(&self, user_id: i64, candidates: &[i64]) -> Vec<(i64, f64)> {
        let mut scored: Vec<(i64, f64)> = candidates
            .iter()
            .filter_map(|&article_id| {
                let score = match self {
                    FactorModel::Rating(model) => Some(model.predict(user_id, article_id).value),
                    FactorModel::Implicit(model) => model.score(user_id, article_id),
                };
                score.map(|s| (article_id, s))
            })
            .collect();
        scored.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.0.cmp(&b.0))
        });
        scored
    }
}

/// A trained model plus the metadata needed to serve it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub algorithm_version: String,
    pub trained_at: DateTime<Utc>,
    pub seed: u64,
    pub model: FactorModel,
}

impl ModelArtifact {
    pub fn path_for(model_dir: &Path, algorithm: Algorithm) -> PathBuf {
        model_dir.join(format!("{}.json", algorithm.version()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        // write then rename so a serving process never reads a partial file
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(self)?)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Owned, reload-capable slot holding the model a latent scorer serves.
///
/// Readers take a cloned `Arc`, so a reload swaps the whole artifact and
/// never mutates one that is being read.
pub struct ModelHandle {
    algorithm: Algorithm,
    path: PathBuf,
    slot: RwLock<Option<Arc<ModelArtifact>>>,
    miss_logged: AtomicBool,
}

impl ModelHandle {
    pub fn empty(algorithm: Algorithm, path: PathBuf) -> Self {
        Self {
            algorithm,
            path,
            slot: RwLock::new(None),
            miss_logged: AtomicBool::new(false),
        }
    }

    /// Loads the artifact at `path` if it can; otherwise starts empty.
    pub fn open(algorithm: Algorithm, path: PathBuf) -> Self {
        let handle = Self::empty(algorithm, path);
        if let Err(e) = handle.reload() {
            warn!("No {} model loaded from {:?}: {}", algorithm, handle.path, e);
            handle.miss_logged.store(true, Ordering::Relaxed);
        }
        handle
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn current(&self) -> Option<Arc<ModelArtifact>> {
        self.slot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_loaded(&self) -> bool {
        self.current().is_some()
    }

    pub fn reload(&self) -> Result<Arc<ModelArtifact>> {
        let artifact = ModelArtifact::load(&self.path)?;
        self.replace(artifact)
    }

    pub fn replace(&self, artifact: ModelArtifact) -> Result<Arc<ModelArtifact>> {
        if artifact.algorithm_version != self.algorithm.version() {
            return Err(AppError::ModelUnavailable(format!(
                "artifact is {}, expected {}",
                artifact.algorithm_version,
                self.algorithm.version()
            )));
        }
        let artifact = Arc::new(artifact);
        *self
            .slot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::clone(&artifact));
        info!(
            "Loaded {} model trained at {}",
            artifact.algorithm_version, artifact.trained_at
        );
        Ok(artifact)
    }

    /// The loaded model. An empty slot gets one reload attempt per call,
    /// read on the blocking pool, so an artifact written after startup is
    /// picked up by the next request.
    pub async fn get_or_reload(&self) -> Option<Arc<ModelArtifact>> {
        if let Some(artifact) = self.current() {
            return Some(artifact);
        }

        let path = self.path.clone();
        let loaded = tokio::task::spawn_blocking(move || ModelArtifact::load(&path))
            .await
            .map_err(|e| AppError::Other(anyhow::anyhow!("model load task failed: {}", e)))
            .and_then(|loaded| loaded)
            .and_then(|artifact| self.replace(artifact));

        match loaded {
            Ok(artifact) => {
                self.miss_logged.store(false, Ordering::Relaxed);
                Some(artifact)
            }
            Err(e) => {
                if self.miss_logged.swap(true, Ordering::Relaxed) {
                    debug!("{} model still unavailable: {}", self.algorithm, e);
                } else {
                    warn!("{} model unavailable: {}", self.algorithm, e);
                }
                None
            }
        }
    }
}
