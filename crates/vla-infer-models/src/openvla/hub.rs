//! Checkpoint resolution: local directories or the Hugging Face Hub

use hf_hub::{api::sync::Api, Repo, RepoType};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use vla_infer_core::{Error, Result};

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";
const WEIGHTS_INDEX_FILE: &str = "model.safetensors.index.json";

/// Files making up an OpenVLA checkpoint
#[derive(Debug, Clone)]
pub struct CheckpointFiles {
    pub config: PathBuf,
    pub tokenizer: PathBuf,
    pub weights: Vec<PathBuf>,
}

#[derive(Debug, Deserialize)]
struct SafetensorsIndex {
    weight_map: HashMap<String, String>,
}

/// How a checkpoint stores its weights
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightLayout {
    /// `model.safetensors.index.json` plus the shards it lists
    Sharded,
    /// A single `model.safetensors`
    Single,
}

/// Pick the weight layout from the files a checkpoint provides
pub fn weight_layout<'a>(files: impl IntoIterator<Item = &'a str>) -> Result<WeightLayout> {
    let mut single = false;
    for name in files {
        match name {
            WEIGHTS_INDEX_FILE => return Ok(WeightLayout::Sharded),
            WEIGHTS_FILE => single = true,
            _ => {}
        }
    }

    if single {
        Ok(WeightLayout::Single)
    } else {
        Err(Error::load(format!(
            "checkpoint has neither {} nor {}",
            WEIGHTS_INDEX_FILE, WEIGHTS_FILE
        )))
    }
}

/// Shard file names referenced by a `model.safetensors.index.json`
pub fn shard_names(index_path: impl AsRef<Path>) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(index_path.as_ref())?;
    let index: SafetensorsIndex = serde_json::from_str(&content)?;

    let shards: BTreeSet<String> = index.weight_map.into_values().collect();
    Ok(shards.into_iter().collect())
}

/// Resolve `model_id` to checkpoint files.
///
/// An existing directory is read in place; anything else is treated as a Hub
/// repository id and downloaded (or served from the local Hub cache).
pub fn resolve_checkpoint(model_id: &str, revision: &str) -> Result<CheckpointFiles> {
    let local = Path::new(model_id);
    if local.is_dir() {
        tracing::info!("Using local checkpoint at {}", local.display());
        return local_checkpoint(local);
    }

    hub_checkpoint(model_id, revision)
}

fn local_checkpoint(dir: &Path) -> Result<CheckpointFiles> {
    let require = |name: &str| -> Result<PathBuf> {
        let path = dir.join(name);
        if !path.exists() {
            return Err(Error::load(format!("Model file not found: {}", path.display())));
        }
        Ok(path)
    };

    let config = require(CONFIG_FILE)?;
    let tokenizer = require(TOKENIZER_FILE)?;

    let present = [WEIGHTS_INDEX_FILE, WEIGHTS_FILE]
        .into_iter()
        .filter(|name| dir.join(name).exists());
    let weights = match weight_layout(present)? {
        WeightLayout::Sharded => shard_names(dir.join(WEIGHTS_INDEX_FILE))?
            .into_iter()
            .map(|name| require(name.as_str()))
            .collect::<Result<Vec<_>>>()?,
        WeightLayout::Single => vec![require(WEIGHTS_FILE)?],
    };

    Ok(CheckpointFiles {
        config,
        tokenizer,
        weights,
    })
}

fn hub_checkpoint(model_id: &str, revision: &str) -> Result<CheckpointFiles> {
    tracing::info!("Fetching {} @ {} from the Hugging Face Hub", model_id, revision);

    let api = Api::new()
        .map_err(|e| Error::load(format!("Failed to initialize HF API: {}", e)))?;
    let repo = api.repo(Repo::with_revision(
        model_id.to_string(),
        RepoType::Model,
        revision.to_string(),
    ));

    let fetch = |name: &str| -> Result<PathBuf> {
        tracing::debug!("Downloading {}", name);
        repo.get(name)
            .map_err(|e| Error::load(format!("Failed to download {} from {}: {}", name, model_id, e)))
    };

    let config = fetch(CONFIG_FILE)?;
    let tokenizer = fetch(TOKENIZER_FILE)?;

    let info = repo
        .info()
        .map_err(|e| Error::load(format!("Failed to list files of {}: {}", model_id, e)))?;
    let listing = info.siblings.iter().map(|s| s.rfilename.as_str());
    let weights = match weight_layout(listing)? {
        WeightLayout::Sharded => shard_names(fetch(WEIGHTS_INDEX_FILE)?)?
            .iter()
            .map(|name| fetch(name.as_str()))
            .collect::<Result<Vec<_>>>()?,
        WeightLayout::Single => vec![fetch(WEIGHTS_FILE)?],
    };

    tracing::info!("Checkpoint ready ({} weight files)", weights.len());
    Ok(CheckpointFiles {
        config,
        tokenizer,
        weights,
    })
}
