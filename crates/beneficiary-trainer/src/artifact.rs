//! Model persistence.
//!
//! Weights go to a safetensors file written by candle. A JSON manifest with
//! the same stem holds the [`ModelConfig`] and both vocabularies, which is
//! everything needed to rebuild the tagger around the weights.

use std::path::{Path, PathBuf};

use anyhow::Context;
use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use serde::{Deserialize, Serialize};
use tracing::info;

use beneficiary_core::Vocabularies;

use crate::model::{BiLstmTagger, ModelConfig};

/// Default weights file, relative to the working directory.
pub const DEFAULT_MODEL_PATH: &str = "ner_beneficiary_model.safetensors";

/// Sidecar describing a saved model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    pub config: ModelConfig,
    pub vocab: Vocabularies,
}

/// A tagger rebuilt from disk.
pub struct LoadedModel {
    pub model: BiLstmTagger,
    pub manifest: ModelManifest,
    pub varmap: VarMap,
}

/// Path of the manifest stored next to `weights`.
pub fn manifest_path(weights: &Path) -> PathBuf {
    weights.with_extension("json")
}

/// Write weights and manifest, overwriting existing files.
pub fn save_model<P: AsRef<Path>>(
    path: P,
    varmap: &VarMap,
    manifest: &ModelManifest,
) -> anyhow::Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating model directory {}", parent.display()))?;
    }

    varmap
        .save(path)
        .with_context(|| format!("writing weights to {}", path.display()))?;

    let sidecar = manifest_path(path);
    let json = serde_json::to_string_pretty(manifest)?;
    std::fs::write(&sidecar, json)
        .with_context(|| format!("writing manifest to {}", sidecar.display()))?;

    info!(weights = %path.display(), manifest = %sidecar.display(), "model saved");
    Ok(())
}

/// Rebuild the tagger described by the manifest next to `path` and load
/// its weights.
pub fn load_model<P: AsRef<Path>>(path: P, device: &Device) -> anyhow::Result<LoadedModel> {
    let path = path.as_ref();
    let sidecar = manifest_path(path);
    let content = std::fs::read_to_string(&sidecar)
        .with_context(|| format!("reading manifest {}", sidecar.display()))?;
    let manifest: ModelManifest = serde_json::from_str(&content)
        .with_context(|| format!("parsing manifest {}", sidecar.display()))?;

    let mut varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, device);
    let model = BiLstmTagger::new(manifest.config, vb)?;
    varmap
        .load(path)
        .with_context(|| format!("loading weights from {}", path.display()))?;

    info!(weights = %path.display(), "model loaded");
    Ok(LoadedModel {
        model,
        manifest,
        varmap,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use beneficiary_core::{build_vocab, generate_synthetic_data};
    use candle_core::Tensor;

    fn temp_model_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("beneficiary-artifact-{}-{}", name, std::process::id()))
            .join("model.safetensors")
    }

    #[test]
    fn test_manifest_path() {
        let path = manifest_path(Path::new("out/ner_beneficiary_model.safetensors"));
        assert_eq!(path, Path::new("out/ner_beneficiary_model.json"));
    }

    #[test]
    fn test_save_then_load_preserves_predictions() {
        let vocab = build_vocab(&generate_synthetic_data(20, 5));
        let config = ModelConfig::new(vocab.vocab_size(), vocab.num_tags(), 8);
        let device = Device::Cpu;

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let model = BiLstmTagger::new(config, vb).unwrap();

        let path = temp_model_path("roundtrip");
        let manifest = ModelManifest { config, vocab };
        save_model(&path, &varmap, &manifest).unwrap();

        let loaded = load_model(&path, &device).unwrap();
        assert_eq!(loaded.manifest, manifest);

        let ids = Tensor::new(&[[2u32, 3, 4, 5, 0, 0, 0, 0]], &device).unwrap();
        let before = model.forward(&ids).unwrap().flatten_all().unwrap();
        let after = loaded.model.forward(&ids).unwrap().flatten_all().unwrap();
        let diff = (before - after).unwrap().abs().unwrap().max(0).unwrap();
        assert!(diff.to_scalar::<f32>().unwrap() < 1e-6);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_load_without_manifest_fails() {
        let path = temp_model_path("missing");
        let err = load_model(&path, &Device::Cpu).err().unwrap();
        assert!(err.to_string().contains("reading manifest"));
    }
}
