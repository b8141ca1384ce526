//! Sentence embeddings for chunk and query text.
//!
//! `EmbeddingModel` runs a BERT-family sentence encoder (all-MiniLM-L6-v2 by
//! default) through candle with masked mean pooling. `FakeEmbedder` is a
//! deterministic hashed bag-of-words used in tests and development; it is
//! selected with `APP_USE_FAKE_EMBEDDINGS=1` or `embedding.use_fake`.
use anyhow::{anyhow, Context};
use std::path::{Path, PathBuf};
use std::time::Instant;

use candle_core::{DType, Device};
use candle_nn::VarBuilder;
use candle_transformers::models::bert::{BertModel, Config as BertConfig};
use tokenizers::Tokenizer;

use ragdb_core::config::{expand_path, EmbeddingConfig};
use ragdb_core::{Embedder, Error, Result};

pub mod device;
pub mod pool;
pub mod tokenize;

pub use pool::masked_mean_l2;

/// Output dimension of all-MiniLM-L6-v2; the fake embedder matches it.
pub const DEFAULT_DIM: usize = 384;
const DEFAULT_MODEL: &str = "all-MiniLM-L6-v2";

fn embed_err(e: anyhow::Error) -> Error {
    Error::Embedding(format!("{e:#}"))
}

pub struct EmbeddingModel {
    model: BertModel,
    tokenizer: Tokenizer,
    device: Device,
    pad_id: u32,
    dim: usize,
    max_len: usize,
    id: String,
}

impl EmbeddingModel {
    pub fn load(model_dir: &Path, max_len: usize) -> Result<Self> {
        Self::load_inner(model_dir, max_len).map_err(embed_err)
    }

    fn load_inner(model_dir: &Path, max_len: usize) -> anyhow::Result<Self> {
        let device = device::select_device();
        tracing::info!(dir = %model_dir.display(), "loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let pad_id = tokenizer.token_to_id("[PAD]").unwrap_or(0);

        let config_path = model_dir.join("config.json");
        let config: BertConfig = serde_json::from_str(
            &std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?,
        )?;

        let safetensors = model_dir.join("model.safetensors");
        let weights = if safetensors.exists() {
            candle_core::safetensors::load(&safetensors, &device)?
        } else {
            let pickle = model_dir.join("pytorch_model.bin");
            candle_core::pickle::read_all(&pickle)
                .with_context(|| format!("reading {}", pickle.display()))?
                .into_iter()
                .collect()
        };
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = BertModel::load(vb, &config)?;

        let dim = config.hidden_size;
        let name = model_dir.file_name().and_then(|s| s.to_str()).unwrap_or(DEFAULT_MODEL);
        let id = format!("local:{name}:d{dim}");
        tracing::info!(%id, "embedding model loaded");
        Ok(Self { model, tokenizer, device, pad_id, dim, max_len, id })
    }

    fn encode(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let (input_ids, attention_mask) =
            tokenize::tokenize_batch(&self.tokenizer, texts, self.max_len, self.pad_id, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &token_type_ids, Some(&attention_mask))?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        let out: Vec<Vec<f32>> = pooled.to_device(&Device::Cpu)?.to_vec2()?;
        tracing::debug!(batch = texts.len(), elapsed_ms = start.elapsed().as_millis(), "embedded batch");
        Ok(out)
    }
}

impl Embedder for EmbeddingModel {
    fn id(&self) -> &str {
        &self.id
    }
    fn dim(&self) -> usize {
        self.dim
    }
    fn max_len(&self) -> usize {
        self.max_len
    }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let out = self.encode(texts).map_err(embed_err)?;
        if let Some(v) = out.iter().find(|v| v.len() != self.dim) {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: v.len() });
        }
        Ok(out)
    }
}

/// Hashed bag-of-words vectors; deterministic and model-free. Output is not
/// normalized, and text without tokens maps to the zero vector.
pub struct FakeEmbedder {
    dim: usize,
    id: String,
}

impl FakeEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, id: format!("fake:d{dim}") }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        use twox_hash::XxHash64;
        let mut v = vec![0f32; self.dim];
        for (i, token) in text.split_whitespace().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            #[allow(clippy::cast_possible_truncation)]
            let idx = (h % self.dim as u64) as usize;
            #[allow(clippy::cast_precision_loss)]
            let val = ((h >> 32) as u32) as f32 / u32::MAX as f32;
            #[allow(clippy::cast_precision_loss)]
            let position = (i % 3) as f32 * 0.01;
            v[idx] += val + position;
        }
        v
    }
}

impl Default for FakeEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIM)
    }
}

impl Embedder for FakeEmbedder {
    fn id(&self) -> &str {
        &self.id
    }
    fn dim(&self) -> usize {
        self.dim
    }
    fn max_len(&self) -> usize {
        usize::MAX
    }
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

fn fake_requested() -> bool {
    std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"))
}

/// Embedder chosen by the environment alone: fake when
/// `APP_USE_FAKE_EMBEDDINGS` is set, otherwise the local model.
pub fn get_default_embedder() -> Result<Box<dyn Embedder>> {
    embedder_from_config(&EmbeddingConfig::default())
}

pub fn embedder_from_config(config: &EmbeddingConfig) -> Result<Box<dyn Embedder>> {
    if config.use_fake || fake_requested() {
        tracing::info!(dim = DEFAULT_DIM, "using FakeEmbedder");
        return Ok(Box::new(FakeEmbedder::default()));
    }
    let dir = resolve_model_dir(config.model_dir.as_deref())?;
    Ok(Box::new(EmbeddingModel::load(&dir, config.max_len)?))
}

fn resolve_model_dir(configured: Option<&str>) -> Result<PathBuf> {
    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Some(dir) = configured {
        candidates.push(expand_path(dir));
    }
    for var in ["APP_MODEL_DIR", "MODEL_DIR"] {
        if let Ok(dir) = std::env::var(var) {
            candidates.push(expand_path(dir));
        }
    }
    candidates.push(Path::new("models").join(DEFAULT_MODEL));
    candidates.push(Path::new("../models").join(DEFAULT_MODEL));
    candidates
        .into_iter()
        .find(|p| p.exists())
        .ok_or_else(|| {
            Error::NotFound(format!("{DEFAULT_MODEL} model directory (set embedding.model_dir or APP_MODEL_DIR)"))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_is_deterministic_and_case_insensitive() {
        let e = FakeEmbedder::new(64);
        let out = e.embed_batch(&["Hello world".into(), "hello WORLD".into(), "other words".into()]).unwrap();
        assert_eq!(out[0], out[1]);
        assert_ne!(out[0], out[2]);
        assert!(out.iter().all(|v| v.len() == 64));
        assert_eq!(e.id(), "fake:d64");
    }

    #[test]
    fn fake_maps_blank_text_to_zero_vector() {
        let e = FakeEmbedder::default();
        let out = e.embed_batch(&["   ".into()]).unwrap();
        assert!(out[0].iter().all(|x| *x == 0.0));
        assert!(matches!(ragdb_core::normalize(&out[0]), Err(Error::ZeroVector)));
    }

    #[test]
    fn configured_model_dir_wins_when_present() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().to_str().unwrap();
        assert_eq!(resolve_model_dir(Some(dir)).unwrap(), tmp.path());
    }
}
