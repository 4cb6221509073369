//! Local sentence encoder using Hugging Face Candle
//!
//! Runs a BERT-family sentence-transformer (all-MiniLM-L6-v2 by default)
//! in-process: tokenize, pad the batch, encode, mean-pool over real tokens,
//! then L2-normalise.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{embedding, layer_norm, linear, Activation, Embedding, LayerNorm, Linear, VarBuilder};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokenizers::Tokenizer;

use super::{check_batch, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::error::RetrievalError;

/// Longest token sequence fed to the encoder
pub const MAX_SEQ_LEN: usize = 512;

/// Encoder hyper-parameters, read from the model's `config.json`
#[derive(Debug, Clone, Deserialize)]
pub struct BertConfig {
    pub vocab_size: usize,
    pub hidden_size: usize,
    pub num_hidden_layers: usize,
    pub num_attention_heads: usize,
    pub intermediate_size: usize,
    #[serde(default = "default_hidden_act")]
    pub hidden_act: String,
    pub max_position_embeddings: usize,
    #[serde(default = "default_type_vocab_size")]
    pub type_vocab_size: usize,
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
    #[serde(default)]
    pub pad_token_id: u32,
}

fn default_hidden_act() -> String {
    "gelu".to_string()
}

fn default_type_vocab_size() -> usize {
    2
}

fn default_layer_norm_eps() -> f64 {
    1e-12
}

impl Default for BertConfig {
    fn default() -> Self {
        // all-MiniLM-L6-v2
        Self {
            vocab_size: 30522,
            hidden_size: 384,
            num_hidden_layers: 6,
            num_attention_heads: 12,
            intermediate_size: 1536,
            hidden_act: default_hidden_act(),
            max_position_embeddings: 512,
            type_vocab_size: 2,
            layer_norm_eps: 1e-12,
            pad_token_id: 0,
        }
    }
}

struct BertEmbeddings {
    word: Embedding,
    position: Embedding,
    token_type: Embedding,
    norm: LayerNorm,
}

impl BertEmbeddings {
    fn load(vb: VarBuilder, config: &BertConfig) -> Result<Self> {
        Ok(Self {
            word: embedding(config.vocab_size, config.hidden_size, vb.pp("word_embeddings"))?,
            position: embedding(
                config.max_position_embeddings,
                config.hidden_size,
                vb.pp("position_embeddings"),
            )?,
            token_type: embedding(
                config.type_vocab_size,
                config.hidden_size,
                vb.pp("token_type_embeddings"),
            )?,
            norm: layer_norm(config.hidden_size, config.layer_norm_eps, vb.pp("LayerNorm"))?,
        })
    }

    /// `input_ids`, `type_ids`: [batch, seq] -> [batch, seq, hidden]
    fn forward(&self, input_ids: &Tensor, type_ids: &Tensor) -> Result<Tensor> {
        let (_, seq_len) = input_ids.dims2()?;
        let positions = Tensor::arange(0u32, seq_len as u32, input_ids.device())?;

        let words = self.word.forward(input_ids)?;
        let types = self.token_type.forward(type_ids)?;
        let positions = self.position.forward(&positions)?;

        let summed = (words + types)?.broadcast_add(&positions)?;
        Ok(self.norm.forward(&summed)?)
    }
}

/// One transformer block: self-attention then feed-forward, both post-norm
struct EncoderLayer {
    query: Linear,
    key: Linear,
    value: Linear,
    attention_out: Linear,
    attention_norm: LayerNorm,
    intermediate: Linear,
    output: Linear,
    output_norm: LayerNorm,
    activation: Activation,
    heads: usize,
    head_dim: usize,
}

impl EncoderLayer {
    fn load(vb: VarBuilder, config: &BertConfig) -> Result<Self> {
        let hidden = config.hidden_size;
        let attention = vb.pp("attention");
        let self_attention = attention.pp("self");
        let activation = match config.hidden_act.as_str() {
            "relu" => Activation::Relu,
            _ => Activation::Gelu,
        };

        Ok(Self {
            query: linear(hidden, hidden, self_attention.pp("query"))?,
            key: linear(hidden, hidden, self_attention.pp("key"))?,
            value: linear(hidden, hidden, self_attention.pp("value"))?,
            attention_out: linear(hidden, hidden, attention.pp("output").pp("dense"))?,
            attention_norm: layer_norm(
                hidden,
                config.layer_norm_eps,
                attention.pp("output").pp("LayerNorm"),
            )?,
            intermediate: linear(
                hidden,
                config.intermediate_size,
                vb.pp("intermediate").pp("dense"),
            )?,
            output: linear(config.intermediate_size, hidden, vb.pp("output").pp("dense"))?,
            output_norm: layer_norm(hidden, config.layer_norm_eps, vb.pp("output").pp("LayerNorm"))?,
            activation,
            heads: config.num_attention_heads,
            head_dim: hidden / config.num_attention_heads,
        })
    }

    /// `hidden`: [batch, seq, hidden]; `bias`: additive mask [batch, 1, 1, seq]
    fn forward(&self, hidden: &Tensor, bias: &Tensor) -> Result<Tensor> {
        let (batch, seq_len, width) = hidden.dims3()?;
        let split_heads = |t: Tensor| -> Result<Tensor> {
            Ok(t.reshape((batch, seq_len, self.heads, self.head_dim))?
                .transpose(1, 2)?
                .contiguous()?)
        };

        let q = split_heads(self.query.forward(hidden)?)?;
        let k = split_heads(self.key.forward(hidden)?)?;
        let v = split_heads(self.value.forward(hidden)?)?;

        let scores = (q.matmul(&k.t()?)? / (self.head_dim as f64).sqrt())?;
        let probs = candle_nn::ops::softmax_last_dim(&scores.broadcast_add(bias)?)?;
        let context = probs
            .matmul(&v)?
            .transpose(1, 2)?
            .contiguous()?
            .reshape((batch, seq_len, width))?;

        let attended = self
            .attention_norm
            .forward(&(self.attention_out.forward(&context)? + hidden)?)?;

        let expanded = self.activation.forward(&self.intermediate.forward(&attended)?)?;
        Ok(self
            .output_norm
            .forward(&(self.output.forward(&expanded)? + &attended)?)?)
    }
}

/// BERT encoder without pooler head
struct Bert {
    embeddings: BertEmbeddings,
    layers: Vec<EncoderLayer>,
    device: Device,
}

impl Bert {
    fn load(vb: VarBuilder, config: &BertConfig) -> Result<Self> {
        let embeddings = BertEmbeddings::load(vb.pp("embeddings"), config)?;
        let layer_vb = vb.pp("encoder").pp("layer");
        let layers = (0..config.num_hidden_layers)
            .map(|i| EncoderLayer::load(layer_vb.pp(i), config))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            embeddings,
            layers,
            device: vb.device().clone(),
        })
    }

    /// Encode pre-tokenized sequences into pooled, unit-length vectors.
    ///
    /// Sequences are right-padded with `pad_id` to the longest one; padding is
    /// masked out of attention and excluded from pooling.
    fn encode(&self, batch: &[Vec<u32>], pad_id: u32) -> Result<Vec<Vec<f32>>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }
        let seq_len = batch.iter().map(Vec::len).max().unwrap_or(0).max(1);

        let mut ids = Vec::with_capacity(batch.len() * seq_len);
        let mut mask = Vec::with_capacity(batch.len() * seq_len);
        for sequence in batch {
            ids.extend_from_slice(sequence);
            ids.extend(std::iter::repeat(pad_id).take(seq_len - sequence.len()));
            mask.extend(std::iter::repeat(1.0f32).take(sequence.len()));
            mask.extend(std::iter::repeat(0.0f32).take(seq_len - sequence.len()));
        }

        let shape = (batch.len(), seq_len);
        let input_ids = Tensor::from_vec(ids, shape, &self.device)?;
        let type_ids = Tensor::zeros(shape, DType::U32, &self.device)?;
        let mask = Tensor::from_vec(mask, shape, &self.device)?;

        // 0 where attended, -10000 on padding
        let bias = (mask.affine(-1.0, 1.0)? * -10000.0)?
            .unsqueeze(1)?
            .unsqueeze(1)?;

        let mut hidden = self.embeddings.forward(&input_ids, &type_ids)?;
        for layer in &self.layers {
            hidden = layer.forward(&hidden, &bias)?;
        }

        let pooled = mean_pool(&hidden, &mask)?;
        Ok(l2_normalize(&pooled)?.to_vec2::<f32>()?)
    }
}

/// Mean over the sequence axis counting only unmasked tokens
fn mean_pool(hidden: &Tensor, mask: &Tensor) -> Result<Tensor> {
    let mask = mask.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&mask)?.sum(1)?;
    let counts = mask.sum(1)?;
    Ok(summed.broadcast_div(&counts)?)
}

fn l2_normalize(vectors: &Tensor) -> Result<Tensor> {
    let norms = (vectors.sqr()?.sum_keepdim(1)?.sqrt()? + 1e-12)?;
    Ok(vectors.broadcast_div(&norms)?)
}

/// Model and tokenizer, shared with blocking inference tasks
struct EncoderSession {
    model: Bert,
    tokenizer: Tokenizer,
    max_len: usize,
    pad_id: u32,
}

impl EncoderSession {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let inputs: Vec<&str> = texts.iter().map(String::as_str).collect();
        let encodings = self
            .tokenizer
            .encode_batch(inputs, true)
            .map_err(|e| anyhow!("Tokenization failed: {}", e))?;

        let batch: Vec<Vec<u32>> = encodings
            .iter()
            .map(|encoding| {
                // Drop any padding the tokenizer config added; encode() pads itself
                encoding
                    .get_ids()
                    .iter()
                    .zip(encoding.get_attention_mask())
                    .filter(|(_, &attend)| attend == 1)
                    .map(|(&id, _)| id)
                    .take(self.max_len)
                    .collect()
            })
            .collect();

        self.model.encode(&batch, self.pad_id)
    }
}

/// Sentence encoder running on the local device.
///
/// Inference runs on the blocking thread pool so async callers keep serving
/// while a batch is encoded.
pub struct LocalEncoder {
    session: Arc<EncoderSession>,
    model_id: String,
    dimension: usize,
}

impl LocalEncoder {
    /// Load from `config.model_path`, downloading `config.model` from the hub
    /// when no path is configured
    pub async fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let model_dir = match &config.model_path {
            Some(path) => path.clone(),
            None => Self::download(&config.model).await?,
        };
        Self::load(&model_dir, &config.model)
    }

    /// Load the encoder from a local directory containing:
    ///   - `config.json` - model hyper-parameters
    ///   - `tokenizer.json` - tokenizer definition
    ///   - `model.safetensors` - weights
    pub fn load(model_dir: &Path, model_id: &str) -> Result<Self> {
        let device = if candle_core::utils::cuda_is_available() {
            Device::new_cuda(0)?
        } else if candle_core::utils::metal_is_available() {
            Device::new_metal(0)?
        } else {
            Device::Cpu
        };
        tracing::info!("Loading embedding model {} on device: {:?}", model_id, device);

        let config_path = model_dir.join("config.json");
        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Config not found at {}", config_path.display()))?;
        let config: BertConfig = serde_json::from_str(&config_str)
            .map_err(|e| anyhow!("Failed to parse config.json: {}", e))?;

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer {}: {}", tokenizer_path.display(), e))?;

        let weights_path = model_dir.join("model.safetensors");
        if !weights_path.exists() {
            return Err(anyhow!("Model weights not found at {}", weights_path.display()));
        }
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[weights_path], DType::F32, &device)? };

        // Sentence-transformers checkpoints store bare names; raw BERT ones use a "bert." prefix
        let vb = if vb.contains_tensor("embeddings.word_embeddings.weight") {
            vb
        } else {
            vb.pp("bert")
        };
        let model = Bert::load(vb, &config)?;

        tracing::info!(
            "Loaded encoder: {} layers, {} hidden size, {} attention heads",
            config.num_hidden_layers,
            config.hidden_size,
            config.num_attention_heads
        );

        Ok(Self::from_parts(model, tokenizer, model_id, &config))
    }

    fn from_parts(model: Bert, tokenizer: Tokenizer, model_id: &str, config: &BertConfig) -> Self {
        Self {
            session: Arc::new(EncoderSession {
                model,
                tokenizer,
                max_len: config.max_position_embeddings.min(MAX_SEQ_LEN),
                pad_id: config.pad_token_id,
            }),
            model_id: model_id.to_string(),
            dimension: config.hidden_size,
        }
    }

    /// Fetch the model files from the Hugging Face hub into the local cache
    pub async fn download(repo_id: &str) -> Result<PathBuf> {
        let repo_id = repo_id.to_string();
        tokio::task::spawn_blocking(move || -> Result<PathBuf> {
            use hf_hub::api::sync::Api;

            tracing::info!("Downloading {} from Hugging Face Hub...", repo_id);
            let api = Api::new()?;
            let repo = api.model(repo_id);

            repo.get("tokenizer.json")?;
            let weights = repo.get("model.safetensors")?;
            repo.get("config.json")?;

            weights
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| anyhow!("Downloaded weights have no parent directory"))
        })
        .await?
    }
}

#[async_trait]
impl EmbeddingProvider for LocalEncoder {
    async fn embed(&self, texts: &[String]) -> crate::error::Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let session = Arc::clone(&self.session);
        let owned = texts.to_vec();
        let vectors = tokio::task::spawn_blocking(move || session.embed(&owned))
            .await
            .map_err(|e| RetrievalError::EmbeddingService(format!("encoder task failed: {}", e)))?
            .map_err(|e| RetrievalError::EmbeddingService(format!("{:#}", e)))?;
        check_batch(texts.len(), &vectors, Some(self.dimension))?;
        Ok(vectors)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}
