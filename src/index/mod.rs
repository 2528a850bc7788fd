//! Per-year vector indices
//!
//! One [`VectorIndex`] per filing year. Built by chunking and embedding the
//! year's documents, persisted under `{storage}/{year}/`, and loaded back
//! without touching the embedding model.

use crate::config::Settings;
use crate::embeddings::Embedder;
use crate::error::AgentError;
use crate::ingest;
use crate::models::{FilingDocument, SourceNode, Year, YearMap};
use crate::Result;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub mod chunker;
pub mod similarity;
pub mod store;

pub use chunker::ChunkConfig;
pub use store::{IndexManifest, IndexNode};

use similarity::{cosine_similarity, l2_norm};

#[derive(Debug, Clone)]
pub struct VectorIndex {
    manifest: IndexManifest,
    nodes: Vec<IndexNode>,
    norms: Vec<f32>,
}

impl VectorIndex {
    /// Chunk and embed one year's documents
    pub async fn build(
        year: Year,
        docs: &[FilingDocument],
        embedder: &dyn Embedder,
        chunking: &ChunkConfig,
    ) -> Result<Self> {
        let mut pending = Vec::new();
        for doc in docs {
            if doc.metadata.year != year {
                return Err(AgentError::InvalidConfig(format!(
                    "Document {} is tagged {} but was routed to the {} index",
                    doc.id, doc.metadata.year, year
                )));
            }
            for (ordinal, text) in chunker::split_text(&doc.text, chunking).into_iter().enumerate() {
                pending.push((doc, ordinal, text));
            }
        }

        if pending.is_empty() {
            return Err(AgentError::EmptyFiling { year });
        }

        let texts: Vec<String> = pending.iter().map(|(_, _, text)| text.clone()).collect();
        let vectors = embedder.embed_texts(&texts).await?;
        if vectors.len() != texts.len() {
            return Err(AgentError::EmbeddingError(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        let dims = vectors[0].len();
        if dims == 0 || vectors.iter().any(|v| v.len() != dims) {
            return Err(AgentError::EmbeddingError(
                "Embedding dimensions are inconsistent".to_string(),
            ));
        }

        let nodes: Vec<IndexNode> = pending
            .into_iter()
            .zip(vectors)
            .map(|((doc, ordinal, text), embedding)| IndexNode {
                id: node_id(year, &doc.id, ordinal, &text),
                doc_id: doc.id.clone(),
                text,
                metadata: doc.metadata.clone(),
                embedding,
            })
            .collect();

        let manifest = IndexManifest {
            format_version: store::FORMAT_VERSION,
            year,
            embedding_model: embedder.model().to_string(),
            dims,
            node_count: nodes.len(),
            chunk_size: chunking.chunk_size,
            chunk_overlap: chunking.chunk_overlap,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        info!(year = %year, nodes = nodes.len(), dims, "Built vector index");
        Ok(Self::from_parts(manifest, nodes))
    }

    fn from_parts(manifest: IndexManifest, nodes: Vec<IndexNode>) -> Self {
        let norms = nodes.iter().map(|n| l2_norm(&n.embedding)).collect();
        Self {
            manifest,
            nodes,
            norms,
        }
    }

    pub fn year(&self) -> Year {
        self.manifest.year
    }

    pub fn embedding_model(&self) -> &str {
        &self.manifest.embedding_model
    }

    pub fn dims(&self) -> usize {
        self.manifest.dims
    }

    pub fn nodes(&self) -> &[IndexNode] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn persist(&self, dir: &Path) -> Result<()> {
        store::write_index(dir, &self.manifest, &self.nodes)?;
        info!(year = %self.year(), path = %dir.display(), "Persisted vector index");
        Ok(())
    }

    /// Load a persisted index; any inconsistency is reported as unavailable
    pub fn load(dir: &Path, year: Year) -> Result<Self> {
        let (manifest, nodes) = store::read_index(dir, year)?;
        let unavailable = |reason: String| AgentError::IndexUnavailable { year, reason };

        if manifest.format_version != store::FORMAT_VERSION {
            return Err(unavailable(format!(
                "unsupported format version {}",
                manifest.format_version
            )));
        }
        if manifest.year != year {
            return Err(unavailable(format!(
                "storage holds the {} index",
                manifest.year
            )));
        }
        if manifest.node_count != nodes.len() || nodes.is_empty() {
            return Err(unavailable(format!(
                "manifest lists {} nodes, found {}",
                manifest.node_count,
                nodes.len()
            )));
        }
        if nodes.iter().any(|n| n.embedding.len() != manifest.dims) {
            return Err(unavailable(format!(
                "node embeddings do not match {} dimensions",
                manifest.dims
            )));
        }

        Ok(Self::from_parts(manifest, nodes))
    }

    /// Top-k nodes by cosine similarity, best first; ties keep node order
    pub fn retrieve(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SourceNode>> {
        if query_embedding.len() != self.dims() {
            return Err(AgentError::EmbeddingError(format!(
                "Query embedding has {} dimensions, index {} expects {}",
                query_embedding.len(),
                self.year(),
                self.dims()
            )));
        }

        let query_norm = l2_norm(query_embedding);
        let mut scored: Vec<(usize, f32)> = self
            .nodes
            .iter()
            .zip(&self.norms)
            .enumerate()
            .map(|(i, (node, norm))| {
                (i, cosine_similarity(query_embedding, &node.embedding, query_norm, *norm))
            })
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(i, score)| {
                let node = &self.nodes[i];
                SourceNode {
                    node_id: node.id.clone(),
                    year: node.metadata.year,
                    score,
                    text: node.text.clone(),
                }
            })
            .collect())
    }
}

fn node_id(year: Year, doc_id: &str, ordinal: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}:", year, doc_id, ordinal).as_bytes());
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

fn chunk_config(settings: &Settings) -> ChunkConfig {
    ChunkConfig {
        chunk_size: settings.chunk_size,
        chunk_overlap: settings.chunk_overlap,
    }
}

/// Ingest every configured year, build its index and persist it
pub async fn build_indices(
    settings: &Settings,
    embedder: &dyn Embedder,
) -> Result<YearMap<Arc<VectorIndex>>> {
    build_years(settings, embedder, &settings.years).await
}

async fn build_years(
    settings: &Settings,
    embedder: &dyn Embedder,
    years: &[Year],
) -> Result<YearMap<Arc<VectorIndex>>> {
    let corpus = ingest::ingest_years(settings, years)?;
    let chunking = chunk_config(settings);

    let mut indices = YearMap::new();
    for (year, docs) in corpus.by_year.iter() {
        let index = VectorIndex::build(year, docs, embedder, &chunking).await?;
        index.persist(&settings.storage_path(year))?;
        indices.insert(year, Arc::new(index));
    }
    Ok(indices)
}

/// Load every configured year from storage. Never builds.
pub fn load_indices(settings: &Settings) -> Result<YearMap<Arc<VectorIndex>>> {
    let mut indices = YearMap::new();
    for &year in &settings.years {
        let index = VectorIndex::load(&settings.storage_path(year), year)?;
        if index.embedding_model() != settings.embedding_model {
            return Err(AgentError::IndexUnavailable {
                year,
                reason: format!(
                    "built with embedding model {}, configured model is {}",
                    index.embedding_model(),
                    settings.embedding_model
                ),
            });
        }
        info!(year = %year, nodes = index.len(), "Loaded vector index");
        indices.insert(year, Arc::new(index));
    }
    Ok(indices)
}

/// Load years that have storage, build the ones that don't
pub async fn ensure_indices(
    settings: &Settings,
    embedder: &dyn Embedder,
) -> Result<YearMap<Arc<VectorIndex>>> {
    let missing: Vec<Year> = settings
        .years
        .iter()
        .copied()
        .filter(|&year| !store::storage_present(&settings.storage_path(year)))
        .collect();

    let mut built = if missing.is_empty() {
        YearMap::new()
    } else {
        warn!(years = ?missing, "No stored index; building");
        build_years(settings, embedder, &missing).await?
    };

    let mut indices = YearMap::new();
    for &year in &settings.years {
        if let Some(index) = built.remove(year) {
            indices.insert(year, index);
            continue;
        }
        let loaded = load_indices(&Settings {
            years: vec![year],
            ..settings.clone()
        })?;
        for (year, index) in loaded {
            indices.insert(year, index);
        }
    }
    Ok(indices)
}
