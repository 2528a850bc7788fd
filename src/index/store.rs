//! On-disk layout of a per-year index
//!
//! `{storage}/{year}/index_manifest.json` describes the index,
//! `{storage}/{year}/nodes.json` holds chunk text, metadata and vectors.
//! Both files are written tmp-then-rename.

use crate::error::AgentError;
use crate::models::{DocumentMetadata, Year};
use crate::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const FORMAT_VERSION: u32 = 1;

const MANIFEST_FILE: &str = "index_manifest.json";
const NODES_FILE: &str = "nodes.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub format_version: u32,
    pub year: Year,
    pub embedding_model: String,
    pub dims: usize,
    pub node_count: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub created_at: String,
}

/// One embedded chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexNode {
    pub id: String,
    pub doc_id: String,
    pub text: String,
    pub metadata: DocumentMetadata,
    pub embedding: Vec<f32>,
}

pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}

pub fn nodes_path(dir: &Path) -> PathBuf {
    dir.join(NODES_FILE)
}

/// True when the directory holds both index files
pub fn storage_present(dir: &Path) -> bool {
    manifest_path(dir).is_file() && nodes_path(dir).is_file()
}

pub fn write_index(dir: &Path, manifest: &IndexManifest, nodes: &[IndexNode]) -> Result<()> {
    fs::create_dir_all(dir)?;
    // Nodes first: a manifest on disk implies complete nodes.
    write_json_atomic(&nodes_path(dir), nodes)?;
    write_json_atomic(&manifest_path(dir), manifest)?;
    Ok(())
}

pub fn read_index(dir: &Path, year: Year) -> Result<(IndexManifest, Vec<IndexNode>)> {
    let unavailable = |reason: String| AgentError::IndexUnavailable { year, reason };

    if !dir.is_dir() {
        return Err(unavailable(format!("storage directory {} not found", dir.display())));
    }

    let manifest: IndexManifest = read_json(&manifest_path(dir)).map_err(unavailable)?;
    let nodes: Vec<IndexNode> = read_json(&nodes_path(dir)).map_err(unavailable)?;

    Ok((manifest, nodes))
}

fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let tmp = path.with_extension("tmp");
    let json = serde_json::to_vec(value)?;
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> std::result::Result<T, String> {
    let bytes = fs::read(path).map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("failed to decode {}: {}", path.display(), e))
}
