//! Persistent vector store over document chunks.
//!
//! The store keeps every chunk record in memory in insertion order and answers
//! nearest-neighbor queries by brute-force cosine similarity, which is exact
//! and more than fast enough for a single-process corpus. Snapshots are plain
//! JSON (`index.json` + `documents.json`) written atomically via temp-file
//! rename; a missing or corrupt snapshot loads as an empty, usable store so the
//! server always starts.
//!
//! The store itself is not synchronized. The owning service wraps it in a
//! `tokio::sync::RwLock`: writes (`add_document` + `persist`) are serialized,
//! reads (`search`) proceed concurrently.

mod types;

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

pub use types::{ChunkRecord, ScoredChunk, StoreError, StoredDocument, compute_chunk_hash};

use types::{IndexSnapshot, SNAPSHOT_VERSION};

const INDEX_FILE: &str = "index.json";
const DOCUMENTS_FILE: &str = "documents.json";

/// In-memory chunk index plus document registry, persisted as JSON snapshots.
#[derive(Debug)]
pub struct DocumentStore {
    dimension: usize,
    records: Vec<ChunkRecord>,
    documents: BTreeMap<String, StoredDocument>,
}

impl DocumentStore {
    /// Create an empty store for vectors of the given dimensionality.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            records: Vec::new(),
            documents: BTreeMap::new(),
        }
    }

    /// Register a document and append its chunk records.
    ///
    /// Every chunk must carry the document's id and an embedding of the
    /// configured dimensionality; nothing is written on failure.
    pub fn add_document(
        &mut self,
        document: StoredDocument,
        chunks: Vec<ChunkRecord>,
    ) -> Result<(), StoreError> {
        for chunk in &chunks {
            if chunk.document_id != document.id {
                return Err(StoreError::ForeignChunk {
                    chunk_id: chunk.id.clone(),
                    document_id: document.id.clone(),
                });
            }
            if chunk.embedding.len() != self.dimension {
                return Err(StoreError::DimensionMismatch {
                    expected: self.dimension,
                    actual: chunk.embedding.len(),
                });
            }
        }

        self.documents.insert(document.id.clone(), document);
        self.records.extend(chunks);
        Ok(())
    }

    /// Return the `k` most similar chunks, highest score first.
    ///
    /// Ties are broken by insertion order. Chunks scoring below `threshold`
    /// are dropped.
    pub fn search(
        &self,
        query_vector: &[f32],
        k: usize,
        threshold: f32,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        if query_vector.len() != self.dimension {
            return Err(StoreError::DimensionMismatch {
                expected: self.dimension,
                actual: query_vector.len(),
            });
        }

        let mut scored: Vec<ScoredChunk> = self
            .records
            .iter()
            .map(|record| ScoredChunk {
                id: record.id.clone(),
                document_id: record.document_id.clone(),
                ordinal: record.ordinal,
                text: record.text.clone(),
                score: cosine_similarity(query_vector, &record.embedding),
            })
            .filter(|hit| hit.score >= threshold)
            .collect();

        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);
        Ok(scored)
    }

    /// Look up a registered document by id.
    pub fn document(&self, id: &str) -> Option<&StoredDocument> {
        self.documents.get(id)
    }

    /// Number of chunk records currently held.
    pub fn chunk_count(&self) -> usize {
        self.records.len()
    }

    /// Number of documents currently registered.
    pub fn document_count(&self) -> usize {
        self.documents.len()
    }

    /// Dimensionality the store was created with.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Flush the store to `dir` as JSON snapshots.
    pub fn persist(&self, dir: &Path) -> Result<(), StoreError> {
        std::fs::create_dir_all(dir)?;

        let snapshot = IndexSnapshot {
            version: SNAPSHOT_VERSION,
            dimension: self.dimension,
            records: self.records.clone(),
        };
        write_atomic(&dir.join(INDEX_FILE), &serde_json::to_vec(&snapshot)?)?;
        write_atomic(
            &dir.join(DOCUMENTS_FILE),
            &serde_json::to_vec(&self.documents)?,
        )?;

        tracing::debug!(
            dir = %dir.display(),
            documents = self.documents.len(),
            chunks = self.records.len(),
            "Store persisted"
        );
        Ok(())
    }

    /// Restore a store from `dir`, degrading to an empty store when the
    /// snapshot is missing, unreadable, or incompatible.
    pub fn load(dir: &Path, dimension: usize) -> Self {
        match Self::try_load(dir, dimension) {
            Ok(Some(store)) => {
                tracing::info!(
                    dir = %dir.display(),
                    documents = store.documents.len(),
                    chunks = store.records.len(),
                    "Store restored from snapshot"
                );
                store
            }
            Ok(None) => {
                tracing::info!(dir = %dir.display(), "No snapshot found; starting empty");
                Self::new(dimension)
            }
            Err(error) => {
                tracing::warn!(
                    dir = %dir.display(),
                    error = %error,
                    "Snapshot unreadable; starting empty"
                );
                Self::new(dimension)
            }
        }
    }

    fn try_load(dir: &Path, dimension: usize) -> Result<Option<Self>, StoreError> {
        let index_path = dir.join(INDEX_FILE);
        if !index_path.exists() {
            return Ok(None);
        }

        let snapshot: IndexSnapshot = serde_json::from_slice(&std::fs::read(&index_path)?)?;
        if snapshot.version != SNAPSHOT_VERSION || snapshot.dimension != dimension {
            return Err(StoreError::DimensionMismatch {
                expected: dimension,
                actual: snapshot.dimension,
            });
        }

        // `persist` always writes both files, so a missing or unreadable
        // document registry alongside an index is a corrupt snapshot.
        let documents: BTreeMap<String, StoredDocument> =
            serde_json::from_slice(&std::fs::read(dir.join(DOCUMENTS_FILE))?)?;

        for record in &snapshot.records {
            if record.embedding.len() != dimension {
                return Err(StoreError::DimensionMismatch {
                    expected: dimension,
                    actual: record.embedding.len(),
                });
            }
            if !documents.contains_key(&record.document_id) {
                return Err(StoreError::OrphanChunk {
                    chunk_id: record.id.clone(),
                    document_id: record.document_id.clone(),
                });
            }
        }

        Ok(Some(Self {
            dimension,
            records: snapshot.records,
            documents,
        }))
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|v| v * v).sum::<f32>().sqrt();
    dot / (norm_a * norm_b + 1e-10)
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let tmp_path = path.with_extension("json.tmp");
    {
        let mut file = std::fs::File::create(&tmp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
    }
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn document(id: &str) -> StoredDocument {
        StoredDocument {
            id: id.to_string(),
            filename: format!("{id}.txt"),
            format: "text".to_string(),
            uploaded_at: "2025-01-06T10:00:00Z".to_string(),
            chunk_count: 1,
            metadata: Map::new(),
        }
    }

    fn chunk(id: &str, document_id: &str, ordinal: usize, embedding: Vec<f32>) -> ChunkRecord {
        ChunkRecord {
            id: id.to_string(),
            document_id: document_id.to_string(),
            ordinal,
            text: format!("chunk {id}"),
            chunk_hash: compute_chunk_hash(id),
            start: 0,
            end: 8,
            embedding,
        }
    }

    #[test]
    fn add_rejects_wrong_dimension() {
        let mut store = DocumentStore::new(3);
        let error = store
            .add_document(document("d1"), vec![chunk("c1", "d1", 0, vec![1.0, 0.0])])
            .unwrap_err();
        assert!(matches!(
            error,
            StoreError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
        assert_eq!(store.document_count(), 0);
    }

    #[test]
    fn add_rejects_foreign_chunks() {
        let mut store = DocumentStore::new(2);
        let error = store
            .add_document(
                document("d1"),
                vec![chunk("c1", "other-doc", 0, vec![1.0, 0.0])],
            )
            .unwrap_err();
        assert!(matches!(error, StoreError::ForeignChunk { .. }));
    }

    #[test]
    fn search_orders_by_similarity() {
        let mut store = DocumentStore::new(2);
        store
            .add_document(
                document("d1"),
                vec![
                    chunk("c1", "d1", 0, vec![1.0, 0.0]),
                    chunk("c2", "d1", 1, vec![0.0, 1.0]),
                    chunk("c3", "d1", 2, vec![0.7, 0.7]),
                ],
            )
            .expect("add");

        let hits = store.search(&[1.0, 0.0], 2, 0.0).expect("search");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "c1");
        assert_eq!(hits[1].id, "c3");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn search_breaks_ties_by_insertion_order() {
        let mut store = DocumentStore::new(2);
        store
            .add_document(
                document("d1"),
                vec![
                    chunk("first", "d1", 0, vec![1.0, 0.0]),
                    chunk("second", "d1", 1, vec![1.0, 0.0]),
                ],
            )
            .expect("add");

        let hits = store.search(&[1.0, 0.0], 2, 0.0).expect("search");
        assert_eq!(hits[0].id, "first");
        assert_eq!(hits[1].id, "second");
    }

    #[test]
    fn search_applies_threshold_and_dimension_check() {
        let mut store = DocumentStore::new(2);
        store
            .add_document(
                document("d1"),
                vec![
                    chunk("c1", "d1", 0, vec![1.0, 0.0]),
                    chunk("c2", "d1", 1, vec![0.0, 1.0]),
                ],
            )
            .expect("add");

        let hits = store.search(&[1.0, 0.0], 10, 0.5).expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "c1");

        let error = store.search(&[1.0, 0.0, 0.0], 1, 0.0).unwrap_err();
        assert!(matches!(error, StoreError::DimensionMismatch { .. }));
    }

    #[test]
    fn self_retrieval_returns_the_added_chunk() {
        let mut store = DocumentStore::new(3);
        let vector = vec![0.3, -0.6, 0.74];
        store
            .add_document(
                document("d1"),
                vec![
                    chunk("target", "d1", 0, vector.clone()),
                    chunk("other", "d1", 1, vec![-0.9, 0.1, 0.2]),
                ],
            )
            .expect("add");

        let hits = store.search(&vector, 1, 0.0).expect("search");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "target");
        assert!(hits[0].score > 0.99);
    }

    #[test]
    fn persist_then_load_round_trips_search_results() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = DocumentStore::new(2);
        store
            .add_document(
                document("d1"),
                vec![
                    chunk("c1", "d1", 0, vec![1.0, 0.0]),
                    chunk("c2", "d1", 1, vec![0.0, 1.0]),
                ],
            )
            .expect("add");
        let before = store.search(&[0.9, 0.1], 5, 0.0).expect("search");

        store.persist(dir.path()).expect("persist");
        let restored = DocumentStore::load(dir.path(), 2);

        assert_eq!(restored.document_count(), 1);
        assert_eq!(restored.chunk_count(), 2);
        let after = restored.search(&[0.9, 0.1], 5, 0.0).expect("search");
        let ids = |hits: &[ScoredChunk]| hits.iter().map(|h| h.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&before), ids(&after));
        assert!(restored.document("d1").is_some());
    }

    #[test]
    fn load_from_missing_directory_yields_empty_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = DocumentStore::load(&dir.path().join("nope"), 4);
        assert_eq!(store.chunk_count(), 0);
        assert_eq!(store.document_count(), 0);
        assert!(store.search(&[0.0; 4], 3, 0.0).expect("search").is_empty());
    }

    #[test]
    fn load_from_corrupt_snapshot_yields_empty_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join(INDEX_FILE), b"{ not json").expect("write");
        let store = DocumentStore::load(dir.path(), 4);
        assert_eq!(store.chunk_count(), 0);
    }

    #[test]
    fn load_with_missing_documents_file_yields_empty_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = DocumentStore::new(2);
        store
            .add_document(document("d1"), vec![chunk("c1", "d1", 0, vec![1.0, 0.0])])
            .expect("add");
        store.persist(dir.path()).expect("persist");
        std::fs::remove_file(dir.path().join(DOCUMENTS_FILE)).expect("remove");

        // Chunks without their document registry must not survive the load.
        let restored = DocumentStore::load(dir.path(), 2);
        assert_eq!(restored.chunk_count(), 0);
        assert_eq!(restored.document_count(), 0);
    }

    #[test]
    fn load_rejects_records_for_unknown_documents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = DocumentStore::new(2);
        store
            .add_document(document("d1"), vec![chunk("c1", "d1", 0, vec![1.0, 0.0])])
            .expect("add");
        store.persist(dir.path()).expect("persist");
        std::fs::write(dir.path().join(DOCUMENTS_FILE), b"{}").expect("write");

        let error = DocumentStore::try_load(dir.path(), 2).unwrap_err();
        assert!(matches!(error, StoreError::OrphanChunk { chunk_id, .. } if chunk_id == "c1"));

        let restored = DocumentStore::load(dir.path(), 2);
        assert_eq!(restored.chunk_count(), 0);
    }

    #[test]
    fn load_rejects_snapshot_with_other_dimension() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut store = DocumentStore::new(2);
        store
            .add_document(document("d1"), vec![chunk("c1", "d1", 0, vec![1.0, 0.0])])
            .expect("add");
        store.persist(dir.path()).expect("persist");

        let restored = DocumentStore::load(dir.path(), 8);
        assert_eq!(restored.chunk_count(), 0);
        assert_eq!(restored.dimension(), 8);
    }
}
