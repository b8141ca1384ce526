//! LanceDB-backed external document store.
//!
//! One table per collection holding `(id, doc_id, doc_path, content,
//! chunk_index, vector)` rows. Search uses LanceDB's cosine distance and
//! reports `1 - distance`, which is the cosine similarity of the stored and
//! query vectors.
use arrow_array::{
    types::Float32Type, Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch,
    RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{connect, Connection, DistanceType, Table};
use std::cmp::Ordering;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ragdb_core::types::{chunk_position, DocumentChunk, QueryResult};
use ragdb_core::{Error, Result};

fn storage_err(e: impl std::fmt::Display) -> Error {
    Error::Storage(e.to_string())
}

pub fn build_arrow_schema(dim: i32) -> Arc<Schema> {
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("doc_id", DataType::Utf8, false),
        Field::new("doc_path", DataType::Utf8, false),
        Field::new("content", DataType::Utf8, false),
        Field::new("chunk_index", DataType::Int32, false),
        Field::new(
            "vector",
            DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float32, true)), dim),
            true,
        ),
    ]))
}

pub struct LanceStore {
    db: Connection,
    root: PathBuf,
    collection: String,
    dim: usize,
}

impl LanceStore {
    pub async fn open(root: &Path, collection: &str, dim: usize) -> Result<Self> {
        if i32::try_from(dim).is_err() || dim == 0 {
            return Err(Error::InvalidArgument(format!("unsupported vector dimension {dim}")));
        }
        std::fs::create_dir_all(root)?;
        let db = connect(root.to_string_lossy().as_ref()).execute().await.map_err(storage_err)?;
        Ok(Self { db, root: root.to_path_buf(), collection: collection.to_string(), dim })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    fn schema(&self) -> Result<Arc<Schema>> {
        let dim = i32::try_from(self.dim).map_err(|_| Error::InvalidArgument(format!("dimension {}", self.dim)))?;
        Ok(build_arrow_schema(dim))
    }

    async fn has_collection(&self) -> Result<bool> {
        let names = self.db.table_names().execute().await.map_err(storage_err)?;
        Ok(names.contains(&self.collection))
    }

    /// Drops the collection's data. Nothing to delete is a valid prior state,
    /// and a failed delete is logged rather than returned.
    pub async fn delete_collection(&self) {
        match self.has_collection().await {
            Ok(false) => {
                tracing::debug!(collection = %self.collection, "no collection to delete");
                return;
            }
            Ok(true) => {}
            Err(e) => tracing::warn!(collection = %self.collection, error = %e, "could not list collections"),
        }
        let table_dir = self.root.join(format!("{}.lance", self.collection));
        match std::fs::remove_dir_all(&table_dir) {
            Ok(()) => tracing::info!(collection = %self.collection, "deleted existing collection"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(collection = %self.collection, "no collection to delete");
            }
            Err(e) => tracing::warn!(collection = %self.collection, error = %e, "could not delete collection"),
        }
    }

    pub async fn get_or_create(&self) -> Result<Table> {
        if !self.has_collection().await? {
            // create empty table with 0 rows
            let schema = self.schema()?;
            let iter = RecordBatchIterator::new(vec![].into_iter(), schema);
            self.db.create_table(&self.collection, Box::new(iter)).execute().await.map_err(storage_err)?;
            tracing::info!(collection = %self.collection, dim = self.dim, "created collection");
        }
        self.db.open_table(&self.collection).execute().await.map_err(storage_err)
    }

    /// Appends one row per chunk; `embeddings[i]` belongs to `chunks[i]`.
    pub async fn add(&self, chunks: &[DocumentChunk], embeddings: &[Vec<f32>]) -> Result<()> {
        if chunks.len() != embeddings.len() {
            return Err(Error::InvalidArgument(format!(
                "{} chunks for {} embeddings",
                chunks.len(),
                embeddings.len()
            )));
        }
        if let Some(v) = embeddings.iter().find(|v| v.len() != self.dim) {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: v.len() });
        }
        if chunks.is_empty() {
            return Ok(());
        }
        let batch = self.record_batch(chunks, embeddings)?;
        let schema = batch.schema();
        let reader = Box::new(RecordBatchIterator::new(vec![Ok(batch)].into_iter(), schema));
        let table = self.get_or_create().await?;
        table.add(reader).execute().await.map_err(storage_err)?;
        tracing::info!(collection = %self.collection, rows = chunks.len(), "added rows");
        Ok(())
    }

    fn record_batch(&self, chunks: &[DocumentChunk], embeddings: &[Vec<f32>]) -> Result<RecordBatch> {
        let dim = i32::try_from(self.dim).map_err(|_| Error::InvalidArgument(format!("dimension {}", self.dim)))?;
        let mut chunk_indices = Vec::with_capacity(chunks.len());
        for c in chunks {
            chunk_indices.push(i32::try_from(c.chunk_index).map_err(storage_err)?);
        }
        let vectors = embeddings.iter().map(|v| Some(v.iter().copied().map(Some).collect::<Vec<_>>()));
        RecordBatch::try_new(
            self.schema()?,
            vec![
                Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.id.as_str()))),
                Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.doc_id.as_str()))),
                Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.doc_path.as_str()))),
                Arc::new(StringArray::from_iter_values(chunks.iter().map(|c| c.content.as_str()))),
                Arc::new(Int32Array::from(chunk_indices)),
                Arc::new(FixedSizeListArray::from_iter_primitive::<Float32Type, _, _>(vectors, dim)),
            ],
        )
        .map_err(storage_err)
    }

    /// Nearest rows to `query`, best first. `query` should be normalized.
    pub async fn search(&self, query: &[f32], k: usize) -> Result<Vec<QueryResult>> {
        if query.len() != self.dim {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: query.len() });
        }
        if k == 0 || !self.has_collection().await? {
            return Ok(Vec::new());
        }
        let table = self.db.open_table(&self.collection).execute().await.map_err(storage_err)?;
        let mut stream = table
            .vector_search(query.to_vec())
            .map_err(storage_err)?
            .distance_type(DistanceType::Cosine)
            .limit(k)
            .execute()
            .await
            .map_err(storage_err)?;

        let mut results = Vec::new();
        while let Some(batch) = stream.try_next().await.map_err(storage_err)? {
            let ids = string_column(&batch, "id")?;
            let contents = string_column(&batch, "content")?;
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| Error::Storage("search result has no _distance column".into()))?;
            for i in 0..batch.num_rows() {
                results.push(QueryResult {
                    id: ids.value(i).to_string(),
                    chunk: contents.value(i).to_string(),
                    score: 1.0 - distances.value(i),
                    rank: 0,
                });
            }
        }
        // Equal scores fall back to corpus order, matching `FlatIndex`.
        results.sort_by(|a, b| match b.score.total_cmp(&a.score) {
            Ordering::Equal => chunk_position(&a.id).cmp(&chunk_position(&b.id)).then_with(|| a.id.cmp(&b.id)),
            other => other,
        });
        results.truncate(k);
        for (rank, r) in results.iter_mut().enumerate() {
            r.rank = rank;
        }
        Ok(results)
    }

    pub async fn count(&self) -> Result<usize> {
        if !self.has_collection().await? {
            return Ok(0);
        }
        let table = self.db.open_table(&self.collection).execute().await.map_err(storage_err)?;
        table.count_rows(None).await.map_err(storage_err)
    }
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .filter(|c| c.len() == batch.num_rows())
        .ok_or_else(|| Error::Storage(format!("search result has no {name} column")))
}
