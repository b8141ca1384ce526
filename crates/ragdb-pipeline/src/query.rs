//! Read-only similarity search over a loaded index snapshot.
//!
//! A `QueryService` owns its embedder, index and chunk list and never
//! mutates them, so a shared reference can serve concurrent callers.
//! `QueryContext` gives it an explicit open/close lifecycle built from
//! configuration.
use ragdb_core::config::RagConfig;
use ragdb_core::types::{DocumentChunk, QueryRequest, QueryResponse, QueryResult};
use ragdb_core::{normalize, Embedder, Error, Result, VectorIndex};
use ragdb_embed::embedder_from_config;
use ragdb_vector::{FlatIndex, IndexStore};

pub struct QueryService {
    embedder: Box<dyn Embedder>,
    index: FlatIndex,
    chunks: Vec<DocumentChunk>,
}

impl QueryService {
    pub fn new(embedder: Box<dyn Embedder>, index: FlatIndex, chunks: Vec<DocumentChunk>) -> Result<Self> {
        if chunks.len() != index.len() {
            return Err(Error::CorruptIndex(format!("{} chunks for {} vectors", chunks.len(), index.len())));
        }
        if index.dim() != embedder.dim() {
            return Err(Error::DimensionMismatch { expected: embedder.dim(), actual: index.dim() });
        }
        Ok(Self { embedder, index, chunks })
    }

    /// Loads the index saved in `store` for use with `embedder`.
    pub fn open(embedder: Box<dyn Embedder>, store: &IndexStore) -> Result<Self> {
        let stored = store.load(embedder.dim())?;
        if stored.manifest.embedder_id != embedder.id() {
            tracing::warn!(
                built_with = %stored.manifest.embedder_id,
                querying_with = %embedder.id(),
                "index was built with a different embedder"
            );
        }
        tracing::info!(dir = %store.dir().display(), chunks = stored.chunks.len(), "index opened");
        Self::new(embedder, stored.index, stored.chunks)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// The `top_n` chunks most similar to `query`, best first.
    pub fn search(&self, query: &str, top_n: usize) -> Result<Vec<QueryResult>> {
        if top_n == 0 {
            return Err(Error::InvalidArgument("top_n must be greater than zero".into()));
        }
        if query.trim().is_empty() {
            return Err(Error::InvalidArgument("query text is empty".into()));
        }
        let mut embedded = self.embedder.embed_batch(&[query.to_string()])?;
        let raw = embedded.pop().ok_or_else(|| Error::Embedding("no vector returned for query".into()))?;
        let q = normalize(&raw)?;

        let hits = self.index.search(&q, top_n)?;
        let mut results = Vec::with_capacity(hits.len());
        for (rank, hit) in hits.into_iter().enumerate() {
            let chunk = self
                .chunks
                .get(hit.id)
                .ok_or_else(|| Error::CorruptIndex(format!("hit {} has no chunk", hit.id)))?;
            results.push(QueryResult { id: chunk.id.clone(), chunk: chunk.content.clone(), score: hit.score, rank });
        }
        tracing::debug!(top_n, returned = results.len(), "query answered");
        Ok(results)
    }

    /// `search`, dropping results that score below `min_score`.
    pub fn search_with_threshold(&self, query: &str, top_n: usize, min_score: f32) -> Result<Vec<QueryResult>> {
        let mut results = self.search(query, top_n)?;
        results.retain(|r| r.score >= min_score);
        Ok(results)
    }

    /// Serves one request of the query endpoint.
    pub fn handle(&self, request: &QueryRequest) -> Result<QueryResponse> {
        let top_n = usize::try_from(request.top_n)
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| Error::InvalidArgument(format!("top_n must be positive, got {}", request.top_n)))?;
        Ok(self.search(&request.query, top_n)?.into())
    }
}

/// Process-wide query state with an explicit lifecycle.
pub struct QueryContext {
    service: Option<QueryService>,
    top_n: usize,
    min_score: Option<f32>,
}

impl QueryContext {
    /// Loads the embedder and the index named by `config`.
    pub fn open(config: &RagConfig) -> Result<Self> {
        let embedder = embedder_from_config(&config.embedding)?;
        let store = IndexStore::new(config.index.dir());
        let service = QueryService::open(embedder, &store)?;
        Ok(Self { service: Some(service), top_n: config.query.top_n, min_score: config.query.min_score })
    }

    pub fn from_service(service: QueryService) -> Self {
        Self { service: Some(service), top_n: ragdb_core::types::DEFAULT_TOP_N, min_score: None }
    }

    pub fn service(&self) -> Result<&QueryService> {
        self.service.as_ref().ok_or_else(|| Error::NotFound("query context is closed".into()))
    }

    /// Query with the configured result count and score floor.
    pub fn search(&self, query: &str) -> Result<Vec<QueryResult>> {
        let service = self.service()?;
        match self.min_score {
            Some(min) => service.search_with_threshold(query, self.top_n, min),
            None => service.search(query, self.top_n),
        }
    }

    /// Releases the model and index.
    pub fn close(&mut self) {
        if self.service.take().is_some() {
            tracing::info!("query context closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragdb_core::types::chunk_id;

    /// Maps a few known words onto fixed axes.
    struct AxisEmbedder;

    impl Embedder for AxisEmbedder {
        fn id(&self) -> &str {
            "axis:d3"
        }
        fn dim(&self) -> usize {
            3
        }
        fn max_len(&self) -> usize {
            64
        }
        fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| match t.as_str() {
                    "rent" => vec![2.0, 0.0, 0.0],
                    "deposit" => vec![0.0, 3.0, 0.0],
                    "void" => vec![0.0, 0.0, 0.0],
                    _ => vec![1.0, 1.0, 1.0],
                })
                .collect())
        }
    }

    fn service() -> QueryService {
        let texts = ["rent", "deposit", "notice"];
        let mut index = FlatIndex::new(3).unwrap();
        let vectors: Vec<Vec<f32>> = AxisEmbedder
            .embed_batch(&texts.iter().map(|t| (*t).to_string()).collect::<Vec<_>>())
            .unwrap()
            .iter()
            .map(|v| normalize(v).unwrap())
            .collect();
        index.add(&vectors).unwrap();
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(i, t)| DocumentChunk {
                id: chunk_id(i),
                doc_id: "lease".into(),
                doc_path: "lease.md".into(),
                content: (*t).to_string(),
                chunk_index: i,
                total_chunks: 3,
            })
            .collect();
        QueryService::new(Box::new(AxisEmbedder), index, chunks).unwrap()
    }

    #[test]
    fn results_are_ranked_and_carry_chunk_text() {
        let results = service().search("rent", 3).unwrap();
        assert_eq!(results[0].chunk, "rent");
        assert_eq!(results[0].id, "chunk_0");
        assert!((results[0].score - 1.0).abs() < 1e-6);
        assert_eq!(results.iter().map(|r| r.rank).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(results[1].chunk, "notice");
    }

    #[test]
    fn invalid_requests_are_rejected() {
        let svc = service();
        assert!(matches!(svc.search("rent", 0), Err(Error::InvalidArgument(_))));
        assert!(matches!(svc.search("   ", 3), Err(Error::InvalidArgument(_))));
        assert!(matches!(svc.search("void", 3), Err(Error::ZeroVector)));
        let req = QueryRequest { query: "rent".into(), top_n: -2 };
        assert!(matches!(svc.handle(&req), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn threshold_drops_weak_matches() {
        let results = service().search_with_threshold("deposit", 3, 0.5).unwrap();
        assert_eq!(results.len(), 2, "deposit itself and the diagonal notice vector");
        assert!(results.iter().all(|r| r.score >= 0.5));
    }

    #[test]
    fn handle_speaks_the_endpoint_shape() {
        let resp = service().handle(&QueryRequest { query: "deposit".into(), top_n: 1 }).unwrap();
        assert_eq!(resp.results.len(), 1);
        assert_eq!(resp.results[0].chunk, "deposit");
        assert!(resp.best_score().unwrap() > 0.99);
    }

    #[test]
    fn mismatched_parts_are_rejected() {
        let index = FlatIndex::new(3).unwrap();
        assert!(matches!(
            QueryService::new(Box::new(AxisEmbedder), index, vec![]).map(|s| s.len()),
            Ok(0)
        ));
        let wrong_dim = FlatIndex::new(4).unwrap();
        assert!(matches!(
            QueryService::new(Box::new(AxisEmbedder), wrong_dim, vec![]),
            Err(Error::DimensionMismatch { expected: 3, actual: 4 })
        ));
    }

    #[test]
    fn closed_context_refuses_queries() {
        let mut ctx = QueryContext::from_service(service());
        assert_eq!(ctx.search("rent").unwrap().len(), 3);
        ctx.close();
        assert!(matches!(ctx.service(), Err(Error::NotFound(_))));
        assert!(ctx.search("rent").is_err());
    }
}
