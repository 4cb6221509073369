//! Online query path: embed, search, map back to passages

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::corpus::{Corpus, Passage};
use crate::embeddings::EmbeddingProvider;
use crate::error::{Result, RetrievalError};
use crate::index::{validate_k, VectorIndex};
use crate::storage::IndexBundle;

/// A ranked passage returned for a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub passage: Passage,
    /// `1 / (1 + distance)`: 1.0 for an exact match, falling towards 0
    pub score: f32,
    /// Squared Euclidean distance between query and passage embeddings
    pub distance: f32,
}

impl RetrievalResult {
    fn new(passage: Passage, distance: f32) -> Self {
        Self {
            passage,
            score: distance_to_score(distance),
            distance,
        }
    }
}

/// Map a distance onto (0, 1], monotonically decreasing
pub fn distance_to_score(distance: f32) -> f32 {
    1.0 / (1.0 + distance.max(0.0))
}

/// Caller-supplied query, validated on use
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub text: String,
    pub top_k: i64,
}

/// Loaded corpus + index + embedder.
///
/// Everything held is immutable, so one instance (or clones of it) can serve
/// concurrent queries without locking.
#[derive(Clone)]
pub struct Retriever {
    corpus: Arc<Corpus>,
    index: Arc<VectorIndex>,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl Retriever {
    /// Pair a loaded corpus and index with the embedder that built them.
    ///
    /// # Errors
    ///
    /// - `CorpusIndexMismatch` if the corpus and index sizes differ
    /// - `DimensionMismatch` if the embedder's dimension is not the index's
    pub fn new(
        corpus: Arc<Corpus>,
        index: Arc<VectorIndex>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        if corpus.len() != index.len() {
            return Err(RetrievalError::CorpusIndexMismatch {
                index: index.len(),
                corpus: corpus.len(),
            });
        }
        if embedder.dimension() != index.dimension() {
            return Err(RetrievalError::DimensionMismatch {
                expected: index.dimension(),
                actual: embedder.dimension(),
            });
        }
        Ok(Self {
            corpus,
            index,
            embedder,
        })
    }

    /// Serve a loaded bundle.
    ///
    /// A bundle built with a different embedding model is refused with
    /// `ModelMismatch` unless `allow_model_mismatch` is set.
    pub fn from_bundle(
        bundle: IndexBundle,
        embedder: Arc<dyn EmbeddingProvider>,
        allow_model_mismatch: bool,
    ) -> Result<Self> {
        if bundle.model != embedder.model_id() {
            if !allow_model_mismatch {
                return Err(RetrievalError::ModelMismatch {
                    index: bundle.model,
                    embedder: embedder.model_id().to_string(),
                });
            }
            tracing::warn!(
                "Index was built with model {} but queries use {}",
                bundle.model,
                embedder.model_id()
            );
        }
        Self::new(Arc::new(bundle.corpus), Arc::new(bundle.index), embedder)
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    pub fn index(&self) -> &VectorIndex {
        &self.index
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    /// Return the `top_k` passages nearest to `query`, best first.
    ///
    /// At most `min(top_k, corpus size)` results are returned. Errors from
    /// the embedder and the index are passed through unchanged.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalResult>> {
        let vectors = self.embedder.embed(&[query.to_string()]).await?;
        let vector = vectors.into_iter().next().ok_or_else(|| {
            RetrievalError::EmbeddingService("provider returned no vector for query".to_string())
        })?;

        let neighbors = self.index.search(&vector, top_k)?;

        let results = neighbors
            .into_iter()
            .map(|hit| {
                let passage = self.corpus.get(hit.position).cloned().ok_or(
                    RetrievalError::CorpusIndexMismatch {
                        index: self.index.len(),
                        corpus: self.corpus.len(),
                    },
                )?;
                Ok(RetrievalResult::new(passage, hit.distance))
            })
            .collect::<Result<Vec<_>>>()?;

        tracing::debug!(
            "Retrieved {} passages for query ({} chars), best distance {:?}",
            results.len(),
            query.len(),
            results.first().map(|r| r.distance)
        );
        Ok(results)
    }

    /// Validate and run a [`QueryRequest`]
    pub async fn query(&self, request: &QueryRequest) -> Result<Vec<RetrievalResult>> {
        let k = validate_k(request.top_k)?;
        self.retrieve(&request.text, k).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Embeds "a" as [1,0], "b" as [0,1], anything else as [1,1]
    struct Fixed;

    #[async_trait]
    impl EmbeddingProvider for Fixed {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| match t.as_str() {
                    "a" => vec![1.0, 0.0],
                    "b" => vec![0.0, 1.0],
                    _ => vec![1.0, 1.0],
                })
                .collect())
        }

        fn dimension(&self) -> usize {
            2
        }

        fn model_id(&self) -> &str {
            "fixed"
        }
    }

    fn retriever() -> Retriever {
        let corpus = Corpus::from_texts(["alpha", "beta", "gamma"]);
        let index =
            VectorIndex::build(&[vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]]).unwrap();
        Retriever::new(Arc::new(corpus), Arc::new(index), Arc::new(Fixed)).unwrap()
    }

    #[test]
    fn test_score_is_monotonic() {
        assert_eq!(distance_to_score(0.0), 1.0);
        assert_eq!(distance_to_score(1.0), 0.5);
        assert!(distance_to_score(2.0) < distance_to_score(1.5));
    }

    #[tokio::test]
    async fn test_retrieve_ranks_by_distance() {
        let results = retriever().retrieve("a", 2).await.unwrap();
        let texts: Vec<&str> = results.iter().map(|r| r.passage.text.as_str()).collect();
        assert_eq!(texts, vec!["alpha", "gamma"]);
        assert_eq!(results[0].distance, 0.0);
        assert_eq!(results[0].score, 1.0);
        assert_eq!(results[1].distance, 1.0);
    }

    #[tokio::test]
    async fn test_top_k_larger_than_corpus_truncates() {
        let results = retriever().retrieve("b", 10).await.unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].passage.id, 1);
    }

    #[tokio::test]
    async fn test_query_rejects_non_positive_k() {
        let request = QueryRequest {
            text: "a".to_string(),
            top_k: -1,
        };
        assert!(matches!(
            retriever().query(&request).await,
            Err(RetrievalError::InvalidK(-1))
        ));
    }

    #[test]
    fn test_new_rejects_mismatch() {
        let corpus = Corpus::from_texts(["alpha"]);
        let index = VectorIndex::build(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        assert!(matches!(
            Retriever::new(Arc::new(corpus), Arc::new(index), Arc::new(Fixed)),
            Err(RetrievalError::CorpusIndexMismatch { index: 2, corpus: 1 })
        ));
    }

    fn bundle_from(model: &str) -> IndexBundle {
        let corpus = Corpus::from_texts(["alpha", "beta"]);
        let index = VectorIndex::build(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        IndexBundle::new(corpus, index, model).unwrap()
    }

    #[test]
    fn test_from_bundle_refuses_other_model() {
        let result = Retriever::from_bundle(bundle_from("other-model"), Arc::new(Fixed), false);
        match result {
            Err(RetrievalError::ModelMismatch { index, embedder }) => {
                assert_eq!(index, "other-model");
                assert_eq!(embedder, "fixed");
            }
            other => panic!("expected ModelMismatch, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_from_bundle_allows_other_model_when_asked() {
        let retriever =
            Retriever::from_bundle(bundle_from("other-model"), Arc::new(Fixed), true).unwrap();
        assert_eq!(retriever.retrieve("b", 1).await.unwrap()[0].passage.id, 1);
    }

    #[test]
    fn test_from_bundle_same_model() {
        assert!(Retriever::from_bundle(bundle_from("fixed"), Arc::new(Fixed), false).is_ok());
    }

    #[test]
    fn test_new_rejects_wrong_embedder_dimension() {
        let corpus = Corpus::from_texts(["alpha"]);
        let index = VectorIndex::build(&[vec![1.0, 0.0, 0.0]]).unwrap();
        assert!(matches!(
            Retriever::new(Arc::new(corpus), Arc::new(index), Arc::new(Fixed)),
            Err(RetrievalError::DimensionMismatch { expected: 3, actual: 2 })
        ));
    }
}
