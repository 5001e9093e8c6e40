use async_trait::async_trait;

use crate::{error::Result, types::WindowRecord};

/// A window handed to the model together with its citation id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passage {
    pub citation_id: usize,
    pub window: WindowRecord,
}

/// Picks the passages of the windowed corpus relevant to a query. Whatever
/// the ranking, each passage keeps the index of its window in the corpus so
/// citations stay resolvable.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, corpus: &[WindowRecord], query: &str) -> Result<Vec<Passage>>;
}

/// Hands the model the whole corpus in transcript order.
#[derive(Debug, Clone, Copy, Default)]
pub struct FullCorpusRetriever;

#[async_trait]
impl Retriever for FullCorpusRetriever {
    async fn retrieve(&self, corpus: &[WindowRecord], _query: &str) -> Result<Vec<Passage>> {
        Ok(corpus
            .iter()
            .cloned()
            .enumerate()
            .map(|(citation_id, window)| Passage {
                citation_id,
                window,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timestamp;

    #[tokio::test]
    async fn keeps_corpus_indices() {
        let corpus: Vec<_> = ["a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(i, text)| WindowRecord {
                combined_text: text.to_string(),
                start: Timestamp::from_secs(i as u64 * 30),
                end: Timestamp::from_secs(i as u64 * 30 + 20),
            })
            .collect();
        let passages = FullCorpusRetriever.retrieve(&corpus, "anything").await.unwrap();
        assert_eq!(passages.len(), 3);
        for (i, passage) in passages.iter().enumerate() {
            assert_eq!(passage.citation_id, i);
            assert_eq!(passage.window, corpus[i]);
        }
    }
}
