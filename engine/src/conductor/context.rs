//! Context Assembler
//!
//! Builds the composite brand context consumed by every creative stage:
//! one recency-ordered sample of historical posts, and the voice report
//! derived from exactly that sample set. The report and the samples are
//! always mutually consistent; there is a single retrieval per assembly,
//! never a second independent one.

use crate::conductor::types::BrandContext;
use crate::stages::{GenerationStage, ReporterStage};
use crate::store::ContextStore;
use sdk::errors::EngineError;
use std::sync::Arc;
use tracing::debug;

pub struct ContextAssembler {
    store: Arc<ContextStore>,
    reporter: Arc<ReporterStage>,
}

impl ContextAssembler {
    pub fn new(store: Arc<ContextStore>, reporter: Arc<ReporterStage>) -> Self {
        Self { store, reporter }
    }

    /// Assemble the brand context from the `sample_size` most recent posts.
    ///
    /// The sample is broad and representative (recency-ordered, not
    /// topic-biased); the Reporter runs over the same records that are
    /// returned to the caller.
    pub async fn build_brand_context(
        &self,
        sample_size: usize,
    ) -> Result<BrandContext, EngineError> {
        let samples = self.store.recency_query(sample_size).await?;
        debug!("Assembling brand context from {} samples", samples.len());

        let report = self.reporter.run(&samples, None, None).await?;

        Ok(BrandContext { report, samples })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrandConfig;
    use crate::db::Database;
    use crate::llm::EmbeddingClient;
    use crate::stages::test_support::ScriptedClient;
    use crate::store::tests::{record, StubEmbedder};
    use tempfile::TempDir;

    const REPORT_JSON: &str = r#"{
        "executive_summary": "Practical warmth.",
        "pillars": [{"name": "Pricing", "description": "Price with confidence"}],
        "audience_persona": "Makers",
        "tone_analysis": "Friendly",
        "language_style": "Colloquial",
        "locale_notes": "English",
        "hashtag_strategy": "Community tags"
    }"#;

    async fn seeded_store(captions: &[(&str, &str, i64)]) -> (Arc<ContextStore>, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Database::new(&dir.path().join("test.db")).await.unwrap();
        let store = Arc::new(ContextStore::new(
            db.pool().clone(),
            Arc::new(StubEmbedder),
        ));

        for (id, caption, epoch) in captions {
            let rec = record(id, caption, *epoch);
            let embedding = StubEmbedder.embed(caption).await.unwrap();
            store.add(&rec, &embedding).await.unwrap();
        }

        (store, dir)
    }

    #[tokio::test]
    async fn test_report_is_built_from_the_returned_samples() {
        let (store, _dir) = seeded_store(&[
            ("old", "an older caption", 100),
            ("mid", "a middle caption", 200),
            ("new", "the newest caption", 300),
        ])
        .await;

        let client = Arc::new(ScriptedClient::new(vec![REPORT_JSON]));
        let reporter = Arc::new(ReporterStage::new(client.clone(), BrandConfig::default()));
        let assembler = ContextAssembler::new(Arc::clone(&store), reporter);

        let context = assembler.build_brand_context(2).await.unwrap();

        // The two newest records, in recency order
        assert_eq!(context.samples.len(), 2);
        assert_eq!(context.samples[0].id, "new");
        assert_eq!(context.samples[1].id, "mid");

        // The reporter saw exactly that sample set: one generation call,
        // whose input contains the returned captions and no others
        assert_eq!(client.call_count(), 1);
        let sent = client.request_inputs().pop().unwrap();
        assert!(sent.contains("the newest caption"));
        assert!(sent.contains("a middle caption"));
        assert!(!sent.contains("an older caption"));

        assert_eq!(context.report.executive_summary, "Practical warmth.");
    }

    #[tokio::test]
    async fn test_short_store_yields_fewer_samples() {
        let (store, _dir) = seeded_store(&[("only", "just one", 100)]).await;

        let client = Arc::new(ScriptedClient::new(vec![REPORT_JSON]));
        let reporter = Arc::new(ReporterStage::new(client, BrandConfig::default()));
        let assembler = ContextAssembler::new(store, reporter);

        let context = assembler.build_brand_context(5).await.unwrap();
        assert_eq!(context.samples.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_store_fails_before_any_generation() {
        let (store, _dir) = seeded_store(&[]).await;

        let client = Arc::new(ScriptedClient::new(vec![REPORT_JSON]));
        let reporter = Arc::new(ReporterStage::new(client.clone(), BrandConfig::default()));
        let assembler = ContextAssembler::new(store, reporter);

        assert!(matches!(
            assembler.build_brand_context(5).await,
            Err(EngineError::StoreNotReady)
        ));
        assert_eq!(client.call_count(), 0);
    }
}
