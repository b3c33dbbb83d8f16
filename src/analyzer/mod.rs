//! External analysis capability.
//!
//! The worker only knows the [`Analyzer`] trait; the production backend is an
//! OpenAI-compatible chat endpoint in [`openai`]. Any recalled memory record
//! is passed as context so the model can build on prior findings.

pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AnalyzerError;
use crate::memory::types::{MemoryRecord, Recommendation};

/// Structured output of one analysis call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub product_title: String,
    pub price: f64,
    pub analysis_text: String,
    pub recommendation: Recommendation,
}

/// One external analysis call. Assumed non-idempotent and costly — retries
/// belong to the queue, not the implementation.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(
        &self,
        query: &str,
        context: Option<&MemoryRecord>,
    ) -> Result<Analysis, AnalyzerError>;
}

#[async_trait]
impl Analyzer for Box<dyn Analyzer> {
    async fn analyze(
        &self,
        query: &str,
        context: Option<&MemoryRecord>,
    ) -> Result<Analysis, AnalyzerError> {
        (**self).analyze(query, context).await
    }
}

/// Assemble the user prompt, folding in prior findings when available.
pub(crate) fn build_prompt(query: &str, context: Option<&MemoryRecord>) -> String {
    let mut prompt = format!(
        "Analyze this product-research request for resale profitability:\n\n\
         Request: {query}\n"
    );

    if let Some(record) = context {
        prompt.push_str(&format!(
            "\nA prior analysis of a similar request exists — refine rather than repeat it:\n\
             Product: {}\nPrice: ${:.2}\nRecommendation: {}\nFindings: {}\n",
            record.product_title, record.price, record.recommendation, record.analysis
        ));
    }

    prompt.push_str(
        "\nRespond with a single JSON object, no surrounding prose:\n\
         {\"product_title\": string, \"price\": number, \
         \"analysis_text\": string, \"recommendation\": \"buy\"|\"avoid\"|\"research\"}",
    );
    prompt
}
