//! Response pipeline: verification, post-processing, citation
//! normalization, and final formatting, as ordered pluggable stages.
//!
//! A stage failure is logged and the pipeline continues with the previous
//! data, so the caller always gets some output.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::postprocess::post_process_response;
use crate::verify::{Verification, Verifier};
use crate::Source;

/// Data carried through the stages.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineData {
    pub response: String,
    pub query: String,
    pub context_chunks: Vec<String>,
    pub sources: Vec<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
    pub verification_score: f64,
    pub verification_status: String,
    pub citations: Vec<Source>,
    pub citation_count: usize,
    pub stages_completed: Vec<String>,
}

impl PipelineData {
    pub fn new(
        response: impl Into<String>,
        query: impl Into<String>,
        context_chunks: Vec<String>,
        sources: Vec<Source>,
    ) -> Self {
        Self {
            response: response.into(),
            query: query.into(),
            context_chunks,
            sources,
            verification_score: 1.0,
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait PipelineStage: Send + Sync {
    fn name(&self) -> &'static str;
    async fn process(&self, data: PipelineData) -> Result<PipelineData>;
}

// ── Verification ────────────────────────────────────────────────────────────

/// Skipped for short responses or when no context was gathered; a verifier
/// failure degrades to a neutral 0.5 score instead of failing the stage.
pub struct VerificationStage {
    verifier: Arc<dyn Verifier>,
    min_response_length: usize,
}

impl VerificationStage {
    pub fn new(verifier: Arc<dyn Verifier>) -> Self {
        Self { verifier, min_response_length: 50 }
    }
}

#[async_trait]
impl PipelineStage for VerificationStage {
    fn name(&self) -> &'static str {
        "VerificationStage"
    }

    async fn process(&self, mut data: PipelineData) -> Result<PipelineData> {
        if data.response.len() < self.min_response_length || data.context_chunks.is_empty() {
            debug!("skipping verification (response too short or no context)");
            data.verification_score = 1.0;
            data.verification_status = "skipped".to_string();
            return Ok(data);
        }

        match self
            .verifier
            .verify(&data.query, &data.response, &data.context_chunks)
            .await
        {
            Ok(verification) => {
                info!(
                    status = %verification.status,
                    score = verification.score,
                    "verification complete"
                );
                data.verification_score = verification.score;
                data.verification_status = verification.status.clone();
                data.verification = Some(verification);
            }
            Err(err) => {
                warn!("verification failed: {err}");
                data.verification_score = 0.5;
                data.verification_status = "error".to_string();
            }
        }
        Ok(data)
    }
}

// ── Post-processing ─────────────────────────────────────────────────────────

pub struct PostProcessingStage;

#[async_trait]
impl PipelineStage for PostProcessingStage {
    fn name(&self) -> &'static str {
        "PostProcessingStage"
    }

    async fn process(&self, mut data: PipelineData) -> Result<PipelineData> {
        if data.response.is_empty() {
            return Ok(data);
        }
        let original_length = data.response.len();
        data.response = post_process_response(&data.response, &data.query);
        debug!(
            from = original_length,
            to = data.response.len(),
            "post-processing complete"
        );
        Ok(data)
    }
}

// ── Citations ───────────────────────────────────────────────────────────────

/// Deduplicate by `(title, url)`, sort by score descending, cap the count.
pub struct CitationStage {
    max_citations: usize,
}

impl CitationStage {
    pub fn new(max_citations: usize) -> Self {
        Self { max_citations }
    }
}

impl Default for CitationStage {
    fn default() -> Self {
        Self::new(10)
    }
}

#[async_trait]
impl PipelineStage for CitationStage {
    fn name(&self) -> &'static str {
        "CitationStage"
    }

    async fn process(&self, mut data: PipelineData) -> Result<PipelineData> {
        let mut seen: Vec<(String, String)> = Vec::new();
        let mut normalized: Vec<Source> = Vec::new();

        for source in &data.sources {
            if source.title.is_empty() {
                continue;
            }
            let key = (source.title.clone(), source.url.clone());
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            normalized.push(source.clone());
        }

        normalized.sort_by(|a, b| b.score.total_cmp(&a.score));
        normalized.truncate(self.max_citations);

        info!(
            raw = data.sources.len(),
            unique = normalized.len(),
            "citations normalized"
        );
        data.citation_count = normalized.len();
        data.citations = normalized;
        Ok(data)
    }
}

// ── Final formatting ────────────────────────────────────────────────────────

pub struct FormatStage;

#[async_trait]
impl PipelineStage for FormatStage {
    fn name(&self) -> &'static str {
        "FormatStage"
    }

    async fn process(&self, mut data: PipelineData) -> Result<PipelineData> {
        data.response = data.response.trim().to_string();
        // `citations` always present past this stage, even when empty.
        Ok(data)
    }
}

// ── Orchestration ───────────────────────────────────────────────────────────

pub struct ResponsePipeline {
    stages: Vec<Box<dyn PipelineStage>>,
}

impl ResponsePipeline {
    pub fn new(stages: Vec<Box<dyn PipelineStage>>) -> Self {
        info!(stages = stages.len(), "response pipeline initialized");
        Self { stages }
    }

    pub async fn process(&self, mut data: PipelineData) -> PipelineData {
        data.stages_completed.clear();
        for stage in &self.stages {
            debug!(stage = stage.name(), "executing stage");
            match stage.process(data.clone()).await {
                Ok(next) => {
                    data = next;
                    data.stages_completed.push(stage.name().to_string());
                }
                Err(err) => {
                    error!(stage = stage.name(), "stage failed: {err}");
                    data.stages_completed.push(format!("{} (failed)", stage.name()));
                }
            }
        }
        data
    }
}

/// The default stage order: verify, clean, cite, format.
pub fn create_default_pipeline(verifier: Arc<dyn Verifier>) -> ResponsePipeline {
    ResponsePipeline::new(vec![
        Box::new(VerificationStage::new(verifier)),
        Box::new(PostProcessingStage),
        Box::new(CitationStage::default()),
        Box::new(FormatStage),
    ])
}
