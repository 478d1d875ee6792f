//! Premortem analysis pipeline orchestrator
//!
//! Sequences the four stages (decomposition, retrieval, synthesis,
//! scoring), reports progress after each transition, merges citations and
//! assembles the report. Stages degrade internally rather than throwing;
//! the orchestrator's error path is reserved for genuinely unrecoverable
//! conditions, which halt the run while preserving partial results.

pub mod decompose;
pub mod retrieve;
pub mod score;
pub mod synthesize;

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use chrono::Utc;

use crate::model::{Citation, IdeaDecomposition, PremortemReport, ReportStatus};
use crate::service::evidence::EvidenceClient;
use crate::service::graveyard::GraveyardClient;

/// Max output size for the full decomposition call.
const DECOMPOSE_MAX_TOKENS: u32 = 1000;
/// Quick previews use a smaller output cap.
const PREVIEW_MAX_TOKENS: u32 = 800;

/// The four pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PipelineStage {
    Decomposition,
    Retrieval,
    Synthesis,
    Scoring,
}

impl PipelineStage {
    pub const ALL: [PipelineStage; 4] = [
        PipelineStage::Decomposition,
        PipelineStage::Retrieval,
        PipelineStage::Synthesis,
        PipelineStage::Scoring,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PipelineStage::Decomposition => "decomposition",
            PipelineStage::Retrieval => "retrieval",
            PipelineStage::Synthesis => "synthesis",
            PipelineStage::Scoring => "scoring",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress snapshot emitted at each stage transition.
#[derive(Debug, Clone)]
pub struct PipelineProgress {
    pub current_stage: PipelineStage,
    /// 0 at stage entry, 100 at stage completion.
    pub stage_progress: u8,
    pub stage_message: String,
    pub completed_stages: Vec<String>,
}

/// Optional observer for stage transitions.
pub type ProgressCallback = dyn Fn(PipelineProgress) + Send + Sync;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Resuming past stage 1 requires an existing decomposition.
    #[error("Cannot resume from {stage}: report has no decomposition")]
    MissingDecomposition { stage: PipelineStage },
}

/// The orchestrator. Owns handles to both external boundaries; stages
/// borrow them per run.
pub struct PremortemPipeline {
    evidence: Arc<EvidenceClient>,
    graveyard: Arc<GraveyardClient>,
}

impl PremortemPipeline {
    pub fn new(evidence: Arc<EvidenceClient>, graveyard: Arc<GraveyardClient>) -> Self {
        Self {
            evidence,
            graveyard,
        }
    }

    /// Run the complete analysis pipeline for a fresh submission.
    ///
    /// Always returns a report: on an unrecoverable stage failure the
    /// status is `error`, the message recorded, and every field computed
    /// so far preserved.
    pub async fn run(
        &self,
        idea_text: &str,
        on_progress: Option<&ProgressCallback>,
    ) -> PremortemReport {
        let mut report = PremortemReport::new(idea_text);
        tracing::info!(report_id = %report.id, "Starting premortem pipeline");

        self.execute(&mut report, PipelineStage::Decomposition, on_progress)
            .await;
        report
    }

    /// Decomposition only, for the quick-preview path.
    pub async fn quick_preview(&self, idea_text: &str) -> IdeaDecomposition {
        decompose::decompose(&self.evidence, idea_text, PREVIEW_MAX_TOKENS).await
    }

    /// Re-run the pipeline from the named stage on an existing report.
    ///
    /// Resuming from stage 1 restarts fully; any later stage reuses the
    /// report's decomposition and re-runs retrieval, synthesis and
    /// scoring. The version counter increments and status resets to
    /// `generating` before re-execution.
    pub async fn rerun_from_stage(
        &self,
        mut report: PremortemReport,
        from_stage: PipelineStage,
        on_progress: Option<&ProgressCallback>,
    ) -> PremortemReport {
        report.version += 1;
        report.status = ReportStatus::Generating;
        report.error = None;
        report.citations.clear();
        if from_stage == PipelineStage::Decomposition {
            report.decomposition = None;
        }

        tracing::info!(
            report_id = %report.id,
            version = report.version,
            from_stage = %from_stage,
            "Re-running premortem pipeline"
        );

        self.execute(&mut report, from_stage, on_progress).await;
        report
    }

    async fn execute(
        &self,
        report: &mut PremortemReport,
        from_stage: PipelineStage,
        on_progress: Option<&ProgressCallback>,
    ) {
        match self.run_stages(report, from_stage, on_progress).await {
            Ok(()) => {
                report.citations = dedupe_citations(std::mem::take(&mut report.citations));
                report.status = ReportStatus::Complete;
                tracing::info!(
                    report_id = %report.id,
                    citations = report.citations.len(),
                    "Premortem pipeline complete"
                );
            }
            Err(e) => {
                // Keep whatever the completed stages already produced.
                report.status = ReportStatus::Error;
                report.error = Some(e.to_string());
                tracing::error!(report_id = %report.id, error = %e, "Premortem pipeline halted");
            }
        }
        report.updated_at = Utc::now();
    }

    async fn run_stages(
        &self,
        report: &mut PremortemReport,
        from_stage: PipelineStage,
        on_progress: Option<&ProgressCallback>,
    ) -> Result<(), PipelineError> {
        if from_stage > PipelineStage::Decomposition && report.decomposition.is_none() {
            return Err(PipelineError::MissingDecomposition { stage: from_stage });
        }

        if from_stage == PipelineStage::Decomposition {
            emit(
                on_progress,
                PipelineStage::Decomposition,
                0,
                "Analyzing idea structure...",
            );
            let decomposition =
                decompose::decompose(&self.evidence, &report.original_idea, DECOMPOSE_MAX_TOKENS)
                    .await;
            report.decomposition = Some(decomposition);
            emit(
                on_progress,
                PipelineStage::Decomposition,
                100,
                "Idea decomposition complete",
            );
        }

        // Guarded above; set in the decomposition arm otherwise.
        let decomposition = report
            .decomposition
            .clone()
            .ok_or(PipelineError::MissingDecomposition { stage: from_stage })?;

        emit(
            on_progress,
            PipelineStage::Retrieval,
            0,
            "Gathering market intelligence...",
        );
        let evidence = retrieve::retrieve(&self.evidence, &self.graveyard, &decomposition).await;
        report.citations.extend(evidence.citations.clone());
        emit(
            on_progress,
            PipelineStage::Retrieval,
            100,
            "Evidence retrieval complete",
        );

        emit(
            on_progress,
            PipelineStage::Synthesis,
            0,
            "Synthesizing failure patterns...",
        );
        let synthesis = synthesize::synthesize(&self.evidence, &decomposition, &evidence).await;
        report.failure_modes = synthesis.failure_modes.clone();
        report.market_risks = synthesis.market_risks.clone();
        report.timing_risks = synthesis.timing_risks.clone();
        report.regulatory_risks = synthesis.regulatory_risks.clone();
        report.distribution_challenges = synthesis.distribution_challenges.clone();
        report.failed_startups = synthesis.failed_comparables.clone();
        report.surviving_startups = synthesis.surviving_comparables.clone();
        report.citations.extend(synthesis.citations.clone());
        emit(
            on_progress,
            PipelineStage::Synthesis,
            100,
            "Pattern synthesis complete",
        );

        emit(
            on_progress,
            PipelineStage::Scoring,
            0,
            "Calculating risk assessment...",
        );
        let scoring = score::score(&decomposition, &synthesis);
        report.risk_score = Some(scoring.risk_score);
        report.improvement_levers = scoring.improvement_levers;
        report.early_warnings = scoring.early_warnings;
        emit(
            on_progress,
            PipelineStage::Scoring,
            100,
            "Risk assessment complete",
        );

        Ok(())
    }
}

fn emit(
    on_progress: Option<&ProgressCallback>,
    stage: PipelineStage,
    stage_progress: u8,
    message: &str,
) {
    if let Some(callback) = on_progress {
        let completed_stages = PipelineStage::ALL
            .iter()
            .take_while(|s| **s != stage)
            .map(|s| s.as_str().to_string())
            .collect();
        callback(PipelineProgress {
            current_stage: stage,
            stage_progress,
            stage_message: message.to_string(),
            completed_stages,
        });
    }
}

/// Deduplicate citations by url-or-title key, earliest occurrence wins.
/// Idempotent: applying it twice equals applying it once.
pub fn dedupe_citations(citations: Vec<Citation>) -> Vec<Citation> {
    let mut seen = HashSet::new();
    citations
        .into_iter()
        .filter(|citation| {
            let key = citation
                .url
                .clone()
                .unwrap_or_else(|| citation.title.clone());
            seen.insert(key)
        })
        .collect()
}
