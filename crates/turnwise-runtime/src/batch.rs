//! JSONL batch runs.
//!
//! One case per line. Cases are evaluated with bounded concurrency; a case
//! that fails to parse or evaluate is recorded in the summary and the batch
//! keeps going.

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use turnwise_core::{ConversationReport, EvaluationCase, GoldenReport, RuleRecord, VerdictStatus};

use crate::engine::Engine;

/// A batch line that is not a valid case.
#[derive(Error, Debug)]
#[error("line {line}: {source}")]
pub struct LineError {
    /// 1-based line number in the input
    pub line: usize,

    #[source]
    pub source: serde_json::Error,
}

/// Parse JSONL input, skipping blank lines.
pub fn read_cases(text: &str) -> Vec<Result<EvaluationCase, LineError>> {
    text.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).map_err(|source| LineError { line: i + 1, source })
        })
        .collect()
}

/// How every case of a batch is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationMode {
    #[default]
    Interactive,
    Golden,
}

impl EvaluationMode {
    /// File name for the per-case reports.
    pub fn output_file_name(&self) -> &'static str {
        match self {
            EvaluationMode::Interactive => "interactive_output.jsonl",
            EvaluationMode::Golden => "golden_history_output.jsonl",
        }
    }
}

impl fmt::Display for EvaluationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvaluationMode::Interactive => write!(f, "interactive"),
            EvaluationMode::Golden => write!(f, "golden"),
        }
    }
}

impl FromStr for EvaluationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "interactive" => Ok(EvaluationMode::Interactive),
            "golden" | "golden_history" => Ok(EvaluationMode::Golden),
            other => Err(format!("unknown evaluation mode '{}'", other)),
        }
    }
}

/// Report of one evaluated case.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CaseOutcome {
    Interactive(ConversationReport),
    Golden(GoldenReport),
}

impl CaseOutcome {
    pub fn total_score(&self) -> i32 {
        match self {
            CaseOutcome::Interactive(report) => report.summary.total_score,
            CaseOutcome::Golden(report) => report.total_score,
        }
    }

    fn records(&self) -> Box<dyn Iterator<Item = &RuleRecord> + '_> {
        match self {
            CaseOutcome::Interactive(report) => {
                Box::new(report.turns.iter().flat_map(|t| t.records.iter()))
            }
            CaseOutcome::Golden(report) => Box::new(report.records.iter()),
        }
    }

    /// Records where a check or the judge actually ran.
    pub fn rules_checked(&self) -> usize {
        self.records()
            .filter(|r| r.verdict.status == VerdictStatus::Evaluated)
            .count()
    }

    pub fn rules_triggered(&self) -> usize {
        self.records().filter(|r| r.verdict.triggered).count()
    }
}

/// One batch entry, in input order.
#[derive(Debug)]
pub struct CaseResult {
    /// 0-based position among the non-blank input lines
    pub index: usize,
    pub key: Option<String>,
    pub outcome: Result<CaseOutcome, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Evaluated,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDetail {
    pub index: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    pub status: EntryStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i32>,

    pub total_rules: usize,

    pub triggered_count: usize,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Batch totals, written as `evaluation_summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub mode: EvaluationMode,
    pub total_entries: usize,
    pub evaluated_entries: usize,
    pub failed_entries: usize,
    pub total_score: i64,
    pub total_rules_checked: usize,
    pub total_rules_triggered: usize,
    pub average_score: f64,
    pub average_triggered_percent: f64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub entry_details: Vec<EntryDetail>,
}

impl BatchSummary {
    fn from_results(
        mode: EvaluationMode,
        results: &[CaseResult],
        started_at: DateTime<Utc>,
    ) -> Self {
        let entry_details: Vec<EntryDetail> = results
            .iter()
            .map(|result| match &result.outcome {
                Ok(outcome) => EntryDetail {
                    index: result.index,
                    key: result.key.clone(),
                    status: EntryStatus::Evaluated,
                    score: Some(outcome.total_score()),
                    total_rules: outcome.rules_checked(),
                    triggered_count: outcome.rules_triggered(),
                    error: None,
                },
                Err(error) => EntryDetail {
                    index: result.index,
                    key: result.key.clone(),
                    status: EntryStatus::Failed,
                    score: None,
                    total_rules: 0,
                    triggered_count: 0,
                    error: Some(error.clone()),
                },
            })
            .collect();

        let evaluated = entry_details
            .iter()
            .filter(|d| d.status == EntryStatus::Evaluated)
            .count();
        let total_score: i64 = entry_details
            .iter()
            .filter_map(|d| d.score)
            .map(i64::from)
            .sum();
        let checked: usize = entry_details.iter().map(|d| d.total_rules).sum();
        let triggered: usize = entry_details.iter().map(|d| d.triggered_count).sum();

        Self {
            mode,
            total_entries: results.len(),
            evaluated_entries: evaluated,
            failed_entries: results.len() - evaluated,
            total_score,
            total_rules_checked: checked,
            total_rules_triggered: triggered,
            average_score: round2(total_score as f64 / evaluated.max(1) as f64),
            average_triggered_percent: round2(triggered as f64 / checked.max(1) as f64 * 100.0),
            started_at,
            finished_at: Utc::now(),
            entry_details,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Everything a batch produced.
#[derive(Debug)]
pub struct BatchOutput {
    pub results: Vec<CaseResult>,
    pub summary: BatchSummary,
}

impl BatchOutput {
    /// Write one report per evaluated case, in input order.
    pub fn write_jsonl<W: Write>(&self, mut writer: W) -> std::io::Result<()> {
        for outcome in self.results.iter().filter_map(|r| r.outcome.as_ref().ok()) {
            serde_json::to_writer(&mut writer, outcome)?;
            writer.write_all(b"\n")?;
        }
        writer.flush()
    }
}

/// Runs many cases through one engine.
pub struct BatchRunner {
    engine: Arc<Engine>,
    mode: EvaluationMode,
    concurrency: usize,
}

impl BatchRunner {
    pub fn new(engine: Arc<Engine>, mode: EvaluationMode) -> Self {
        Self {
            engine,
            mode,
            concurrency: 5,
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn run(&self, cases: Vec<Result<EvaluationCase, LineError>>) -> BatchOutput {
        let started_at = Utc::now();
        let total = cases.len();
        tracing::info!(mode = %self.mode, cases = total, concurrency = self.concurrency, "Batch started");

        let mut results: Vec<CaseResult> = stream::iter(cases.into_iter().enumerate())
            .map(|(index, case)| self.run_case(index, case))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;
        results.sort_by_key(|r| r.index);

        let summary = BatchSummary::from_results(self.mode, &results, started_at);
        tracing::info!(
            evaluated = summary.evaluated_entries,
            failed = summary.failed_entries,
            total_score = summary.total_score,
            "Batch finished"
        );

        BatchOutput { results, summary }
    }

    async fn run_case(&self, index: usize, case: Result<EvaluationCase, LineError>) -> CaseResult {
        let case = match case {
            Ok(case) => case,
            Err(err) => {
                tracing::warn!(index, error = %err, "Skipping malformed case");
                return CaseResult {
                    index,
                    key: None,
                    outcome: Err(err.to_string()),
                };
            }
        };

        let outcome = match self.mode {
            EvaluationMode::Interactive => self
                .engine
                .evaluate_interactive(&case)
                .await
                .map(CaseOutcome::Interactive),
            EvaluationMode::Golden => self
                .engine
                .evaluate_golden(&case)
                .await
                .map(CaseOutcome::Golden),
        };

        if let Err(err) = &outcome {
            tracing::warn!(index, key = case.key.as_deref().unwrap_or("-"), error = %err, "Case failed");
        }

        CaseResult {
            index,
            key: case.key,
            outcome: outcome.map_err(|e| e.to_string()),
        }
    }
}
