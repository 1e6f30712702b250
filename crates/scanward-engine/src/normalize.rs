//! Normalization of raw engine output.
//!
//! Engines report in one of two shapes: structured JSON-lines records, or a
//! looser collection of text lines in the `<path>: <name> FOUND` style used
//! by clamscan. Both are folded into a single [`ScanOutcome`] here so the
//! layers above only ever see typed outcomes.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use scanward_core::{ScanOutcome, ScanTask, Verdict};

/// One structured record as emitted by engines with machine-readable output.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineRecord {
    /// File the record refers to; records without a path apply to the task.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Engine verdict, e.g. `clean`, `infected`, `found`, `warning`.
    pub verdict: String,
    /// Threat or signature name.
    #[serde(default, alias = "signature", alias = "name")]
    pub threat: Option<String>,
    /// Free-form message, used for errors and warnings.
    #[serde(default)]
    pub message: Option<String>,
}

/// Engine output before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawReport {
    /// Structured records.
    Structured(Vec<EngineRecord>),
    /// Unstructured output lines.
    Loose(Vec<String>),
}

impl RawReport {
    /// Classify engine stdout. Output whose every non-empty line parses as a
    /// record is structured; anything else is loose.
    pub fn parse(output: &str) -> Self {
        let lines: Vec<&str> = output
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .collect();

        if !lines.is_empty() {
            let records: Result<Vec<EngineRecord>, _> = lines
                .iter()
                .map(|line| serde_json::from_str::<EngineRecord>(line))
                .collect();
            if let Ok(records) = records {
                return Self::Structured(records);
            }
        }

        Self::Loose(lines.into_iter().map(str::to_string).collect())
    }

    /// Whether the report carries no data at all.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Structured(records) => records.is_empty(),
            Self::Loose(lines) => lines.is_empty(),
        }
    }

    /// Fold the report into one outcome for `task`.
    ///
    /// Returns `None` when nothing in the report speaks about the task, in
    /// which case the caller falls back to other signals such as the exit
    /// status. When several findings apply, the most severe one wins.
    pub fn into_outcome(self, task: &ScanTask, duration: Duration) -> Option<ScanOutcome> {
        let findings = match self {
            Self::Structured(records) => records
                .into_iter()
                .filter(|r| r.path.as_ref().is_none_or(|p| p == &task.path))
                .filter_map(Finding::from_record)
                .collect::<Vec<_>>(),
            Self::Loose(lines) => lines
                .iter()
                .filter_map(|line| Finding::from_line(line))
                .collect(),
        };

        let finding = findings.into_iter().max_by_key(|f| severity(f.verdict))?;
        Some(finding.into_outcome(task, duration))
    }
}

/// A verdict extracted from one record or line.
#[derive(Debug)]
struct Finding {
    verdict: Verdict,
    label: Option<String>,
}

impl Finding {
    fn from_record(record: EngineRecord) -> Option<Self> {
        let verdict = parse_verdict(&record.verdict)?;
        let label = match verdict {
            Verdict::Error => record.message.or(record.threat),
            _ => record.threat.or(record.message),
        };
        Some(Self { verdict, label })
    }

    fn from_line(line: &str) -> Option<Self> {
        if let Some(rest) = line.strip_suffix(" FOUND") {
            let name = rest.rsplit_once(": ").map_or(rest, |(_, name)| name);
            return Some(Self {
                verdict: Verdict::Infected,
                label: Some(name.trim().to_string()),
            });
        }
        if let Some(rest) = line.strip_suffix(" ERROR") {
            let reason = rest.rsplit_once(": ").map_or(rest, |(_, reason)| reason);
            return Some(Self {
                verdict: Verdict::Error,
                label: Some(reason.trim().to_string()),
            });
        }
        if let Some(rest) = line.strip_prefix("Warning:") {
            return Some(Self {
                verdict: Verdict::Suspicious,
                label: Some(rest.trim().to_string()),
            });
        }
        if line.ends_with(": OK") || line.ends_with(": Empty file") {
            return Some(Self {
                verdict: Verdict::Clean,
                label: None,
            });
        }
        None
    }

    fn into_outcome(self, task: &ScanTask, duration: Duration) -> ScanOutcome {
        match self.verdict {
            Verdict::Infected => ScanOutcome::infected(
                task,
                self.label.unwrap_or_else(|| "Unknown".to_string()),
                duration,
            ),
            Verdict::Suspicious => ScanOutcome::suspicious(
                task,
                self.label.unwrap_or_else(|| "Unknown".to_string()),
                duration,
            ),
            Verdict::Error => ScanOutcome::error(
                task,
                self.label.unwrap_or_else(|| "engine reported an error".to_string()),
                duration,
            ),
            Verdict::Skipped => {
                ScanOutcome::skipped(task, self.label.unwrap_or_else(|| "skipped by engine".into()))
            }
            Verdict::Clean => ScanOutcome::clean(task, duration),
        }
    }
}

/// Map engine-specific verdict words onto [`Verdict`].
fn parse_verdict(word: &str) -> Option<Verdict> {
    match word.trim().to_ascii_lowercase().as_str() {
        "clean" | "ok" | "pass" | "passed" => Some(Verdict::Clean),
        "infected" | "found" | "malware" | "virus" | "detected" => Some(Verdict::Infected),
        "suspicious" | "warning" | "heuristic" | "pua" => Some(Verdict::Suspicious),
        "error" | "failed" => Some(Verdict::Error),
        "skipped" | "excluded" => Some(Verdict::Skipped),
        _ => None,
    }
}

fn severity(verdict: Verdict) -> u8 {
    match verdict {
        Verdict::Infected => 4,
        Verdict::Suspicious => 3,
        Verdict::Error => 2,
        Verdict::Clean => 1,
        Verdict::Skipped => 0,
    }
}
