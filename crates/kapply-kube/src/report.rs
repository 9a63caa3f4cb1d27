//! Per-document outcomes and batch reports

use kapply_core::ResourceIdentity;
use serde::Serialize;
use std::fmt;

/// What happened to one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum Outcome {
    Created,
    Updated,
    Unchanged,
    Deleted,
    /// Delete of a resource that did not exist
    AlreadyAbsent,
    Failed(String),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Outcome::Failed(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Created => "created",
            Outcome::Updated => "configured",
            Outcome::Unchanged => "unchanged",
            Outcome::Deleted => "deleted",
            Outcome::AlreadyAbsent => "not found",
            Outcome::Failed(_) => "failed",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Failed(reason) => write!(f, "failed: {}", reason),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Result of reconciling a single document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileResult {
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
    #[serde(flatten)]
    pub outcome: Outcome,
}

impl ReconcileResult {
    pub fn new(identity: &ResourceIdentity, outcome: Outcome) -> Self {
        Self {
            kind: identity.kind.clone(),
            namespace: identity.namespace.clone(),
            name: identity.name.clone(),
            outcome,
        }
    }

    /// Display name used in logs and CLI output
    pub fn display_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}/{}/{}", self.kind, ns, self.name),
            None => format!("{}/{}", self.kind, self.name),
        }
    }
}

/// A manifest source that could not be loaded or decoded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFailure {
    pub source: String,
    pub error: String,
}

/// Results of one apply/delete call, in processing order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub results: Vec<ReconcileResult>,
    pub source_failures: Vec<SourceFailure>,
}

impl ReconcileReport {
    /// Check if every document and every source succeeded
    pub fn is_success(&self) -> bool {
        self.source_failures.is_empty() && self.results.iter().all(|r| r.outcome.is_success())
    }

    /// Number of results with the given outcome kind
    pub fn count(&self, outcome: &Outcome) -> usize {
        self.results
            .iter()
            .filter(|r| std::mem::discriminant(&r.outcome) == std::mem::discriminant(outcome))
            .count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &ReconcileResult> {
        self.results.iter().filter(|r| !r.outcome.is_success())
    }

    pub fn outcomes(&self) -> Vec<&Outcome> {
        self.results.iter().map(|r| &r.outcome).collect()
    }

    pub fn extend(&mut self, other: ReconcileReport) {
        self.results.extend(other.results);
        self.source_failures.extend(other.source_failures);
    }

    /// Format as human-readable summary
    pub fn summary(&self) -> String {
        let failed = self.count(&Outcome::Failed(String::new()));
        let counts = [
            (self.count(&Outcome::Created), "created"),
            (self.count(&Outcome::Updated), "configured"),
            (self.count(&Outcome::Unchanged), "unchanged"),
            (self.count(&Outcome::Deleted), "deleted"),
            (self.count(&Outcome::AlreadyAbsent), "not found"),
            (failed, "failed"),
            (self.source_failures.len(), "sources failed"),
        ];

        let parts: Vec<String> = counts
            .iter()
            .filter(|(n, _)| *n > 0)
            .map(|(n, label)| format!("{} {}", n, label))
            .collect();

        if parts.is_empty() {
            "No resources processed".to_string()
        } else {
            parts.join(", ")
        }
    }
}
