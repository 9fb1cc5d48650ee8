use std::fmt::Write as _;

use bizscan_core::{Identifier, NormalizedPage, StatusRecord};

const MISSING: &str = "NA";

/// Where processing of one page ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageOutcome {
    RecognitionFailed { reason: String },
    NoIdentifier,
    LookupFailed { identifier: Identifier, reason: String },
    /// The registry answered. `status` may still be unparsable.
    Resolved { identifier: Identifier, status: StatusRecord },
}

impl PageOutcome {
    pub fn identifier(&self) -> Option<&Identifier> {
        match self {
            Self::LookupFailed { identifier, .. } | Self::Resolved { identifier, .. } => Some(identifier),
            Self::RecognitionFailed { .. } | Self::NoIdentifier => None,
        }
    }

    pub fn status(&self) -> Option<&StatusRecord> {
        match self {
            Self::Resolved { status, .. } => Some(status),
            _ => None,
        }
    }

    /// Reviewer-facing note; `None` for a clean resolution.
    pub fn note(&self) -> Option<String> {
        match self {
            Self::RecognitionFailed { reason } => Some(format!("recognition failed: {reason}")),
            Self::NoIdentifier => Some("no identifier found".into()),
            Self::LookupFailed { reason, .. } => Some(format!("lookup failed: {reason}")),
            Self::Resolved { status, .. } if status.is_unparsable() => {
                Some("unparsable registry response".into())
            }
            Self::Resolved { status, .. } if status.is_partial() => {
                Some("partial registry response".into())
            }
            Self::Resolved { .. } => None,
        }
    }

    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::Resolved { .. })
    }
}

#[derive(Debug, Clone)]
pub struct PageRecord {
    pub page: NormalizedPage,
    /// Recognized text, when recognition succeeded.
    pub text: Option<String>,
    pub outcome: PageOutcome,
}

impl PageRecord {
    /// The report block for this page, including its trailing blank line.
    pub fn render(&self) -> String {
        let status = self.outcome.status();
        let mut block = String::new();
        let _ = writeln!(block, "Img File: {}", self.page.file_name());
        let _ = writeln!(
            block,
            "Business Number: {}",
            self.outcome.identifier().map_or(MISSING, Identifier::as_str)
        );
        let _ = writeln!(
            block,
            "status: {}",
            status.and_then(|s| s.status.as_deref()).unwrap_or(MISSING)
        );
        let _ = writeln!(
            block,
            "desc: {}",
            status.and_then(|s| s.description.as_deref()).unwrap_or(MISSING)
        );
        if let Some(note) = self.outcome.note() {
            let _ = writeln!(block, "note: {note}");
        }
        block.push('\n');
        block
    }
}

/// Records of one batch in page order, with the report text built alongside.
#[derive(Debug, Default)]
pub struct BatchResult {
    pub records: Vec<PageRecord>,
    pub report: String,
}

impl BatchResult {
    pub fn push(&mut self, record: PageRecord) {
        self.report.push_str(&record.render());
        self.records.push(record);
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn resolved(&self) -> usize {
        self.records.iter().filter(|r| r.outcome.is_resolved()).count()
    }
}
