use std::path::{Path, PathBuf};

use bizscan_core::{NormalizedPage, RunContext};
use bizscan_registry::RegistryLookup;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::extract::{extract_identifier, extract_status};
use crate::recognizer::OcrBackend;
use crate::report::{BatchResult, PageOutcome, PageRecord};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Runs recognition, extraction and registry lookup over normalized pages.
///
/// A page that fails at any stage is recorded with the reason and the batch
/// moves on; `run_batch` itself never fails.
pub struct BatchRunner<R: OcrBackend, L: RegistryLookup> {
    recognizer: R,
    registry: L,
    write_page_text: bool,
}

impl<R: OcrBackend, L: RegistryLookup> BatchRunner<R, L> {
    pub fn new(recognizer: R, registry: L) -> Self {
        Self { recognizer, registry, write_page_text: false }
    }

    /// Also write each page's recognized text next to the report.
    pub fn with_page_text(mut self, enabled: bool) -> Self {
        self.write_page_text = enabled;
        self
    }

    pub fn run_batch(&self, pages: &[NormalizedPage], ctx: &RunContext) -> BatchResult {
        let _run = ctx.span.enter();
        info!(pages = pages.len(), "Starting batch");

        let mut result = BatchResult::default();
        for page in pages {
            let record = self.process_page(page);
            if let Some(note) = record.outcome.note() {
                debug!(page = %page.file_name(), note = %note, "Page finished with note");
            }
            result.push(record);
        }

        info!(pages = result.records.len(), resolved = result.resolved(), "Batch complete");
        result
    }

    fn process_page(&self, page: &NormalizedPage) -> PageRecord {
        let name = page.file_name();

        let text = match std::fs::read(&page.path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| self.recognizer.recognize(&bytes).map_err(|e| e.to_string()))
        {
            Ok(text) => text,
            Err(reason) => {
                warn!(page = %name, error = %reason, "Recognition failed");
                return PageRecord {
                    page: page.clone(),
                    text: None,
                    outcome: PageOutcome::RecognitionFailed { reason },
                };
            }
        };

        let outcome = match extract_identifier(&text) {
            None => {
                warn!(page = %name, "No business number in recognized text");
                PageOutcome::NoIdentifier
            }
            Some(identifier) => match self.registry.lookup(&identifier) {
                Err(e) => {
                    warn!(page = %name, identifier = %identifier, error = %e, "Registry lookup failed");
                    PageOutcome::LookupFailed { identifier, reason: e.to_string() }
                }
                Ok(body) => {
                    let status = extract_status(&body);
                    if status.is_unparsable() {
                        warn!(page = %name, identifier = %identifier, "Unparsable registry response");
                    } else {
                        info!(
                            page = %name,
                            identifier = %identifier,
                            status = status.status.as_deref().unwrap_or_default(),
                            "Registry status resolved"
                        );
                    }
                    PageOutcome::Resolved { identifier, status }
                }
            },
        };

        PageRecord { page: page.clone(), text: Some(text), outcome }
    }

    /// Write the aggregate report, and per-page transcripts if enabled.
    ///
    /// Nothing is written for an empty batch; the report path is returned otherwise.
    pub fn write_report(
        &self,
        result: &BatchResult,
        output_dir: &Path,
        ctx: &RunContext,
    ) -> Result<Option<PathBuf>, PipelineError> {
        let _run = ctx.span.enter();
        if result.is_empty() {
            info!("No pages processed, report not written");
            return Ok(None);
        }

        if self.write_page_text {
            for record in &result.records {
                let Some(text) = &record.text else { continue };
                let path = output_dir.join(format!("{}_result.txt", record.page.file_name()));
                write_file(&path, text)?;
                debug!(path = %path.display(), "Page text written");
            }
        }

        let path = output_dir.join(ctx.report_file_name());
        write_file(&path, &result.report)?;
        info!(path = %path.display(), records = result.records.len(), "Report written");
        Ok(Some(path))
    }
}

fn write_file(path: &Path, contents: &str) -> Result<(), PipelineError> {
    std::fs::write(path, contents).map_err(|source| PipelineError::Write {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognizer::{MockRecognizer, OcrError};
    use bizscan_registry::MockRegistry;
    use chrono::TimeZone;
    use std::collections::HashMap;

    const ACTIVE: &str = "<map><smpcBmanTrtCntn>부가가치세 일반과세자 입니다.</smpcBmanTrtCntn>\
        <trtCntn>정상 영업중</trtCntn></map>";

    /// Answers per image content; bytes not in the script fail recognition.
    struct ScriptedRecognizer {
        script: HashMap<Vec<u8>, String>,
    }

    impl ScriptedRecognizer {
        fn new(entries: &[(&str, &str)]) -> Self {
            Self {
                script: entries.iter().map(|(k, v)| (k.as_bytes().to_vec(), v.to_string())).collect(),
            }
        }
    }

    impl OcrBackend for ScriptedRecognizer {
        fn recognize(&self, image_bytes: &[u8]) -> Result<String, OcrError> {
            self.script
                .get(image_bytes)
                .cloned()
                .ok_or_else(|| OcrError::Engine("engine crashed".into()))
        }
    }

    fn ctx() -> RunContext {
        RunContext::at(chrono::Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap())
    }

    fn write_pages(dir: &Path, pages: &[(&str, &str)]) -> Vec<NormalizedPage> {
        pages
            .iter()
            .map(|(name, bytes)| {
                let path = dir.join(name);
                std::fs::write(&path, bytes).unwrap();
                NormalizedPage { path, source: None, page_index: None }
            })
            .collect()
    }

    #[test]
    fn failing_page_does_not_stop_batch() {
        let dir = tempfile::tempdir().unwrap();
        let pages = write_pages(dir.path(), &[("a.jpg", "one"), ("b.jpg", "two"), ("c.jpg", "three")]);
        let runner = BatchRunner::new(
            ScriptedRecognizer::new(&[("one", "번호 111-11-11111"), ("three", "번호 333-33-33333")]),
            MockRegistry::new()
                .with_body("111-11-11111", ACTIVE)
                .with_body("333-33-33333", ACTIVE),
        );

        let result = runner.run_batch(&pages, &ctx());

        assert_eq!(result.records.len(), 3);
        assert!(result.records[0].outcome.is_resolved());
        assert!(matches!(
            &result.records[1].outcome,
            PageOutcome::RecognitionFailed { reason } if reason.contains("engine crashed")
        ));
        assert!(result.records[2].outcome.is_resolved());
        assert_eq!(result.resolved(), 2);
    }

    #[test]
    fn unreadable_page_is_recognition_failure() {
        let runner = BatchRunner::new(MockRecognizer::new("123-45-67890"), MockRegistry::new());
        let page = NormalizedPage {
            path: PathBuf::from("/nonexistent/page.jpg"),
            source: None,
            page_index: None,
        };
        let result = runner.run_batch(&[page], &ctx());
        assert!(matches!(result.records[0].outcome, PageOutcome::RecognitionFailed { .. }));
    }

    #[test]
    fn stages_are_distinguished() {
        let dir = tempfile::tempdir().unwrap();
        let pages = write_pages(
            dir.path(),
            &[("none.png", "n"), ("down.png", "d"), ("junk.png", "j"), ("ok.png", "o")],
        );
        let runner = BatchRunner::new(
            ScriptedRecognizer::new(&[
                ("n", "no number here"),
                ("d", "111-11-11111"),
                ("j", "222-22-22222"),
                ("o", "333-33-33333"),
            ]),
            MockRegistry::new()
                .with_status("111-11-11111", 500)
                .with_body("222-22-22222", "<html>maintenance</html>")
                .with_body("333-33-33333", ACTIVE),
        );

        let result = runner.run_batch(&pages, &ctx());
        let notes: Vec<Option<String>> = result.records.iter().map(|r| r.outcome.note()).collect();

        assert_eq!(notes[0].as_deref(), Some("no identifier found"));
        assert!(notes[1].as_deref().unwrap().starts_with("lookup failed: "));
        assert_eq!(notes[2].as_deref(), Some("unparsable registry response"));
        assert_eq!(notes[3], None);
        assert!(result.report.contains(
            "Img File: ok.png\nBusiness Number: 333-33-33333\nstatus: 부가가치세 일반과세자 입니다.\ndesc: 정상 영업중\n\n"
        ));
    }

    #[test]
    fn registry_is_only_called_with_identifiers() {
        let dir = tempfile::tempdir().unwrap();
        let pages = write_pages(dir.path(), &[("a.png", "a"), ("b.png", "b")]);
        let registry = MockRegistry::new().with_body("123-45-67890", ACTIVE);
        let runner = BatchRunner::new(
            ScriptedRecognizer::new(&[("a", "nothing"), ("b", "no 123-45-67890 and 987-65-43210")]),
            registry,
        );

        runner.run_batch(&pages, &ctx());
        assert_eq!(runner.registry.calls(), vec!["123-45-67890"]);
    }

    #[test]
    fn empty_batch_writes_nothing() {
        let out = tempfile::tempdir().unwrap();
        let runner = BatchRunner::new(MockRecognizer::new(""), MockRegistry::new()).with_page_text(true);

        let result = runner.run_batch(&[], &ctx());
        let written = runner.write_report(&result, out.path(), &ctx()).unwrap();

        assert!(written.is_none());
        assert_eq!(std::fs::read_dir(out.path()).unwrap().count(), 0);
    }

    #[test]
    fn report_is_named_by_run_id() {
        let pages_dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let pages = write_pages(pages_dir.path(), &[("a.jpg", "a"), ("b.jpg", "b")]);
        let runner = BatchRunner::new(
            MockRecognizer::new("등록번호 123-45-67890"),
            MockRegistry::new().with_body("123-45-67890", ACTIVE),
        );
        let ctx = ctx();

        let result = runner.run_batch(&pages, &ctx);
        let path = runner.write_report(&result, out.path(), &ctx).unwrap().unwrap();

        assert_eq!(path.file_name().unwrap().to_str().unwrap(), "total_result_1709283600.txt");
        assert_eq!(std::fs::read_to_string(&path).unwrap(), result.report);
        assert!(!out.path().join("a.jpg_result.txt").exists());
    }

    #[test]
    fn page_text_written_when_enabled() {
        let pages_dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let pages = write_pages(pages_dir.path(), &[("a.jpg", "a"), ("b.jpg", "b")]);
        let runner = BatchRunner::new(
            ScriptedRecognizer::new(&[("a", "first page text")]),
            MockRegistry::new(),
        )
        .with_page_text(true);

        let result = runner.run_batch(&pages, &ctx());
        runner.write_report(&result, out.path(), &ctx()).unwrap();

        assert_eq!(
            std::fs::read_to_string(out.path().join("a.jpg_result.txt")).unwrap(),
            "first page text"
        );
        // Recognition failed for b, so there is no transcript for it.
        assert!(!out.path().join("b.jpg_result.txt").exists());
    }
}
