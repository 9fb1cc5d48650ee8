use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use bizscan_core::config::OcrConfig;
use bizscan_core::{AppConfig, Identifier, NormalizedPage, OcrBackendKind, RunContext};
use bizscan_import::{collect_pages, ensure_dirs, NormalizeSummary, Normalizer};
use bizscan_ocr::{extract_status, BatchRunner, CloudVisionRecognizer, MockRecognizer, OcrBackend};
use bizscan_pdf::PdfiumRasterizer;
use bizscan_registry::{HometaxClient, RegistryLookup};
use tracing::info;

// ── Adapters ──────────────────────────────────────────────────────────────────

fn recognizer(config: &OcrConfig) -> Result<Box<dyn OcrBackend>> {
    match config.backend {
        OcrBackendKind::Vision => {
            let key = config
                .api_key
                .clone()
                .context("ocr.api_key or BIZSCAN_VISION_API_KEY must be set for the vision backend")?;
            let vision = CloudVisionRecognizer::new(
                config.endpoint.clone(),
                key,
                Duration::from_secs(config.timeout_secs),
            )?;
            Ok(Box::new(vision))
        }
        #[cfg(feature = "tesseract")]
        OcrBackendKind::Tesseract => Ok(Box::new(bizscan_ocr::TesseractRecognizer::new(
            config.tesseract_data_path.clone(),
            &config.tesseract_lang,
        ))),
        #[cfg(not(feature = "tesseract"))]
        OcrBackendKind::Tesseract => Err(bizscan_ocr::OcrError::NotAvailable.into()),
        OcrBackendKind::Mock => Ok(Box::new(MockRecognizer::new(""))),
    }
}

fn registry(config: &AppConfig) -> Result<Box<dyn RegistryLookup>> {
    Ok(Box::new(HometaxClient::from_config(&config.registry)?))
}

fn normalizer(config: &AppConfig) -> Normalizer<PdfiumRasterizer> {
    Normalizer::new(PdfiumRasterizer::new(config.pdf.dpi, config.pdf.library_path.clone()))
}

// ── Subcommands ───────────────────────────────────────────────────────────────

pub fn run(mut config: AppConfig, input: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    if let Some(input) = input {
        config.paths.input_dir = input;
    }
    if let Some(output) = output {
        config.paths.output_dir = output;
    }
    let normalized = config.paths.normalized_dir();
    ensure_dirs(&[&config.paths.input_dir, &config.paths.output_dir, &normalized])
        .context("creating working directories")?;

    let ctx = RunContext::start();
    let summary = normalize_into(&config, &config.paths.input_dir, &normalized, &ctx)?;
    print_summary(&summary);

    let pages = collect_pages(&normalized)
        .with_context(|| format!("listing {}", normalized.display()))?;
    run_pages(&config, &pages, &config.paths.output_dir, &ctx)
}

pub fn normalize(mut config: AppConfig, input: Option<PathBuf>, target: Option<PathBuf>) -> Result<()> {
    if let Some(input) = input {
        config.paths.input_dir = input;
    }
    let target = target.unwrap_or_else(|| config.paths.normalized_dir());
    ensure_dirs(&[&config.paths.input_dir, &target]).context("creating working directories")?;

    let ctx = RunContext::start();
    let summary = normalize_into(&config, &config.paths.input_dir, &target, &ctx)?;
    print_summary(&summary);
    Ok(())
}

pub fn batch(mut config: AppConfig, pages: Option<PathBuf>, output: Option<PathBuf>) -> Result<()> {
    if let Some(output) = output {
        config.paths.output_dir = output;
    }
    let pages_dir = pages.unwrap_or_else(|| config.paths.normalized_dir());
    if !pages_dir.is_dir() {
        bail!("page directory not found: {}", pages_dir.display());
    }
    ensure_dirs(&[&config.paths.output_dir]).context("creating output directory")?;

    let ctx = RunContext::start();
    let pages = collect_pages(&pages_dir)
        .with_context(|| format!("listing {}", pages_dir.display()))?;
    run_pages(&config, &pages, &config.paths.output_dir, &ctx)
}

pub fn lookup(config: &AppConfig, identifier: &str) -> Result<()> {
    let identifier = Identifier::parse(identifier)?;
    let body = registry(config)?
        .lookup(&identifier)
        .with_context(|| format!("looking up {identifier}"))?;
    let record = extract_status(&body);
    if record.is_unparsable() {
        tracing::warn!(identifier = %identifier, "Unparsable registry response");
    }
    println!("Business Number: {identifier}");
    println!("status: {}", record.status.as_deref().unwrap_or("NA"));
    println!("desc: {}", record.description.as_deref().unwrap_or("NA"));
    Ok(())
}

pub fn fit(image: &Path, max_width: u32, max_height: u32, format: &str, out: Option<&Path>) -> Result<()> {
    let (width, height) = bizscan_ocr::optimal_size(image, max_width, max_height)
        .with_context(|| format!("sizing {}", image.display()))?;
    println!("{width}x{height}");
    if let Some(out) = out {
        bizscan_ocr::resize(image, width, height, format, out)
            .with_context(|| format!("resizing {} to {}", image.display(), out.display()))?;
        info!(out = %out.display(), width, height, "Resized");
    }
    Ok(())
}

// ── Shared steps ──────────────────────────────────────────────────────────────

fn normalize_into(config: &AppConfig, source: &Path, target: &Path, ctx: &RunContext) -> Result<NormalizeSummary> {
    normalizer(config)
        .normalize(source, target, ctx)
        .with_context(|| format!("normalizing {}", source.display()))
}

fn run_pages(config: &AppConfig, pages: &[NormalizedPage], output_dir: &Path, ctx: &RunContext) -> Result<()> {
    let runner = BatchRunner::new(recognizer(&config.ocr)?, registry(config)?)
        .with_page_text(config.report.write_page_text);
    let result = runner.run_batch(pages, ctx);

    match runner.write_report(&result, output_dir, ctx)? {
        Some(path) => println!(
            "{} page(s), {} resolved; report written to {}",
            result.records.len(),
            result.resolved(),
            path.display()
        ),
        None => println!("No pages to process; no report written"),
    }
    Ok(())
}

fn print_summary(summary: &NormalizeSummary) {
    println!(
        "Normalized {} page(s); skipped {} already normalized and {} directories",
        summary.written.len(),
        summary.skipped_duplicates.len(),
        summary.skipped_directories.len(),
    );
}
