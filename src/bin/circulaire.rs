//! CLI binary for circulaire-extract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, picks the OCR engine, and prints or writes results.

use anyhow::{bail, Context, Result};
use circulaire_extract::{
    process_range_stream, write_outputs, BatchHalt, BatchProgressCallback, CirculairePipeline,
    DocumentStatus, Extractor, HttpFetcher, InMemoryCatalog, InMemoryCursor, JsonFileCursor,
    MatchResult, MatchStatus, PdfiumBackend, PipelineConfig, ProcessedCirculaire,
    ProcessingCursor, RangeItem, TesseractRecognizer, TextRecognizer, VisionRecognizer,
};
use clap::Parser;
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One bar tick per circular in the range, one log line per outcome.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} circulars  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Processing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_range_start(&self, year: u32, start: u32, end: u32) {
        self.bar.set_length(u64::from(end.saturating_sub(start)) + 1);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Circulars {start:02}..{end:02} of {year:02}"))
        ));
    }

    fn on_document_skipped(&self, year: u32, index: u32) {
        self.bar
            .println(format!("  {} {index:02}/{year:02}  {}", dim("·"), dim("already processed")));
        self.bar.inc(1);
    }

    fn on_document_start(&self, year: u32, index: u32) {
        self.bar.set_message(format!("{index:02}/{year:02}"));
    }

    fn on_document_complete(&self, year: u32, index: u32, records: usize) {
        self.bar.println(format!(
            "  {} {index:02}/{year:02}  {}",
            green("✓"),
            dim(&format!("{records:>4} records"))
        ));
        self.bar.inc(1);
    }

    fn on_document_failed(&self, year: u32, index: u32, error: &str) {
        let first_line = error.lines().next().unwrap_or(error);
        let msg: String = if first_line.chars().count() > 80 {
            first_line.chars().take(79).chain(['\u{2026}']).collect()
        } else {
            first_line.to_string()
        };
        self.bar
            .println(format!("  {} {index:02}/{year:02}  {}", red("✗"), red(&msg)));
        self.bar.inc(1);
    }

    fn on_range_halted(&self, halt: &BatchHalt) {
        self.bar.println(format!(
            "{} halted at {:02} after {} consecutive failures",
            cyan("⚠"),
            halt.index,
            halt.consecutive_failures
        ));
    }

    fn on_range_complete(&self, successes: usize, failures: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} circulars processed, {} failed",
            if failures == 0 { green("✔") } else { cyan("⚠") },
            bold(&successes.to_string()),
            failures
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Parse a local circular and print a summary
  circulaire circ0425.pdf

  # Parse and write circ0425.json + circ0425_simplified.json
  circulaire circ0425.pdf -o out/

  # Fetch circular 4 of 2025 from the publisher
  circulaire --year 25 --index 4 -o out/

  # Process a whole year, skipping what the cursor already saw
  circulaire --year 25 --range 1 60 --cursor state/cursor.json -o out/

  # Same range over several years
  circulaire --years 24 25 --range 1 60 -o out/

  # Match records against a catalog export
  circulaire circ0425.pdf --catalog products.json

  # Scanned circular, vision LLM instead of tesseract
  circulaire scan.pdf --ocr-engine vision --provider openai

CATALOG FORMAT:
  A JSON array of {"id", "name", "laboratory"?, "code"?} objects.

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Directory containing libpdfium
  EDGEQUAKE_LLM_PROVIDER  Vision provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Vision model ID
  OPENAI_API_KEY          OpenAI API key (vision engine)
  RUST_LOG                Log filter, overrides -v/-q
"#;

/// Extract medication price records from pharmaceutical price circulars.
#[derive(Parser, Debug)]
#[command(
    name = "circulaire",
    version,
    about = "Extract medication records from pharmaceutical price circulars",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file path or HTTP/HTTPS URL.
    #[arg(conflicts_with_all = ["file", "url", "index", "range"])]
    input: Option<String>,

    /// Local PDF file.
    #[arg(long, conflicts_with_all = ["url", "index", "range"])]
    file: Option<PathBuf>,

    /// PDF URL.
    #[arg(long, conflicts_with_all = ["index", "range"])]
    url: Option<String>,

    /// Circular number to fetch from the publisher (needs --year).
    #[arg(long, requires = "year", conflicts_with = "range")]
    index: Option<u32>,

    /// Range of circular numbers to process (needs --year or --years).
    #[arg(long, num_args = 2, value_names = ["START", "END"])]
    range: Option<Vec<u32>>,

    /// Year of the circulars, two or four digits.
    #[arg(long, env = "CIRCULAIRE_YEAR")]
    year: Option<u32>,

    /// Run --range over several years in turn; failures are counted per year.
    #[arg(long, num_args = 1.., value_name = "YEAR", conflicts_with_all = ["year", "index"], requires = "range")]
    years: Option<Vec<u32>>,

    /// Match records against this JSON catalog.
    #[arg(long, env = "CIRCULAIRE_CATALOG")]
    catalog: Option<PathBuf>,

    /// Write JSON outputs into this directory.
    #[arg(short, long, env = "CIRCULAIRE_OUTPUT")]
    output: Option<PathBuf>,

    /// Print the processed document as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// OCR engine used when the text layer is insufficient.
    #[arg(long, value_enum, default_value = "tesseract", env = "CIRCULAIRE_OCR_ENGINE")]
    ocr_engine: OcrEngineArg,

    /// Vision provider (openai, anthropic, gemini, ollama).
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// Vision model ID.
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// OCR every document, ignoring the text layer.
    #[arg(long)]
    force_ocr: bool,

    /// Skip binarisation before OCR.
    #[arg(long)]
    no_preprocess: bool,

    /// Drop veterinary sections.
    #[arg(long)]
    skip_veterinary: bool,

    /// JSON cursor file recording the last processed index per year.
    #[arg(long, env = "CIRCULAIRE_CURSOR")]
    cursor: Option<PathBuf>,

    /// Rendering DPI for OCR (72–600).
    #[arg(long, default_value_t = 300, value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Per-page OCR timeout in seconds.
    #[arg(long, default_value_t = 60)]
    ocr_timeout: u64,

    /// OCR languages, tesseract syntax.
    #[arg(long, default_value = "ara+fra+eng")]
    languages: String,

    /// Consecutive failures that halt a range (0 = never).
    #[arg(long, default_value_t = 5)]
    max_failures: u32,

    /// Pause between fetches in milliseconds.
    #[arg(long, default_value_t = 1000)]
    delay_ms: u64,

    /// Minimum confidence to accept a catalog match.
    #[arg(long, default_value_t = 60.0)]
    threshold: f64,

    /// Publisher directory URL.
    #[arg(long, env = "CIRCULAIRE_BASE_URL")]
    base_url: Option<String>,

    /// HTTP download timeout in seconds.
    #[arg(long, default_value_t = 60)]
    download_timeout: u64,

    /// Largest accepted PDF, in MiB.
    #[arg(long, default_value_t = 20)]
    max_file_size: u64,

    /// Disable progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OcrEngineArg {
    Tesseract,
    Vision,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;
    let pipeline = build_pipeline(&cli, config.clone()).await?;
    let catalog = match &cli.catalog {
        Some(path) => Some(InMemoryCatalog::load(path)?),
        None => None,
    };

    if let Some(range) = &cli.range {
        let (start, end) = match range.as_slice() {
            [start, end] if start <= end => (*start, *end),
            _ => bail!("--range needs START <= END"),
        };
        let years: Vec<u32> = match (&cli.years, cli.year) {
            (Some(years), _) => years.iter().copied().map(two_digit_year).collect(),
            (None, Some(year)) => vec![two_digit_year(year)],
            (None, None) => bail!("--range needs --year or --years"),
        };
        for year in years {
            run_range(&cli, pipeline.clone(), &config, catalog.as_ref(), year, start, end).await?;
        }
        return Ok(());
    }

    let doc = if let Some(index) = cli.index {
        let year = two_digit_year(cli.year.context("--index needs --year")?);
        let fetcher = HttpFetcher::new(&config)?;
        pipeline.fetch_and_process(&fetcher, year, index).await?
    } else {
        let input = cli
            .input
            .clone()
            .or_else(|| cli.file.as_ref().map(|p| p.display().to_string()))
            .or_else(|| cli.url.clone())
            .context("give a PDF path or URL, --index, or --range")?;
        pipeline
            .process_input(&input)
            .await
            .with_context(|| format!("processing {input}"))?
    };

    emit(&cli, &pipeline, catalog.as_ref(), &doc).await
}

fn two_digit_year(year: u32) -> u32 {
    year % 100
}

fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .dpi(cli.dpi)
        .ocr_page_timeout_secs(cli.ocr_timeout)
        .ocr_languages(cli.languages.clone())
        .force_ocr(cli.force_ocr)
        .preprocess_for_ocr(!cli.no_preprocess && cli.ocr_engine == OcrEngineArg::Tesseract)
        .skip_veterinary(cli.skip_veterinary)
        .match_threshold(cli.threshold)
        .max_consecutive_failures(cli.max_failures)
        .request_delay_ms(cli.delay_ms)
        .download_timeout_secs(cli.download_timeout)
        .max_file_size_bytes(cli.max_file_size * 1024 * 1024);
    if let Some(url) = &cli.base_url {
        builder = builder.base_url(url.clone());
    }
    Ok(builder.build()?)
}

async fn build_pipeline(cli: &Cli, config: PipelineConfig) -> Result<CirculairePipeline> {
    let backend = Arc::new(PdfiumBackend::new());
    backend.check().await?;

    let recognizer: Arc<dyn TextRecognizer> = match cli.ocr_engine {
        OcrEngineArg::Tesseract => {
            let tesseract = TesseractRecognizer::new();
            // Only needed when a document falls back to OCR.
            if let Err(e) = tesseract.check().await {
                warn!("{}", e);
            }
            Arc::new(tesseract)
        }
        OcrEngineArg::Vision => Arc::new(match &cli.provider {
            Some(name) => VisionRecognizer::from_provider(name, cli.model.as_deref())?,
            None => VisionRecognizer::from_env()?,
        }),
    };

    let pipeline =
        CirculairePipeline::new(Extractor::new(backend.clone(), backend, recognizer, config));
    Ok(pipeline)
}

async fn run_range(
    cli: &Cli,
    pipeline: CirculairePipeline,
    config: &PipelineConfig,
    catalog: Option<&InMemoryCatalog>,
    year: u32,
    start: u32,
    end: u32,
) -> Result<()> {
    let fetcher = Arc::new(HttpFetcher::new(config)?);
    let cursor: Arc<dyn ProcessingCursor> = match &cli.cursor {
        Some(path) => Arc::new(JsonFileCursor::open(path)?),
        None => Arc::new(InMemoryCursor::new()),
    };
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let pipeline = if show_progress {
        pipeline.with_progress(CliProgressCallback::new())
    } else {
        pipeline
    };

    let mut items = process_range_stream(pipeline.clone(), fetcher, cursor, year, start, end);
    let mut halted = None;
    while let Some(item) = items.next().await {
        match item? {
            RangeItem::Document(outcome) => {
                if let DocumentStatus::Processed(doc) = outcome.status {
                    emit(cli, &pipeline, catalog, &doc).await?;
                }
            }
            RangeItem::Halted(halt) => halted = Some(halt),
        }
    }
    if let Some(halt) = halted {
        eprintln!(
            "Stopped at circular {:02}/{:02} after {} consecutive failures ({} processed).",
            halt.index, year, halt.consecutive_failures, halt.successes
        );
    }
    Ok(())
}

/// Print, write and match one processed circular as the flags ask.
async fn emit(
    cli: &Cli,
    pipeline: &CirculairePipeline,
    catalog: Option<&InMemoryCatalog>,
    doc: &ProcessedCirculaire,
) -> Result<()> {
    if let Some(dir) = &cli.output {
        write_outputs(doc, dir).await?;
    }

    let matches = match catalog {
        Some(catalog) => Some(pipeline.match_records(&doc.parsed.medications, catalog)?),
        None => None,
    };
    if let (Some(matches), Some(dir)) = (&matches, &cli.output) {
        write_matches(dir, doc, matches)?;
    }

    if cli.json {
        println!("{}", serde_json::to_string_pretty(doc)?);
    } else if !cli.quiet {
        print_summary(doc);
    }
    if let Some(matches) = &matches {
        if !cli.quiet {
            print_match_stats(matches);
        }
    }
    Ok(())
}

fn write_matches(dir: &Path, doc: &ProcessedCirculaire, matches: &[MatchResult]) -> Result<()> {
    let path = dir.join(format!("{}_matches.json", doc.document.stem()));
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(matches)?)
        .with_context(|| format!("writing {}", tmp.display()))?;
    std::fs::rename(&tmp, &path).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn print_summary(doc: &ProcessedCirculaire) {
    let parsed = &doc.parsed;
    println!(
        "{}  {}  {}",
        bold(&parsed.filename),
        parsed.circulaire_number.as_deref().unwrap_or("?"),
        parsed.date.as_deref().unwrap_or("?")
    );
    println!(
        "  {} records, {} laboratories, {} pages{}",
        parsed.medications.len(),
        parsed.laboratories.len(),
        doc.extraction.page_count,
        if doc.extraction.ocr_used { " (OCR)" } else { "" }
    );
    for entry in &doc.simplified {
        println!(
            "  {:<40} {:<8} {:>4}",
            entry.laboratory,
            format!("{:?}", entry.record_type).to_lowercase(),
            entry.medications.len()
        );
    }
    for error in &doc.extraction.page_errors {
        println!("  {} {}", red("✗"), error);
    }
    let diag = &doc.extraction.diagnostics;
    if diag.header_not_found {
        println!("  {}", dim("header not found"));
    }
    println!(
        "  {}",
        dim(&format!(
            "{} of {} lines not recognized",
            diag.lines_not_recognized, diag.lines_seen
        ))
    );
}

fn print_match_stats(matches: &[MatchResult]) {
    let matched = matches
        .iter()
        .filter(|m| m.status == MatchStatus::Matched)
        .count();
    let total = matches.len();
    let rate = if total == 0 {
        0.0
    } else {
        matched as f64 * 100.0 / total as f64
    };
    println!(
        "  {} {matched}/{total} matched ({rate:.0}%)",
        if matched == total { green("✔") } else { cyan("◆") }
    );
    for m in matches.iter().filter(|m| m.status == MatchStatus::NotFound) {
        println!(
            "    {} {}  {}",
            red("✗"),
            m.record.name,
            dim(&format!("best {:.0}", m.confidence))
        );
    }
}
