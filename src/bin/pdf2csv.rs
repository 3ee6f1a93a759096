//! CLI binary for edgequake-pdf2csv.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig`, runs every input and prints one CSV table.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2csv::{
    extract_many, inspect, write_csv_file, ExtractionConfig, ExtractionMode, ExtractionOutput,
    ExtractionProgressCallback, OcrBackend, PageSelection, ProgressCallback, Table, TableLayout,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per image. Images complete out of
/// order under concurrency, so start times are keyed by (page, image).
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<(usize, usize), Instant>>,
}

impl CliProgressCallback {
    /// Starts as a spinner; `on_extraction_start` switches to a bar once the
    /// image count of the current document is known.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_position(0);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("OCR");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, page_num: usize, image_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&(page_num, image_num)))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_extraction_start(&self, total_images: usize) {
        self.activate_bar(total_images);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Recognising {total_images} images…"))
        ));
    }

    fn on_image_start(&self, page_num: usize, image_num: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert((page_num, image_num), Instant::now());
        }
        self.bar.set_message(format!("page {page_num} image {image_num}"));
    }

    fn on_image_complete(&self, page_num: usize, image_num: usize, _total: usize, line_count: usize) {
        let secs = self.elapsed_secs(page_num, image_num);
        self.bar.println(format!(
            "  {} Page {:>3} image {:<3}  {:<10}  {}",
            green("✓"),
            page_num,
            image_num,
            dim(&format!("{line_count:>4} lines")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_image_error(&self, page_num: usize, image_num: usize, _total: usize, error: &str) {
        let secs = self.elapsed_secs(page_num, image_num);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3} image {:<3}  {}  {}",
            red("✗"),
            page_num,
            image_num,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_extraction_complete(&self, total_images: usize, success_count: usize) {
        let failed = total_images.saturating_sub(success_count);
        if failed == 0 {
            self.bar.println(format!(
                "{} {} images recognised",
                green("✔"),
                bold(&success_count.to_string())
            ));
        } else {
            self.bar.println(format!(
                "{} {}/{} images recognised  ({} failed)",
                if failed == total_images {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_images,
                red(&failed.to_string()),
            ));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One row of invoice fields per document (stdout)
  pdf2csv invoice.pdf

  # Many documents into one file
  pdf2csv scans/*.pdf -o invoices.csv

  # Every OCR line with its page and image number
  pdf2csv --layout lines invoice.pdf -o lines.csv

  # Embedded image dimensions and pixel layout
  pdf2csv --layout metadata invoice.pdf

  # Digitally generated PDFs: read the text layer, no OCR
  pdf2csv --mode text statement.pdf

  # German and English invoices, one line per OCR line
  pdf2csv --lang deu+eng --no-paragraph rechnung.pdf

  # OCR through a vision LLM instead of tesseract
  pdf2csv --ocr vision --provider openai --model gpt-4.1-mini invoice.pdf

  # Full structured output
  pdf2csv --json invoice.pdf > invoice.json

  # Inspect PDF metadata (no OCR)
  pdf2csv --inspect-only invoice.pdf

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  OPENAI_API_KEY          OpenAI API key (vision OCR)
  ANTHROPIC_API_KEY       Anthropic API key (vision OCR)
  EDGEQUAKE_LLM_PROVIDER  Provider override for vision OCR
  EDGEQUAKE_MODEL         Model override for vision OCR
  RUST_LOG                Log filter, e.g. edgequake_pdf2csv=debug

SETUP:
  1. Install tesseract:  apt install tesseract-ocr   (or brew install tesseract)
  2. Install pdfium:     place libpdfium next to pdf2csv or set PDFIUM_LIB_PATH
  3. Extract:            pdf2csv invoice.pdf -o invoice.csv
"#;

/// Extract invoice data from scanned PDFs into CSV.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2csv",
    version,
    about = "Extract invoice data from scanned PDFs into CSV",
    long_about = "Extract the images embedded in PDF documents (local files or URLs), OCR them \
with tesseract or a vision LLM, recover invoice fields from their printed labels and write the \
result as CSV.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF file paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Write CSV to this file instead of stdout.
    #[arg(short, long, env = "PDF2CSV_OUTPUT")]
    output: Option<PathBuf>,

    /// Table shape: one row per document, per text line, or per image.
    #[arg(long, env = "PDF2CSV_LAYOUT", value_enum, default_value = "invoice")]
    layout: LayoutArg,

    /// Text source: embedded images, text layer, or images with text fallback.
    #[arg(long, env = "PDF2CSV_MODE", value_enum, default_value = "images")]
    mode: ModeArg,

    /// OCR engine.
    #[arg(long, env = "PDF2CSV_OCR", value_enum, default_value = "tesseract")]
    ocr: OcrArg,

    /// OCR language(s) in tesseract notation, e.g. eng or deu+eng.
    #[arg(long, env = "PDF2CSV_LANG", default_value = "eng")]
    lang: String,

    /// Tesseract page segmentation mode (0–13).
    #[arg(long, env = "PDF2CSV_PSM", default_value_t = 3,
          value_parser = clap::value_parser!(u8).range(0..=13))]
    psm: u8,

    /// Path to the tesseract executable.
    #[arg(long, env = "PDF2CSV_TESSERACT_PATH", default_value = "tesseract")]
    tesseract_path: PathBuf,

    /// Keep every OCR line separate instead of merging blocks into paragraphs.
    #[arg(long, env = "PDF2CSV_NO_PARAGRAPH")]
    no_paragraph: bool,

    /// Page selection: all, 5, 3-15, or 1,3,5,7.
    #[arg(long, env = "PDF2CSV_PAGES", default_value = "all")]
    pages: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2CSV_PASSWORD")]
    password: Option<String>,

    /// Number of images recognised concurrently.
    #[arg(short, long, env = "PDF2CSV_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Skip embedded images smaller than this many pixels on either edge.
    #[arg(long, env = "PDF2CSV_MIN_IMAGE_EDGE", default_value_t = 16)]
    min_image_edge: u32,

    /// Vision LLM model ID (with --ocr vision).
    #[arg(long, env = "PDF2CSV_MODEL")]
    model: Option<String>,

    /// Vision LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "PDF2CSV_PROVIDER")]
    provider: Option<String>,

    /// Retries per image on OCR failure.
    #[arg(long, env = "PDF2CSV_MAX_RETRIES", default_value_t = 2)]
    max_retries: u32,

    /// Per-image OCR timeout in seconds.
    #[arg(long, env = "PDF2CSV_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2CSV_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Output structured JSON (one ExtractionOutput per document) instead of CSV.
    #[arg(long, env = "PDF2CSV_JSON")]
    json: bool,

    /// Print PDF metadata only, no extraction.
    #[arg(long)]
    inspect_only: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDF2CSV_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2CSV_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2CSV_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LayoutArg {
    Invoice,
    Lines,
    Metadata,
}

impl From<LayoutArg> for TableLayout {
    fn from(v: LayoutArg) -> Self {
        match v {
            LayoutArg::Invoice => TableLayout::Invoice,
            LayoutArg::Lines => TableLayout::Lines,
            LayoutArg::Metadata => TableLayout::Metadata,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    Images,
    Text,
    Auto,
}

impl From<ModeArg> for ExtractionMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::Images => ExtractionMode::Images,
            ModeArg::Text => ExtractionMode::Text,
            ModeArg::Auto => ExtractionMode::Auto,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OcrArg {
    Tesseract,
    Vision,
}

impl From<OcrArg> for OcrBackend {
    fn from(v: OcrArg) -> Self {
        match v {
            OcrArg::Tesseract => OcrBackend::Tesseract,
            OcrArg::Vision => OcrBackend::Vision,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO logs would tear through the progress bar, so the bar gets the
    // terminal to itself unless --verbose asks for debug output.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        return run_inspect(&cli).await;
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress = show_progress.then(CliProgressCallback::new_dynamic);
    let config = build_config(
        &cli,
        progress
            .clone()
            .map(|cb| cb as Arc<dyn ExtractionProgressCallback>),
    )?;

    // ── Run extraction ───────────────────────────────────────────────────
    let results = extract_many(&cli.inputs, &config).await;
    if let Some(ref cb) = progress {
        cb.finish();
    }

    let mut outputs: Vec<ExtractionOutput> = Vec::with_capacity(results.len());
    let mut first_err = None;
    for (input, result) in cli.inputs.iter().zip(results) {
        match result {
            Ok(output) => outputs.push(output),
            Err(e) => {
                if !cli.quiet {
                    eprintln!("{} {}: {}", red("✗"), bold(input), e);
                }
                if first_err.is_none() {
                    first_err = Some((input.clone(), e));
                }
            }
        }
    }

    if outputs.is_empty() {
        if let Some((input, e)) = first_err {
            return Err(e).with_context(|| format!("Extraction failed for '{input}'"));
        }
    }

    // ── Write output ─────────────────────────────────────────────────────
    let layout: TableLayout = cli.layout.into();
    let rendered = if cli.json {
        let mut json =
            serde_json::to_string_pretty(&outputs).context("Failed to serialise output")?;
        json.push('\n');
        json
    } else {
        Table::build(layout, &outputs).to_csv()
    };

    match cli.output {
        Some(ref path) => write_csv_file(path, &rendered)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => io::stdout()
            .lock()
            .write_all(rendered.as_bytes())
            .context("Failed to write to stdout")?,
    }

    // ── Summary ──────────────────────────────────────────────────────────
    if !cli.quiet {
        print_summary(&cli, &outputs);
    }

    Ok(())
}

async fn run_inspect(cli: &Cli) -> Result<()> {
    let config = build_config(cli, None)?;
    let mut all = Vec::with_capacity(cli.inputs.len());
    for input in &cli.inputs {
        let meta = inspect(input, &config)
            .await
            .with_context(|| format!("Failed to inspect '{input}'"))?;

        if cli.json {
            all.push(meta);
            continue;
        }

        println!("File:         {}", input);
        if let Some(ref t) = meta.title {
            println!("Title:        {}", t);
        }
        if let Some(ref a) = meta.author {
            println!("Author:       {}", a);
        }
        if let Some(ref s) = meta.subject {
            println!("Subject:      {}", s);
        }
        println!("Pages:        {}", meta.page_count);
        println!("PDF Version:  {}", meta.pdf_version);
        if let Some(ref p) = meta.producer {
            println!("Producer:     {}", p);
        }
        if let Some(ref c) = meta.creator {
            println!("Creator:      {}", c);
        }
        if let Some(ref d) = meta.creation_date {
            println!("Created:      {}", d);
        }
        println!();
    }

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&all).context("Failed to serialise metadata")?
        );
    }
    Ok(())
}

fn print_summary(cli: &Cli, outputs: &[ExtractionOutput]) {
    let failed_docs = cli.inputs.len() - outputs.len();
    let lines: usize = outputs.iter().map(|o| o.stats.line_count).sum();
    let fields: usize = outputs.iter().map(|o| o.stats.fields_found).sum();
    let failed_images: usize = outputs.iter().map(|o| o.stats.images_failed).sum();
    let millis: u64 = outputs.iter().map(|o| o.stats.total_duration_ms).sum();

    eprintln!(
        "{}  {}/{} documents  {} lines  {} fields  {}ms{}",
        if failed_docs == 0 && failed_images == 0 {
            green("✔")
        } else {
            cyan("⚠")
        },
        outputs.len(),
        cli.inputs.len(),
        lines,
        fields,
        millis,
        cli.output
            .as_ref()
            .map(|p| format!("  →  {}", bold(&p.display().to_string())))
            .unwrap_or_default(),
    );

    let tokens_in: u64 = outputs.iter().map(|o| o.stats.input_tokens).sum();
    let tokens_out: u64 = outputs.iter().map(|o| o.stats.output_tokens).sum();
    if tokens_in + tokens_out > 0 {
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&tokens_in.to_string()),
            dim(&tokens_out.to_string()),
        );
    }
}

/// Map CLI args to `ExtractionConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ExtractionConfig> {
    let pages = parse_pages(&cli.pages)?;

    let mut builder = ExtractionConfig::builder()
        .mode(cli.mode.into())
        .ocr_backend(cli.ocr.into())
        .language(cli.lang.clone())
        .page_seg_mode(cli.psm)
        .tesseract_path(cli.tesseract_path.clone())
        .paragraph(!cli.no_paragraph)
        .concurrency(cli.concurrency)
        .min_image_edge(cli.min_image_edge)
        .max_retries(cli.max_retries)
        .ocr_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .pages(pages);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--pages` string into `PageSelection`.
fn parse_pages(s: &str) -> Result<PageSelection> {
    let s = s.trim().to_lowercase();

    if s == "all" {
        return Ok(PageSelection::All);
    }

    // Range: "3-15"
    if let Some((start, end)) = s.split_once('-') {
        let start: usize = start
            .trim()
            .parse()
            .context("Invalid start page in range")?;
        let end: usize = end.trim().parse().context("Invalid end page in range")?;

        if start < 1 {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", start);
        }
        if start > end {
            anyhow::bail!("Invalid page range '{}-{}': start must be <= end", start, end);
        }
        return Ok(PageSelection::Range(start, end));
    }

    // Set: "1,3,5,7"
    if s.contains(',') {
        let pages: Vec<usize> = s
            .split(',')
            .map(|p| {
                p.trim()
                    .parse::<usize>()
                    .with_context(|| format!("Invalid page number: '{}'", p.trim()))
            })
            .collect::<Result<Vec<_>>>()?;

        if let Some(&p) = pages.iter().find(|&&p| p < 1) {
            anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", p);
        }
        return Ok(PageSelection::Set(pages));
    }

    // Single page: "5"
    let page: usize = s.parse().context("Invalid page number")?;
    if page < 1 {
        anyhow::bail!("Pages are 1-indexed, minimum is 1 (got {})", page);
    }
    Ok(PageSelection::Single(page))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_page_selections() {
        assert!(matches!(parse_pages("all").unwrap(), PageSelection::All));
        assert!(matches!(parse_pages(" 4 ").unwrap(), PageSelection::Single(4)));
        assert!(matches!(parse_pages("2-5").unwrap(), PageSelection::Range(2, 5)));
        match parse_pages("1,3, 7").unwrap() {
            PageSelection::Set(p) => assert_eq!(p, vec![1, 3, 7]),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn reject_bad_pages() {
        assert!(parse_pages("0").is_err());
        assert!(parse_pages("5-2").is_err());
        assert!(parse_pages("1,x").is_err());
        assert!(parse_pages("0,2").is_err());
    }

    #[test]
    fn cli_maps_onto_config() {
        let cli = Cli::parse_from([
            "pdf2csv",
            "--mode",
            "auto",
            "--ocr",
            "vision",
            "--lang",
            "deu+eng",
            "--no-paragraph",
            "--pages",
            "2-3",
            "a.pdf",
            "b.pdf",
        ]);
        assert_eq!(cli.inputs, ["a.pdf", "b.pdf"]);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.mode, ExtractionMode::Auto);
        assert_eq!(config.ocr_backend, OcrBackend::Vision);
        assert_eq!(config.language, "deu+eng");
        assert!(!config.paragraph);
        assert!(matches!(config.pages, PageSelection::Range(2, 3)));
    }
}
