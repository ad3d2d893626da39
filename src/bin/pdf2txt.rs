//! CLI binary for edgequake-pdf2txt.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, prints one status line per document and a final summary.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_pdf2txt::{
    DocumentReport, DocumentStatus, FailureKind, InstructionProfile, Pipeline, PipelineConfig,
    PipelineProgressCallback, ProgressCallback, RunSummary,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

/// Terminal progress: a document-level bar plus one status line per
/// document. With `--concurrency > 1` lines arrive in completion order.
struct CliProgressCallback {
    bar: ProgressBar,
    started: Instant,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Scanning");
        bar.set_message("Looking for PDFs…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Instant::now(),
        })
    }

    fn activate_bar(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} documents  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Converting");
        self.bar.set_message("");
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_documents: usize) {
        self.activate_bar(total_documents);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total_documents} PDF(s)"))
        ));
    }

    fn on_document_rasterised(&self, name: &str, pages: usize, batches: usize) {
        self.bar
            .set_message(format!("{name}: {pages} pages in {batches} batch(es)"));
    }

    fn on_batch_start(&self, name: &str, batch: usize, total: usize, first: usize, last: usize) {
        self.bar
            .set_message(format!("{name}: batch {batch}/{total} (pages {first}–{last})"));
    }

    fn on_harmonize_start(&self, name: &str) {
        self.bar.set_message(format!("{name}: harmonizing"));
    }

    fn on_document_finished(&self, report: &DocumentReport) {
        self.bar.println(status_line(report));
        self.bar.inc(1);
    }

    fn on_run_complete(&self, summary: &RunSummary) {
        self.bar.finish_and_clear();
        eprintln!("{}", summary_line(summary, self.started.elapsed()));
    }
}

fn status_line(report: &DocumentReport) -> String {
    let name = report.name();
    match report.status {
        DocumentStatus::Succeeded => {
            let mut line = format!(
                "  {} {}  →  {}  {}",
                green("✓"),
                name,
                report.output.display(),
                dim(&format!(
                    "{} pages, {} batches, {:.1}s",
                    report.pages,
                    report.batches,
                    report.duration_ms as f64 / 1000.0
                )),
            );
            if let Some(ref path) = report.verification {
                let note = format!("{} page(s) flagged, see {}", report.flagged_pages, path.display());
                line.push_str(&format!("  {}", if report.flagged_pages > 0 { yellow(&note) } else { dim(&note) }));
            }
            line
        }
        DocumentStatus::Skipped => format!(
            "  {} {}  {}",
            dim("–"),
            name,
            dim(&format!("skipped: {} exists", report.output.display())),
        ),
        DocumentStatus::Failed(kind) => {
            let label = match kind {
                FailureKind::ContentRejected => yellow("content rejected"),
                FailureKind::Service => red("service error"),
                FailureKind::Other => red("error"),
            };
            let detail = report.error.as_deref().unwrap_or("");
            let detail = detail.lines().next().unwrap_or("");
            let detail = if detail.chars().count() > 100 {
                format!("{}\u{2026}", detail.chars().take(99).collect::<String>())
            } else {
                detail.to_string()
            };
            format!("  {} {}  {}  {}", red("✗"), name, label, dim(&detail))
        }
    }
}

fn summary_line(summary: &RunSummary, elapsed: Duration) -> String {
    let mark = if summary.failed == 0 {
        green("✔")
    } else if summary.succeeded == 0 && summary.skipped == 0 {
        red("✘")
    } else {
        cyan("⚠")
    };
    let mut line = format!(
        "{} {} converted, {} skipped, {} failed of {}  {}",
        mark,
        bold(&summary.succeeded.to_string()),
        summary.skipped,
        if summary.failed == 0 {
            "0".to_string()
        } else {
            red(&summary.failed.to_string())
        },
        summary.total,
        dim(&format!("{:.1}s", elapsed.as_secs_f64())),
    );
    if summary.rejected > 0 {
        line.push_str(&format!("  ({} rejected by the model)", yellow(&summary.rejected.to_string())));
    }
    line.push_str(&format!(
        "\n   {} tokens in  /  {} tokens out",
        dim(&summary.total_input_tokens.to_string()),
        dim(&summary.total_output_tokens.to_string()),
    ));
    line
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert every PDF in ./reports into ./texts
  pdf2txt reports texts

  # Smaller batches, harmonise batch seams
  pdf2txt --batch-size 10 --harmonize reports texts

  # Spot-check one page per batch; findings land in texts/<name>.verify.txt
  pdf2txt --verify reports texts

  # Financial statements with OpenAI
  pdf2txt --provider openai --model gpt-4.1-mini --profile financial filings texts

  # Two documents at a time, JSON summary on stdout
  pdf2txt --concurrency 2 --json reports texts > summary.json

Re-running the same command skips every PDF whose .txt already exists.

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY / GOOGLE_API_KEY  Gemini API key (default provider)
  OPENAI_API_KEY                   OpenAI API key
  ANTHROPIC_API_KEY                Anthropic API key
  MISTRAL_API_KEY                  Mistral API key
  EDGEQUAKE_LLM_PROVIDER           Override provider
  EDGEQUAKE_MODEL                  Override model ID
  PDFIUM_LIB_PATH                  Path to libpdfium
  RUST_LOG                         Log filter (overrides -v / -q)
"#;

/// Batch-convert a directory of PDFs to text files with a vision model.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2txt",
    version,
    about = "Batch-convert a directory of PDFs to text files using a vision LLM as OCR",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory containing the PDFs to convert.
    input_dir: PathBuf,

    /// Directory receiving one <name>.txt per PDF (created if missing).
    output_dir: PathBuf,

    /// LLM provider: gemini, openai, anthropic, mistral, ollama, …
    #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
    provider: Option<String>,

    /// LLM model ID (default: gemini-2.0-flash with the gemini provider).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Rendering DPI (72–600).
    #[arg(long, env = "PDF2TXT_DPI", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Page images per OCR request.
    #[arg(short, long, env = "PDF2TXT_BATCH_SIZE", default_value_t = 25,
          value_parser = clap::value_parser!(u64).range(1..))]
    batch_size: u64,

    /// Documents processed at the same time.
    #[arg(short, long, env = "PDF2TXT_CONCURRENCY", default_value_t = 1)]
    concurrency: usize,

    /// Run a second model pass that removes batch markers and merges content across them.
    #[arg(long, env = "PDF2TXT_HARMONIZE")]
    harmonize: bool,

    /// Apply deterministic cleanup (fences, blank lines, stray table separators).
    #[arg(long, env = "PDF2TXT_POSTPROCESS")]
    postprocess: bool,

    /// Have the model check one page per batch against the transcription;
    /// findings go to <stem>.verify.txt.
    #[arg(long, env = "PDF2TXT_VERIFY")]
    verify: bool,

    /// Built-in task instruction.
    #[arg(long, env = "PDF2TXT_PROFILE", value_enum, default_value = "complex-layout")]
    profile: ProfileArg,

    /// Path to a text file containing a custom task instruction.
    #[arg(long, env = "PDF2TXT_INSTRUCTION")]
    instruction: Option<PathBuf>,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2TXT_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Max LLM output tokens per request.
    #[arg(long, env = "PDF2TXT_MAX_TOKENS", default_value_t = 8192)]
    max_tokens: usize,

    /// Retries per request on a transient failure.
    #[arg(long, env = "PDF2TXT_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Per-request timeout in seconds.
    #[arg(long, env = "PDF2TXT_API_TIMEOUT", default_value_t = 300)]
    api_timeout: u64,

    /// Parent directory for per-document working directories.
    #[arg(long, env = "PDF2TXT_WORK_DIR")]
    work_dir: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "PDF2TXT_PASSWORD")]
    password: Option<String>,

    /// Path to the pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Print the run summary as JSON on stdout.
    #[arg(long, env = "PDF2TXT_JSON")]
    json: bool,

    /// Disable the progress display.
    #[arg(long, env = "PDF2TXT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDF2TXT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDF2TXT_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum ProfileArg {
    ComplexLayout,
    Financial,
}

impl From<ProfileArg> for InstructionProfile {
    fn from(v: ProfileArg) -> Self {
        match v {
            ProfileArg::ComplexLayout => InstructionProfile::ComplexLayout,
            ProfileArg::Financial => InstructionProfile::Financial,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO-level library logs would tear through the progress display, so
    // they are only shown when the display is off.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb).await?;
    let pipeline = Pipeline::from_config(config).context("Failed to initialise pipeline")?;

    let summary = pipeline
        .run(&cli.input_dir, &cli.output_dir)
        .await
        .context("Conversion run failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?;
        println!("{json}");
    } else if !cli.quiet && !show_progress {
        // Without the progress callback nobody has printed per-document lines yet.
        for report in &summary.documents {
            eprintln!("{}", status_line(report));
        }
        eprintln!(
            "{}",
            summary_line(&summary, Duration::from_millis(summary.total_duration_ms))
        );
    }

    Ok(())
}

/// Map CLI args to `PipelineConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let instruction = if let Some(ref path) = cli.instruction {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read instruction from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = PipelineConfig::builder()
        .dpi(cli.dpi)
        .batch_size(cli.batch_size as usize)
        .concurrency(cli.concurrency)
        .harmonize(cli.harmonize)
        .postprocess(cli.postprocess)
        .verify(cli.verify)
        .profile(cli.profile.clone().into())
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .max_retries(cli.max_retries)
        .api_timeout_secs(cli.api_timeout);

    if let Some(text) = instruction {
        builder = builder.instruction(text);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref dir) = cli.work_dir {
        builder = builder.work_dir(dir.clone());
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password.clone());
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(lib.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
