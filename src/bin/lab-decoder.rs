//! CLI binary for lab-report-decoder.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `AnalysisConfig` and prints the colour-coded blocks.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use lab_report_decoder::config::{MAX_RENDERED_PIXELS, MIN_RENDERED_PIXELS};
use lab_report_decoder::{
    analyze, display, loading_message, AnalysisConfig, AnalysisProgressCallback, AnalysisStats,
    Backend, Outcome, ProgressCallback, Stage,
};
use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const DISCLAIMER: &str = "⚠️  Medical Disclaimer: This tool is an AI prototype designed to assist with \
medical literacy. It is not a doctor and does not provide medical advice. No images or text \
uploaded here are stored. Consult your physician for all health decisions.";

const HEADING: &str = "📋 Detailed Analysis & Recommendations";

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner showing a light-hearted wait message and the current stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_message(loading_message(&mut rand::thread_rng()));
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl AnalysisProgressCallback for CliProgressCallback {
    fn on_stage(&self, stage: Stage) {
        self.bar.set_prefix(stage.label());
    }

    fn on_complete(&self, _shown_blocks: usize, _rejected: bool) {
        self.bar.finish_and_clear();
    }

    fn on_error(&self, _error: &str) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Analyze a PDF report (page 1)
  lab-decoder cbc.pdf

  # A phone photo, no colours (for piping)
  lab-decoder --no-color photo.jpg > results.txt

  # Straight from a URL
  lab-decoder https://example.com/reports/lipid-panel.png

  # Structured output
  lab-decoder --json cbc.pdf > analysis.json

  # Another vision provider through edgequake-llm
  lab-decoder --provider openai --model gpt-4.1-mini cbc.pdf

ACCEPTED FILES:
  .jpg  .jpeg  .png  .pdf   (only the first page of a PDF is read)

ENVIRONMENT VARIABLES:
  GROQ_API_KEY            Groq API key (required for the default backend)
  OPENAI_API_KEY, ...     Keys for --provider backends, read by edgequake-llm
  PDFIUM_LIB_PATH         Path to libpdfium; otherwise ./ then the system library
  RUST_LOG                Override log filter (e.g. lab_report_decoder=debug)
"#;

/// Explain a medical lab report in plain language using a vision model.
#[derive(Parser, Debug)]
#[command(
    name = "lab-decoder",
    version,
    about = "Explain a medical lab report (PDF or image) in plain language",
    long_about = "Upload a lab report as a PDF or image. The first page is sent to a \
vision model, which flags each value as normal, abnormal or borderline against the \
reference ranges printed on the report and suggests follow-ups. Not medical advice.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local file path or HTTP/HTTPS URL (jpg, jpeg, png, pdf).
    input: String,

    /// Groq API key.
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Backend: groq, or any edgequake-llm provider (openai, anthropic, gemini, ollama).
    #[arg(long, env = "LAB_DECODER_PROVIDER", default_value = "groq")]
    provider: String,

    /// Vision model ID. Default depends on the provider.
    #[arg(
        long,
        env = "LAB_DECODER_MODEL",
        long_help = "Vision model to use. Defaults: groq → meta-llama/llama-4-scout-17b-16e-instruct,\n\
          openai → gpt-4.1-nano, anthropic → claude-sonnet-4-20250514, gemini → gemini-2.0-flash,\n\
          ollama → llama3.2-vision."
    )]
    model: Option<String>,

    /// Base URL of the Groq (OpenAI-compatible) API.
    #[arg(long, env = "LAB_DECODER_BASE_URL", default_value = lab_report_decoder::config::DEFAULT_GROQ_BASE_URL)]
    base_url: String,

    /// Sampling temperature (0.0–2.0). Provider default when unset.
    #[arg(long, env = "LAB_DECODER_TEMPERATURE")]
    temperature: Option<f32>,

    /// Completion token cap. Provider default when unset.
    #[arg(long, env = "LAB_DECODER_MAX_TOKENS")]
    max_tokens: Option<usize>,

    /// Longest edge in pixels of the image sent to the model.
    #[arg(long, env = "LAB_DECODER_MAX_PIXELS", default_value_t = 2000,
          value_parser = clap::value_parser!(u32).range(
              MIN_RENDERED_PIXELS as i64..=MAX_RENDERED_PIXELS as i64))]
    max_pixels: u32,

    /// Path to a text file replacing the built-in instruction.
    #[arg(long, env = "LAB_DECODER_INSTRUCTION")]
    instruction_file: Option<PathBuf>,

    /// Model call timeout in seconds.
    #[arg(long, env = "LAB_DECODER_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "LAB_DECODER_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Output structured JSON (Analysis) instead of coloured text.
    #[arg(long)]
    json: bool,

    /// Also print the model's raw response.
    #[arg(long)]
    raw: bool,

    /// Disable ANSI colours.
    #[arg(long, env = "NO_COLOR")]
    no_color: bool,

    /// Disable the spinner.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress everything except the results and errors.
    #[arg(short, long)]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner gives all the feedback that matters; keep INFO logs out
    // of its way unless asked for.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && io::stderr().is_terminal();
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let color = !cli.no_color && io::stdout().is_terminal();

    if !cli.quiet && !cli.json {
        eprintln!("{}\n", if color { cyan(DISCLAIMER) } else { DISCLAIMER.to_string() });
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn AnalysisProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb).await?;

    // ── Run analysis ─────────────────────────────────────────────────────
    let analysis = analyze(&cli.input, &config)
        .await
        .context("Analysis failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&analysis).context("Failed to serialise output")?;
        println!("{json}");
        return Ok(());
    }

    if let Outcome::Findings { .. } = analysis.outcome {
        println!("{}\n", if color { bold(HEADING) } else { HEADING.to_string() });
    }
    let rendered = display::render_outcome(&analysis.outcome, color);
    if !rendered.is_empty() {
        println!("{rendered}");
    }

    if cli.raw {
        println!("\n--- raw response ---\n{}", analysis.raw_response);
    }

    if !cli.quiet {
        let line = stats_line(&analysis.stats);
        eprintln!("\n{}", if color { dim(&line) } else { line });
    }

    Ok(())
}

fn stats_line(stats: &AnalysisStats) -> String {
    format!(
        "{} tokens in  /  {} tokens out  /  {}ms total",
        stats.input_tokens, stats.output_tokens, stats.total_duration_ms
    )
}

/// Map CLI args to `AnalysisConfig`.
async fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AnalysisConfig> {
    let instruction = if let Some(ref path) = cli.instruction_file {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read instruction from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = AnalysisConfig::builder()
        .backend(Backend::from_name(&cli.provider))
        .base_url(cli.base_url.as_str())
        .max_rendered_pixels(cli.max_pixels)
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout);

    if let Some(ref model) = cli.model {
        builder = builder.model(model.as_str());
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.as_str());
    }
    if let Some(t) = cli.temperature {
        builder = builder.temperature(t);
    }
    if let Some(n) = cli.max_tokens {
        builder = builder.max_tokens(n);
    }
    if let Some(text) = instruction {
        builder = builder.instruction(text);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
