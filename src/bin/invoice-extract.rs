//! CLI binary for invoice-extract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ServiceConfig` and either serves the HTTP API, runs a batch over local
//! files and URLs, or prints the default field schema.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use invoice_extract::schema_editor::{render_outline, render_text};
use invoice_extract::server::{self, AppState};
use invoice_extract::{
    run_batch_to_file, BatchProgressCallback, EditorCommand, EditorState, ProgressCallback, ServiceConfig,
    Services,
};
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
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

/// Terminal progress callback: one bar over all input files, one log line
/// per file. Files finish out of order when extraction runs concurrently.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Preparing");
        bar.set_message("Reading inputs…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    fn elapsed_secs(&self, index: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&index))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} files  \
                 ⏱ {elapsed_precise}  {msg}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        self.bar.set_prefix("Extracting");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting text from {total_files} file(s)…"))
        ));
    }

    fn on_file_start(&self, index: usize, name: &str) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(index, Instant::now());
        }
        self.bar.set_message(name.to_string());
    }

    fn on_file_extracted(&self, index: usize, name: &str, text_len: usize) {
        let secs = self.elapsed_secs(index);
        self.bar.println(format!(
            "  {} {:<32}  {:<8}  {}",
            green("✓"),
            name,
            dim(&format!("{text_len:>6} chars")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, index: usize, name: &str, error: &str) {
        let secs = self.elapsed_secs(index);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(Some('\u{2026}')).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:<32}  {}  {}",
            red("✗"),
            name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_structuring_start(&self, documents: usize) {
        self.bar.set_prefix("Structuring");
        self.bar
            .set_message(format!("{documents} document(s) with the LLM…"));
    }

    fn on_batch_complete(&self, documents: usize, failed_files: usize) {
        self.bar.finish_and_clear();
        if failed_files == 0 {
            eprintln!(
                "{} {} document(s) extracted",
                green("✔"),
                bold(&documents.to_string())
            );
        } else {
            eprintln!(
                "{} {} document(s) extracted  ({} file(s) failed)",
                if documents == 0 { red("✘") } else { cyan("⚠") },
                bold(&documents.to_string()),
                red(&failed_files.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Serve the HTTP API on port 3000
  invoice-extract serve --bind 0.0.0.0:3000

  # Extract a folder of invoices into one spreadsheet
  invoice-extract run invoices/*.pdf -o extracted_data.xlsx

  # Mix local files and URLs, print the records as JSON too
  invoice-extract run a.pdf https://example.com/b.pdf -o out.xlsx --json

  # Use a specific model
  invoice-extract --provider anthropic --model claude-sonnet-4-20250514 run a.pdf

  # Show the default field schema
  invoice-extract schema

ENVIRONMENT VARIABLES:
  LLAMA_CLOUD_API_KEY     LlamaParse API key (PDF text extraction)
  OPENAI_API_KEY          OpenAI API key (structuring, default provider)
  ANTHROPIC_API_KEY       Anthropic API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  REPLICATE_API_TOKEN     Replicate token (image generation endpoint)

  Variables are also read from a .env file in the working directory.
"#;

/// Extract structured invoice data from PDFs into a spreadsheet.
#[derive(Parser, Debug)]
#[command(
    name = "invoice-extract",
    version,
    about = "Extract structured invoice data from PDFs into a spreadsheet",
    long_about = "Extract company, address, totals and line items from PDF invoices. \
Text is read by LlamaParse, structured by an LLM (OpenAI, Anthropic, Gemini, Ollama, …) \
and exported as XLSX, either from the command line or through an HTTP API.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    service: ServiceArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "INVOICE_EXTRACT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "INVOICE_EXTRACT_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the HTTP API.
    Serve {
        /// Address to listen on.
        #[arg(long, env = "INVOICE_EXTRACT_BIND", default_value = "127.0.0.1:3000")]
        bind: SocketAddr,
    },

    /// Extract a batch of PDFs (paths or URLs) into one workbook.
    Run {
        /// Local PDF paths or HTTP/HTTPS URLs.
        #[arg(required = true)]
        inputs: Vec<String>,

        /// Where to write the workbook.
        #[arg(short, long, env = "INVOICE_EXTRACT_OUTPUT", default_value = "extracted_data.xlsx")]
        output: PathBuf,

        /// Also print the structured records as JSON on stdout.
        #[arg(long)]
        json: bool,

        /// Disable progress bar.
        #[arg(long, env = "INVOICE_EXTRACT_NO_PROGRESS")]
        no_progress: bool,
    },

    /// Print the default field schema, optionally after applying edits.
    Schema {
        /// Print the tree as JSON instead of an outline.
        #[arg(long)]
        json: bool,

        /// JSON file with a list of edit commands, e.g.
        /// `[{"op":"add_field","parent_id":"4"}]`.
        #[arg(long, value_name = "FILE")]
        edits: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct ServiceArgs {
    /// LLM model ID (e.g. gpt-4, gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, global = true, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        global = true,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: openai, anthropic, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Documents structured concurrently.
    #[arg(short, long, global = true, env = "INVOICE_EXTRACT_CONCURRENCY", default_value_t = 8)]
    concurrency: usize,

    /// Max LLM output tokens per document.
    #[arg(long, global = true, env = "INVOICE_EXTRACT_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, global = true, env = "INVOICE_EXTRACT_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Extra attempts per document on LLM failure.
    #[arg(long, global = true, env = "INVOICE_EXTRACT_MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, global = true, env = "INVOICE_EXTRACT_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// LlamaParse API key.
    #[arg(long, global = true, env = "LLAMA_CLOUD_API_KEY", hide_env_values = true)]
    llama_parse_api_key: Option<String>,

    /// LlamaParse base URL.
    #[arg(long, global = true, env = "LLAMA_CLOUD_BASE_URL")]
    llama_parse_url: Option<String>,

    /// Replicate API token.
    #[arg(long, global = true, env = "REPLICATE_API_TOKEN", hide_env_values = true)]
    replicate_api_token: Option<String>,

    /// Replicate image model (owner/name).
    #[arg(long, global = true, env = "INVOICE_EXTRACT_IMAGE_MODEL")]
    image_model: Option<String>,

    /// Timeout for each outbound API call in seconds.
    #[arg(long, global = true, env = "INVOICE_EXTRACT_API_TIMEOUT", default_value_t = 120)]
    api_timeout: u64,

    /// HTTP download timeout for URL inputs in seconds.
    #[arg(long, global = true, env = "INVOICE_EXTRACT_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Largest accepted PDF in megabytes.
    #[arg(long, global = true, env = "INVOICE_EXTRACT_MAX_UPLOAD_MB", default_value_t = 25)]
    max_upload_mb: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine; everything can come from the real environment.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = match &cli.command {
        Command::Run { no_progress, .. } => !cli.quiet && !no_progress,
        _ => false,
    };
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

    match &cli.command {
        Command::Schema { json, edits } => print_schema(*json, edits.as_deref()),

        Command::Serve { bind } => {
            let config = build_config(&cli.service, None).await?;
            let services =
                Services::from_config(&config).context("Failed to initialise services")?;
            server::serve(*bind, AppState::new(services, config))
                .await
                .context("Server failed")
        }

        Command::Run {
            inputs,
            output,
            json,
            ..
        } => {
            let progress_cb: Option<ProgressCallback> = if show_progress {
                Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
            } else {
                None
            };
            let config = build_config(&cli.service, progress_cb).await?;
            let services =
                Services::from_config(&config).context("Failed to initialise services")?;

            let start = Instant::now();
            let result = run_batch_to_file(inputs, output, &services, &config)
                .await
                .context("Extraction failed")?;

            if *json {
                let out = serde_json::to_string_pretty(&result.documents)
                    .context("Failed to serialise documents")?;
                println!("{out}");
            }

            if !cli.quiet {
                let skipped = result.unreadable.len() + result.failed_extractions();
                eprintln!(
                    "{}  {} document(s)  {} skipped  {}ms  →  {}",
                    if skipped == 0 { green("✔") } else { cyan("⚠") },
                    result.documents.len(),
                    skipped,
                    start.elapsed().as_millis(),
                    bold(&output.display().to_string()),
                );
            }
            Ok(())
        }
    }
}

fn print_schema(json: bool, edits: Option<&Path>) -> Result<()> {
    let mut state = EditorState::default();
    if let Some(path) = edits {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read edits from {}", path.display()))?;
        let commands: Vec<EditorCommand> = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid edit commands in {}", path.display()))?;
        state = state.apply_all(commands);
    }
    if json {
        let out =
            serde_json::to_string_pretty(&state.fields).context("Failed to serialise schema")?;
        println!("{out}");
    } else {
        print!("{}", render_text(&state));
        eprintln!(
            "{}",
            dim(&format!("{} field(s)", render_outline(&state).len()))
        );
    }
    Ok(())
}

/// Map CLI args to `ServiceConfig`.
async fn build_config(args: &ServiceArgs, progress: Option<ProgressCallback>) -> Result<ServiceConfig> {
    let system_prompt = if let Some(ref path) = args.system_prompt {
        Some(
            tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read system prompt from {:?}", path))?,
        )
    } else {
        None
    };

    let mut builder = ServiceConfig::builder()
        .concurrency(args.concurrency)
        .max_tokens(args.max_tokens)
        .temperature(args.temperature)
        .max_retries(args.max_retries)
        .api_timeout_secs(args.api_timeout)
        .download_timeout_secs(args.download_timeout)
        .max_upload_bytes(args.max_upload_mb.saturating_mul(1024 * 1024));

    if let Some(ref model) = args.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(prompt) = system_prompt {
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref key) = args.llama_parse_api_key {
        builder = builder.llama_parse_api_key(key.clone());
    }
    if let Some(ref url) = args.llama_parse_url {
        builder = builder.llama_parse_url(url.clone());
    }
    if let Some(ref token) = args.replicate_api_token {
        builder = builder.replicate_api_token(token.clone());
    }
    if let Some(ref model) = args.image_model {
        builder = builder.image_model(model.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
