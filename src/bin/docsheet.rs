//! CLI binary for docsheet.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractionConfig` and prints tables.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use docsheet::server::{self, ServerConfig};
use docsheet::{
    chat, extract_table, render_table_csv, suggest_prompt, ChatContext, ChatTurn, Column,
    ColumnType, Document, ExtractionConfig, ExtractionConfigBuilder, ExtractionProgressCallback,
    IngestStrategy, Ingestor, ProgressCallback, ResponsePolicy, TableOutput,
};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use std::io::{self, BufRead, Write};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
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

/// Terminal progress bar with one log line per finished cell. Cells finish
/// out of order, so every line names its document and column.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} cells  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_table_start(&self, total_cells: usize) {
        self.bar.set_length(total_cells as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Extracting {total_cells} cells…"))
        ));
    }

    fn on_cell_start(&self, document: &str, column: &str) {
        self.bar.set_message(format!("{document} / {column}"));
    }

    fn on_cell_complete(&self, document: &str, column: &str, value: &str) {
        self.bar.println(format!(
            "  {} {} / {}  {}",
            green("✓"),
            document,
            column,
            dim(&truncate(value, 60)),
        ));
        self.bar.inc(1);
    }

    fn on_cell_error(&self, document: &str, column: &str, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {} / {}  {}",
            red("✗"),
            document,
            column,
            red(&truncate(error, 80)),
        ));
        self.bar.inc(1);
    }

    fn on_table_complete(&self, total_cells: usize, success_count: usize) {
        let failed = total_cells.saturating_sub(success_count);
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!("{} {} cells extracted", green("✔"), bold(&success_count.to_string()));
        } else {
            eprintln!(
                "{} {}/{} cells extracted  ({} failed)",
                if failed == total_cells { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total_cells,
                red(&failed.to_string()),
            );
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max - 1).collect();
        format!("{head}\u{2026}")
    } else {
        s.to_string()
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Two columns over three invoices, CSV on stdout
  docsheet extract a.pdf b.pdf c.docx -c "Total:number" -c "Due Date:date:When payment is due"

  # Columns from a JSON file, full results as JSON
  docsheet extract invoices/*.pdf --columns columns.json --json -o table.json

  # Convert Word files through the conversion service first
  docsheet extract report.docx -c "Author" --strategy convert

  # Ask questions about the extracted table (interactive without --question)
  docsheet chat a.pdf b.pdf -c "Total:number" --question "Which invoice is largest?"

  # Draft an extraction instruction for a column
  docsheet suggest-prompt "Renewal Date" --type date

  # Run the Word → PDF conversion service
  CLOUDCONVERT_API_KEY=... docsheet serve --addr 0.0.0.0:8787

COLUMN SYNTAX:
  NAME[:TYPE[:PROMPT]]   TYPE is text (default), date, boolean, number or list.
  A missing PROMPT becomes "Extract the NAME from the document."

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY               Model API key
  DOCSHEET_MODEL                  Override model ID (default claude-haiku-4-5-20251001)
  DOCSHEET_ANTHROPIC_BASE_URL     Override model API root
  GEMINI_API_KEY                  File-store key for --strategy reference
  DOCSHEET_UPLOAD_BASE_URL        Override file-store API root
  DOCSHEET_CONVERT_URL            Conversion service root for --strategy convert
  DOCSHEET_CONVERT_KEY            Conversion service key
  CLOUDCONVERT_API_KEY            Provider key for `docsheet serve`
  DOCSHEET_CLOUDCONVERT_BASE_URL  Override provider API root
"#;

/// Extract structured tables from documents with a hosted LLM.
#[derive(Parser, Debug)]
#[command(
    name = "docsheet",
    version,
    about = "Extract structured tables from PDFs, images and Word documents with a hosted LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "DOCSHEET_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "DOCSHEET_QUIET")]
    quiet: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "DOCSHEET_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract every column from every file.
    Extract {
        #[command(flatten)]
        table: TableArgs,

        /// Output the full result (cells, failures, stats) as JSON.
        #[arg(long, env = "DOCSHEET_JSON")]
        json: bool,

        /// Write output to this file instead of stdout.
        #[arg(short, long, env = "DOCSHEET_OUTPUT")]
        output: Option<PathBuf>,
    },

    /// Extract a table, then answer questions about it.
    Chat {
        #[command(flatten)]
        table: TableArgs,

        /// Ask a single question and exit. Without it, read questions from stdin.
        #[arg(long)]
        question: Option<String>,
    },

    /// Ask the model to draft an extraction instruction for a column.
    SuggestPrompt {
        /// Column name.
        name: String,

        /// Column type.
        #[arg(long = "type", value_enum, default_value = "text")]
        column_type: ColumnTypeArg,

        /// Existing instruction to improve.
        #[arg(long)]
        draft: Option<String>,

        #[command(flatten)]
        model: ModelArgs,
    },

    /// Run the Word → PDF conversion service.
    Serve {
        /// Listen address.
        #[arg(long, env = "DOCSHEET_ADDR", default_value = "127.0.0.1:8787")]
        addr: SocketAddr,

        /// Seconds between provider job status checks.
        #[arg(long, default_value_t = 1)]
        poll_interval: u64,

        /// Status checks before answering 504.
        #[arg(long, default_value_t = 30)]
        max_polls: u32,
    },
}

#[derive(clap::Args, Debug)]
struct TableArgs {
    /// Files to extract from (PDF, image, Word, text).
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Column as NAME[:TYPE[:PROMPT]]. Repeatable.
    #[arg(short = 'c', long = "column")]
    columns: Vec<String>,

    /// JSON file with an array of {"name", "type", "prompt"} columns.
    #[arg(long = "columns", env = "DOCSHEET_COLUMNS")]
    columns_file: Option<PathBuf>,

    /// How files reach the model.
    #[arg(long, env = "DOCSHEET_STRATEGY", value_enum, default_value = "inline")]
    strategy: StrategyArg,

    /// What to do when the model's JSON lacks value/confidence.
    #[arg(long, env = "DOCSHEET_POLICY", value_enum, default_value = "lenient")]
    policy: PolicyArg,

    /// Number of concurrent model calls.
    #[arg(long, env = "DOCSHEET_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Skip local text extraction for Word files.
    #[arg(long)]
    no_local_text: bool,

    #[command(flatten)]
    model: ModelArgs,
}

#[derive(clap::Args, Debug)]
struct ModelArgs {
    /// Model ID.
    #[arg(long, env = "DOCSHEET_MODEL")]
    model: Option<String>,

    /// Max output tokens per call.
    #[arg(long, env = "DOCSHEET_MAX_TOKENS")]
    max_tokens: Option<u32>,

    /// Retries on rate limits.
    #[arg(long, env = "DOCSHEET_MAX_RETRIES", default_value_t = 5)]
    max_retries: u32,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum StrategyArg {
    Inline,
    Convert,
    Reference,
}

impl From<StrategyArg> for IngestStrategy {
    fn from(v: StrategyArg) -> Self {
        match v {
            StrategyArg::Inline => IngestStrategy::Inline,
            StrategyArg::Convert => IngestStrategy::ConvertThenInline,
            StrategyArg::Reference => IngestStrategy::Reference,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PolicyArg {
    Lenient,
    Strict,
    StrictRetry,
}

impl From<PolicyArg> for ResponsePolicy {
    fn from(v: PolicyArg) -> Self {
        match v {
            PolicyArg::Lenient => ResponsePolicy::Lenient,
            PolicyArg::Strict => ResponsePolicy::Strict,
            PolicyArg::StrictRetry => ResponsePolicy::StrictWithRetry,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ColumnTypeArg {
    Text,
    Date,
    Boolean,
    Number,
    List,
}

impl From<ColumnTypeArg> for ColumnType {
    fn from(v: ColumnTypeArg) -> Self {
        match v {
            ColumnTypeArg::Text => ColumnType::Text,
            ColumnTypeArg::Date => ColumnType::Date,
            ColumnTypeArg::Boolean => ColumnType::Boolean,
            ColumnTypeArg::Number => ColumnType::Number,
            ColumnTypeArg::List => ColumnType::List,
        }
    }
}

/// Column entry in a `--columns` JSON file.
#[derive(Deserialize)]
struct ColumnSpec {
    name: String,
    #[serde(rename = "type", default)]
    column_type: ColumnType,
    #[serde(default)]
    prompt: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    match cli.command {
        Command::Extract {
            ref table,
            json,
            ref output,
        } => {
            let progress = progress_callback(show_progress && !json);
            let (documents, columns, config) = prepare_table(table, progress).await?;
            let result = extract_table(&documents, &columns, &config)
                .await
                .context("Extraction failed")?;

            let rendered = if json {
                serde_json::to_string_pretty(&result).context("Failed to serialise output")?
            } else {
                render_table_csv(&ChatContext {
                    documents: &documents,
                    columns: &columns,
                    results: &result.results,
                })
            };
            write_output(output.as_ref(), &rendered).await?;

            if !cli.quiet && !show_progress {
                print_summary(&result);
            }
        }

        Command::Chat {
            ref table,
            ref question,
        } => {
            let progress = progress_callback(show_progress);
            let (documents, columns, config) = prepare_table(table, progress).await?;
            let result = extract_table(&documents, &columns, &config)
                .await
                .context("Extraction failed")?;
            let context = ChatContext {
                documents: &documents,
                columns: &columns,
                results: &result.results,
            };

            if let Some(q) = question {
                println!("{}", chat(q, &context, &[], &config).await);
            } else {
                run_chat_loop(&context, &config).await?;
            }
        }

        Command::SuggestPrompt {
            ref name,
            column_type,
            ref draft,
            ref model,
        } => {
            let config = apply_model_args(ExtractionConfigBuilder::from_config(ExtractionConfig::from_env()), model)
                .build()
                .context("Invalid configuration")?;
            let prompt = suggest_prompt(name, column_type.into(), draft.as_deref(), &config).await;
            println!("{prompt}");
        }

        Command::Serve {
            addr,
            poll_interval,
            max_polls,
        } => {
            let mut config = ServerConfig::from_env();
            config.poll_interval = Duration::from_secs(poll_interval);
            config.max_poll_attempts = max_polls;
            if config.cloudconvert_api_key.is_none() && !cli.quiet {
                eprintln!(
                    "{} CLOUDCONVERT_API_KEY is not set; Word conversions will answer 503",
                    cyan("⚠")
                );
            }
            server::serve(config, addr)
                .await
                .context("Conversion service failed")?;
        }
    }

    Ok(())
}

fn progress_callback(enabled: bool) -> Option<ProgressCallback> {
    enabled.then(|| CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
}

fn apply_model_args(mut builder: ExtractionConfigBuilder, args: &ModelArgs) -> ExtractionConfigBuilder {
    if let Some(ref model) = args.model {
        builder = builder.model(model.clone());
    }
    if let Some(n) = args.max_tokens {
        builder = builder.max_tokens(n);
    }
    builder.max_retries(args.max_retries)
}

/// Build the config, parse columns and ingest every file.
async fn prepare_table(
    args: &TableArgs,
    progress: Option<ProgressCallback>,
) -> Result<(Vec<Document>, Vec<Column>, ExtractionConfig)> {
    let mut builder = ExtractionConfigBuilder::from_config(ExtractionConfig::from_env())
        .strategy(args.strategy.into())
        .response_policy(args.policy.into())
        .concurrency(args.concurrency)
        .extract_local_text(!args.no_local_text);
    builder = apply_model_args(builder, &args.model);
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }
    let config = builder.build().context("Invalid configuration")?;

    let mut columns = Vec::new();
    if let Some(ref path) = args.columns_file {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read columns from {:?}", path))?;
        let specs: Vec<ColumnSpec> =
            serde_json::from_str(&raw).with_context(|| format!("Invalid columns file {:?}", path))?;
        columns.extend(specs.into_iter().map(|s| column_from_parts(&s.name, s.column_type, &s.prompt)));
    }
    for raw in &args.columns {
        columns.push(parse_column(raw)?);
    }
    if columns.is_empty() {
        anyhow::bail!("No columns given; use --column NAME[:TYPE[:PROMPT]] or --columns FILE");
    }

    let ingestor = Ingestor::new(&config);
    let mut documents = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let doc = ingestor
            .ingest_path(path)
            .await
            .with_context(|| format!("Failed to ingest {}", path.display()))?;
        documents.push(doc);
    }

    Ok((documents, columns, config))
}

/// Parse `NAME[:TYPE[:PROMPT]]`.
fn parse_column(raw: &str) -> Result<Column> {
    let mut parts = raw.splitn(3, ':');
    let name = parts.next().unwrap_or_default().trim();
    if name.is_empty() {
        anyhow::bail!("Column name must not be empty (got '{raw}')");
    }
    let column_type: ColumnType = parts
        .next()
        .map(|t| t.parse().unwrap_or_default())
        .unwrap_or_default();
    let prompt = parts.next().unwrap_or_default().trim();
    Ok(column_from_parts(name, column_type, prompt))
}

fn column_from_parts(name: &str, column_type: ColumnType, prompt: &str) -> Column {
    let prompt = if prompt.trim().is_empty() {
        docsheet::prompts::default_column_prompt(name)
    } else {
        prompt.to_string()
    };
    Column::new(name, column_type, prompt)
}

async fn write_output(path: Option<&PathBuf>, rendered: &str) -> Result<()> {
    match path {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .with_context(|| format!("Failed to create {}", parent.display()))?;
            }
            tokio::fs::write(path, rendered)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(rendered.as_bytes())
                .context("Failed to write to stdout")?;
            if !rendered.ends_with('\n') {
                handle.write_all(b"\n").ok();
            }
        }
    }
    Ok(())
}

fn print_summary(output: &TableOutput) {
    eprintln!(
        "Extracted {}/{} cells in {}ms",
        output.stats.extracted_cells, output.stats.total_cells, output.stats.total_duration_ms
    );
    for failure in &output.failures {
        eprintln!("  {} {}", red("✗"), failure);
    }
}

/// Read questions line by line, keeping the conversation history.
async fn run_chat_loop(context: &ChatContext<'_>, config: &ExtractionConfig) -> Result<()> {
    let mut history: Vec<ChatTurn> = Vec::new();
    let stdin = io::stdin();
    eprintln!("{}", dim("Ask about the table. Empty line or Ctrl-D to quit."));

    loop {
        eprint!("{} ", bold("›"));
        io::stderr().flush().ok();

        let mut line = String::new();
        if stdin.lock().read_line(&mut line).context("Failed to read stdin")? == 0 {
            break;
        }
        let question = line.trim();
        if question.is_empty() {
            break;
        }

        let answer = chat(question, context, &history, config).await;
        println!("{answer}\n");
        history.push(ChatTurn::user(question));
        history.push(ChatTurn::assistant(answer));
    }
    Ok(())
}
