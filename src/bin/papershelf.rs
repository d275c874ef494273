//! CLI binary for papershelf.
//!
//! A thin shim over the library crate that maps CLI flags to `FilerConfig`,
//! makes sure rmapi is installed, files one paper and prints the receipt.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use papershelf::{
    Dispatcher, FilerConfig, FilingProgressCallback, FilingReceipt, FilingStage, ProgressCallback,
    RmapiBridge,
};
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner that shows the current filing stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Filing");
        bar.set_message("Starting…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl FilingProgressCallback for CliProgressCallback {
    fn on_stage(&self, stage: FilingStage) {
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_complete(&self, remote_path: &str, dry_run: bool) {
        self.bar.finish_and_clear();
        let verb = if dry_run { "Would file as" } else { "Filed as" };
        eprintln!("{} {} {}", green("✔"), verb, bold(remote_path));
    }

    fn on_failed(&self, error: &str) {
        self.bar.finish_and_clear();
        let first_line = error.lines().next().unwrap_or(error);
        eprintln!("{} {}", red("✘"), red(first_line));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # File an arXiv paper by ID, URL or arxiv: reference
  papershelf 2301.12345
  papershelf https://arxiv.org/abs/2301.12345v2

  # File a local PDF; the oracle picks category and title
  papershelf ~/Downloads/paper.pdf

  # Show what would happen without touching the tablet
  papershelf --dry-run ~/Downloads/paper.pdf

  # Classify with a vision model through another provider
  papershelf --provider openai --model gpt-4.1-mini paper.pdf

  # Download rmapi and stop (then run `./bin/rmapi` once to pair the device)
  papershelf --setup

LAYOUT ON THE DEVICE:
  /papers/<Category>/<Title>.pdf
  arXiv categories map to folder names (cs → ComputerScience, hep-th →
  HighEnergyPhysics, …). Without a usable answer from the oracle the paper
  goes to /papers/Uncategorized/ under its original file name.

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Anthropic API key (default oracle)
  OPENAI_API_KEY          OpenAI key, with --provider openai
  RMAPI_BIN               Path to an existing rmapi binary; skips download
  RMAPI_CONFIG            rmapi session file (default ./.rmapi)
  RMAPI_AUTO_CACHE_DIR    Override the rmapi download cache directory
  PDFIUM_LIB_PATH         libpdfium used to send only the first page
  RUST_LOG                Override the log filter

  A .env file in the working directory is loaded first.
"#;

/// File research papers onto a reMarkable tablet.
#[derive(Parser, Debug)]
#[command(
    name = "papershelf",
    version,
    about = "File research papers onto a reMarkable tablet, sorted by subject",
    long_about = "File a local PDF or an arXiv paper into /papers/<Category>/<Title>.pdf on a \
reMarkable tablet via rmapi. arXiv papers are named from their metadata; local files are \
classified by an LLM reading the first page.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local PDF path, arXiv ID, arxiv: reference or arXiv URL.
    paper: Option<String>,

    /// Decide and log everything but do not create, upload or rename.
    #[arg(short = 'n', long, env = "PAPERSHELF_DRY_RUN")]
    dry_run: bool,

    /// Download rmapi if needed, then exit.
    #[arg(long)]
    setup: bool,

    /// Path to the rmapi binary. Skips the automatic download.
    #[arg(long, env = "RMAPI_BIN")]
    bridge_bin: Option<PathBuf>,

    /// rmapi session file, handed to rmapi as RMAPI_CONFIG.
    #[arg(long, env = "RMAPI_CONFIG", default_value = "./.rmapi")]
    bridge_config: PathBuf,

    /// Kill an rmapi call that runs longer than this many seconds.
    #[arg(long, env = "PAPERSHELF_BRIDGE_TIMEOUT")]
    bridge_timeout: Option<u64>,

    /// Remote folder that holds the category folders.
    #[arg(long, env = "PAPERSHELF_REMOTE_ROOT", default_value = "/papers")]
    remote_root: String,

    /// Oracle model ID (default: claude-sonnet-4-20250514).
    #[arg(long, env = "PAPERSHELF_MODEL")]
    model: Option<String>,

    /// Classify with a vision model from this edgequake-llm provider
    /// (openai, gemini, ollama, …) instead of the Anthropic document API.
    #[arg(long, env = "PAPERSHELF_PROVIDER")]
    provider: Option<String>,

    /// Anthropic API key.
    #[arg(long, env = "ANTHROPIC_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Anthropic API base URL.
    #[arg(long, env = "ANTHROPIC_BASE_URL")]
    api_base_url: Option<String>,

    /// Oracle call timeout in seconds.
    #[arg(long, env = "PAPERSHELF_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Path to libpdfium, used to trim the oracle payload to page one.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,

    /// Keep downloaded arXiv PDFs here (default: a scratch dir removed after filing).
    #[arg(long, env = "PAPERSHELF_DOWNLOAD_DIR")]
    download_dir: Option<PathBuf>,

    /// arXiv download timeout in seconds.
    #[arg(long, env = "PAPERSHELF_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Ask the oracle for a category when arXiv lists none, instead of
    /// filing under Uncategorized.
    #[arg(long, env = "PAPERSHELF_CLASSIFY_MISSING_CATEGORY")]
    classify_missing_category: bool,

    /// Print the filing receipt as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "PAPERSHELF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs (shows every rmapi command).
    #[arg(short, long, env = "PAPERSHELF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PAPERSHELF_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env is normal.
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.verbose;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "warn"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match run(cli, show_progress).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {:#}", red("error:"), e);
            ExitCode::from(papershelf::EXIT_FAILURE)
        }
    }
}

/// File the paper named on the command line; returns the process exit code.
async fn run(cli: Cli, show_progress: bool) -> Result<u8> {
    if cli.paper.is_none() && !cli.setup {
        use clap::CommandFactory;
        Cli::command().print_help().context("Failed to print help")?;
        return Ok(papershelf::EXIT_SUCCESS);
    }

    // ── Ensure rmapi is available ────────────────────────────────────────
    let bridge_bin = match cli.bridge_bin.clone() {
        Some(path) => path,
        None => ensure_bridge(cli.quiet)?,
    };

    if cli.setup {
        if !cli.quiet {
            eprintln!("{} rmapi ready at {}", green("✔"), bold(&bridge_bin.display().to_string()));
            eprintln!(
                "   {}",
                dim("Run it once to pair this machine with your reMarkable account.")
            );
        }
        if cli.paper.is_none() {
            return Ok(papershelf::EXIT_SUCCESS);
        }
    }

    let Some(ref paper) = cli.paper else {
        return Ok(papershelf::EXIT_SUCCESS);
    };

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn FilingProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, bridge_bin, progress_cb)?;

    let bridge = Arc::new(RmapiBridge::new(config.bridge.clone()));
    let dispatcher =
        Dispatcher::from_config(bridge, &config).context("Failed to set up the filer")?;

    // ── File the paper ───────────────────────────────────────────────────
    match dispatcher.dispatch(paper, cli.dry_run).await {
        Ok(receipt) => {
            print_receipt(&receipt, cli.json, cli.quiet || show_progress)?;
            Ok(papershelf::EXIT_SUCCESS)
        }
        Err(e) => {
            if !show_progress {
                tracing::error!("{}", e);
            }
            Ok(papershelf::EXIT_FAILURE)
        }
    }
}

/// Locate rmapi, downloading it with a progress bar on first use.
fn ensure_bridge(quiet: bool) -> Result<PathBuf> {
    if rmapi_auto::is_rmapi_cached() || quiet {
        return tokio::task::block_in_place(|| rmapi_auto::ensure_rmapi(None))
            .context("Failed to install rmapi");
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("rmapi");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    let path = tokio::task::block_in_place(|| {
        rmapi_auto::ensure_rmapi(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download rmapi")?;

    dl_bar.finish_and_clear();
    Ok(path)
}

/// Map CLI args to `FilerConfig`.
fn build_config(
    cli: &Cli,
    bridge_bin: PathBuf,
    progress: Option<ProgressCallback>,
) -> Result<FilerConfig> {
    let mut builder = FilerConfig::builder()
        .bridge_binary(bridge_bin)
        .bridge_config_path(cli.bridge_config.clone())
        .remote_root(cli.remote_root.clone())
        .api_timeout_secs(cli.api_timeout)
        .download_timeout_secs(cli.download_timeout)
        .classify_missing_category(cli.classify_missing_category);

    if let Some(secs) = cli.bridge_timeout {
        builder = builder.bridge_timeout_secs(secs);
    }
    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key.clone());
    }
    if let Some(ref url) = cli.api_base_url {
        builder = builder.api_base_url(url.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_lib_path(lib.clone());
    }
    if let Some(ref dir) = cli.download_dir {
        builder = builder.download_dir(dir.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_receipt(receipt: &FilingReceipt, json: bool, terse: bool) -> Result<()> {
    if json {
        let out = serde_json::to_string_pretty(receipt).context("Failed to serialise receipt")?;
        println!("{out}");
        return Ok(());
    }

    println!("{}", receipt.remote_path);
    if !terse {
        let mode = if receipt.dry_run { " (dry run)" } else { "" };
        eprintln!(
            "   {}",
            dim(&format!(
                "category {} via {:?}, uploaded as '{}'{}{}",
                receipt.category,
                receipt.classification,
                receipt.uploaded_as,
                if receipt.renamed { ", renamed" } else { "" },
                mode
            ))
        );
        for dir in &receipt.created_dirs {
            eprintln!("   {}", dim(&format!("created {dir}")));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bare_invocation_prints_help_and_succeeds() {
        let cli = Cli::try_parse_from(["papershelf"]).unwrap();
        assert!(cli.paper.is_none() && !cli.setup);
        assert_eq!(run(cli, false).await.unwrap(), papershelf::EXIT_SUCCESS);
    }

    #[test]
    fn paper_and_flags_parse() {
        let cli = Cli::try_parse_from(["papershelf", "-n", "--json", "2301.12345"]).unwrap();
        assert_eq!(cli.paper.as_deref(), Some("2301.12345"));
        assert!(cli.dry_run && cli.json);
    }
}
