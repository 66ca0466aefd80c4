//! CLI binary for pdf-flattener.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `FlattenConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use pdf_flattener::config::MAX_DPI;
use pdf_flattener::{
    flatten_with_cancel, inspect, resolve_request, DateZone, FlattenConfig, FlattenError,
    FlattenProgressCallback, FlattenStats, ProgressCallback, Renderer, RendererKind, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
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

/// Spinner while the source is opened and rendered, then a page bar while
/// the images are embedded.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Page count, learned from the first rendered page.
    total: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
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
            total: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(self.total.load(Ordering::SeqCst) as u64);
        self.bar.set_position(0);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Assembling");
    }
}

impl FlattenProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        match stage {
            Stage::Resolve => self.bar.set_message("Reading source…"),
            Stage::Rasterize => {
                self.bar.set_prefix("Rendering");
                self.bar.set_message("Rasterising pages…");
            }
            Stage::Assemble => self.activate_bar(),
            Stage::Patch => {
                self.bar.set_prefix("Patching");
                self.bar.set_message("Writing dates…");
            }
        }
    }

    fn on_page_rendered(&self, page_num: usize, total_pages: usize, width_px: u32, height_px: u32) {
        self.total.store(total_pages, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            page_num,
            total_pages,
            dim(&format!("{width_px}x{height_px} px")),
        ));
    }

    fn on_page_assembled(&self, _page_num: usize, _total_pages: usize) {
        self.bar.inc(1);
    }

    fn on_complete(&self, stats: &FlattenStats) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} pages flattened at {} DPI",
            green("✔"),
            bold(&stats.page_count.to_string()),
            stats.dpi
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Flatten to flat-contract.pdf in the current directory
  flatten-pdf contract.pdf

  # Choose the output and a sharper raster
  flatten-pdf contract.pdf -o signed.pdf --dpi 300

  # Back-date the document metadata
  flatten-pdf contract.pdf -c 2020-01-15 -m 2020-02-01

  # Keep the source's time of day and stamp the file times too
  flatten-pdf contract.pdf -c 2020-01-15 --keep-source-time --set-file-times

  # Render in-process with pdfium instead of pdftoppm
  flatten-pdf contract.pdf --renderer pdfium

  # Inspect the source (no rendering)
  flatten-pdf --inspect-only --json contract.pdf

ENVIRONMENT VARIABLES:
  POPPLER_PATH            Directory containing pdftoppm
  PDFIUM_LIB_PATH         Path to an existing libpdfium (pdfium renderer)
  FLATTEN_PDF_*           Any option, e.g. FLATTEN_PDF_DPI=300
  RUST_LOG                Log filter, overrides --verbose

SETUP:
  The default renderer needs poppler's pdftoppm:
    macOS:          brew install poppler
    Debian/Ubuntu:  sudo apt install poppler-utils
    Windows:        install poppler and set POPPLER_PATH to its bin directory
"#;

/// Flatten a PDF into an image-only PDF.
#[derive(Parser, Debug)]
#[command(
    name = "flatten-pdf",
    version,
    about = "Flatten a PDF by rasterising every page into an image-only PDF",
    long_about = "Render each page of a PDF at a fixed DPI and reassemble the images into a new \
PDF with the original page sizes. Text layers, annotations and form fields are gone from the \
result. Optionally set the /CreationDate and /ModDate of the output.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Source PDF file.
    input: PathBuf,

    /// Output PDF path. Default: flat-<input name> in the current directory.
    #[arg(short, long, env = "FLATTEN_PDF_OUTPUT")]
    output: Option<PathBuf>,

    /// Rendering DPI.
    #[arg(short, long, env = "FLATTEN_PDF_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(1..=MAX_DPI as i64))]
    dpi: u32,

    /// Creation date to write, YYYY-MM-DD.
    #[arg(short, long, env = "FLATTEN_PDF_CREATION_DATE")]
    creation_date: Option<String>,

    /// Modification date to write, YYYY-MM-DD.
    #[arg(short, long, env = "FLATTEN_PDF_MODIFICATION_DATE")]
    modification_date: Option<String>,

    /// JPEG quality of the page images (1–100).
    #[arg(short, long, env = "FLATTEN_PDF_QUALITY", default_value_t = 50,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: u8,

    /// Rendering backend.
    #[arg(long, env = "FLATTEN_PDF_RENDERER", value_enum, default_value = "poppler")]
    renderer: RendererArg,

    /// Directory containing pdftoppm.
    #[arg(long, env = "POPPLER_PATH")]
    poppler_path: Option<PathBuf>,

    /// Anchor dates at local midnight instead of UTC.
    #[arg(long, env = "FLATTEN_PDF_LOCAL_TIME")]
    local_time: bool,

    /// Use the source document's time of day instead of midnight.
    #[arg(long, env = "FLATTEN_PDF_KEEP_SOURCE_TIME")]
    keep_source_time: bool,

    /// Also set the output file's access/modification times.
    #[arg(long, env = "FLATTEN_PDF_SET_FILE_TIMES")]
    set_file_times: bool,

    /// Print source PDF facts only, no flattening.
    #[arg(long)]
    inspect_only: bool,

    /// Print the result as JSON on stdout.
    #[arg(long, env = "FLATTEN_PDF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "FLATTEN_PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "FLATTEN_PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(long, env = "FLATTEN_PDF_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum RendererArg {
    Poppler,
    Pdfium,
}

impl From<RendererArg> for RendererKind {
    fn from(v: RendererArg) -> Self {
        match v {
            RendererArg::Poppler => RendererKind::Poppler,
            RendererArg::Pdfium => RendererKind::Pdfium,
        }
    }
}

/// Attach `"<stage> stage failed"` so the message names where the run stopped.
fn with_stage<T>(res: Result<T, FlattenError>) -> Result<T> {
    res.map_err(|e| {
        let stage = e.stage();
        anyhow::Error::new(e).context(format!("{stage} stage failed"))
    })
}

/// Exit status of a process killed by SIGINT.
const EXIT_INTERRUPTED: i32 = 130;

/// Resolves on Ctrl-C. Never resolves if no handler can be installed.
async fn ctrl_c() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar provides the feedback; library INFO logs would
    // tear through it.
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
        let info = with_stage(inspect(&cli.input).await).context("Failed to inspect PDF")?;

        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&info).context("Failed to serialize source info")?
            );
        } else {
            println!("File:          {}", cli.input.display());
            if let Some(ref t) = info.title {
                println!("Title:         {}", t);
            }
            if let Some(ref a) = info.author {
                println!("Author:        {}", a);
            }
            println!("Pages:         {}", info.page_count);
            println!("PDF Version:   {}", info.pdf_version);
            println!("Encrypted:     {}", info.is_encrypted);
            if let Some(ref p) = info.producer {
                println!("Producer:      {}", p);
            }
            if let Some(ref c) = info.creation_date {
                println!("CreationDate:  {}", c);
            }
            if let Some(ref m) = info.modification_date {
                println!("ModDate:       {}", m);
            }
        }
        return Ok(());
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn FlattenProgressCallback>)
    } else {
        None
    };

    let config = with_stage(build_config(&cli, progress_cb))?;
    let request = with_stage(resolve_request(&cli.input, cli.output.clone(), config))?;
    let renderer = Renderer::new(cli.renderer.into(), cli.poppler_path.clone());

    // ── Run ──────────────────────────────────────────────────────────────
    // Ctrl-C while rendering is handled by the pipeline, which kills the
    // renderer and commits nothing. Any later Ctrl-C ends the process with
    // the usual SIGINT status.
    let stats = tokio::select! {
        biased;
        res = flatten_with_cancel(&request, &renderer, ctrl_c()) => with_stage(res)?,
        () = ctrl_c() => {
            eprintln!(
                "Interrupted; {} may be missing or unpatched",
                request.output.display()
            );
            std::process::exit(EXIT_INTERRUPTED);
        }
    };

    if cli.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&stats).context("Failed to serialise stats")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {} pages  {}ms  →  {}",
            green("✔"),
            stats.page_count,
            stats.total_duration_ms,
            bold(&stats.output_path.display().to_string()),
        );
        eprintln!(
            "   {}{}",
            dim(&format!("{} bytes", stats.output_bytes)),
            if stats.metadata_patched {
                format!("  {}", cyan("dates patched"))
            } else {
                String::new()
            },
        );
    }

    Ok(())
}

/// Map CLI args to `FlattenConfig`.
fn build_config(
    cli: &Cli,
    progress: Option<ProgressCallback>,
) -> Result<FlattenConfig, FlattenError> {
    let mut builder = FlattenConfig::builder()
        .dpi(cli.dpi)
        .jpeg_quality(cli.quality)
        .date_zone(if cli.local_time {
            DateZone::Local
        } else {
            DateZone::Utc
        })
        .keep_source_time(cli.keep_source_time)
        .set_file_times(cli.set_file_times);

    if let Some(ref c) = cli.creation_date {
        builder = builder.creation_date(c.clone());
    }
    if let Some(ref m) = cli.modification_date {
        builder = builder.modification_date(m.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build()
}
