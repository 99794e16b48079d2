//! CLI binary for pdf-flatten.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `FlattenConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use pdf_flatten::{
    flatten_path, verify, AssemblerSelection, DocumentReport, ErrorPolicy, FlattenConfig,
    FlattenProgressCallback, ProgressCallback, RasterOutcome, RasterPass,
};
use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
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

// ── CLI progress callback ────────────────────────────────────────────────────

/// Terminal progress callback: one status line per event on stderr.
///
/// No progress bar: Ghostscript writes its own output to the same terminal
/// while a document is being flattened.
#[derive(Default)]
struct CliProgressCallback {
    warnings: AtomicUsize,
}

impl FlattenProgressCallback for CliProgressCallback {
    fn on_run_start(&self, total_documents: usize) {
        eprintln!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Flattening {total_documents} PDF file(s)…"))
        );
    }

    fn on_document_start(&self, index: usize, total: usize, input: &Path, output: &Path) {
        eprintln!(
            "\n{} Flattening: {} -> {}",
            dim(&format!("[{index}/{total}]")),
            input.display(),
            output.display()
        );
    }

    fn on_fallback_warning(&self, input: &Path, warning: &str) {
        self.warnings.fetch_add(1, Ordering::SeqCst);
        eprintln!(
            "  {} Raster pass failed for {}, vector flattening kept: {}",
            yellow("⚠"),
            input.display(),
            warning
        );
    }

    fn on_document_complete(&self, _index: usize, _total: usize, report: &DocumentReport) {
        let raster = match &report.raster {
            RasterOutcome::Applied { pages, assembler } => {
                format!("  rasterised {pages} page(s) via {assembler}")
            }
            _ => String::new(),
        };
        eprintln!(
            "  {} Successfully flattened: {}  {}{}",
            green("✓"),
            report.output.display(),
            dim(&format!("{:.1}s", report.duration_ms as f64 / 1000.0)),
            dim(&raster),
        );
    }

    fn on_document_error(&self, _index: usize, _total: usize, input: &Path, error: &str) {
        eprintln!("  {} {}: {}", red("✗"), input.display(), red(error));
    }

    fn on_run_complete(&self, total: usize, succeeded: usize) {
        let failed = total.saturating_sub(succeeded);
        let warnings = self.warnings.load(Ordering::SeqCst);

        if failed == 0 && warnings == 0 {
            eprintln!(
                "\n{} {} file(s) flattened successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "\n{} {}/{} file(s) flattened  ({} failed, {} raster warning(s))",
                if failed == total && total > 0 {
                    red("✘")
                } else {
                    yellow("⚠")
                },
                bold(&succeeded.to_string()),
                total,
                red(&failed.to_string()),
                warnings,
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Flatten one file, writing report_flattened.pdf next to it
  pdfflatten report.pdf

  # Flatten every PDF under a folder, overwriting the originals
  pdfflatten ~/scans -replace

  # Force the rasterise-and-reassemble pass on any OS, at 300 DPI
  pdfflatten --raster-pass always --dpi 300 redacted.pdf

  # Keep going after a failed document and print a JSON summary
  pdfflatten --keep-going --json ~/scans > summary.json

  # Check that Ghostscript (and optionally ImageMagick) are usable
  pdfflatten --check

ENGINES:
  Ghostscript   required   vector flatten, rasterisation, fallback assembly
  ImageMagick   optional   preferred page-image assembly (magick, then convert)

ENVIRONMENT VARIABLES:
  FLATTEN_GS_PATH        Ghostscript executable (skips the PATH search)
  FLATTEN_MAGICK_PATH    ImageMagick executable (skips the PATH search)
  RUST_LOG               Override log filter (e.g. pdf_flatten=debug)
"#;

/// Flatten PDF forms, annotations and redactions into static page content.
#[derive(Parser, Debug)]
#[command(
    name = "pdfflatten",
    version,
    about = "Flatten PDF forms, annotations and redactions into static page content",
    long_about = "Flatten a PDF file, or every PDF under a folder, with Ghostscript so that \
form fields, annotations and redaction marks become part of the page. An optional second pass \
rasterises every page and reassembles the images, so nothing drawn beneath a redaction bar \
survives.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file or folder to flatten.
    #[arg(required_unless_present = "check")]
    path: Option<PathBuf>,

    /// Overwrite originals in place (also accepted as `-replace`).
    #[arg(long, env = "PDFFLATTEN_REPLACE")]
    replace: bool,

    /// When to run the rasterise-and-reassemble pass.
    #[arg(long, env = "PDFFLATTEN_RASTER_PASS", value_enum, default_value = "auto")]
    raster_pass: RasterPassArg,

    /// Rasterisation DPI for the raster pass (200–600).
    #[arg(long, env = "PDFFLATTEN_DPI", default_value_t = 200,
          value_parser = clap::value_parser!(u32).range(200..=600))]
    dpi: u32,

    /// Engine that reassembles page images into a PDF.
    #[arg(long, env = "PDFFLATTEN_ASSEMBLER", value_enum, default_value = "auto")]
    assembler: AssemblerArg,

    /// Ghostscript executable to use.
    #[arg(long = "gs", env = "PDFFLATTEN_GS", value_name = "PATH")]
    ghostscript: Option<PathBuf>,

    /// Kill any engine invocation running longer than this many seconds.
    #[arg(long, env = "PDFFLATTEN_TIMEOUT", default_value_t = 1800,
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Let engine invocations run without a time limit.
    #[arg(long, env = "PDFFLATTEN_NO_TIMEOUT")]
    no_timeout: bool,

    /// Record failed documents and continue with the rest of the folder.
    #[arg(long, env = "PDFFLATTEN_KEEP_GOING")]
    keep_going: bool,

    /// Print the run summary as JSON on stdout.
    #[arg(long, env = "PDFFLATTEN_JSON")]
    json: bool,

    /// Verify the engines and exit without flattening anything.
    #[arg(long)]
    check: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFFLATTEN_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFFLATTEN_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum RasterPassArg {
    Auto,
    Always,
    Never,
}

impl From<RasterPassArg> for RasterPass {
    fn from(v: RasterPassArg) -> Self {
        match v {
            RasterPassArg::Auto => RasterPass::Auto,
            RasterPassArg::Always => RasterPass::Always,
            RasterPassArg::Never => RasterPass::Never,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum AssemblerArg {
    Auto,
    Magick,
    Convert,
    Ghostscript,
}

/// Accept the historical single-dash `-replace` token.
fn normalise_args(args: impl IntoIterator<Item = OsString>) -> Vec<OsString> {
    args.into_iter()
        .map(|arg| {
            if arg == "-replace" {
                OsString::from("--replace")
            } else {
                arg
            }
        })
        .collect()
}

#[tokio::main]
async fn main() -> Result<()> {
    // Usage errors exit with 1; --help and --version exit with 0.
    let cli = match Cli::try_parse_from(normalise_args(std::env::args_os())) {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            std::process::exit(1);
        }
        Err(e) => e.exit(),
    };

    // ── Logging setup ────────────────────────────────────────────────────
    // Status lines from the progress callback replace INFO-level library
    // logs unless --verbose asks for everything.
    let show_status = !cli.quiet && !cli.json && !cli.check;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_status {
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

    let progress_cb: Option<ProgressCallback> = if show_status {
        Some(Arc::new(CliProgressCallback::default()) as Arc<dyn FlattenProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;

    // ── Check-only mode ──────────────────────────────────────────────────
    if cli.check {
        let tools = verify(&config).await.context("Engine check failed")?;
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&tools).context("Failed to serialise report")?
            );
        } else {
            println!(
                "Ghostscript:  {} ({})",
                tools.ghostscript_version,
                tools.ghostscript.display()
            );
            match (&tools.assembler, &tools.assembler_path) {
                (Some(name), Some(path)) => println!("Assembler:    {} ({})", name, path.display()),
                _ => println!("Assembler:    ghostscript list-file (ImageMagick not found)"),
            }
            println!(
                "Raster pass:  {}",
                if config.raster_pass.enabled() { "on" } else { "off" }
            );
        }
        return Ok(());
    }

    let path = cli.path.as_deref().context("No PDF file or folder given")?;

    if config.replace && !cli.quiet {
        eprintln!(
            "{}  Replace mode enabled: original files will be overwritten",
            yellow("⚠")
        );
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let summary = flatten_path(path, &config)
        .await
        .with_context(|| format!("Failed to flatten {}", path.display()))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?;
        println!("{json}");
    } else if !cli.quiet && !show_status {
        eprintln!(
            "Flattened {}/{} file(s) in {}ms",
            summary.succeeded(),
            summary.discovered,
            summary.total_duration_ms
        );
    }

    if summary.failed() > 0 {
        anyhow::bail!(
            "{} of {} file(s) could not be flattened",
            summary.failed(),
            summary.discovered
        );
    }

    Ok(())
}

/// Map CLI args to `FlattenConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<FlattenConfig> {
    let mut builder = FlattenConfig::builder()
        .replace(cli.replace)
        .raster_pass(cli.raster_pass.into())
        .dpi(cli.dpi)
        .assembler(assembler_selection(cli.assembler)?)
        .engine_timeout_secs(if cli.no_timeout {
            None
        } else {
            Some(cli.timeout)
        })
        .error_policy(if cli.keep_going {
            ErrorPolicy::Continue
        } else {
            ErrorPolicy::Abort
        });

    if let Some(ref gs) = cli.ghostscript {
        builder = builder.ghostscript(gs);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Resolve `--assembler` into a concrete selection.
fn assembler_selection(arg: AssemblerArg) -> Result<AssemblerSelection> {
    let find = |name: &str| {
        engine_probe::find_executable(name)
            .with_context(|| format!("--assembler {name}: '{name}' was not found on PATH"))
    };
    Ok(match arg {
        AssemblerArg::Auto => AssemblerSelection::Auto,
        AssemblerArg::Magick => AssemblerSelection::Magick(find("magick")?),
        AssemblerArg::Convert => AssemblerSelection::LegacyConvert(find("convert")?),
        AssemblerArg::Ghostscript => AssemblerSelection::Ghostscript,
    })
}
