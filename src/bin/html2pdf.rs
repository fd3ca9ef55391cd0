//! CLI binary for edgequake-html2pdf.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ProcessorConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_html2pdf::pipeline::input;
use edgequake_html2pdf::{
    DownloadOutcome, HtmlProcessor, ImageReference, Orientation, PageSize, ProcessError,
    ProcessObserver, ProcessReport, ProcessorConfig, ProgressCallback, RunOptions,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress observer using indicatif ────────────────────────────────────

/// Terminal observer: a live progress bar plus one log line per settled
/// image. Images settle in completion order, so the lines carry the
/// discovery index.
struct CliProgressObserver {
    bar: ProgressBar,
}

impl CliProgressObserver {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Scanning HTML…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} images  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Fetching");
    }
}

impl ProcessObserver for CliProgressObserver {
    fn on_run_start(&self, total_images: usize) {
        self.activate_bar(total_images);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Fetching {total_images} images…"))
        ));
    }

    fn on_image_complete(&self, reference: &ImageReference, outcome: &DownloadOutcome) {
        let line = match outcome {
            DownloadOutcome::Failed { url, error } => format!(
                "  {} #{:<4} {}  {}",
                red("✗"),
                reference.index,
                truncate(url, 60),
                red(&error.to_string()),
            ),
            DownloadOutcome::Saved { path, .. } => format!(
                "  {} #{:<4} {}  {}",
                green("✓"),
                reference.index,
                truncate(reference.url.as_str(), 60),
                dim(&path.display().to_string()),
            ),
            DownloadOutcome::Fetched { bytes, .. } => format!(
                "  {} #{:<4} {}  {}",
                green("✓"),
                reference.index,
                truncate(reference.url.as_str(), 60),
                dim(&format!("{bytes} bytes")),
            ),
        };
        self.bar.println(line);
    }

    fn on_progress(&self, completed: usize, _total: usize) {
        self.bar.set_position(completed as u64);
    }

    fn on_assembly_start(&self, saved_images: usize) {
        self.bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        self.bar.set_prefix("Assembling");
        self.bar
            .set_message(format!("{saved_images} images → PDF pages"));
    }

    fn on_completed(&self, report: &ProcessReport) {
        self.bar.finish_and_clear();
        let stats = &report.stats;
        if report.failed_urls.is_empty() {
            eprintln!(
                "{} {} images fetched",
                green("✔"),
                bold(&stats.total_images.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} images fetched  ({} failed)",
                cyan("⚠"),
                bold(&(stats.total_images - stats.failed_images).to_string()),
                stats.total_images,
                red(&stats.failed_images.to_string()),
            );
        }
    }

    // The error itself is printed once by `main` on exit.
    fn on_failed(&self, _error: &ProcessError) {
        self.bar.finish_and_clear();
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
  # Local page; images resolve relative to the file
  html2pdf gallery.html

  # Download a page and write the PDF elsewhere
  html2pdf https://example.com/chapter-1.html -o chapter-1.pdf

  # Page from stdin needs an explicit base URL
  curl -s https://example.com/a.html | html2pdf - --base-url https://example.com/

  # Only download the images
  html2pdf gallery.html --no-pdf --images-dir ./scans

  # Letter paper, portrait, at most 4 downloads at a time
  html2pdf gallery.html --page-size letter --portrait --max-concurrent 4

  # Machine-readable report
  html2pdf gallery.html --json > report.json

OUTPUT:
  Images are written as image_{index}.{ext} in discovery order, with the
  extension chosen from the Content-Type (png, gif, bmp, webp, else jpg).
  The PDF holds one page per image that could be fetched and decoded.

ENVIRONMENT VARIABLES:
  RUST_LOG                Override the log filter (e.g. edgequake_html2pdf=debug)
  HTML2PDF_*              Every flag has an env var; see --help for names
"#;

/// Download every image referenced by an HTML page and bind them into a PDF.
#[derive(Parser, Debug)]
#[command(
    name = "html2pdf",
    version,
    about = "Download every image referenced by an HTML page and bind them into a PDF",
    long_about = "Scan an HTML page for <img src> references, download every image \
concurrently, save them in page order and compose them into a PDF with one \
centered, aspect-preserving image per page. Failed downloads are listed by URL.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Local HTML file, `-` for stdin, or an HTTP/HTTPS page URL.
    input: String,

    /// Resolve relative image sources against this URL instead of the
    /// input's own location.
    #[arg(long, env = "HTML2PDF_BASE_URL")]
    base_url: Option<String>,

    /// Write the PDF to this file.
    #[arg(short, long, env = "HTML2PDF_OUTPUT", default_value = "output.pdf")]
    output: PathBuf,

    /// Directory for downloaded images.
    #[arg(long, env = "HTML2PDF_IMAGES_DIR", default_value = "images")]
    images_dir: PathBuf,

    /// Only has an effect together with `--no-pdf`: the PDF is built from
    /// the saved files, so images are still written to the images
    /// directory (and left there) whenever a PDF is generated.
    #[arg(long, env = "HTML2PDF_NO_SAVE_IMAGES")]
    no_save_images: bool,

    /// Skip PDF generation.
    #[arg(long, env = "HTML2PDF_NO_PDF")]
    no_pdf: bool,

    /// Paper size.
    #[arg(long, env = "HTML2PDF_PAGE_SIZE", value_enum, default_value = "a4")]
    page_size: PageSizeArg,

    /// Portrait pages instead of landscape.
    #[arg(long, env = "HTML2PDF_PORTRAIT")]
    portrait: bool,

    /// Layout resolution (72–600).
    #[arg(long, env = "HTML2PDF_DPI", default_value_t = 150,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Per-request timeout in seconds for pages and images.
    #[arg(long, env = "HTML2PDF_TIMEOUT", default_value_t = 30,
          value_parser = clap::value_parser!(u64).range(1..))]
    timeout: u64,

    /// Maximum simultaneous image downloads (default: unlimited).
    #[arg(long, env = "HTML2PDF_MAX_CONCURRENT")]
    max_concurrent: Option<usize>,

    /// Print the run report as JSON on stdout.
    #[arg(long, env = "HTML2PDF_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "HTML2PDF_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "HTML2PDF_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "HTML2PDF_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum PageSizeArg {
    A3,
    A4,
    Letter,
    Legal,
}

impl From<PageSizeArg> for PageSize {
    fn from(v: PageSizeArg) -> Self {
        match v {
            PageSizeArg::A3 => PageSize::A3,
            PageSizeArg::A4 => PageSize::A4,
            PageSizeArg::Letter => PageSize::Letter,
            PageSizeArg::Legal => PageSize::Legal,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO-level library logs would tear the progress bar, so they are
    // suppressed while it is active.
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

    // ── Resolve input ────────────────────────────────────────────────────
    let resolved = input::resolve_input(&cli.input, cli.timeout)
        .await
        .with_context(|| format!("Failed to read HTML from '{}'", cli.input))?;

    let base_url = match cli.base_url {
        Some(ref raw) => input::parse_base_url(raw).context("Invalid --base-url")?,
        None => resolved
            .base_url
            .clone()
            .context("HTML from stdin needs --base-url to resolve image sources")?,
    };

    // ── Build config ─────────────────────────────────────────────────────
    let observer: Option<ProgressCallback> = if show_progress {
        Some(CliProgressObserver::new() as Arc<dyn ProcessObserver>)
    } else {
        None
    };
    let config = build_config(&cli, observer)?;
    let options = RunOptions::new(!cli.no_save_images, !cli.no_pdf);

    // ── Run ──────────────────────────────────────────────────────────────
    let report = HtmlProcessor::new(config)
        .process(resolved.html, &base_url, options)
        .wait()
        .await
        .context("Processing failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
        return Ok(());
    }

    if !cli.quiet {
        // The observer already printed per-image lines when active.
        if !show_progress {
            eprintln!(
                "Fetched {}/{} images in {}ms",
                report.stats.total_images - report.stats.failed_images,
                report.stats.total_images,
                report.stats.fetch_duration_ms
            );
            for url in &report.failed_urls {
                eprintln!("  failed: {url}");
            }
        }
        if let Some(ref pdf) = report.pdf_path {
            eprintln!(
                "{}  {} pages  {}ms  →  {}",
                green("✔"),
                report.stats.pages_written,
                report.stats.total_duration_ms,
                bold(&pdf.display().to_string()),
            );
            if report.stats.skipped_images > 0 {
                eprintln!(
                    "   {}",
                    dim(&format!(
                        "{} saved images could not be decoded and were skipped",
                        report.stats.skipped_images
                    ))
                );
            }
        }
    }

    Ok(())
}

/// Map CLI args to `ProcessorConfig`.
fn build_config(cli: &Cli, observer: Option<ProgressCallback>) -> Result<ProcessorConfig> {
    let orientation = if cli.portrait {
        Orientation::Portrait
    } else {
        Orientation::Landscape
    };

    let mut builder = ProcessorConfig::builder()
        .output_dir(&cli.images_dir)
        .pdf_path(&cli.output)
        .page_size(cli.page_size.clone().into())
        .orientation(orientation)
        .dpi(cli.dpi)
        .fetch_timeout_secs(cli.timeout);

    if let Some(n) = cli.max_concurrent {
        builder = builder.max_concurrent_fetches(n);
    }
    if let Some(cb) = observer {
        builder = builder.observer(cb);
    }

    builder.build().context("Invalid configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn no_save_images_help_mentions_no_pdf() {
        let cmd = Cli::command();
        let arg = cmd
            .get_arguments()
            .find(|a| a.get_id() == "no_save_images")
            .unwrap();
        let help = arg.get_help().unwrap().to_string();
        assert!(help.contains("--no-pdf"), "help: {help}");
    }

    #[test]
    fn failure_only_clears_the_bar() {
        let observer = CliProgressObserver {
            bar: ProgressBar::hidden(),
        };
        observer.on_failed(&ProcessError::NoImagesFound);
        assert!(observer.bar.is_finished());
    }
}
