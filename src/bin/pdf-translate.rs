//! CLI binary for pdf-translate.
//!
//! A thin shim over the library crate: maps flags onto `PipelineConfig`,
//! wires a filesystem store and the external renderer, and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use futures::stream::{self, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use pdf_translate::{
    input, FsStore, Glossary, ImageRecord, Pipeline, PipelineConfig, ProgressCallback,
    ProviderKind, TranslationProgressCallback, TranslationRequest,
};
use std::collections::HashMap;
use std::io;
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

/// Live progress bar over translation chunks, one log line per chunk.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Extracting…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
        })
    }

    /// Stops the spinner, whichever way the command ended.
    fn finish(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl TranslationProgressCallback for CliProgressCallback {
    fn on_translation_start(&self, total_chunks: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_chunks as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Translating");
        self.bar.reset_eta();
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Translating {total_chunks} chunks…"))
        ));
    }

    fn on_chunk_start(&self, chunk: usize, _total: usize) {
        if let Ok(mut times) = self.start_times.lock() {
            times.insert(chunk, Instant::now());
        }
        self.bar.set_message(format!("chunk {chunk}"));
    }

    fn on_chunk_complete(&self, chunk: usize, total: usize, output_len: usize) {
        let elapsed_ms = self
            .start_times
            .lock()
            .ok()
            .and_then(|mut times| times.remove(&chunk))
            .map(|t| t.elapsed().as_millis())
            .unwrap_or(0);

        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3}  {:<8}  {}",
            green("✓"),
            chunk,
            total,
            dim(&format!("{output_len:>5} chars")),
            dim(&format!("{:.1}s", elapsed_ms as f64 / 1000.0)),
        ));
        self.bar.inc(1);
    }

    fn on_translation_complete(&self, total_chunks: usize) {
        self.bar.finish_and_clear();
        eprintln!(
            "{} {} chunks translated",
            green("✔"),
            bold(&total_chunks.to_string())
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Whole pipeline: PDF → translated PDF in ./out
  pdf-translate run report.pdf --from ko --to en -O out

  # Several documents, two at a time
  pdf-translate run a.pdf b.pdf c.pdf --from en --to ko -j 2

  # Stage by stage
  pdf-translate extract report.pdf -O out
  pdf-translate translate out/report.md --from ko --to en -o out/report_en.md
  pdf-translate render out/report_en.md --manifest out/report.images.json \
      --store out -o report_translated.pdf

  # Enforce terminology
  pdf-translate translate doc.md --from ko --to en --glossary terms.json

  # Without an API key the translation runs offline: each chunk is copied
  # unchanged behind a "[ko→en]" marker.

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY                  OpenAI API key
  ANTHROPIC_API_KEY               Anthropic API key
  PDF_TRANSLATE_PROVIDER          openai (default) or anthropic
  PDF_TRANSLATE_MODEL             Model ID override
  PDF_TRANSLATE_EXTRACTORS        Strategy order, e.g. "layout,table,minimal"
  PDF_TRANSLATE_CHUNK_SIZE        Soft chunk size in characters (default 2000)
  PDF_TRANSLATE_CONTEXT_CHARS     Context carried between chunks (default 200)
  PDF_TRANSLATE_MAX_PAGES         Page limit (default 200)
  PDF_TRANSLATE_MAX_FILE_SIZE_MB  Size limit in MB (default 50)
  PDF_TRANSLATE_RENDERER          HTML→PDF command (default "weasyprint {input} {output}")
  PDFIUM_LIB_PATH                 Directory containing libpdfium
"#;

/// Extract, translate and re-render PDF documents.
#[derive(Parser, Debug)]
#[command(
    name = "pdf-translate",
    version,
    about = "Translate PDF documents through Markdown with an LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    global: GlobalArgs,
}

#[derive(Args, Debug)]
struct GlobalArgs {
    /// LLM provider: openai or anthropic.
    #[arg(long, global = true)]
    provider: Option<String>,

    /// LLM model ID (e.g. gpt-4.1-mini, claude-sonnet-4-20250514).
    #[arg(long, global = true)]
    model: Option<String>,

    /// Soft maximum chunk size in characters.
    #[arg(long, global = true, value_parser = clap::value_parser!(u64).range(1..))]
    chunk_size: Option<u64>,

    /// Characters of the previous translation passed as context.
    #[arg(long, global = true)]
    context_chars: Option<usize>,

    /// Per-chunk LLM call timeout in seconds.
    #[arg(long, global = true)]
    api_timeout: Option<u64>,

    /// HTML→PDF command with {input} and {output} placeholders.
    #[arg(long, global = true)]
    renderer: Option<String>,

    /// Prepend a document metadata header to the Markdown.
    #[arg(long, global = true)]
    metadata: bool,

    /// Disable progress bar.
    #[arg(long, global = true, env = "PDF_TRANSLATE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF_TRANSLATE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF_TRANSLATE_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// PDF → Markdown, stored images, and an image manifest.
    Extract {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        /// Output directory.
        #[arg(short = 'O', long, default_value = ".")]
        out_dir: PathBuf,
    },

    /// Markdown → translated Markdown.
    Translate {
        /// Markdown file to translate.
        input: PathBuf,

        #[command(flatten)]
        langs: LangArgs,

        /// Write the translation here instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Markdown + image manifest → PDF.
    Render {
        /// Translated Markdown file.
        input: PathBuf,

        /// Image manifest written by `extract`.
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Directory image locators are relative to.
        #[arg(long, default_value = ".")]
        store: PathBuf,

        /// Document language for the HTML `lang` attribute.
        #[arg(long, default_value = "en")]
        lang: String,

        /// Title shown in the page header.
        #[arg(long)]
        title: Option<String>,

        /// Output PDF path.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// All stages, for one or more documents.
    Run {
        /// Local PDF file paths or HTTP/HTTPS URLs.
        #[arg(required = true)]
        inputs: Vec<String>,

        #[command(flatten)]
        langs: LangArgs,

        /// Output directory.
        #[arg(short = 'O', long, default_value = ".")]
        out_dir: PathBuf,

        /// Documents processed at the same time.
        #[arg(short, long, default_value_t = 1)]
        jobs: usize,
    },
}

#[derive(Args, Debug, Clone)]
struct LangArgs {
    /// Source language code (ko, en, ja, zh, …).
    #[arg(long = "from")]
    source: String,

    /// Target language code.
    #[arg(long = "to")]
    target: String,

    /// JSON object of source term → target term.
    #[arg(long)]
    glossary: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let Cli { command, global } = Cli::parse();
    let g = &global;

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO logs stay quiet while the progress bar is drawing.
    let show_progress = wants_progress(&command, g);
    let filter = if g.verbose {
        "debug"
    } else if g.quiet || show_progress {
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

    let progress_bar = show_progress.then(CliProgressCallback::new);
    let progress: Option<ProgressCallback> = progress_bar
        .clone()
        .map(|cb| cb as Arc<dyn TranslationProgressCallback>);
    let config = build_config(g, progress)?;
    let download_timeout = config.download_timeout_secs;
    let pipeline = Pipeline::new(config);

    let result = dispatch(command, g, &pipeline, download_timeout).await;
    if let Some(bar) = &progress_bar {
        bar.finish();
    }
    result
}

/// The spinner is only drawn for commands that translate a single document.
fn wants_progress(command: &Command, g: &GlobalArgs) -> bool {
    let translates_one = match command {
        Command::Translate { .. } => true,
        Command::Run { inputs, .. } => inputs.len() == 1,
        Command::Extract { .. } | Command::Render { .. } => false,
    };
    translates_one && !g.quiet && !g.no_progress
}

async fn dispatch(
    command: Command,
    g: &GlobalArgs,
    pipeline: &Pipeline,
    download_timeout: u64,
) -> Result<()> {
    match command {
        Command::Extract { input, out_dir } => {
            let raw = input::resolve_input(&input, download_timeout).await?;
            let stem = stem_of(&raw.filename);
            let store = FsStore::new(&out_dir);
            let output = pipeline
                .extract(raw, &store, &format!("{stem}_images"))
                .await
                .context("Extraction failed")?;

            let md_path = out_dir.join(format!("{stem}.md"));
            let manifest_path = out_dir.join(format!("{stem}.images.json"));
            write_file(&md_path, output.markdown.as_bytes()).await?;
            write_manifest(&manifest_path, &output.images).await?;

            if !g.quiet {
                eprintln!(
                    "{}  {} pages, {} images via '{}'  →  {}",
                    green("✔"),
                    output.total_pages,
                    output.images.len(),
                    output.extractor,
                    bold(&md_path.display().to_string()),
                );
            }
        }

        Command::Translate {
            input,
            langs,
            output,
        } => {
            let markdown = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let request = build_request(&langs).await?;
            let translated = pipeline
                .translate(&markdown, &request)
                .await
                .context("Translation failed")?;

            match output {
                Some(path) => write_file(&path, translated.as_bytes()).await?,
                None => println!("{translated}"),
            }
        }

        Command::Render {
            input,
            manifest,
            store,
            lang,
            title,
            output,
        } => {
            let markdown = tokio::fs::read_to_string(&input)
                .await
                .with_context(|| format!("Failed to read {}", input.display()))?;
            let records: Vec<ImageRecord> = match manifest {
                Some(path) => {
                    let json = tokio::fs::read_to_string(&path)
                        .await
                        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
                    serde_json::from_str(&json).context("Invalid image manifest")?
                }
                None => Vec::new(),
            };
            let store = FsStore::new(store);
            let title = title.unwrap_or_else(|| stem_of(&input.to_string_lossy()));
            let pdf = pipeline
                .render(&markdown, Some(&title), &lang, &records, &store)
                .await
                .context("Rendering failed")?;
            write_file(&output, &pdf).await?;

            if !g.quiet {
                eprintln!(
                    "{}  {} bytes  →  {}",
                    green("✔"),
                    pdf.len(),
                    bold(&output.display().to_string())
                );
            }
        }

        Command::Run {
            inputs,
            langs,
            out_dir,
            jobs,
        } => {
            let request = build_request(&langs).await?;
            let store = FsStore::new(&out_dir);
            let (store, request, out_dir) = (&store, &request, &out_dir);

            let results: Vec<(String, Result<PathBuf>)> = stream::iter(inputs)
                .map(|input| async move {
                    let result = run_one(pipeline, &input, request, store, out_dir, download_timeout).await;
                    (input, result)
                })
                .buffer_unordered(jobs.max(1))
                .collect()
                .await;

            let mut failed = 0;
            for (input, result) in &results {
                match result {
                    Ok(path) => {
                        if !g.quiet {
                            eprintln!("{}  {}  →  {}", green("✔"), input, bold(&path.display().to_string()));
                        }
                    }
                    Err(e) => {
                        failed += 1;
                        eprintln!("{}  {}  {}", red("✘"), input, red(&format!("{e:#}")));
                    }
                }
            }
            if failed > 0 {
                anyhow::bail!("{failed}/{} documents failed", results.len());
            }
        }
    }

    Ok(())
}

/// Extract, translate and render one input, writing everything to `out_dir`.
async fn run_one(
    pipeline: &Pipeline,
    input: &str,
    request: &TranslationRequest,
    store: &FsStore,
    out_dir: &Path,
    download_timeout: u64,
) -> Result<PathBuf> {
    let raw = input::resolve_input(input, download_timeout).await?;
    let stem = stem_of(&raw.filename);
    let request = request.clone().with_folder(format!("{stem}_images"));

    let output = pipeline
        .run(raw, &request, store)
        .await
        .with_context(|| format!("Failed to translate {input}"))?;

    write_file(&out_dir.join(format!("{stem}.md")), output.source_markdown.as_bytes()).await?;
    write_file(
        &out_dir.join(format!("{stem}_{}.md", request.target_lang)),
        output.translated_markdown.as_bytes(),
    )
    .await?;
    write_manifest(&out_dir.join(format!("{stem}.images.json")), &output.images).await?;

    let pdf_path = out_dir.join(&output.filename);
    write_file(&pdf_path, &output.pdf).await?;

    tracing::info!(
        "{}: {} pages, {} images, {}ms ({}ms translating)",
        input,
        output.stats.total_pages,
        output.stats.image_count,
        output.stats.total_duration_ms,
        output.stats.translate_duration_ms
    );
    Ok(pdf_path)
}

/// Environment first, then flags on top.
fn build_config(g: &GlobalArgs, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let mut config = PipelineConfig::from_env().context("Invalid configuration")?;

    if let Some(ref name) = g.provider {
        let provider: ProviderKind = name.parse()?;
        if provider != config.provider {
            config.provider = provider;
            config.api_key = std::env::var(provider.api_key_var())
                .ok()
                .filter(|k| !k.trim().is_empty());
        }
    }
    if let Some(ref model) = g.model {
        config.model = Some(model.clone());
    }
    if let Some(n) = g.chunk_size {
        config.chunk_size = n as usize;
    }
    if let Some(n) = g.context_chars {
        config.context_chars = n;
    }
    if let Some(secs) = g.api_timeout {
        config.api_timeout_secs = secs;
    }
    if let Some(ref cmd) = g.renderer {
        if !cmd.contains("{input}") || !cmd.contains("{output}") {
            anyhow::bail!("--renderer must contain {{input}} and {{output}}, got '{cmd}'");
        }
        config.renderer_command = cmd.clone();
    }
    if g.metadata {
        config.include_metadata = true;
    }
    config.progress_callback = progress;

    Ok(config)
}

async fn build_request(langs: &LangArgs) -> Result<TranslationRequest> {
    let mut request = TranslationRequest::new(&langs.source, &langs.target);
    if let Some(ref path) = langs.glossary {
        let json = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read glossary {}", path.display()))?;
        let glossary: Glossary =
            serde_json::from_str(&json).context("Glossary must be a JSON object of strings")?;
        request = request.with_glossary(glossary);
    }
    Ok(request)
}

async fn write_manifest(path: &Path, images: &[ImageRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(images).context("Failed to serialise manifest")?;
    write_file(path, json.as_bytes()).await
}

/// Atomic write: temp file next to the target, then rename.
async fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    Ok(pdf_translate::pipeline::write_output(path, bytes).await?)
}

fn stem_of(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}
