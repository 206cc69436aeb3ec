//! End-to-end tests against real PDFs, a live LLM and the configured renderer.
//!
//! Gated behind `E2E_ENABLED` so they never run in CI by accident. They also
//! need pdfium on the library path and `OPENAI_API_KEY` (or
//! `PDF_TRANSLATE_PROVIDER=anthropic` plus `ANTHROPIC_API_KEY`).
//!
//! Run with:
//!   E2E_ENABLED=1 DYLD_LIBRARY_PATH=. cargo test --test e2e -- --nocapture

use pdf_translate::{input, FsStore, Pipeline, PipelineConfig, TranslationRequest};
use std::path::PathBuf;

fn test_cases_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases")
}

/// Skip this test if E2E_ENABLED is not set *or* no PDF file at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — test file not found: {}", p.display());
            return;
        }
        p
    }};
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pdf_translate=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

#[tokio::test]
async fn test_extract_real_pdf() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("korean_lecture.pdf"));
    init_tracing();

    let out_dir = tempfile::tempdir().unwrap();
    let store = FsStore::new(out_dir.path());
    let pipeline = Pipeline::new(PipelineConfig::from_env().unwrap());

    let raw = input::resolve_input(path.to_str().unwrap(), 60).await.unwrap();
    let out = pipeline.extract(raw, &store, "images").await.unwrap();

    println!("extractor={} pages={} images={}", out.extractor, out.total_pages, out.images.len());
    assert!(out.total_pages > 0);
    assert!(out.markdown.starts_with("# Page 1\n"));
    assert!(!out.markdown.contains("IMAGE_PLACEHOLDER"));
    for record in &out.images {
        assert!(out_dir.path().join(&record.locator).exists());
    }
}

#[tokio::test]
async fn test_translate_and_render_real_pdf() {
    let path = e2e_skip_unless_ready!(test_cases_dir().join("korean_lecture.pdf"));
    init_tracing();

    let config = PipelineConfig::from_env().unwrap();
    if config.api_key.is_none() {
        println!("SKIP — no API key in the environment");
        return;
    }

    let out_dir = tempfile::tempdir().unwrap();
    let store = FsStore::new(out_dir.path());
    let pipeline = Pipeline::new(config);

    let raw = input::resolve_input(path.to_str().unwrap(), 60).await.unwrap();
    let out = pipeline
        .run(raw, &TranslationRequest::new("ko", "en"), &store)
        .await
        .unwrap();

    println!("{:#?}", out.stats);
    assert_eq!(out.filename, "korean_lecture_translated.pdf");
    assert!(out.translated_markdown.contains("# Page 1"));
    assert!(!out.translated_markdown.contains("[ko→en]"));
    assert!(out.pdf.starts_with(b"%PDF"));

    std::fs::write(out_dir.path().join(&out.filename), &out.pdf).unwrap();
}
