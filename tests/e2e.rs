//! End-to-end integration tests for pdf-flatten.
//!
//! These tests run the real Ghostscript (and ImageMagick, when installed)
//! on small PDFs generated on the fly. They are gated behind the
//! `E2E_ENABLED` environment variable so they do not run in CI unless
//! explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 cargo test --test e2e -- --nocapture
//!
//! To restrict to a specific test:
//!   E2E_ENABLED=1 cargo test --test e2e test_raster_pass -- --nocapture

use pdf_flatten::{
    flatten_file, flatten_path, verify, AssemblerSelection, FlattenConfig, RasterOutcome,
    RasterPass,
};
use std::path::{Path, PathBuf};

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test if E2E_ENABLED is not set *or* Ghostscript is missing.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP: set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        if engine_probe::locate_ghostscript().is_err() {
            println!("SKIP: Ghostscript not found on PATH (or FLATTEN_GS_PATH)");
            return;
        }
        let _ = tracing_subscriber::fmt()
            .with_env_filter("pdf_flatten=debug")
            .with_test_writer()
            .try_init();
    }};
}

/// Build a small, valid PDF with `pages` letter-size pages.
///
/// Each page shows a line of text. With `redaction_bar`, a black rectangle
/// is drawn over the text as a separate vector object, the way a careless
/// redaction looks.
fn write_pdf(path: &Path, pages: usize, redaction_bar: bool) {
    let mut objects: Vec<String> = Vec::new();
    // 1: catalog, 2: pages, 3: font; then (page, content) pairs.
    let kids: Vec<String> = (0..pages).map(|i| format!("{} 0 R", 4 + 2 * i)).collect();
    objects.push("<< /Type /Catalog /Pages 2 0 R >>".into());
    objects.push(format!(
        "<< /Type /Pages /Kids [{}] /Count {} >>",
        kids.join(" "),
        pages
    ));
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".into());

    for i in 0..pages {
        let page_obj = 4 + 2 * i;
        let content_obj = page_obj + 1;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {content_obj} 0 R >>"
        ));
        let mut stream = format!("BT /F1 24 Tf 72 700 Td (Secret account {}) Tj ET\n", i + 1);
        if redaction_bar {
            stream.push_str("0 0 0 rg 66 690 320 36 re f\n");
        }
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}endstream",
            stream.len(),
            stream
        ));
    }

    let mut pdf = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(pdf.len());
        pdf.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }
    let xref = pdf.len();
    pdf.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        pdf.push_str(&format!("{offset:010} 00000 n \n"));
    }
    pdf.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref
    ));
    std::fs::write(path, pdf).unwrap();
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

fn assert_is_pdf(path: &Path, context: &str) {
    let bytes = std::fs::read(path).unwrap_or_else(|e| panic!("[{context}] read failed: {e}"));
    assert!(bytes.starts_with(b"%PDF-"), "[{context}] not a PDF");
    assert!(contains(&bytes, b"%%EOF"), "[{context}] truncated PDF");
    println!("[{context}] ✓  {} bytes", bytes.len());
}

fn leftovers(dir: &Path) -> Vec<PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            let name = p.file_name().unwrap().to_string_lossy();
            name.contains("_temp_") || name.contains("_second_pass_") || name.starts_with("temp_png_")
        })
        .collect()
}

fn config(replace: bool, raster: RasterPass) -> FlattenConfig {
    FlattenConfig::builder()
        .replace(replace)
        .raster_pass(raster)
        .engine_timeout_secs(Some(120))
        .build()
        .unwrap()
}

// ── Probe ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_probe_reports_real_ghostscript() {
    e2e_skip_unless_ready!();

    let tools = verify(&config(false, RasterPass::Never))
        .await
        .expect("verify() should succeed with a real Ghostscript");

    assert!(tools.ghostscript_version.contains('.'));
    println!("Tools: {tools:?}");
}

// ── Vector flatten ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_copy_mode_writes_sibling() {
    e2e_skip_unless_ready!();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("letter.pdf");
    write_pdf(&input, 2, false);
    let original = std::fs::read(&input).unwrap();

    let report = flatten_file(&input, &config(false, RasterPass::Never))
        .await
        .expect("flatten_file() should succeed");

    assert_eq!(report.output, dir.path().join("letter_flattened.pdf"));
    assert_is_pdf(&report.output, "copy");
    assert_eq!(std::fs::read(&input).unwrap(), original);
    assert!(leftovers(dir.path()).is_empty());
}

#[tokio::test]
async fn test_replace_mode_single_file() {
    e2e_skip_unless_ready!();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("doc.pdf");
    write_pdf(&input, 3, false);

    let report = flatten_file(&input, &config(true, RasterPass::Never))
        .await
        .expect("flatten_file() should succeed");

    assert!(report.replaced);
    assert_is_pdf(&input, "replace");
    let names: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .collect();
    assert_eq!(names, ["doc.pdf"]);
}

#[tokio::test]
async fn test_folder_aborts_on_invalid_pdf() {
    e2e_skip_unless_ready!();
    let dir = tempfile::tempdir().unwrap();
    write_pdf(&dir.path().join("a.pdf"), 3, false);
    std::fs::write(dir.path().join("b.pdf"), b"").unwrap();

    let result = flatten_path(dir.path(), &config(false, RasterPass::Never)).await;

    assert!(result.is_err(), "zero-byte b.pdf must fail the run");
    assert_is_pdf(&dir.path().join("a_flattened.pdf"), "folder a");
    assert!(!dir.path().join("b_flattened.pdf").exists());
    assert_eq!(std::fs::metadata(dir.path().join("b.pdf")).unwrap().len(), 0);
}

#[tokio::test]
async fn test_reflatten_is_stable() {
    e2e_skip_unless_ready!();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("twice.pdf");
    write_pdf(&input, 1, false);
    let cfg = config(true, RasterPass::Never);

    flatten_file(&input, &cfg).await.expect("first pass");
    flatten_file(&input, &cfg).await.expect("second pass");

    assert_is_pdf(&input, "reflatten");
    assert!(leftovers(dir.path()).is_empty());
}

// ── Raster pass ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_raster_pass_turns_redaction_into_image() {
    e2e_skip_unless_ready!();
    if engine_probe::locate_image_assembler().is_none() {
        println!("SKIP: ImageMagick (magick or convert) not found");
        return;
    }
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("redacted.pdf");
    write_pdf(&input, 2, true);

    let report = flatten_file(&input, &config(true, RasterPass::Always))
        .await
        .expect("flatten_file() should succeed");

    match &report.raster {
        RasterOutcome::Applied { pages, assembler } => {
            assert_eq!(*pages, 2);
            println!("assembled with {assembler}");
        }
        other => panic!("raster pass did not apply: {other:?}"),
    }
    let bytes = std::fs::read(&input).unwrap();
    assert!(bytes.starts_with(b"%PDF-"));
    assert!(contains(&bytes, b"/Image"), "pages should be embedded images");
    assert!(
        !contains(&bytes, b"Secret account"),
        "no text should survive beneath the redaction bar"
    );
    assert!(leftovers(dir.path()).is_empty());
}

#[tokio::test]
async fn test_raster_pass_ghostscript_assembly() {
    e2e_skip_unless_ready!();
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("gs_only.pdf");
    write_pdf(&input, 1, true);

    let cfg = FlattenConfig::builder()
        .raster_pass(RasterPass::Always)
        .assembler(AssemblerSelection::Ghostscript)
        .engine_timeout_secs(Some(120))
        .build()
        .unwrap();
    let report = flatten_file(&input, &cfg)
        .await
        .expect("a failed raster pass is still a successful flatten");

    // Ghostscript's own image assembly depends on its build; either outcome
    // must leave a valid PDF and no scratch files.
    println!("raster outcome: {:?}", report.raster);
    assert_is_pdf(&report.output, "gs assembly");
    assert!(leftovers(dir.path()).is_empty());
}
