//! Raster pass: rasterise every page, then reassemble the images into a PDF.
//!
//! Nothing that was vector content survives this pass, so redaction bars
//! drawn as vector overlays can no longer be lifted off the page. Every
//! failure here is a [`FallbackError`]: the caller keeps the
//! vector-flattened result it already has.
//!
//! Page images live in a scratch directory created with `tempfile` next to
//! the document. It is removed on every exit path, including early returns
//! and panics (via `TempDir`'s `Drop`).

use crate::config::{AssemblerSelection, FlattenConfig};
use crate::engine::{EngineJob, EngineOutput, Engines};
use crate::error::{EngineError, FallbackError};
use crate::pipeline::commit::{discard, inspect_artifact, ArtifactState};
use crate::pipeline::plan::OutputPlan;
use engine_probe::ImageAssembler;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use tracing::{debug, info, warn};

/// Ghostscript output template for page images. Zero padding keeps the
/// lexicographic order equal to page order up to 99 999 pages.
pub const PAGE_TEMPLATE: &str = "page-%05d.png";

/// Name of the image list handed to Ghostscript as `@pnglist.txt`.
pub const LIST_FILE: &str = "pnglist.txt";

/// Label used in reports when Ghostscript assembled the pages.
pub const GHOSTSCRIPT_LABEL: &str = "ghostscript";

/// A successful raster pass.
#[derive(Debug)]
pub struct RasterSummary {
    pub pages: usize,
    /// Which engine reassembled the pages.
    pub assembler: String,
    /// The verified, reassembled PDF. Removed if dropped uncommitted.
    pub output: TempPath,
}

/// Resolve the assembler selection into a dedicated image assembler, if any.
///
/// `None` means Ghostscript list-file assembly is the only option.
pub fn choose_assembler(selection: &AssemblerSelection) -> Option<ImageAssembler> {
    match selection {
        AssemblerSelection::Auto => engine_probe::locate_image_assembler(),
        AssemblerSelection::Magick(path) => Some(ImageAssembler::Magick(path.clone())),
        AssemblerSelection::LegacyConvert(path) => {
            Some(ImageAssembler::LegacyConvert(path.clone()))
        }
        AssemblerSelection::Ghostscript => None,
    }
}

/// Rasterise `source` and reassemble it into a new temporary named after
/// [`OutputPlan::raster_temp`].
///
/// On success the output is verified non-empty and handed back in the
/// summary. On failure no output is left behind. In both cases the scratch
/// directory is gone when this returns.
pub async fn run(
    source: &Path,
    plan: &OutputPlan,
    engines: &Engines,
    config: &FlattenConfig,
) -> Result<RasterSummary, FallbackError> {
    let scratch = tempfile::Builder::new()
        .prefix(&plan.scratch_prefix)
        .tempdir_in(&plan.work_dir)
        .map_err(|e| FallbackError::ScratchDir {
            detail: format!("{}: {}", plan.work_dir.display(), e),
        })?;
    debug!("Raster scratch directory: {}", scratch.path().display());

    let result = match plan.reserve(&plan.raster_temp) {
        Ok(output) => rasterize_and_assemble(source, scratch.path(), output, engines, config).await,
        Err(e) => Err(FallbackError::ScratchDir {
            detail: format!("could not reserve output in {}: {}", plan.work_dir.display(), e),
        }),
    };

    let scratch_path = scratch.path().to_path_buf();
    if let Err(e) = scratch.close() {
        warn!(
            "Could not remove scratch directory {}: {}",
            scratch_path.display(),
            e
        );
    }

    result
}

async fn rasterize_and_assemble(
    source: &Path,
    scratch: &Path,
    output: TempPath,
    engines: &Engines,
    config: &FlattenConfig,
) -> Result<RasterSummary, FallbackError> {
    // ── Step 1: Rasterise ────────────────────────────────────────────────
    let run = engines
        .run_ghostscript(EngineJob::Rasterize {
            input: source.to_path_buf(),
            output_template: scratch.join(PAGE_TEMPLATE),
            dpi: config.dpi,
            max_bitmap_bytes: config.max_bitmap_bytes,
        })
        .await
        .map_err(|e| FallbackError::Rasterize {
            detail: e.to_string(),
        })?;
    if !run.success {
        return Err(FallbackError::Rasterize {
            detail: format!("Ghostscript failed with {}", run.status_text()),
        });
    }

    // ── Step 2: Collect page images in page order ────────────────────────
    let pages = page_images(scratch).await?;
    if pages.is_empty() {
        return Err(FallbackError::NoPageImages);
    }
    info!(pages = pages.len(), dpi = config.dpi, "Rasterised {}", source.display());

    // ── Step 3: Reassemble ───────────────────────────────────────────────
    let assembler = assemble(&pages, scratch, &output, engines, config).await?;
    info!(
        pages = pages.len(),
        assembler = %assembler,
        "Reassembled {}",
        output.display()
    );

    Ok(RasterSummary {
        pages: pages.len(),
        assembler,
        output,
    })
}

/// PNG files in `scratch`, sorted by name.
async fn page_images(scratch: &Path) -> Result<Vec<PathBuf>, FallbackError> {
    let listing_failed = |e: std::io::Error| FallbackError::Rasterize {
        detail: format!("could not list page images: {e}"),
    };

    let mut entries = tokio::fs::read_dir(scratch).await.map_err(listing_failed)?;
    let mut pages = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(listing_failed)? {
        let path = entry.path();
        let is_png = path
            .extension()
            .and_then(OsStr::to_str)
            .is_some_and(|ext| ext.eq_ignore_ascii_case("png"));
        let is_file = entry.file_type().await.is_ok_and(|t| t.is_file());
        if is_png && is_file {
            pages.push(path);
        }
    }
    pages.sort();
    Ok(pages)
}

/// Try the dedicated image assembler, then Ghostscript list-file assembly.
/// Returns the label of the engine that succeeded.
async fn assemble(
    pages: &[PathBuf],
    scratch: &Path,
    output: &Path,
    engines: &Engines,
    config: &FlattenConfig,
) -> Result<String, FallbackError> {
    let mut earlier = None;

    if let Some(assembler) = choose_assembler(&config.assembler) {
        let job = EngineJob::AssembleImages {
            images: pages.to_vec(),
            output: output.to_path_buf(),
            density: config.dpi,
        };
        match check_attempt(engines.run_program(assembler.program(), job).await, output).await {
            Ok(()) => return Ok(assembler.label().to_string()),
            Err(e) => {
                warn!(
                    "{} could not assemble page images ({}), trying Ghostscript",
                    assembler.label(),
                    e
                );
                let detail = match e {
                    FallbackError::Assemble { detail } => detail,
                    other => other.to_string(),
                };
                earlier = Some(format!("{}: {}", assembler.label(), detail));
            }
        }
    } else {
        debug!("No image assembler available, using Ghostscript list-file assembly");
    }

    let list_file = write_list_file(scratch, pages).await?;
    let job = EngineJob::AssembleFromList {
        list_file,
        output: output.to_path_buf(),
    };
    match check_attempt(engines.run_ghostscript(job).await, output).await {
        Ok(()) => Ok(GHOSTSCRIPT_LABEL.to_string()),
        Err(FallbackError::Assemble { detail }) => Err(FallbackError::Assemble {
            detail: match earlier {
                Some(earlier) => format!("{earlier}; {GHOSTSCRIPT_LABEL}: {detail}"),
                None => detail,
            },
        }),
        Err(e) => Err(e),
    }
}

/// Turn one assembler run into a verdict, discarding any bad output.
async fn check_attempt(
    result: Result<EngineOutput, EngineError>,
    output: &Path,
) -> Result<(), FallbackError> {
    let run = match result {
        Ok(run) => run,
        Err(e) => {
            discard(output).await;
            return Err(FallbackError::Assemble {
                detail: e.to_string(),
            });
        }
    };
    if !run.success {
        discard(output).await;
        return Err(FallbackError::Assemble {
            detail: format!("failed with {}", run.status_text()),
        });
    }
    match inspect_artifact(output).await {
        ArtifactState::Ready(_) => Ok(()),
        _ => {
            discard(output).await;
            Err(FallbackError::EmptyAssembly)
        }
    }
}

async fn write_list_file(scratch: &Path, pages: &[PathBuf]) -> Result<PathBuf, FallbackError> {
    let path = scratch.join(LIST_FILE);
    let mut content = String::new();
    for page in pages {
        content.push_str(&list_entry(page));
        content.push('\n');
    }
    tokio::fs::write(&path, content)
        .await
        .map_err(|e| FallbackError::ListFile {
            detail: format!("{}: {}", path.display(), e),
        })?;
    Ok(path)
}

/// One line of a Ghostscript `@file`. Arguments are whitespace-separated
/// there, so paths containing whitespace are quoted.
fn list_entry(path: &Path) -> String {
    let text = path.to_string_lossy();
    if text.chars().any(char::is_whitespace) {
        format!("\"{text}\"")
    } else {
        text.into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::engine::{EngineCommand, EngineRunner};
    use crate::pipeline::plan::plan;
    use futures::future::BoxFuture;
    use std::sync::{Arc, Mutex};

    /// Emulates Ghostscript and ImageMagick by writing files.
    #[derive(Default)]
    struct FakeEngines {
        pages: usize,
        magick_fails: bool,
        gs_assembly_fails: bool,
        empty_assembly: bool,
        jobs: Mutex<Vec<EngineJob>>,
        list_files: Mutex<Vec<String>>,
    }

    impl FakeEngines {
        fn jobs(&self) -> Vec<EngineJob> {
            self.jobs.lock().unwrap().clone()
        }
    }

    fn exit(code: i32) -> EngineOutput {
        EngineOutput {
            success: code == 0,
            code: Some(code),
            output: String::new(),
        }
    }

    impl EngineRunner for FakeEngines {
        fn run<'a>(
            &'a self,
            command: &'a EngineCommand,
        ) -> BoxFuture<'a, Result<EngineOutput, EngineError>> {
            Box::pin(async move {
                self.jobs.lock().unwrap().push(command.job.clone());
                let payload: &[u8] = if self.empty_assembly { b"" } else { b"%PDF-raster" };
                match &command.job {
                    EngineJob::Rasterize {
                        output_template, ..
                    } => {
                        let template = output_template.to_string_lossy().into_owned();
                        for page in (1..=self.pages).rev() {
                            let name = template.replace("%05d", &format!("{page:05}"));
                            std::fs::write(name, b"png").unwrap();
                        }
                        Ok(exit(0))
                    }
                    EngineJob::AssembleImages { output, .. } => {
                        if self.magick_fails {
                            return Ok(exit(1));
                        }
                        std::fs::write(output, payload).unwrap();
                        Ok(exit(0))
                    }
                    EngineJob::AssembleFromList { list_file, output } => {
                        let listed = std::fs::read_to_string(list_file).unwrap();
                        self.list_files.lock().unwrap().push(listed);
                        if self.gs_assembly_fails {
                            return Ok(exit(1));
                        }
                        std::fs::write(output, payload).unwrap();
                        Ok(exit(0))
                    }
                    _ => Ok(exit(0)),
                }
            })
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
        doc: Document,
        plan: OutputPlan,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, b"%PDF-vector").unwrap();
        let doc = Document::open(&path).unwrap();
        let plan = plan(&doc, false);
        Fixture { dir, doc, plan }
    }

    fn setup(fake: FakeEngines, assembler: AssemblerSelection) -> (Arc<FakeEngines>, Engines, FlattenConfig) {
        let fake = Arc::new(fake);
        let engines = Engines {
            ghostscript: "gs".into(),
            runner: fake.clone(),
        };
        let config = FlattenConfig::builder()
            .assembler(assembler)
            .dpi(300)
            .build()
            .unwrap();
        (fake, engines, config)
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with("temp_png_") || n.contains("_second_pass_"))
            .collect()
    }

    #[test]
    fn choose_assembler_honours_explicit_selection() {
        assert_eq!(choose_assembler(&AssemblerSelection::Ghostscript), None);
        assert_eq!(
            choose_assembler(&AssemblerSelection::LegacyConvert("/usr/bin/convert".into())),
            Some(ImageAssembler::LegacyConvert("/usr/bin/convert".into()))
        );
        assert_eq!(
            choose_assembler(&AssemblerSelection::Magick("m".into()))
                .map(|a| a.label()),
            Some("magick")
        );
    }

    #[test]
    fn list_entries_quote_whitespace() {
        assert_eq!(list_entry(Path::new("/tmp/a/page-00001.png")), "/tmp/a/page-00001.png");
        assert_eq!(
            list_entry(Path::new("/tmp/my docs/page-00001.png")),
            "\"/tmp/my docs/page-00001.png\""
        );
    }

    #[tokio::test]
    async fn pages_are_assembled_in_page_order() {
        let fx = fixture();
        let (fake, engines, config) = setup(
            FakeEngines {
                pages: 12,
                ..Default::default()
            },
            AssemblerSelection::Magick("magick".into()),
        );

        let summary = run(fx.doc.path(), &fx.plan, &engines, &config).await.unwrap();

        assert_eq!(summary.pages, 12);
        assert_eq!(summary.assembler, "magick");
        assert_eq!(std::fs::read(&summary.output).unwrap(), b"%PDF-raster");

        let jobs = fake.jobs();
        let images = jobs
            .iter()
            .find_map(|j| match j {
                EngineJob::AssembleImages { images, density, .. } => {
                    assert_eq!(*density, 300);
                    Some(images.clone())
                }
                _ => None,
            })
            .unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.first().map(String::as_str), Some("page-00001.png"));
        assert_eq!(names.last().map(String::as_str), Some("page-00012.png"));
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);

        // Only the reassembled output remains; the scratch directory is gone.
        let remaining = leftovers(fx.dir.path());
        assert_eq!(remaining.len(), 1, "got: {remaining:?}");
        assert!(remaining[0].starts_with("scan_second_pass_"));

        drop(summary);
        assert!(leftovers(fx.dir.path()).is_empty());
    }

    #[tokio::test]
    async fn user_file_with_the_temporary_name_survives() {
        let fx = fixture();
        let lookalike = fx.dir.path().join("scan_second_pass_.pdf");
        std::fs::write(&lookalike, b"%PDF-user").unwrap();
        let (_fake, engines, config) = setup(
            FakeEngines {
                pages: 2,
                ..Default::default()
            },
            AssemblerSelection::Ghostscript,
        );

        let summary = run(fx.doc.path(), &fx.plan, &engines, &config).await.unwrap();

        assert_ne!(*summary.output, *lookalike);
        assert_eq!(std::fs::read(&lookalike).unwrap(), b"%PDF-user");
    }

    #[tokio::test]
    async fn no_page_images_is_non_fatal_and_leaves_nothing_behind() {
        let fx = fixture();
        let (fake, engines, config) = setup(
            FakeEngines::default(),
            AssemblerSelection::Magick("magick".into()),
        );

        let err = run(fx.doc.path(), &fx.plan, &engines, &config).await.unwrap_err();

        assert_eq!(err, FallbackError::NoPageImages);
        assert!(leftovers(fx.dir.path()).is_empty());
        assert_eq!(fake.jobs().len(), 1, "no assembly without pages");
    }

    #[tokio::test]
    async fn failed_magick_falls_back_to_ghostscript_list_file() {
        let fx = fixture();
        let (fake, engines, config) = setup(
            FakeEngines {
                pages: 3,
                magick_fails: true,
                ..Default::default()
            },
            AssemblerSelection::Magick("magick".into()),
        );

        let summary = run(fx.doc.path(), &fx.plan, &engines, &config).await.unwrap();

        assert_eq!(summary.assembler, GHOSTSCRIPT_LABEL);
        let lists = fake.list_files.lock().unwrap().clone();
        assert_eq!(lists.len(), 1);
        let lines: Vec<&str> = lists[0].lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("page-00001.png"));
        assert!(lines[2].ends_with("page-00003.png"));
    }

    #[tokio::test]
    async fn ghostscript_selection_skips_image_assemblers() {
        let fx = fixture();
        let (fake, engines, config) = setup(
            FakeEngines {
                pages: 2,
                ..Default::default()
            },
            AssemblerSelection::Ghostscript,
        );

        run(fx.doc.path(), &fx.plan, &engines, &config).await.unwrap();

        assert!(!fake
            .jobs()
            .iter()
            .any(|j| matches!(j, EngineJob::AssembleImages { .. })));
    }

    #[tokio::test]
    async fn every_assembler_failing_reports_the_whole_chain() {
        let fx = fixture();
        let (_fake, engines, config) = setup(
            FakeEngines {
                pages: 2,
                magick_fails: true,
                gs_assembly_fails: true,
                ..Default::default()
            },
            AssemblerSelection::LegacyConvert("convert".into()),
        );

        let err = run(fx.doc.path(), &fx.plan, &engines, &config).await.unwrap_err();

        match err {
            FallbackError::Assemble { detail } => {
                assert!(detail.contains("convert"), "got: {detail}");
                assert!(detail.contains(GHOSTSCRIPT_LABEL), "got: {detail}");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(leftovers(fx.dir.path()).is_empty());
        assert_eq!(std::fs::read(fx.doc.path()).unwrap(), b"%PDF-vector");
    }

    #[tokio::test]
    async fn empty_assembly_is_rejected() {
        let fx = fixture();
        let (_fake, engines, config) = setup(
            FakeEngines {
                pages: 1,
                empty_assembly: true,
                ..Default::default()
            },
            AssemblerSelection::Ghostscript,
        );

        let err = run(fx.doc.path(), &fx.plan, &engines, &config).await.unwrap_err();

        assert_eq!(err, FallbackError::EmptyAssembly);
        assert!(leftovers(fx.dir.path()).is_empty());
    }
}
