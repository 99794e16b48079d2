//! External engine invocations.
//!
//! Every call to Ghostscript or ImageMagick is described by an immutable
//! [`EngineCommand`] built for that call alone: program path plus an
//! [`EngineJob`] carrying the input/output paths and mode settings. The job
//! renders its own argument vector, so no argument list is shared between
//! invocations.
//!
//! Commands are executed through the [`EngineRunner`] trait, which also
//! performs the final move of every committed artifact. [`SystemRunner`]
//! spawns real processes; tests inject a runner that emulates the engines.

use crate::config::FlattenConfig;
use crate::error::{EngineError, FlattenError};
use futures::future::BoxFuture;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// What an engine invocation should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineJob {
    /// `gs --version`, used by the tool probe.
    Version,
    /// Print-oriented vector flatten of `input` into `output`.
    VectorFlatten { input: PathBuf, output: PathBuf },
    /// One PNG per page of `input`. The file name of `output_template`
    /// carries a printf-style page counter (`%05d`); its directory is taken
    /// literally.
    Rasterize {
        input: PathBuf,
        output_template: PathBuf,
        dpi: u32,
        max_bitmap_bytes: u64,
    },
    /// ImageMagick: combine `images` (already in page order) into `output`.
    AssembleImages {
        images: Vec<PathBuf>,
        output: PathBuf,
        density: u32,
    },
    /// Ghostscript: combine the images listed in `list_file` into `output`.
    AssembleFromList { list_file: PathBuf, output: PathBuf },
}

impl EngineJob {
    /// Short name for logs.
    pub fn label(&self) -> &'static str {
        match self {
            EngineJob::Version => "version",
            EngineJob::VectorFlatten { .. } => "vector-flatten",
            EngineJob::Rasterize { .. } => "rasterize",
            EngineJob::AssembleImages { .. } => "assemble-images",
            EngineJob::AssembleFromList { .. } => "assemble-from-list",
        }
    }
}

/// A single, fully-specified engine invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCommand {
    pub program: PathBuf,
    pub job: EngineJob,
}

impl EngineCommand {
    pub fn new(program: impl Into<PathBuf>, job: EngineJob) -> Self {
        Self {
            program: program.into(),
            job,
        }
    }

    /// Only the version probe captures output; every other job streams the
    /// engine's stdout/stderr straight through to the operator.
    pub fn captures_output(&self) -> bool {
        matches!(self.job, EngineJob::Version)
    }

    /// The file this invocation is expected to create, if any.
    pub fn output(&self) -> Option<&Path> {
        match &self.job {
            EngineJob::Version | EngineJob::Rasterize { .. } => None,
            EngineJob::VectorFlatten { output, .. }
            | EngineJob::AssembleImages { output, .. }
            | EngineJob::AssembleFromList { output, .. } => Some(output.as_path()),
        }
    }

    /// Render the argument vector (without the program itself).
    pub fn args(&self) -> Vec<OsString> {
        match &self.job {
            EngineJob::Version => vec!["--version".into()],

            EngineJob::VectorFlatten { input, output } => vec![
                "-sDEVICE=pdfwrite".into(),
                "-dPDFSETTINGS=/prepress".into(),
                "-dNOPAUSE".into(),
                "-dBATCH".into(),
                "-dPrinted=true".into(),
                "-o".into(),
                escape_percent(output),
                input.into(),
            ],

            EngineJob::Rasterize {
                input,
                output_template,
                dpi,
                max_bitmap_bytes,
            } => vec![
                "-dSAFER".into(),
                "-dBATCH".into(),
                "-dNOPAUSE".into(),
                "-sDEVICE=png16m".into(),
                format!("-r{dpi}").into(),
                "-dTextAlphaBits=4".into(),
                "-dGraphicsAlphaBits=4".into(),
                format!("-dMaxBitmap={max_bitmap_bytes}").into(),
                {
                    let mut arg = OsString::from("-sOutputFile=");
                    if let Some(dir) = output_template.parent() {
                        arg.push(escape_percent(dir));
                        arg.push(std::path::MAIN_SEPARATOR_STR);
                    }
                    if let Some(name) = output_template.file_name() {
                        arg.push(name);
                    }
                    arg
                },
                input.into(),
            ],

            EngineJob::AssembleImages {
                images,
                output,
                density,
            } => {
                let mut args: Vec<OsString> = images.iter().map(OsString::from).collect();
                let settings: [OsString; 8] = [
                    "-units".into(),
                    "PixelsPerInch".into(),
                    "-density".into(),
                    density.to_string().into(),
                    "-strip".into(),
                    "-compress".into(),
                    "zip".into(),
                    escape_percent(output),
                ];
                args.extend(settings);
                args
            }

            EngineJob::AssembleFromList { list_file, output } => vec![
                "-dSAFER".into(),
                "-dBATCH".into(),
                "-dNOPAUSE".into(),
                "-sDEVICE=pdfwrite".into(),
                "-dPDFSETTINGS=/prepress".into(),
                "-dCompatibilityLevel=1.4".into(),
                prefixed("-sOutputFile=", &escape_percent(output)),
                "-c".into(),
                "30000000 setvmthreshold".into(),
                "-f".into(),
                prefixed("@", list_file),
            ],
        }
    }

    /// Human-readable command line for logs.
    pub fn display(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in self.args() {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

fn prefixed(prefix: &str, path: impl AsRef<std::ffi::OsStr>) -> OsString {
    let mut arg = OsString::from(prefix);
    arg.push(path);
    arg
}

/// Double every `%` of an output path. Ghostscript and ImageMagick both read
/// output names as printf-style templates, where `%%` is a literal percent.
#[cfg(unix)]
fn escape_percent(path: &Path) -> OsString {
    use std::os::unix::ffi::{OsStrExt, OsStringExt};
    let bytes = path.as_os_str().as_bytes();
    let mut escaped = Vec::with_capacity(bytes.len());
    for &b in bytes {
        if b == b'%' {
            escaped.push(b'%');
        }
        escaped.push(b);
    }
    OsString::from_vec(escaped)
}

#[cfg(not(unix))]
fn escape_percent(path: &Path) -> OsString {
    match path.to_str() {
        Some(text) => text.replace('%', "%%").into(),
        None => path.as_os_str().to_owned(),
    }
}

/// Result of a completed engine invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOutput {
    /// The process exited with status 0.
    pub success: bool,
    /// Exit code, if the process exited normally.
    pub code: Option<i32>,
    /// Combined stdout + stderr for capturing jobs; empty otherwise.
    pub output: String,
}

impl EngineOutput {
    /// `"exit code N"` or `"terminated by signal"`, for error messages.
    pub fn status_text(&self) -> String {
        match self.code {
            Some(code) => format!("exit code {code}"),
            None => "terminated by signal".into(),
        }
    }
}

/// Executes engine commands.
///
/// Implementations must block (asynchronously) until the engine exits.
pub trait EngineRunner: Send + Sync {
    fn run<'a>(&'a self, command: &'a EngineCommand)
        -> BoxFuture<'a, Result<EngineOutput, EngineError>>;

    /// Move a finished artifact to `to`, which has already been removed.
    /// The default is a rename on the local filesystem.
    fn move_into_place<'a>(
        &'a self,
        from: &'a Path,
        to: &'a Path,
    ) -> BoxFuture<'a, std::io::Result<()>> {
        Box::pin(tokio::fs::rename(from, to))
    }
}

/// Runs engines as real child processes via `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    async fn execute(&self, command: &EngineCommand) -> Result<EngineOutput, EngineError> {
        let program = command.program.clone();
        let mut cmd = tokio::process::Command::new(&command.program);
        cmd.args(command.args())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if command.captures_output() {
            cmd.stdout(Stdio::piped()).stderr(Stdio::piped());
        } else {
            cmd.stdout(Stdio::inherit()).stderr(Stdio::inherit());
        }

        debug!(job = command.job.label(), "Running: {}", command.display());

        let child = cmd.spawn().map_err(|source| EngineError::Spawn {
            program: program.clone(),
            source,
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let wait = child.wait_with_output();
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, wait)
                .await
                .map_err(|_| EngineError::TimedOut {
                    program: program.clone(),
                    limit,
                })?,
            None => wait.await,
        };
        let output = result.map_err(|source| EngineError::Wait { program, source })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        text.push_str(&String::from_utf8_lossy(&output.stderr));

        Ok(EngineOutput {
            success: output.status.success(),
            code: output.status.code(),
            output: text,
        })
    }
}

impl EngineRunner for SystemRunner {
    fn run<'a>(
        &'a self,
        command: &'a EngineCommand,
    ) -> BoxFuture<'a, Result<EngineOutput, EngineError>> {
        Box::pin(self.execute(command))
    }
}

/// The engines resolved for one run: the Ghostscript executable and the
/// runner that executes every command.
#[derive(Clone)]
pub struct Engines {
    pub ghostscript: PathBuf,
    pub runner: Arc<dyn EngineRunner>,
}

impl Engines {
    /// Resolve Ghostscript and the runner from `config`.
    ///
    /// Resolution order for Ghostscript: `config.ghostscript`, then
    /// `FLATTEN_GS_PATH`, then a `PATH` search.
    pub fn resolve(config: &FlattenConfig) -> Result<Self, FlattenError> {
        let ghostscript = match &config.ghostscript {
            Some(path) => path.clone(),
            None => engine_probe::locate_ghostscript().map_err(|e| {
                FlattenError::EngineUnavailable {
                    engine: "Ghostscript".into(),
                    detail: e.to_string(),
                    hint: engine_probe::Platform::current().remediation(),
                }
            })?,
        };

        let runner = match &config.runner {
            Some(runner) => Arc::clone(runner),
            None => Arc::new(SystemRunner::new(
                config.engine_timeout_secs.map(Duration::from_secs),
            )),
        };

        Ok(Self {
            ghostscript,
            runner,
        })
    }

    /// Run a Ghostscript job.
    pub async fn run_ghostscript(&self, job: EngineJob) -> Result<EngineOutput, EngineError> {
        let command = EngineCommand::new(&self.ghostscript, job);
        self.runner.run(&command).await
    }

    /// Run a job on an arbitrary program (the image assembler).
    pub async fn run_program(
        &self,
        program: &Path,
        job: EngineJob,
    ) -> Result<EngineOutput, EngineError> {
        let command = EngineCommand::new(program, job);
        self.runner.run(&command).await
    }
}
