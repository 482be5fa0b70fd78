//! The external image service that renders subjects on flat backgrounds.
//!
//! The matting core only needs three operations from it, captured by
//! [`BackgroundService`]. [`CommandService`] bridges them to an external program.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};

use image::{DynamicImage, ImageFormat};

use crate::error::{Error, Result, ServiceOperation};

/// Image generation/editing operations needed to build a background pair.
///
/// Each call is a single synchronous round-trip. Implementations must not retry
/// internally; a failure is reported as [`Error::Service`].
pub trait BackgroundService {
    /// Render the subject described by `prompt` on a pure white background.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Service`] if the service fails or produces no image.
    fn place_on_white(&self, prompt: &str) -> Result<DynamicImage>;

    /// Cut the subject named by `prompt` out of `source` onto a pure white background.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Service`] if the service fails or produces no image.
    fn isolate_on_white(&self, source: &DynamicImage, prompt: &str) -> Result<DynamicImage>;

    /// Replace the background of `source` with pure black, leaving the subject untouched.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Service`] if the service fails or produces no image.
    fn edit_background_to_black(&self, source: &DynamicImage) -> Result<DynamicImage>;
}

/// Instruction sent for [`BackgroundService::place_on_white`].
#[must_use]
pub fn place_on_white_instruction(prompt: &str) -> String {
    format!(
        "{prompt}, centered, on a completely flat pure white (#FFFFFF) background \
         with no shadows, gradients or reflections"
    )
}

/// Instruction sent for [`BackgroundService::isolate_on_white`].
#[must_use]
pub fn isolate_on_white_instruction(prompt: &str) -> String {
    format!(
        "Extract only the {prompt} from this image and place it on a completely flat \
         pure white (#FFFFFF) background. Keep the object exactly as it appears, \
         with the same pose, size and position."
    )
}

/// Instruction sent for [`BackgroundService::edit_background_to_black`].
pub const EDIT_TO_BLACK_INSTRUCTION: &str =
    "Change the white background to a completely flat pure black (#000000) background. \
     Keep every pixel of the subject exactly unchanged.";

static SCRATCH_COUNTER: AtomicU64 = AtomicU64::new(0);
const SCRATCH_ATTEMPTS: u32 = 16;

/// Runs an external program for every service call.
///
/// Invocation shape:
///
/// ```text
/// <program> [args...] <operation> --instruction <text> [--input <png>] --output <png>
/// ```
///
/// `<operation>` is one of `place-on-white`, `isolate-on-white`, `edit-to-black`.
/// The program must write the resulting image to the `--output` path and exit 0.
/// Credentials and transport are the program's own business.
#[derive(Debug, Clone)]
pub struct CommandService {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandService {
    /// Bridge to `program`, with no extra leading arguments.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Add fixed arguments passed before the operation name.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// The program this bridge runs.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn run(
        &self,
        operation: ServiceOperation,
        instruction: &str,
        source: Option<&DynamicImage>,
    ) -> Result<DynamicImage> {
        let scratch = ScratchDir::create(operation)?;
        self.run_in(&scratch.path, operation, instruction, source)
    }

    fn run_in(
        &self,
        dir: &Path,
        operation: ServiceOperation,
        instruction: &str,
        source: Option<&DynamicImage>,
    ) -> Result<DynamicImage> {
        let output_path = dir.join("output.png");

        let mut cmd = Command::new(&self.program);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .args(&self.args)
            .arg(operation.as_str())
            .arg("--instruction")
            .arg(instruction);

        if let Some(source) = source {
            let input_path = dir.join("input.png");
            source
                .save_with_format(&input_path, ImageFormat::Png)
                .map_err(|e| {
                    Error::service(operation, format!("failed to stage source image: {e}"))
                })?;
            cmd.arg("--input").arg(input_path);
        }
        cmd.arg("--output").arg(&output_path);

        tracing::debug!(
            program = %self.program.display(),
            %operation,
            "invoking background service"
        );

        let output = cmd.output().map_err(|e| {
            Error::service(
                operation,
                format!("failed to spawn '{}': {e}", self.program.display()),
            )
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::service(
                operation,
                format!(
                    "'{}' exited with {}: {}",
                    self.program.display(),
                    output.status,
                    stderr.trim()
                ),
            ));
        }

        if !output_path.is_file() {
            return Err(Error::service(operation, "service produced no image"));
        }

        image::open(&output_path).map_err(|e| {
            Error::service(
                operation,
                format!("service returned an unusable image: {e}"),
            )
        })
    }
}

impl BackgroundService for CommandService {
    fn place_on_white(&self, prompt: &str) -> Result<DynamicImage> {
        self.run(
            ServiceOperation::PlaceOnWhite,
            &place_on_white_instruction(prompt),
            None,
        )
    }

    fn isolate_on_white(&self, source: &DynamicImage, prompt: &str) -> Result<DynamicImage> {
        self.run(
            ServiceOperation::IsolateOnWhite,
            &isolate_on_white_instruction(prompt),
            Some(source),
        )
    }

    fn edit_background_to_black(&self, source: &DynamicImage) -> Result<DynamicImage> {
        self.run(
            ServiceOperation::EditToBlack,
            EDIT_TO_BLACK_INSTRUCTION,
            Some(source),
        )
    }
}

/// Per-call working directory, removed on drop.
struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    fn create(operation: ServiceOperation) -> Result<Self> {
        Self::create_in(&std::env::temp_dir(), operation)
    }

    /// Create a fresh directory under `base`. A path that already exists is
    /// never reused, so a leftover `output.png` cannot pose as a result.
    fn create_in(base: &Path, operation: ServiceOperation) -> Result<Self> {
        for _ in 0..SCRATCH_ATTEMPTS {
            let n = SCRATCH_COUNTER.fetch_add(1, Ordering::Relaxed);
            let path = base.join(format!(
                "diffmatte-{}-{n}-{}",
                std::process::id(),
                operation.as_str()
            ));
            match std::fs::create_dir(&path) {
                Ok(()) => return Ok(Self { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => {
                    return Err(Error::service(
                        operation,
                        format!(
                            "failed to create scratch directory '{}': {e}",
                            path.display()
                        ),
                    ))
                }
            }
        }
        Err(Error::service(
            operation,
            format!("no unused scratch directory under '{}'", base.display()),
        ))
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}
