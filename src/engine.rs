//! End-to-end pipeline: acquire a background pair, recover alpha, persist.

use std::path::{Path, PathBuf};

use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};

use crate::acquire::{AcquisitionPlan, AcquisitionRequest, BackgroundPair, ImageSource};
use crate::error::{Error, Result};
use crate::service::BackgroundService;

/// Options controlling how a matting run persists its results.
#[derive(Debug, Clone, Default)]
pub struct MatteOptions {
    /// Also write the white and black renderings next to the output.
    pub save_intermediates: bool,
}

/// Files written by a successful run.
#[derive(Debug, Clone)]
pub struct MatteOutput {
    /// The recovered RGBA image.
    pub path: PathBuf,
    /// White- and black-background renderings, when saved.
    pub intermediates: Option<(PathBuf, PathBuf)>,
    /// Output dimensions.
    pub dimensions: (u32, u32),
}

/// Acquire a background pair for `request` and recover its RGBA image.
///
/// Nothing is written to disk.
///
/// # Errors
///
/// Propagates acquisition errors ([`Error::Configuration`], [`Error::Load`],
/// [`Error::Service`]) and [`Error::DimensionMismatch`] from matting.
pub fn matte(
    request: &AcquisitionRequest,
    service: Option<&dyn BackgroundService>,
) -> Result<(BackgroundPair, RgbaImage)> {
    let pair = AcquisitionPlan::resolve(request).execute(service)?;
    tracing::debug!(
        width = pair.white.width(),
        height = pair.white.height(),
        "recovering alpha"
    );
    let rgba = pair.matte()?;
    Ok((pair, rgba))
}

/// Run the full pipeline and write the result to `output`.
///
/// The output format is checked before any work starts. Every file is first
/// written to a hidden sibling and moved into place only once all writes have
/// succeeded, so a failed run leaves no files behind. An intermediate whose path
/// is the caller's own input image is left untouched.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] for an output format without lossless
/// alpha, any error from [`matte`], or I/O and encode errors while saving.
pub fn process(
    request: &AcquisitionRequest,
    service: Option<&dyn BackgroundService>,
    output: &Path,
    opts: &MatteOptions,
) -> Result<MatteOutput> {
    check_output_format(output)?;

    let (pair, rgba) = matte(request, service)?;

    ensure_parent_dir(output)?;
    let mut staged = StagedFiles::default();

    let intermediates = if opts.save_intermediates {
        let (white_path, black_path) = intermediate_paths(output);
        let (white_src, black_src) = source_paths(request);
        for (img, path, src) in [
            (&pair.white, &white_path, white_src),
            (&pair.black, &black_path, black_src),
        ] {
            if src.is_some_and(|src| same_file(src, path)) {
                tracing::debug!(
                    path = %path.display(),
                    "intermediate is an input image; keeping it"
                );
                continue;
            }
            staged.stage(path, |tmp| save_rgb(img, tmp))?;
        }
        Some((white_path, black_path))
    } else {
        None
    };

    // Output last, so it only appears once everything else is in place.
    staged.stage(output, |tmp| save_rgba(&rgba, tmp))?;
    staged.commit()?;

    tracing::info!(path = %output.display(), "wrote matte");
    if let Some((white, black)) = &intermediates {
        tracing::info!(
            white = %white.display(),
            black = %black.display(),
            "wrote intermediates"
        );
    }

    Ok(MatteOutput {
        path: output.to_path_buf(),
        intermediates,
        dimensions: rgba.dimensions(),
    })
}

/// Input files the white and black renderings were loaded from, if any.
fn source_paths(request: &AcquisitionRequest) -> (Option<&Path>, Option<&Path>) {
    let white = request.white.as_ref().and_then(ImageSource::path);
    // A black image is only used alongside a white one.
    let black = white.and(request.black.as_ref().and_then(ImageSource::path));
    (white, black)
}

fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Files written beside their destinations and renamed into place together.
///
/// Anything not committed is removed on drop.
#[derive(Default)]
struct StagedFiles {
    files: Vec<(PathBuf, PathBuf)>,
}

impl StagedFiles {
    fn stage(&mut self, dest: &Path, write: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
        let tmp = staging_path(dest);
        self.files.push((tmp.clone(), dest.to_path_buf()));
        write(&tmp)
    }

    fn commit(mut self) -> Result<()> {
        let files = std::mem::take(&mut self.files);
        for (i, (tmp, dest)) in files.iter().enumerate() {
            if let Err(e) = std::fs::rename(tmp, dest) {
                for (_, done) in &files[..i] {
                    let _ = std::fs::remove_file(done);
                }
                for (pending, _) in &files[i..] {
                    let _ = std::fs::remove_file(pending);
                }
                return Err(e.into());
            }
        }
        Ok(())
    }
}

impl Drop for StagedFiles {
    fn drop(&mut self) {
        for (tmp, _) in &self.files {
            let _ = std::fs::remove_file(tmp);
        }
    }
}

fn staging_path(dest: &Path) -> PathBuf {
    let name = dest.file_name().unwrap_or_default().to_string_lossy();
    let parent = dest.parent().unwrap_or(Path::new(""));
    parent.join(format!(".diffmatte-tmp.{name}"))
}

/// Check that `path` names a format that stores alpha losslessly.
///
/// # Errors
///
/// Returns [`Error::UnsupportedFormat`] otherwise.
pub fn check_output_format(path: &Path) -> Result<ImageFormat> {
    let format =
        ImageFormat::from_path(path).map_err(|e| Error::UnsupportedFormat(e.to_string()))?;
    match format {
        ImageFormat::Png | ImageFormat::WebP => Ok(format),
        _ => Err(Error::UnsupportedFormat(format!(
            "{format:?} cannot store a lossless alpha channel; use .png or .webp"
        ))),
    }
}

/// Save an RGBA image losslessly (PNG or WebP).
///
/// # Errors
///
/// Returns an error if the format is unsupported or writing fails.
pub fn save_rgba(img: &RgbaImage, path: &Path) -> Result<()> {
    let format = check_output_format(path)?;
    img.save_with_format(path, format)?;
    Ok(())
}

fn save_rgb(img: &RgbImage, path: &Path) -> Result<()> {
    DynamicImage::ImageRgb8(img.clone()).save_with_format(path, ImageFormat::Png)?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Paths for the intermediate renderings of `output`.
///
/// Example: `"out/cube.png"` gives `"out/cube_white.png"` and `"out/cube_black.png"`.
#[must_use]
pub fn intermediate_paths(output: &Path) -> (PathBuf, PathBuf) {
    let stem = output.file_stem().unwrap_or_default().to_string_lossy();
    let parent = output.parent().unwrap_or(Path::new(""));
    (
        parent.join(format!("{stem}_white.png")),
        parent.join(format!("{stem}_black.png")),
    )
}

/// Default output path for a request.
///
/// Next to the input image (or else the white image) as `{stem}_matte.png`;
/// `matte.png` in the working directory when neither is a file.
#[must_use]
pub fn default_output_path(request: &AcquisitionRequest) -> PathBuf {
    let anchor = request
        .input_image
        .as_ref()
        .and_then(|s| s.path())
        .or_else(|| request.white.as_ref().and_then(|s| s.path()));

    match anchor {
        Some(input) => {
            let stem = input.file_stem().unwrap_or_default().to_string_lossy();
            let parent = input.parent().unwrap_or(Path::new("."));
            parent.join(format!("{stem}_matte.png"))
        }
        None => PathBuf::from("matte.png"),
    }
}

/// Check if a file has a supported input image extension.
#[must_use]
pub fn is_supported_image(path: &Path) -> bool {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => matches!(
            ext.to_lowercase().as_str(),
            "jpg" | "jpeg" | "png" | "webp" | "bmp"
        ),
        None => false,
    }
}
