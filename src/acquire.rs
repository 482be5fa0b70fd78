//! Acquisition of a white/black background pair.
//!
//! The caller's inputs resolve to exactly one [`AcquisitionPlan`]; executing the
//! plan loads images and issues at most two [`BackgroundService`] calls, in order.

use std::path::{Path, PathBuf};

use image::{DynamicImage, RgbImage};

use crate::error::{Error, ImageRole, Result};
use crate::matting;
use crate::service::BackgroundService;

/// Where an input image comes from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Decode from a file on disk.
    Path(PathBuf),
    /// Already decoded.
    Memory(DynamicImage),
}

impl ImageSource {
    /// Decode (or clone) the image, labelling failures with `role`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Load`] if the file cannot be read or decoded.
    pub fn load(&self, role: ImageRole) -> Result<DynamicImage> {
        match self {
            Self::Path(path) => {
                tracing::debug!(%role, path = %path.display(), "loading image");
                image::open(path).map_err(|source| Error::Load {
                    role,
                    path: path.clone(),
                    source,
                })
            }
            Self::Memory(img) => Ok(img.clone()),
        }
    }

    /// The file path, if this source is on disk.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Path(path) => Some(path),
            Self::Memory(_) => None,
        }
    }
}

impl From<PathBuf> for ImageSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ImageSource {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<DynamicImage> for ImageSource {
    fn from(img: DynamicImage) -> Self {
        Self::Memory(img)
    }
}

/// Everything the caller supplied towards a background pair.
#[derive(Debug, Clone, Default)]
pub struct AcquisitionRequest {
    /// A ready-made white-background rendering.
    pub white: Option<ImageSource>,
    /// A ready-made black-background rendering.
    pub black: Option<ImageSource>,
    /// A photo to extract the subject from (needs `prompt`).
    pub input_image: Option<ImageSource>,
    /// Subject description.
    pub prompt: Option<String>,
}

/// The acquisition path chosen for a request.
#[derive(Debug, Clone)]
pub enum AcquisitionPlan {
    /// Both renderings supplied; no service calls.
    ProvidedPair {
        /// White-background source.
        white: ImageSource,
        /// Black-background source.
        black: ImageSource,
    },
    /// White rendering supplied; the service edits it to black.
    EditOnly {
        /// White-background source.
        white: ImageSource,
    },
    /// The service isolates the subject from a photo onto white, then edits to black.
    ExtractThenEdit {
        /// Photo containing the subject.
        input: ImageSource,
        /// Name of the subject to isolate.
        prompt: String,
    },
    /// The service generates the subject on white, then edits to black.
    GenerateThenEdit {
        /// Subject description.
        prompt: String,
    },
    /// No usable path.
    Unresolvable,
}

/// A white-background and black-background rendering of the same subject.
#[derive(Debug, Clone)]
pub struct BackgroundPair {
    /// Subject over pure white.
    pub white: RgbImage,
    /// Subject over pure black.
    pub black: RgbImage,
}

impl BackgroundPair {
    /// Build a pair from decoded images, dropping any alpha channel.
    #[must_use]
    pub fn from_images(white: &DynamicImage, black: &DynamicImage) -> Self {
        Self {
            white: white.to_rgb8(),
            black: black.to_rgb8(),
        }
    }

    /// Run difference matting over the pair.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DimensionMismatch`] if the buffers disagree after resampling.
    pub fn matte(&self) -> Result<image::RgbaImage> {
        matting::recover_rgba(&self.white, &self.black)
    }
}

impl AcquisitionPlan {
    /// Pick the acquisition path for `request`. First matching rule wins:
    ///
    /// 1. white and black supplied
    /// 2. white supplied
    /// 3. input image and prompt supplied
    /// 4. prompt supplied
    ///
    /// A blank prompt counts as absent.
    #[must_use]
    pub fn resolve(request: &AcquisitionRequest) -> Self {
        let prompt = request
            .prompt
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());

        match (&request.white, &request.black, &request.input_image, prompt) {
            (Some(white), Some(black), _, _) => Self::ProvidedPair {
                white: white.clone(),
                black: black.clone(),
            },
            (Some(white), None, _, _) => Self::EditOnly {
                white: white.clone(),
            },
            (None, _, Some(input), Some(prompt)) => Self::ExtractThenEdit {
                input: input.clone(),
                prompt: prompt.to_string(),
            },
            (None, _, None, Some(prompt)) => Self::GenerateThenEdit {
                prompt: prompt.to_string(),
            },
            (None, _, _, None) => Self::Unresolvable,
        }
    }

    /// Whether executing this plan calls the background service.
    #[must_use]
    pub fn needs_service(&self) -> bool {
        !matches!(self, Self::ProvidedPair { .. } | Self::Unresolvable)
    }

    /// Short name of the path, for logging.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::ProvidedPair { .. } => "provided-pair",
            Self::EditOnly { .. } => "edit-only",
            Self::ExtractThenEdit { .. } => "extract-then-edit",
            Self::GenerateThenEdit { .. } => "generate-then-edit",
            Self::Unresolvable => "unresolvable",
        }
    }

    /// Load and/or produce the background pair.
    ///
    /// `service` may be `None` only for [`AcquisitionPlan::ProvidedPair`].
    ///
    /// # Errors
    ///
    /// - [`Error::Configuration`] for an unresolvable plan, or when the plan needs
    ///   a service and none is given.
    /// - [`Error::Load`] if a supplied image cannot be decoded.
    /// - [`Error::Service`] if a service call fails.
    pub fn execute(&self, service: Option<&dyn BackgroundService>) -> Result<BackgroundPair> {
        tracing::info!(plan = self.name(), "acquiring background pair");

        let white = match self {
            Self::Unresolvable => {
                return Err(Error::Configuration(
                    "need a white and black image, a white image, an input image with a \
                     prompt, or a prompt"
                        .to_string(),
                ))
            }
            Self::ProvidedPair { white, black } => {
                let white = white.load(ImageRole::White)?;
                let black = black.load(ImageRole::Black)?;
                return Ok(BackgroundPair::from_images(&white, &black));
            }
            Self::EditOnly { white } => {
                self.require(service)?;
                white.load(ImageRole::White)?
            }
            Self::ExtractThenEdit { input, prompt } => {
                let service = self.require(service)?;
                let input = input.load(ImageRole::Input)?;
                service.isolate_on_white(&input, prompt)?
            }
            Self::GenerateThenEdit { prompt } => self.require(service)?.place_on_white(prompt)?,
        };

        let black = self.require(service)?.edit_background_to_black(&white)?;
        Ok(BackgroundPair::from_images(&white, &black))
    }

    fn require<'s>(
        &self,
        service: Option<&'s dyn BackgroundService>,
    ) -> Result<&'s dyn BackgroundService> {
        service.ok_or_else(|| {
            Error::Configuration(format!(
                "the {} path needs a background service, but none is configured",
                self.name()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mem(v: u8) -> ImageSource {
        ImageSource::Memory(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            2,
            2,
            image::Rgb([v, v, v]),
        )))
    }

    fn request(
        white: bool,
        black: bool,
        input: bool,
        prompt: Option<&str>,
    ) -> AcquisitionRequest {
        AcquisitionRequest {
            white: white.then(|| mem(255)),
            black: black.then(|| mem(0)),
            input_image: input.then(|| mem(128)),
            prompt: prompt.map(str::to_string),
        }
    }

    #[test]
    fn pair_wins_over_everything() {
        let plan = AcquisitionPlan::resolve(&request(true, true, true, Some("cube")));
        assert!(matches!(plan, AcquisitionPlan::ProvidedPair { .. }));
        assert!(!plan.needs_service());
    }

    #[test]
    fn white_alone_edits() {
        let plan = AcquisitionPlan::resolve(&request(true, false, true, Some("cube")));
        assert!(matches!(plan, AcquisitionPlan::EditOnly { .. }));
        assert!(plan.needs_service());
    }

    #[test]
    fn input_with_prompt_extracts() {
        let plan = AcquisitionPlan::resolve(&request(false, false, true, Some("cube")));
        match plan {
            AcquisitionPlan::ExtractThenEdit { prompt, .. } => assert_eq!(prompt, "cube"),
            other => panic!("unexpected plan {}", other.name()),
        }
    }

    #[test]
    fn prompt_alone_generates() {
        let plan = AcquisitionPlan::resolve(&request(false, false, false, Some("  a red cube ")));
        match plan {
            AcquisitionPlan::GenerateThenEdit { prompt } => assert_eq!(prompt, "a red cube"),
            other => panic!("unexpected plan {}", other.name()),
        }
    }

    #[test]
    fn black_alone_is_ignored() {
        let plan = AcquisitionPlan::resolve(&request(false, true, false, Some("cube")));
        assert!(matches!(plan, AcquisitionPlan::GenerateThenEdit { .. }));

        let plan = AcquisitionPlan::resolve(&request(false, true, false, None));
        assert!(matches!(plan, AcquisitionPlan::Unresolvable));
    }

    #[test]
    fn nothing_usable_is_unresolvable() {
        for req in [
            request(false, false, false, None),
            request(false, false, true, None),
            request(false, false, true, Some("   ")),
        ] {
            let plan = AcquisitionPlan::resolve(&req);
            assert!(matches!(plan, AcquisitionPlan::Unresolvable));
            assert!(matches!(
                plan.execute(None).unwrap_err(),
                Error::Configuration(_)
            ));
        }
    }

    #[test]
    fn provided_pair_needs_no_service() {
        let pair = AcquisitionPlan::resolve(&request(true, true, false, None))
            .execute(None)
            .unwrap();
        assert_eq!(pair.white.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(pair.black.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn service_paths_without_service_are_configuration_errors() {
        let plan = AcquisitionPlan::resolve(&request(false, false, false, Some("cube")));
        let err = plan.execute(None).unwrap_err();
        assert!(matches!(err, Error::Configuration(ref m) if m.contains("generate-then-edit")));
    }

    #[test]
    fn missing_file_reports_role() {
        let req = AcquisitionRequest {
            white: Some(ImageSource::from(Path::new("/nonexistent/white.png"))),
            black: Some(mem(0)),
            ..AcquisitionRequest::default()
        };
        let err = AcquisitionPlan::resolve(&req).execute(None).unwrap_err();
        assert!(matches!(
            err,
            Error::Load {
                role: ImageRole::White,
                ..
            }
        ));
    }
}
