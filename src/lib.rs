//! Recover a transparent cut-out from two renderings of the same subject:
//! one over pure white, one over pure black.
//!
//! Where the two renderings agree the subject is opaque; where they differ by the
//! full white-to-black swing it is fully transparent. Alpha comes from the length
//! of that color shift, and the true foreground color is un-blended from the
//! black rendering.
//!
//! # Quick Start
//!
//! ```no_run
//! use diffmatte::matting;
//!
//! let white = image::open("cube_white.png").unwrap().to_rgb8();
//! let black = image::open("cube_black.png").unwrap().to_rgb8();
//! let rgba = matting::recover_rgba(&white, &black).expect("matting failed");
//! rgba.save("cube.png").unwrap();
//! ```
//!
//! # Acquisition
//!
//! When the renderings do not exist yet, an [`AcquisitionRequest`] describes what
//! the caller has (a prompt, a photo, a white rendering) and a
//! [`BackgroundService`] fills in the rest.
//!
//! ```no_run
//! use diffmatte::{process, AcquisitionRequest, CommandService, MatteOptions};
//!
//! let service = CommandService::new("my-image-service");
//! let request = AcquisitionRequest {
//!     prompt: Some("a red cube".to_string()),
//!     ..AcquisitionRequest::default()
//! };
//! let out = process(&request, Some(&service), "cube.png".as_ref(), &MatteOptions::default())
//!     .expect("pipeline failed");
//! println!("{}x{}", out.dimensions.0, out.dimensions.1);
//! ```

#![deny(missing_docs)]

pub mod acquire;
mod engine;
pub mod error;
pub mod matting;
pub mod service;

pub use acquire::{AcquisitionPlan, AcquisitionRequest, BackgroundPair, ImageSource};
pub use engine::{
    check_output_format, default_output_path, intermediate_paths, is_supported_image, matte,
    process, save_rgba, MatteOptions, MatteOutput,
};
pub use error::{Error, ImageRole, Result, ServiceOperation};
pub use service::{BackgroundService, CommandService};
