//! # SURF
//!
//! Speeded-Up Robust Features: scale and rotation invariant interest points
//! with float descriptors, computed from box filters over an integral image.
//!
//! The pipeline is:
//!
//! 1. Build an [`IntegralImage`] of the grayscale input.
//! 2. Build a [`ResponsePyramid`] of determinant-of-Hessian layers.
//! 3. Find maxima over each 3x3x3 neighborhood of the pyramid and refine
//!    them to sub-pixel position and scale.
//! 4. Estimate a dominant orientation per keypoint.
//! 5. Extract a 64 or 128 component descriptor per keypoint.
//!
//! [`Surf::extract`] runs all of it. Steps 3 to 5 only read the integral
//! image and the pyramid, so a caller processing video can keep one
//! pyramid around and call [`Surf::extract_with_pyramid`].

mod descriptors;
pub mod extrema;
pub mod image;
pub mod integral;
mod matching;
pub mod orientation;
pub mod response;

pub use crate::descriptors::{get_descriptor, Descriptor, DescriptorMode};
pub use crate::image::GrayFloatImage;
pub use crate::integral::IntegralImage;
pub use crate::matching::match_keypoints;
pub use crate::response::{LayerTriple, ResponseLayer, ResponsePyramid};

use ::image::{DynamicImage, ImageError};
use cv_core::nalgebra::Point2;
use cv_core::ImagePoint;
use log::*;
use std::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to load image: {0}")]
    Image(#[from] ImageError),
    #[error("unsupported pixel format {0}")]
    UnsupportedPixelFormat(String),
    #[error("image is empty ({width}x{height})")]
    EmptyImage { width: u32, height: u32 },
    #[error("number of octaves must be between 1 and 5, got {0}")]
    InvalidOctaves(usize),
    #[error("initial sampling step must be at least 1, got {0}")]
    InvalidInitialStep(usize),
}

/// A point of interest in an image.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct KeyPoint {
    /// The horizontal and vertical coordinates, in pixels.
    /// +x faces right and +y faces toward the bottom of the image,
    /// starting from the top left corner.
    pub point: (f32, f32),
    /// Characteristic scale, derived from the box filter size.
    pub scale: f32,
    /// Dominant orientation in radians within `[0, 2π)`, or `0` if
    /// orientation estimation is turned off.
    pub orientation: f32,
    /// The magnitude of response from the detector.
    pub response: f32,
    /// Sign of the Laplacian: `1` for dark blobs on a bright background,
    /// `-1` for bright blobs on a dark background. Keypoints with different
    /// signs never match.
    pub laplacian: i8,
    /// The octave in which the keypoint was detected.
    pub octave: usize,
    /// The descriptor, if one was requested.
    pub descriptor: Option<Descriptor>,
}

impl ImagePoint for KeyPoint {
    fn image_point(&self) -> Point2<f64> {
        Point2::new(self.point.0 as f64, self.point.1 as f64)
    }
}

/// Anything that turns an image into a list of points.
pub trait FeatureDetector {
    type Feature: ImagePoint;

    fn detect_features(&self, image: &GrayFloatImage) -> Vec<Self::Feature>;
}

/// Contains the configuration parameters of SURF.
///
/// The most important parameter to pay attention to is `threshold`.
/// [`Surf::new`] can be used to set this threshold and let all other parameters
/// remain default. You can also use the helpers [`Surf::sparse`] and
/// [`Surf::dense`]. The default value of `threshold` is `0.0002`.
#[derive(Debug, Copy, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Surf {
    /// Minimum determinant of Hessian response to accept a point
    pub threshold: f64,

    /// Number of octaves to search (1 to 5)
    pub octaves: usize,

    /// Sampling step of the first octave, in pixels
    pub initial_step: usize,

    /// Estimate a dominant orientation so that descriptors are rotation invariant
    pub orientation: bool,

    /// The kind of descriptor to extract
    pub descriptor: DescriptorMode,
}

impl Surf {
    /// This convenience constructor is provided for the very common case
    /// that the detector threshold needs to be modified.
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            ..Default::default()
        }
    }

    /// Create a `Surf` that sparsely detects features.
    ///
    /// Uses a threshold of `0.001` (default is `0.0002`).
    pub fn sparse() -> Self {
        Self::new(0.001)
    }

    /// Create a `Surf` that densely detects features.
    ///
    /// Uses a threshold of `0.00005` (default is `0.0002`).
    pub fn dense() -> Self {
        Self::new(0.00005)
    }

    /// Check the parameters without running anything.
    pub fn validate(&self) -> Result<(), Error> {
        self.new_pyramid().map(|_| ())
    }

    /// An empty response pyramid matching this configuration.
    pub fn new_pyramid(&self) -> Result<ResponsePyramid, Error> {
        ResponsePyramid::new(self.octaves, self.initial_step)
    }
}

impl Default for Surf {
    fn default() -> Surf {
        Surf {
            threshold: 0.0002f64,
            octaves: 5,
            initial_step: 2,
            orientation: true,
            descriptor: DescriptorMode::Standard,
        }
    }
}

impl Surf {
    /// Detect keypoints and compute their orientation and descriptor.
    ///
    /// The integral image and the pyramid are only read. The pyramid must
    /// have been built from `integral`. Octaves of the pyramid beyond
    /// `self.octaves` are not scanned.
    ///
    /// # Arguments
    /// * `integral` - Integral image of the input.
    /// * `pyramid` - Response pyramid built from `integral`.
    /// # Return value
    /// The keypoints in octave order, then raster order.
    pub fn detect(&self, integral: &IntegralImage, pyramid: &ResponsePyramid) -> Vec<KeyPoint> {
        trace!("Finding scale space extrema.");
        let mut keypoints = self.detect_keypoints(pyramid);
        if self.orientation {
            trace!("Computing orientations.");
            self.compute_orientations(&mut keypoints, integral);
        }
        trace!("Computing descriptors.");
        self.compute_descriptors(&mut keypoints, integral);
        keypoints
    }

    /// Extract features, reusing the allocation of a caller-owned pyramid.
    ///
    /// The pyramid is first brought to this configuration's octave count and
    /// initial step, then rebuilt for this image. Its layers are only
    /// reallocated when one of those or the image size differs from the
    /// previous call.
    pub fn extract_with_pyramid(
        &self,
        image: &GrayFloatImage,
        pyramid: &mut ResponsePyramid,
    ) -> Result<Vec<KeyPoint>, Error> {
        pyramid.configure(self.octaves, self.initial_step)?;
        let integral = IntegralImage::new(image);
        trace!("Integral image finished.");
        pyramid.build(&integral);
        trace!("Response pyramid finished.");
        let keypoints = self.detect(&integral, pyramid);
        info!("Extracted {} features", keypoints.len());
        Ok(keypoints)
    }

    /// Extract features from a grayscale image.
    pub fn extract_from_gray_float_image(&self, image: &GrayFloatImage) -> Result<Vec<KeyPoint>, Error> {
        let mut pyramid = self.new_pyramid()?;
        self.extract_with_pyramid(image, &mut pyramid)
    }

    /// Extract features using the SURF feature extractor.
    ///
    /// This performs all operations end-to-end. The client might be only interested
    /// in certain portions of the process, all of which are exposed in public functions,
    /// but this function can document how the various parts fit together.
    ///
    /// # Arguments
    /// * `image` - The input image for which to extract features.
    ///
    /// Returns the keypoints, each with its descriptor.
    ///
    /// # Example
    /// ```
    /// let image = image::DynamicImage::ImageLuma8(image::GrayImage::new(64, 64));
    /// let keypoints = surf::Surf::default().extract(&image).unwrap();
    /// assert!(keypoints.is_empty());
    /// ```
    pub fn extract(&self, image: &DynamicImage) -> Result<Vec<KeyPoint>, Error> {
        let float_image = GrayFloatImage::from_dynamic(image)?;
        self.extract_from_gray_float_image(&float_image)
    }

    /// Extract features using the SURF feature extractor from an image on disk.
    ///
    /// # Arguments
    /// * `path` - The input image path for which to extract features.
    pub fn extract_path(&self, path: impl AsRef<Path>) -> Result<Vec<KeyPoint>, Error> {
        self.extract(&::image::open(path)?)
    }
}

impl FeatureDetector for Surf {
    type Feature = KeyPoint;

    /// Runs the full pipeline. An invalid configuration yields no features.
    fn detect_features(&self, image: &GrayFloatImage) -> Vec<KeyPoint> {
        match self.extract_from_gray_float_image(image) {
            Ok(keypoints) => keypoints,
            Err(e) => {
                warn!("Not detecting features: {}", e);
                vec![]
            }
        }
    }
}
