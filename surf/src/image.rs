use crate::Error;
use derive_more::{Deref, DerefMut};
use image::{DynamicImage, ImageBuffer, Luma, Pixel};
use log::*;
use ndarray::ArrayView2;
use nshare::RefNdarray2;

type GrayImageBuffer = ImageBuffer<Luma<f32>, Vec<f32>>;

/// The image type we use in this library.
///
/// This is a wrapper around a contiguous f32 buffer holding unit intensities
/// (`0.0` is black, `1.0` is white). All detector thresholds are expressed
/// in these units, so an 8-bit source is divided by 255 and a 16-bit source
/// by 65535 on the way in.
///
/// We continue to use the image crate for loading and saving images.
#[derive(Debug, Clone, Deref, DerefMut)]
pub struct GrayFloatImage(pub GrayImageBuffer);

impl GrayFloatImage {
    /// Create a unit float image from the image crate's DynamicImage type.
    ///
    /// # Arguments
    /// * `input_image` - the input image.
    /// # Return value
    /// An image with pixel values between 0 and 1, or an error if the
    /// pixel layout cannot be represented as a single luma channel.
    pub fn from_dynamic(input_image: &DynamicImage) -> Result<Self, Error> {
        let (width, height) = (input_image.width(), input_image.height());
        if width == 0 || height == 0 {
            return Err(Error::EmptyImage { width, height });
        }
        let buffer = match input_image.grayscale() {
            DynamicImage::ImageLuma8(gray_image) => {
                info!("Loaded a {} x {} 8-bit image", width, height);
                ImageBuffer::from_fn(width, height, |x, y| {
                    Luma([f32::from(gray_image[(x, y)][0]) / 255f32])
                })
            }
            DynamicImage::ImageLuma16(gray_image) => {
                info!("Loaded a {} x {} 16-bit image", width, height);
                ImageBuffer::from_fn(width, height, |x, y| {
                    Luma([f32::from(gray_image[(x, y)][0]) / 65535f32])
                })
            }
            DynamicImage::ImageLumaA8(gray_image) => {
                info!("Loaded a {} x {} 8-bit image with alpha", width, height);
                ImageBuffer::from_fn(width, height, |x, y| {
                    Luma([f32::from(gray_image[(x, y)][0]) / 255f32])
                })
            }
            DynamicImage::ImageLumaA16(gray_image) => {
                info!("Loaded a {} x {} 16-bit image with alpha", width, height);
                ImageBuffer::from_fn(width, height, |x, y| {
                    Luma([f32::from(gray_image[(x, y)][0]) / 65535f32])
                })
            }
            DynamicImage::ImageRgb32F(float_image) => {
                info!("Loaded a {} x {} 32-bit RGB float image", width, height);
                ImageBuffer::from_fn(width, height, |x, y| {
                    Luma([float_image[(x, y)].to_luma()[0]])
                })
            }
            DynamicImage::ImageRgba32F(float_image) => {
                info!("Loaded a {} x {} 32-bit RGBA float image", width, height);
                ImageBuffer::from_fn(width, height, |x, y| {
                    Luma([float_image[(x, y)].to_luma()[0]])
                })
            }
            other => {
                return Err(Error::UnsupportedPixelFormat(format!(
                    "{:?}",
                    other.color()
                )))
            }
        };
        Ok(Self(buffer))
    }

    /// Build an image by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> f32) -> Self {
        Self(ImageBuffer::from_fn(width as u32, height as u32, |x, y| {
            Luma([f(x as usize, y as usize)])
        }))
    }

    /// A `[row, col]` view of the samples.
    pub fn ref_array2(&self) -> ArrayView2<f32> {
        self.0.ref_ndarray2()
    }

    pub fn width(&self) -> usize {
        self.0.width() as usize
    }

    pub fn height(&self) -> usize {
        self.0.height() as usize
    }

    pub fn new(width: usize, height: usize) -> Self {
        Self(ImageBuffer::from_pixel(
            width as u32,
            height as u32,
            Luma([0.0]),
        ))
    }

    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.get_pixel(x as u32, y as u32)[0]
    }
}
