use crate::{integral::IntegralImage, Error};
use log::*;
use ndarray::{Array2, Zip};

/// Filter sizes computed for each octave. Later octaves only add the two
/// coarsest sizes and borrow the rest from the octave below.
const OCTAVE_FILTERS: [&[usize]; 5] = [
    &[9, 15, 21, 27],
    &[39, 51],
    &[75, 99],
    &[147, 195],
    &[291, 387],
];

/// The indices into the layer list which form each octave.
const FILTER_MAP: [[usize; 4]; 5] = [
    [0, 1, 2, 3],
    [1, 3, 4, 5],
    [3, 5, 6, 7],
    [5, 7, 8, 9],
    [7, 9, 10, 11],
];

/// Largest number of octaves the filter table supports.
pub const MAX_OCTAVES: usize = OCTAVE_FILTERS.len();

/// A grid of determinant-of-Hessian responses for a single box filter size.
#[derive(Debug, Clone)]
pub struct ResponseLayer {
    /// Number of grid columns.
    pub width: usize,
    /// Number of grid rows.
    pub height: usize,
    /// Distance in pixels between two grid samples.
    pub step: usize,
    /// Side length of the box filter in pixels.
    pub filter: usize,
    /// Determinant of Hessian, indexed `[row, col]`.
    pub responses: Array2<f32>,
    /// Sign of the trace of the Hessian (+1 or -1), indexed `[row, col]`.
    pub laplacian: Array2<i8>,
}

impl ResponseLayer {
    pub fn new(width: usize, height: usize, step: usize, filter: usize) -> Self {
        Self {
            width,
            height,
            step,
            filter,
            responses: Array2::zeros((height, width)),
            laplacian: Array2::from_elem((height, width), 1),
        }
    }

    /// Fill the layer from the integral image using the box filter
    /// approximation of the second order Gaussian derivatives.
    pub fn compute(&mut self, integral: &IntegralImage) {
        let step = self.step as isize;
        let b = (self.filter as isize - 1) / 2;
        let l = self.filter as isize / 3;
        let w = self.filter as isize;
        let inverse_area = 1.0 / (w * w) as f64;
        Zip::indexed(&mut self.responses)
            .and(&mut self.laplacian)
            .for_each(|(ar, ac), response, laplacian| {
                let r = ar as isize * step;
                let c = ac as isize * step;
                let dxx = integral.box_sum(r - l + 1, c - b, 2 * l - 1, w)
                    - integral.box_sum(r - l + 1, c - l / 2, 2 * l - 1, l) * 3.0;
                let dyy = integral.box_sum(r - b, c - l + 1, w, 2 * l - 1)
                    - integral.box_sum(r - l / 2, c - l + 1, l, 2 * l - 1) * 3.0;
                let dxy = integral.box_sum(r - l, c + 1, l, l)
                    + integral.box_sum(r + 1, c - l, l, l)
                    - integral.box_sum(r - l, c - l, l, l)
                    - integral.box_sum(r + 1, c + 1, l, l);
                let dxx = dxx * inverse_area;
                let dyy = dyy * inverse_area;
                let dxy = dxy * inverse_area;
                *response = (dxx * dyy - 0.81 * dxy * dxy) as f32;
                *laplacian = if dxx + dyy >= 0.0 { 1 } else { -1 };
            });
    }

    /// Read the response at `(row, col)` expressed in the grid of `src`.
    ///
    /// The scale between the grids is truncated to an integer.
    pub fn response(&self, row: usize, col: usize, src: &ResponseLayer) -> f32 {
        let scale = self.width / src.width;
        self.responses[[scale * row, scale * col]]
    }

    /// Read the Laplacian sign at `(row, col)` expressed in the grid of `src`.
    pub fn laplacian(&self, row: usize, col: usize, src: &ResponseLayer) -> i8 {
        let scale = self.width / src.width;
        self.laplacian[[scale * row, scale * col]]
    }
}

/// Three consecutive layers of an octave. Extrema are searched in `middle`.
#[derive(Debug, Clone, Copy)]
pub struct LayerTriple<'a> {
    pub octave: usize,
    pub bottom: &'a ResponseLayer,
    pub middle: &'a ResponseLayer,
    pub top: &'a ResponseLayer,
}

/// All response layers of an image.
///
/// The pyramid owns its allocation and is meant to be kept around between
/// frames: [`ResponsePyramid::build`] only reallocates the layer grids when
/// the image dimensions change.
#[derive(Debug, Clone)]
pub struct ResponsePyramid {
    octaves: usize,
    initial_step: usize,
    /// Image dimensions the layers are currently allocated for.
    allocated_for: Option<(usize, usize)>,
    layers: Vec<ResponseLayer>,
}

impl ResponsePyramid {
    /// Create an empty pyramid.
    ///
    /// # Arguments
    /// * `octaves` - Number of octaves, between 1 and 5.
    /// * `initial_step` - Sampling step of the first octave in pixels.
    pub fn new(octaves: usize, initial_step: usize) -> Result<Self, Error> {
        if !(1..=MAX_OCTAVES).contains(&octaves) {
            return Err(Error::InvalidOctaves(octaves));
        }
        if initial_step == 0 {
            return Err(Error::InvalidInitialStep(initial_step));
        }
        Ok(Self {
            octaves,
            initial_step,
            allocated_for: None,
            layers: vec![],
        })
    }

    /// Change the octave count and initial step.
    ///
    /// The layers depend on both, so a change drops the current allocation
    /// and the next [`ResponsePyramid::build`] reallocates.
    pub fn configure(&mut self, octaves: usize, initial_step: usize) -> Result<(), Error> {
        if (octaves, initial_step) != (self.octaves, self.initial_step) {
            debug!(
                "Reconfiguring response pyramid from {} octaves at step {} to {} octaves at step {}.",
                self.octaves, self.initial_step, octaves, initial_step
            );
            *self = Self::new(octaves, initial_step)?;
        }
        Ok(())
    }

    pub fn octaves(&self) -> usize {
        self.octaves
    }

    pub fn initial_step(&self) -> usize {
        self.initial_step
    }

    pub fn layers(&self) -> &[ResponseLayer] {
        &self.layers
    }

    /// Whether the layers are allocated for an image of the given size.
    pub fn is_allocated_for(&self, width: usize, height: usize) -> bool {
        self.allocated_for == Some((width, height))
    }

    fn allocate(&mut self, width: usize, height: usize) {
        let mut w = width / self.initial_step;
        let mut h = height / self.initial_step;
        let mut step = self.initial_step;
        self.layers.clear();
        for filters in OCTAVE_FILTERS.iter().take(self.octaves) {
            for &filter in filters.iter() {
                self.layers.push(ResponseLayer::new(w, h, step, filter));
            }
            w /= 2;
            h /= 2;
            step *= 2;
        }
        self.allocated_for = Some((width, height));
    }

    /// Compute every layer from the integral image.
    pub fn build(&mut self, integral: &IntegralImage) {
        let (width, height) = (integral.width(), integral.height());
        if self.is_allocated_for(width, height) {
            debug!("Reusing response layers for a {}x{} image.", width, height);
        } else {
            debug!("Allocating response layers for a {}x{} image.", width, height);
            self.allocate(width, height);
        }
        for layer in self.layers.iter_mut() {
            layer.compute(integral);
            trace!(
                "Computed {}x{} layer with filter {} and step {}.",
                layer.width,
                layer.height,
                layer.filter,
                layer.step
            );
        }
    }

    /// Iterate over the (bottom, middle, top) triples, two per octave.
    ///
    /// Yields nothing if the pyramid has not been built yet.
    pub fn triples(&self) -> impl Iterator<Item = LayerTriple<'_>> + '_ {
        let built = !self.layers.is_empty();
        FILTER_MAP
            .iter()
            .take(if built { self.octaves } else { 0 })
            .enumerate()
            .flat_map(move |(octave, map)| {
                (0..2).map(move |i| LayerTriple {
                    octave,
                    bottom: &self.layers[map[i]],
                    middle: &self.layers[map[i + 1]],
                    top: &self.layers[map[i + 2]],
                })
            })
    }
}
