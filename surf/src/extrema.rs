use crate::response::{LayerTriple, ResponsePyramid};
use crate::{KeyPoint, Surf};
use cv_core::nalgebra::{Matrix3, Vector3};
use log::*;

/// Converts a box filter size into the scale of the equivalent Gaussian.
const FILTER_TO_SCALE: f64 = 0.1333;

/// A discrete scale space maximum, in the grid of the top layer of a triple.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extremum {
    pub row: usize,
    pub col: usize,
    /// Response of the middle layer at this cell.
    pub response: f32,
    /// Laplacian sign of the middle layer at this cell.
    pub laplacian: i8,
}

impl Surf {
    /// Find the scale space maxima of every triple and localize them.
    ///
    /// # Arguments
    /// * `pyramid` - A built response pyramid.
    /// # Return value
    /// Keypoints with position, scale, response and Laplacian sign set,
    /// in triple order and then raster order.
    pub fn detect_keypoints(&self, pyramid: &ResponsePyramid) -> Vec<KeyPoint> {
        let threshold = self.threshold as f32;
        let mut keypoints = vec![];
        let mut candidates = 0;
        for triple in pyramid.triples().filter(|t| t.octave < self.octaves) {
            let extrema = find_extrema(&triple, threshold);
            trace!(
                "Octave {} filters {}/{}/{}: {} extrema.",
                triple.octave,
                triple.bottom.filter,
                triple.middle.filter,
                triple.top.filter,
                extrema.len()
            );
            candidates += extrema.len();
            keypoints.extend(extrema.iter().filter_map(|e| localize(e, &triple)));
        }
        debug!(
            "{}/{} scale space extrema remain after subpixel refinement.",
            keypoints.len(),
            candidates
        );
        keypoints
    }
}

/// Scan the middle layer of a triple for maxima over its 3x3x3 neighborhood.
///
/// Iteration happens in the grid of the top (coarsest) layer, skipping a
/// border in which the top filter would leave the image. A candidate loses
/// every tie: any neighbor with an equal or greater response disqualifies it.
pub fn find_extrema(triple: &LayerTriple, threshold: f32) -> Vec<Extremum> {
    let LayerTriple {
        bottom: b,
        middle: m,
        top: t,
        ..
    } = *triple;
    let border = ((t.filter + 1) / (2 * t.step)).max(1);
    let mut extrema = vec![];
    for row in (border + 1)..t.height.saturating_sub(border) {
        for col in (border + 1)..t.width.saturating_sub(border) {
            let candidate = m.response(row, col, t);
            if candidate < threshold {
                continue;
            }
            let dominated = (-1isize..=1).any(|i| {
                (-1isize..=1).any(|j| {
                    let r = (row as isize + i) as usize;
                    let c = (col as isize + j) as usize;
                    t.response(r, c, t) >= candidate
                        || ((i != 0 || j != 0) && m.response(r, c, t) >= candidate)
                        || b.response(r, c, t) >= candidate
                })
            });
            if !dominated {
                extrema.push(Extremum {
                    row,
                    col,
                    response: candidate,
                    laplacian: m.laplacian(row, col, t),
                });
            }
        }
    }
    extrema
}

/// Fit a quadratic to the responses around an extremum and return the
/// offset `(dx, dy, dscale)` of its peak, or `None` if the Hessian of the
/// fit cannot be inverted.
pub fn interpolation_offset(extremum: &Extremum, triple: &LayerTriple) -> Option<Vector3<f64>> {
    let LayerTriple {
        bottom: b,
        middle: m,
        top: t,
        ..
    } = *triple;
    let (row, col) = (extremum.row as isize, extremum.col as isize);
    let at = |r: isize, c: isize| ((row + r) as usize, (col + c) as usize);
    let mid = |r, c| {
        let (r, c) = at(r, c);
        f64::from(m.response(r, c, t))
    };
    let top = |r, c| {
        let (r, c) = at(r, c);
        f64::from(t.response(r, c, t))
    };
    let bot = |r, c| {
        let (r, c) = at(r, c);
        f64::from(b.response(r, c, t))
    };

    // Gradient
    let dx = (mid(0, 1) - mid(0, -1)) / 2.0;
    let dy = (mid(1, 0) - mid(-1, 0)) / 2.0;
    let ds = (top(0, 0) - bot(0, 0)) / 2.0;

    // Hessian
    let v = mid(0, 0);
    let dxx = mid(0, 1) + mid(0, -1) - 2.0 * v;
    let dyy = mid(1, 0) + mid(-1, 0) - 2.0 * v;
    let dss = top(0, 0) + bot(0, 0) - 2.0 * v;
    let dxy = (mid(1, 1) - mid(1, -1) - mid(-1, 1) + mid(-1, -1)) / 4.0;
    let dxs = (top(0, 1) - top(0, -1) - bot(0, 1) + bot(0, -1)) / 4.0;
    let dys = (top(1, 0) - top(-1, 0) - bot(1, 0) + bot(-1, 0)) / 4.0;

    let hessian = Matrix3::new(dxx, dxy, dxs, dxy, dyy, dys, dxs, dys, dss);
    let gradient = Vector3::new(dx, dy, ds);
    let offset = -(hessian.try_inverse()? * gradient);
    offset.iter().all(|o| o.is_finite()).then_some(offset)
}

/// Refine an extremum to sub-pixel position and sub-filter scale.
///
/// The refinement is rejected when the triple is not evenly spaced in filter
/// size, when the fit is degenerate, or when the peak moves half a grid
/// unit or more along any axis.
pub fn localize(extremum: &Extremum, triple: &LayerTriple) -> Option<KeyPoint> {
    let LayerTriple {
        bottom: b,
        middle: m,
        top: t,
        octave,
    } = *triple;
    let filter_step = m.filter as isize - b.filter as isize;
    if filter_step <= 0 || t.filter as isize - m.filter as isize != filter_step {
        return None;
    }
    let offset = interpolation_offset(extremum, triple)?;
    if offset.iter().any(|o| o.abs() >= 0.5) {
        return None;
    }
    let step = t.step as f64;
    Some(KeyPoint {
        point: (
            ((extremum.col as f64 + offset.x) * step) as f32,
            ((extremum.row as f64 + offset.y) * step) as f32,
        ),
        scale: (FILTER_TO_SCALE * (m.filter as f64 + offset.z * filter_step as f64)) as f32,
        orientation: 0.0,
        response: extremum.response,
        laplacian: extremum.laplacian,
        octave,
        descriptor: None,
    })
}
