use crate::KeyPoint;
use float_ord::FloatOrd;

/// Match the keypoints of two images by descriptor distance.
///
/// Every keypoint of `a` is compared against the keypoints of `b` with the
/// same Laplacian sign. A pair is kept when the nearest neighbor is closer
/// than `ratio` times the second nearest (Lowe's ratio test). Keypoints
/// without a descriptor never match.
///
/// Returns pairs of indices into `a` and `b`.
pub fn match_keypoints(a: &[KeyPoint], b: &[KeyPoint], ratio: f32) -> Vec<(usize, usize)> {
    a.iter()
        .enumerate()
        .filter_map(|(ia, ka)| {
            let da = ka.descriptor.as_ref()?;
            let mut neighbors: Vec<(FloatOrd<f32>, usize)> = b
                .iter()
                .enumerate()
                .filter(|(_, kb)| kb.laplacian == ka.laplacian)
                .filter_map(|(ib, kb)| {
                    let db = kb.descriptor.as_ref()?;
                    Some((FloatOrd(da.distance_squared(db)), ib))
                })
                .collect();
            neighbors.sort_unstable();
            match neighbors.as_slice() {
                [] => None,
                [(_, ib)] => Some((ia, *ib)),
                [(best, ib), (second, _), ..] => {
                    // Squared distances, so the ratio is squared as well.
                    (best.0 < second.0 * ratio * ratio).then_some((ia, *ib))
                }
            }
        })
        .collect()
}
