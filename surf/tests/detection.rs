use image::{imageops, DynamicImage, GrayImage, Luma};
use imageproc::{drawing::draw_filled_rect_mut, rect::Rect};
use log::*;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::f32::consts::{FRAC_PI_2, PI, TAU};
use surf::extrema::find_extrema;
use surf::orientation::compute_main_orientation;
use surf::{
    get_descriptor, match_keypoints, DescriptorMode, Error, FeatureDetector, GrayFloatImage,
    IntegralImage, KeyPoint, ResponsePyramid, Surf,
};

const LOWES_RATIO: f32 = 0.8;

fn init() {
    let _ = pretty_env_logger::try_init_timed();
}

/// Random gray blocks, which give plenty of corners and blobs.
fn blocks(seed: u64, size: usize, block: usize) -> GrayFloatImage {
    let mut rng = Pcg64::seed_from_u64(seed);
    let cells = (size + block - 1) / block;
    let values: Vec<f32> = (0..cells * cells).map(|_| rng.gen_range(0.0..1.0)).collect();
    GrayFloatImage::from_fn(size, size, |x, y| values[(y / block) * cells + x / block])
}

/// A sum of Gaussian blobs, `(x, y, sigma, amplitude)`.
fn blobs(width: usize, height: usize, blobs: &[(f32, f32, f32, f32)]) -> GrayFloatImage {
    GrayFloatImage::from_fn(width, height, |x, y| {
        blobs
            .iter()
            .map(|&(bx, by, sigma, amplitude)| {
                let (dx, dy) = (x as f32 - bx, y as f32 - by);
                amplitude * (-(dx * dx + dy * dy) / (2.0 * sigma * sigma)).exp()
            })
            .sum()
    })
}

fn angle_difference(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(TAU);
    d.min(TAU - d)
}

#[test]
fn uniform_image_has_no_keypoints() {
    init();
    let image = GrayFloatImage::from_fn(64, 64, |_, _| 0.5);
    let keypoints = Surf::default().extract_from_gray_float_image(&image).unwrap();
    assert!(keypoints.is_empty());
}

#[test]
fn bright_square_gives_a_keypoint_at_its_center() {
    init();
    let mut gray = GrayImage::new(64, 64);
    draw_filled_rect_mut(&mut gray, Rect::at(29, 29).of_size(7, 7), Luma([255u8]));
    let keypoints = Surf::default()
        .extract(&DynamicImage::ImageLuma8(gray))
        .unwrap();
    info!("{} keypoints on the square", keypoints.len());
    let strongest = keypoints
        .iter()
        .max_by(|a, b| a.response.total_cmp(&b.response))
        .expect("the square should be detected");
    assert!((strongest.point.0 - 32.0).abs() < 1.0, "{strongest:?}");
    assert!((strongest.point.1 - 32.0).abs() < 1.0, "{strongest:?}");
    assert_eq!(strongest.laplacian, -1);
    assert_eq!(strongest.octave, 0);
    // Besides the center, the corners of the square may respond as well,
    // about 6.4 pixels out along the diagonals. Nothing lies further away.
    for keypoint in &keypoints {
        let (dx, dy) = (keypoint.point.0 - 32.0, keypoint.point.1 - 32.0);
        assert!((dx * dx + dy * dy).sqrt() < 10.0, "{keypoint:?}");
    }
    for keypoint in &keypoints {
        let descriptor = keypoint.descriptor.as_ref().unwrap();
        assert_eq!(descriptor.len(), 64);
        assert!((descriptor.norm() - 1.0).abs() < 1e-5);
        assert!((0.0..TAU).contains(&keypoint.orientation));
    }
}

#[test]
fn extraction_is_deterministic() {
    init();
    let image = blocks(1, 128, 6);
    let surf = Surf::default();
    let first = surf.extract_from_gray_float_image(&image).unwrap();
    let second = surf.extract_from_gray_float_image(&image).unwrap();
    assert!(!first.is_empty());
    assert_eq!(first, second);
}

#[test]
fn raising_the_threshold_never_adds_keypoints() {
    init();
    let image = blocks(2, 128, 5);
    let counts: Vec<usize> = [0.00005, 0.0002, 0.001, 0.005, 0.02]
        .iter()
        .map(|&threshold| {
            Surf {
                descriptor: DescriptorMode::None,
                ..Surf::new(threshold)
            }
            .extract_from_gray_float_image(&image)
            .unwrap()
            .len()
        })
        .collect();
    info!("keypoint counts: {:?}", counts);
    assert!(counts[0] > 0);
    assert!(counts.windows(2).all(|w| w[0] >= w[1]), "{counts:?}");
}

#[test]
fn extrema_stay_out_of_the_border() {
    init();
    let image = blocks(3, 160, 4);
    let integral = IntegralImage::new(&image);
    let mut pyramid = ResponsePyramid::new(4, 2).unwrap();
    pyramid.build(&integral);
    let mut total = 0;
    for triple in pyramid.triples() {
        let t = triple.top;
        let border = (t.filter + 1) / (2 * t.step);
        for extremum in find_extrema(&triple, 0.0002) {
            assert!(extremum.row > border && extremum.row < t.height - border);
            assert!(extremum.col > border && extremum.col < t.width - border);
            total += 1;
        }
    }
    assert!(total > 0);
}

#[test]
fn every_stage_can_be_disabled() {
    init();
    let image = blocks(4, 96, 6);
    let upright = Surf {
        orientation: false,
        descriptor: DescriptorMode::Extended,
        ..Default::default()
    }
    .extract_from_gray_float_image(&image)
    .unwrap();
    assert!(!upright.is_empty());
    for keypoint in &upright {
        assert_eq!(keypoint.orientation, 0.0);
        assert_eq!(keypoint.descriptor.as_ref().unwrap().len(), 128);
    }

    let bare = Surf {
        orientation: false,
        descriptor: DescriptorMode::None,
        ..Default::default()
    }
    .extract_from_gray_float_image(&image)
    .unwrap();
    assert_eq!(bare.len(), upright.len());
    assert!(bare.iter().all(|k| k.descriptor.is_none()));
    // Detection itself does not depend on the later stages.
    for (a, b) in bare.iter().zip(upright.iter()) {
        assert_eq!(a.point, b.point);
        assert_eq!(a.scale, b.scale);
    }
}

#[test]
fn rotation_shifts_orientation_and_keeps_descriptor() {
    init();
    let image = blobs(96, 96, &[(68.0, 56.0, 12.0, 1.0), (40.0, 30.0, 5.0, 0.3)]);
    let rotated = GrayFloatImage(imageops::rotate90(&image.0));
    let (original_integral, rotated_integral) =
        (IntegralImage::new(&image), IntegralImage::new(&rotated));

    // A pixel (x, y) lands on (height - 1 - y, x) after rotating clockwise.
    let (x, y) = (48.0, 48.0);
    let mut original = KeyPoint {
        point: (x, y),
        scale: 2.0,
        orientation: 0.0,
        response: 0.0,
        laplacian: -1,
        octave: 0,
        descriptor: None,
    };
    let mut turned = KeyPoint {
        point: (95.0 - y, x),
        ..original.clone()
    };
    original.orientation = compute_main_orientation(&original, &original_integral);
    turned.orientation = compute_main_orientation(&turned, &rotated_integral);
    info!(
        "orientation {} turned into {}",
        original.orientation, turned.orientation
    );
    assert!(
        angle_difference(turned.orientation, original.orientation + FRAC_PI_2) < 0.1,
        "{} vs {}",
        original.orientation,
        turned.orientation
    );

    let a = get_descriptor(&original, &original_integral, false, false);
    let b = get_descriptor(&turned, &rotated_integral, false, false);
    let similarity = a.cosine_similarity(&b);
    info!("descriptor cosine similarity {}", similarity);
    assert!(similarity > 0.9);

    // Without rotation compensation the descriptors disagree.
    let a = get_descriptor(&original, &original_integral, true, false);
    let b = get_descriptor(&turned, &rotated_integral, true, false);
    assert!(a.cosine_similarity(&b) < similarity);
}

#[test]
fn translated_image_matches_itself() {
    init();
    let scene = [
        (60.0, 64.0, 4.0, 1.0),
        (90.0, 50.0, 6.0, 0.8),
        (120.0, 80.0, 3.0, 0.9),
        (70.0, 110.0, 5.0, 0.6),
        (110.0, 120.0, 8.0, 1.0),
        (140.0, 130.0, 3.5, 0.7),
    ];
    let shifted: Vec<_> = scene
        .iter()
        .map(|&(x, y, s, a)| (x + 16.0, y + 16.0, s, a))
        .collect();
    let surf = Surf {
        octaves: 3,
        ..Surf::dense()
    };
    let kps1 = surf
        .extract_from_gray_float_image(&blobs(200, 200, &scene))
        .unwrap();
    let kps2 = surf
        .extract_from_gray_float_image(&blobs(200, 200, &shifted))
        .unwrap();
    info!("{} and {} keypoints", kps1.len(), kps2.len());

    let matches = match_keypoints(&kps1, &kps2, LOWES_RATIO);
    info!("{} matches", matches.len());
    assert!(matches.len() >= scene.len() / 2);
    let consistent = matches
        .iter()
        .filter(|&&(i1, i2)| {
            let (a, b) = (kps1[i1].point, kps2[i2].point);
            (b.0 - a.0 - 16.0).abs() < 1.0 && (b.1 - a.1 - 16.0).abs() < 1.0
        })
        .count();
    assert!(consistent * 10 >= matches.len() * 9, "{consistent}/{}", matches.len());
}

#[test]
fn pyramid_can_be_reused_between_frames() {
    init();
    let surf = Surf::default();
    let mut pyramid = surf.new_pyramid().unwrap();
    let frames = [blocks(5, 96, 6), blocks(6, 96, 6), blocks(7, 128, 6)];
    for frame in &frames {
        let reused = surf.extract_with_pyramid(frame, &mut pyramid).unwrap();
        let fresh = surf.extract_from_gray_float_image(frame).unwrap();
        assert_eq!(reused, fresh);
    }
    assert!(pyramid.is_allocated_for(128, 128));
}

#[test]
fn pyramid_follows_the_configuration() {
    init();
    // A small blob for the first octave and a large one for the later octaves.
    let image = blobs(
        256,
        256,
        &[(80.0, 90.0, 2.0, 1.0), (170.0, 160.0, 20.0, 1.0)],
    );
    let surf = Surf {
        octaves: 1,
        ..Surf::dense()
    };
    let mut pyramid = ResponsePyramid::new(5, 2).unwrap();
    let reused = surf.extract_with_pyramid(&image, &mut pyramid).unwrap();
    let fresh = surf.extract_from_gray_float_image(&image).unwrap();
    assert!(!fresh.is_empty());
    assert_eq!(reused, fresh);
    assert!(reused.iter().all(|k| k.octave == 0));
    assert_eq!((pyramid.octaves(), pyramid.initial_step()), (1, 2));

    // A larger pyramid handed straight to `detect` is cut to the configured octaves.
    let integral = IntegralImage::new(&image);
    let mut large = ResponsePyramid::new(5, 2).unwrap();
    large.build(&integral);
    assert_eq!(surf.detect(&integral, &large), fresh);

    let broken = Surf {
        initial_step: 0,
        ..surf
    };
    assert!(matches!(
        broken.extract_with_pyramid(&image, &mut pyramid),
        Err(Error::InvalidInitialStep(0))
    ));
}

#[test]
fn detector_trait_and_configuration_errors() {
    init();
    let image = blocks(8, 96, 6);
    let keypoints = Surf::default().detect_features(&image);
    assert!(!keypoints.is_empty());
    assert!(keypoints.iter().all(|k| k.point.0 >= 0.0 && k.point.0 < 96.0));

    let broken = Surf {
        octaves: 9,
        ..Default::default()
    };
    assert!(matches!(broken.validate(), Err(Error::InvalidOctaves(9))));
    assert!(broken.detect_features(&image).is_empty());
    assert!(matches!(
        Surf {
            initial_step: 0,
            ..Default::default()
        }
        .extract_from_gray_float_image(&image),
        Err(Error::InvalidInitialStep(0))
    ));
    assert!(matches!(
        Surf::default().extract_path("does/not/exist.png"),
        Err(Error::Image(_))
    ));
}

#[test]
fn orientation_range_on_real_content() {
    init();
    let keypoints = Surf::default()
        .extract_from_gray_float_image(&blocks(9, 128, 7))
        .unwrap();
    assert!(!keypoints.is_empty());
    assert!(keypoints
        .iter()
        .all(|k| k.orientation >= 0.0 && k.orientation < 2.0 * PI));
}
