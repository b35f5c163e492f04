use std::{fs, path::Path};

use surf::Surf;

fn replace_ext(filename: &str, new: &str) -> String {
    let stemmed = Path::new(filename).file_stem().unwrap().to_str().unwrap();
    format!("{stemmed}{new}")
}

fn main() {
    pretty_env_logger::init_timed();
    let args: Vec<_> = std::env::args().collect();
    for path in &args[1..] {
        let kps = Surf::default().extract_path(path).unwrap();
        let mut kp_file = fs::File::create(replace_ext(path, "_kps.csv")).unwrap();
        let mut desc_file = fs::File::create(replace_ext(path, "_descs.txt")).unwrap();
        for kp in &kps {
            std::io::Write::write_all(
                &mut kp_file,
                format!(
                    "{}, {}, {}, {}, {}, {}, {}\n",
                    kp.point.0, kp.point.1, kp.orientation, kp.scale, kp.response, kp.laplacian, kp.octave
                )
                .as_bytes(),
            )
            .unwrap();
            if let Some(descriptor) = &kp.descriptor {
                std::io::Write::write_all(
                    &mut desc_file,
                    format!(
                        "{}\n",
                        descriptor
                            .iter()
                            .map(|x| format!("{x:.6}"))
                            .collect::<Vec<_>>()
                            .join(" ")
                    )
                    .as_bytes(),
                )
                .unwrap();
            }
        }
    }
}
