use std::env;
use std::path::{Path, PathBuf};

const WATCHED_VARIABLES: &[&str] = &[
    "FFMPEG_DIR",
    "PKG_CONFIG_PATH",
    "VCPKG_ROOT",
    "VCPKGRS_TRIPLET",
];

fn main() {
    for variable in WATCHED_VARIABLES {
        println!("cargo:rerun-if-env-changed={variable}");
    }

    if let Some(ffmpeg_dir) = env::var_os("FFMPEG_DIR").map(PathBuf::from) {
        check_ffmpeg_dir(&ffmpeg_dir);
        return;
    }

    // ffmpeg-sys-next finds FFmpeg through pkg-config everywhere except
    // Windows, where vcpkg is the usual source.
    if env::var("CARGO_CFG_TARGET_OS").unwrap_or_default() != "windows" {
        return;
    }
    match env::var("VCPKG_ROOT") {
        Ok(vcpkg_root) => {
            let triplet =
                env::var("VCPKGRS_TRIPLET").unwrap_or_else(|_| "x64-windows".to_string());
            let candidate = Path::new(&vcpkg_root).join("installed").join(triplet);
            if candidate.join("include").join("libavcodec").is_dir() {
                println!(
                    "cargo:warning=Using vcpkg FFmpeg at {}; set FFMPEG_DIR to pin it.",
                    candidate.display()
                );
            } else {
                println!(
                    "cargo:warning=No FFmpeg headers under {}; install ffmpeg with vcpkg or set FFMPEG_DIR.",
                    candidate.display()
                );
            }
        }
        Err(_) => println!(
            "cargo:warning=Neither FFMPEG_DIR nor VCPKG_ROOT is set; lecture2slides needs FFmpeg development libraries."
        ),
    }
}

fn check_ffmpeg_dir(ffmpeg_dir: &Path) {
    for required in ["include", "lib"] {
        if !ffmpeg_dir.join(required).is_dir() {
            println!(
                "cargo:warning=FFMPEG_DIR={} has no {required}/ directory.",
                ffmpeg_dir.display()
            );
        }
    }
}
