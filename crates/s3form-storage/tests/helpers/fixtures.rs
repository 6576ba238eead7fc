//! Test fixtures: the files under `tests/fixtures`.

use std::path::PathBuf;

/// Size of `ffffff.png`, a 1x1 white RGBA image.
pub const PNG_SIZE: u64 = 68;

/// Size of `xss-test.svg` once scriptable content is stripped.
pub const SANITIZED_SVG_SIZE: u64 = 463;

pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

pub fn load(name: &str) -> Vec<u8> {
    std::fs::read(fixture_path(name)).unwrap_or_else(|e| panic!("fixture {name}: {e}"))
}

pub fn white_png() -> Vec<u8> {
    load("ffffff.png")
}

pub fn xss_svg() -> Vec<u8> {
    load("xss-test.svg")
}
