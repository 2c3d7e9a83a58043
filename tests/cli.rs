use assert_cmd::prelude::*;
use image::{ImageFormat, Rgb, RgbImage};
use predicates::prelude::*;
use predicates::str::contains;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const BIRD_OBJ: &str = "\
o bird
v 0 0 0
v 1 0 0
v 1 1 0
v 0 1 0
f 1 2 3 4
";

fn assets_dir() -> TempDir {
    let dir = tempfile::tempdir().expect("temp assets");
    std::fs::write(dir.path().join("bird.obj"), BIRD_OBJ).expect("write model");
    RgbImage::from_pixel(16, 8, Rgb([200, 120, 40]))
        .save_with_format(dir.path().join("sky.png"), ImageFormat::Png)
        .expect("write environment");
    dir
}

fn summary(assets: &Path) -> Command {
    let mut cmd = Command::cargo_bin("flappy-xr").expect("binary exists");
    cmd.arg("--assets")
        .arg(assets)
        .args(["--environment", "sky.png", "--model", "bird.obj", "--summary-only"]);
    cmd
}

#[test]
fn summary_reports_loaded_scene() {
    let assets = assets_dir();
    summary(assets.path())
        .args(["--size", "800x400"])
        .assert()
        .success()
        .stdout(contains("Camera: fov 70.0, aspect 2.00, near 0.1, far 5000"))
        .stdout(contains(
            "Renderer: 800x400 @1.00x (headless, antialias on, Srgb, xr on)",
        ))
        .stdout(contains(
            "Lights: hemisphere #606060/#404040, directional #ffffff",
        ))
        .stdout(contains("Environment: ").and(contains("levels")))
        .stdout(contains("Model: bird (1 meshes)"));
}

#[test]
fn missing_assets_leave_scene_empty() {
    let assets = tempfile::tempdir().expect("temp assets");
    summary(assets.path())
        .assert()
        .success()
        .stdout(contains("Environment: not loaded"))
        .stdout(contains("Model: not loaded"))
        .stdout(contains("Lights: hemisphere"));
}

#[test]
fn corrupt_model_is_skipped() {
    let assets = assets_dir();
    std::fs::write(assets.path().join("bird.obj"), "v 0 0 0\nf 1 2 9\n").expect("write model");
    summary(assets.path())
        .assert()
        .success()
        .stdout(contains("Model: not loaded"))
        .stdout(contains("levels"));
}

#[test]
fn unknown_flag_is_rejected() {
    Command::cargo_bin("flappy-xr")
        .expect("binary exists")
        .arg("--fullscreen")
        .assert()
        .failure()
        .stderr(contains("Unknown argument: --fullscreen"));
}
