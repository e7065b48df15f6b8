//! CLI integration tests

use assert_cmd::Command;
use image::{DynamicImage, Rgba, RgbaImage};
use predicates::prelude::*;
use std::path::Path;

fn write_png(path: &Path, width: u32, height: u32, color: [u8; 4]) {
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba(color)))
        .save_with_format(path, image::ImageFormat::Png)
        .unwrap();
}

fn logo_options(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("options.json");
    std::fs::write(
        &path,
        r#"{"watermarkType": "logo", "logoSize": 20, "logoOpacity": 1.0, "logoPosition": "top-left", "logoOffsetX": 0, "logoOffsetY": 0}"#,
    )
    .unwrap();
    path
}

#[test]
fn test_cli_info_command() {
    let mut cmd = Command::cargo_bin("watermarker").unwrap();
    cmd.arg("info")
        .assert()
        .success()
        .stdout(predicate::str::contains("Watermarker"))
        .stdout(predicate::str::contains("Supported formats"))
        .stdout(predicate::str::contains("image/png"));
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("watermarker").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Batch watermarking of images"))
        .stdout(predicate::str::contains("watermark"))
        .stdout(predicate::str::contains("batch"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("watermarker").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.1.0"));
}

#[test]
fn test_invalid_command() {
    let mut cmd = Command::cargo_bin("watermarker").unwrap();
    cmd.arg("invalid-command").assert().failure();
}

#[test]
fn test_verbose_and_config_flags() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("custom_config.toml");
    let mut cmd = Command::cargo_bin("watermarker").unwrap();
    cmd.args(["--verbose", "--config"])
        .arg(&config)
        .arg("info")
        .assert()
        .success();
}

#[test]
fn test_batch_isolates_corrupt_image() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    std::fs::create_dir(&input).unwrap();

    write_png(&input.join("a.png"), 60, 40, [255, 255, 255, 255]);
    std::fs::write(input.join("b.png"), b"not really a png").unwrap();
    write_png(&input.join("c.png"), 50, 50, [255, 255, 255, 255]);
    let logo = dir.path().join("logo.png");
    write_png(&logo, 20, 20, [0, 0, 255, 255]);
    let summary = dir.path().join("summary.json");

    let mut cmd = Command::cargo_bin("watermarker").unwrap();
    cmd.arg("batch")
        .arg("--input-dir")
        .arg(&input)
        .arg("--output-dir")
        .arg(&output)
        .arg("--options")
        .arg(logo_options(dir.path()))
        .arg("--logo")
        .arg(&logo)
        .arg("--summary")
        .arg(&summary)
        .assert()
        .success()
        .stdout(predicate::str::contains("2 succeeded, 1 failed"));

    assert!(output.join("watermarked_a.png").exists());
    assert!(!output.join("watermarked_b.png").exists());

    let result = image::open(output.join("watermarked_c.png")).unwrap().into_rgba8();
    assert_eq!(*result.get_pixel(5, 5), Rgba([0, 0, 255, 255]));
    assert_eq!(*result.get_pixel(40, 40), Rgba([255, 255, 255, 255]));

    let report: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&summary).unwrap()).unwrap();
    assert_eq!(report["summary"]["total"], 3);
    assert_eq!(report["entries"][1]["status"], "failed");
    assert_eq!(report["entries"][1]["error_type"], "decode_error");
}

#[test]
fn test_watermark_single_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("photo.png");
    let output = dir.path().join("result").join("photo.png");
    write_png(&input, 40, 40, [255, 255, 255, 255]);
    let logo = dir.path().join("logo.png");
    write_png(&logo, 20, 20, [255, 0, 0, 255]);

    let mut cmd = Command::cargo_bin("watermarker").unwrap();
    cmd.arg("watermark")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .arg("--options")
        .arg(logo_options(dir.path()))
        .arg("--logo")
        .arg(&logo)
        .assert()
        .success()
        .stdout(predicate::str::contains("Watermarked"));

    let result = image::open(&output).unwrap().into_rgba8();
    assert_eq!(*result.get_pixel(10, 10), Rgba([255, 0, 0, 255]));
}

#[test]
fn test_watermark_corrupt_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.png");
    std::fs::write(&input, b"garbage").unwrap();

    let mut cmd = Command::cargo_bin("watermarker").unwrap();
    cmd.arg("watermark")
        .arg("-i")
        .arg(&input)
        .arg("-o")
        .arg(dir.path().join("out.png"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("broken.png"));
}
