use std::error::Error;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use image::{GrayImage, Luma};
use tempfile::tempdir;

fn write_sample_image(dir: &Path) -> Result<std::path::PathBuf, Box<dyn Error>> {
    let path = dir.join("sample.png");
    GrayImage::from_pixel(16, 16, Luma([128])).save(&path)?;
    Ok(path)
}

#[test]
fn help_lists_main_options() -> Result<(), Box<dyn Error>> {
    let output = cargo_bin_cmd!("emotion-cli").arg("--help").output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for flag in ["--input", "--webcam", "--model", "--labels", "--display"] {
        assert!(stdout.contains(flag), "help should mention {flag}");
    }
    Ok(())
}

#[test]
fn missing_model_reports_model_not_ready() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let image = write_sample_image(work_dir.path())?;

    let output = cargo_bin_cmd!("emotion-cli")
        .current_dir(work_dir.path())
        .arg("--input")
        .arg(&image)
        .arg("--model")
        .arg(work_dir.path().join("absent.onnx"))
        .output()?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("model not ready"),
        "unexpected stderr: {stderr}"
    );
    Ok(())
}

#[test]
fn unsupported_rotation_is_rejected() -> Result<(), Box<dyn Error>> {
    let work_dir = tempdir()?;
    let image = write_sample_image(work_dir.path())?;

    let output = cargo_bin_cmd!("emotion-cli")
        .current_dir(work_dir.path())
        .arg("--input")
        .arg(&image)
        .args(["--rotation", "45"])
        .output()?;

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unsupported rotation 45"), "unexpected stderr: {stderr}");
    Ok(())
}

#[test]
fn webcam_and_input_conflict() -> Result<(), Box<dyn Error>> {
    let output = cargo_bin_cmd!("emotion-cli")
        .args(["--webcam", "--input", "faces"])
        .output()?;
    assert!(!output.status.success());
    Ok(())
}

#[test]
fn malformed_display_size_is_rejected() -> Result<(), Box<dyn Error>> {
    let output = cargo_bin_cmd!("emotion-cli")
        .args(["--input", "faces", "--display", "wide"])
        .output()?;
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("WIDTHxHEIGHT"), "unexpected stderr: {stderr}");
    Ok(())
}
