use assert_cmd::Command;
use camera_calib::{CameraParams, Distortion, Intrinsics, ParameterStore};
use predicates::prelude::*;

fn cli() -> Command {
    Command::cargo_bin("camera-calib").expect("binary")
}

#[test]
fn help_lists_subcommands() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("calibrate"))
        .stdout(predicate::str::contains("detect"))
        .stdout(predicate::str::contains("rectify"));
}

#[test]
fn rectify_writes_an_image_of_the_same_size() {
    let dir = tempfile::tempdir().expect("tempdir");
    let params = dir.path().join("Intrinsic.xml");
    let camera = CameraParams::new(
        Intrinsics::new(300.0, 300.0, 79.5, 59.5),
        Distortion {
            k1: -0.1,
            ..Default::default()
        },
    );
    ParameterStore::new(&params).save(&camera).expect("params");

    let input = dir.path().join("frame.png");
    image::GrayImage::from_fn(160, 120, |x, y| image::Luma([((x + y) % 256) as u8]))
        .save(&input)
        .expect("input");
    let output = dir.path().join("rectified.png");

    cli()
        .arg("rectify")
        .arg("--params")
        .arg(&params)
        .arg(&input)
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote"));

    let out = image::open(&output).expect("output").to_luma8();
    assert_eq!(out.dimensions(), (160, 120));
}

#[test]
fn rectify_rejects_a_malformed_parameter_store() {
    let dir = tempfile::tempdir().expect("tempdir");
    let params = dir.path().join("Intrinsic.xml");
    std::fs::write(&params, "<opencv_storage><matrix_left><data>1 2 3</data></matrix_left></opencv_storage>").expect("write");

    cli()
        .args(["rectify", "--params"])
        .arg(&params)
        .args(["in.png", "out.png"])
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("error:"));
}

#[test]
fn detect_reports_a_missing_board() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("blank.png");
    image::GrayImage::from_pixel(64, 48, image::Luma([128])).save(&input).expect("input");
    let overlay = dir.path().join("overlay.png");

    cli()
        .arg("detect")
        .arg(&input)
        .arg("--overlay")
        .arg(&overlay)
        .assert()
        .success()
        .stdout(predicate::str::contains("not found"));
    assert!(overlay.exists());
}

#[test]
fn calibrate_requires_an_existing_image_directory() {
    let dir = tempfile::tempdir().expect("tempdir");
    cli()
        .current_dir(dir.path())
        .args(["calibrate", "--images", "no-such-dir"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn invalid_pattern_override_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("blank.png");
    image::GrayImage::new(8, 8).save(&input).expect("input");
    cli()
        .args(["detect", "--columns", "0"])
        .arg(&input)
        .assert()
        .failure()
        .stderr(predicate::str::contains("inner corners"));
}

#[test]
fn calibrate_stops_on_an_image_without_a_board() {
    let dir = tempfile::tempdir().expect("tempdir");
    let images = dir.path().join("frames");
    std::fs::create_dir(&images).expect("mkdir");
    for n in 1..=3 {
        image::GrayImage::from_pixel(64, 48, image::Luma([128]))
            .save(images.join(format!("left{n}.bmp")))
            .expect("write bmp");
    }

    cli()
        .current_dir(dir.path())
        .args(["calibrate", "--image-count", "3", "--images"])
        .arg(&images)
        .timeout(std::time::Duration::from_secs(60))
        .assert()
        .failure()
        .stderr(predicate::str::contains("no chessboard found for view 1"));
    assert!(!dir.path().join("Intrinsic.xml").exists());
}
