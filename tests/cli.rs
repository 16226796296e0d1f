use assert_cmd::Command;
use image::{Rgb, RgbImage};
use insta::assert_snapshot;
use predicates::prelude::*;
use predicates::str::contains;
use qrcode::{Color, QrCode};
use std::path::Path;
use tempfile::TempDir;

/// Write `count` blank frames named so they sort in capture order.
fn blank_frames(dir: &Path, count: usize) {
    for i in 0..count {
        RgbImage::from_pixel(32, 32, Rgb([255, 255, 255]))
            .save(dir.join(format!("frame_{i:03}.png")))
            .unwrap();
    }
}

/// Write one frame holding a QR code per payload, laid out left to right.
fn coded_frame(path: &Path, payloads: &[&str]) {
    const MODULE_PX: u32 = 6;
    const SLOT_PX: u32 = 200;
    let frame_width = SLOT_PX * payloads.len() as u32 + 40;
    let mut image = RgbImage::from_pixel(frame_width, 200, Rgb([255; 3]));
    for (slot, payload) in payloads.iter().enumerate() {
        let code = QrCode::new(payload.as_bytes()).unwrap();
        let width = code.width() as u32;
        let left = 24 + slot as u32 * SLOT_PX;
        for (i, color) in code.to_colors().into_iter().enumerate() {
            if color != Color::Dark {
                continue;
            }
            let (mx, my) = (i as u32 % width, i as u32 / width);
            for dy in 0..MODULE_PX {
                for dx in 0..MODULE_PX {
                    let (x, y) = (left + mx * MODULE_PX + dx, 24 + my * MODULE_PX + dy);
                    image.put_pixel(x, y, Rgb([0; 3]));
                }
            }
        }
    }
    image.save(path).unwrap();
}

/// A command isolated from any user-level config.
fn qrseq(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("qrseq").unwrap();
    cmd.env_remove("QRSEQ_CONFIG")
        .env_remove("RUST_LOG")
        .env_remove("LOG_FORMAT")
        .env("XDG_CONFIG_HOME", home.path())
        .env("HOME", home.path())
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn blank_stream_emits_one_empty_batch_per_window() {
    let home = TempDir::new().unwrap();
    let frames = TempDir::new().unwrap();
    blank_frames(frames.path(), 4);

    qrseq(&home)
        .args(["run", "--emit-empty", "--window", "0.25"])
        .arg(frames.path())
        .assert()
        .success()
        .stdout("QR codes (left to right): []\n")
        .stderr(contains("4 frames, 1 batches"))
        .stderr(contains("end of stream"));
}

#[test]
fn real_codes_are_reported_left_to_right() {
    let home = TempDir::new().unwrap();
    let frames = TempDir::new().unwrap();
    coded_frame(&frames.path().join("frame_000.png"), &["3", "1", "2"]);

    qrseq(&home)
        .arg("run")
        .arg(frames.path())
        .assert()
        .success()
        .stdout("QR codes (left to right): [\"3\", \"1\", \"2\"]\n")
        .stderr(contains("1 frames, 1 batches"));
}

#[test]
fn blank_stream_is_silent_without_emit_empty() {
    let home = TempDir::new().unwrap();
    let frames = TempDir::new().unwrap();
    blank_frames(frames.path(), 4);

    qrseq(&home)
        .args(["run", "--window", "0.25"])
        .arg(frames.path())
        .assert()
        .success()
        .stdout("")
        .stderr(contains("0 batches"));
}

#[test]
fn json_format_prints_one_object_per_batch() {
    let home = TempDir::new().unwrap();
    let frames = TempDir::new().unwrap();
    blank_frames(frames.path(), 4);

    let output = qrseq(&home)
        .args(["run", "--emit-empty", "--window", "0.25", "--format", "json"])
        .arg(frames.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_snapshot!(stdout.trim_end(), @r#"{"sequence":1,"payloads":[]}"#);
}

#[test]
fn history_prints_the_full_sequence() {
    let home = TempDir::new().unwrap();
    let frames = TempDir::new().unwrap();
    blank_frames(frames.path(), 4);

    qrseq(&home)
        .args(["run", "--emit-empty", "--window", "0.25", "--consumers", "history"])
        .arg(frames.path())
        .assert()
        .success()
        .stdout("Full sequence: [[]]\n");
}

#[test]
fn frame_limit_stops_early() {
    let home = TempDir::new().unwrap();
    let frames = TempDir::new().unwrap();
    blank_frames(frames.path(), 5);

    qrseq(&home)
        .args(["run", "--max-frames", "2"])
        .arg(frames.path())
        .assert()
        .success()
        .stderr(contains("2 frames"))
        .stderr(contains("frame limit"));
}

#[test]
fn unreadable_frame_exits_with_failure() {
    let home = TempDir::new().unwrap();
    let frames = TempDir::new().unwrap();
    let missing = frames.path().join("missing.png");

    qrseq(&home)
        .arg("run")
        .arg(&missing)
        .assert()
        .failure()
        .code(1)
        .stderr(contains("read failure"));
}

#[test]
fn empty_input_directory_is_an_error() {
    let home = TempDir::new().unwrap();
    let frames = TempDir::new().unwrap();

    qrseq(&home)
        .arg("run")
        .arg(frames.path())
        .assert()
        .failure()
        .code(1)
        .stderr(contains("no image frames found"));
}

#[test]
fn unknown_consumer_is_rejected() {
    let home = TempDir::new().unwrap();
    let frames = TempDir::new().unwrap();
    blank_frames(frames.path(), 1);

    qrseq(&home)
        .args(["run", "--consumers", "log,banjo"])
        .arg(frames.path())
        .assert()
        .failure()
        .code(1)
        .stderr(contains("unknown consumer: banjo"));
}

#[test]
fn non_positive_fps_is_rejected() {
    let home = TempDir::new().unwrap();
    let frames = TempDir::new().unwrap();
    blank_frames(frames.path(), 1);

    qrseq(&home)
        .args(["run", "--fps", "0"])
        .arg(frames.path())
        .assert()
        .failure()
        .code(1)
        .stderr(contains("--fps must be positive"));
}

#[test]
fn oversized_window_and_tiny_fps_are_errors_not_crashes() {
    let home = TempDir::new().unwrap();
    let frames = TempDir::new().unwrap();
    blank_frames(frames.path(), 1);

    qrseq(&home)
        .args(["run", "--window", "1e30"])
        .arg(frames.path())
        .assert()
        .failure()
        .code(1)
        .stderr(contains("window.duration_seconds"));

    qrseq(&home)
        .args(["run", "--fps", "1e-20"])
        .arg(frames.path())
        .assert()
        .failure()
        .code(1)
        .stderr(contains("--fps must be positive"));
}

#[test]
fn invalid_config_file_is_reported() {
    let home = TempDir::new().unwrap();
    let frames = TempDir::new().unwrap();
    blank_frames(frames.path(), 1);
    let config = home.path().join("bad.toml");
    std::fs::write(&config, "[window]\nduration_seconds = -1.0\n").unwrap();

    qrseq(&home)
        .arg("run")
        .arg("--config")
        .arg(&config)
        .arg(frames.path())
        .assert()
        .failure()
        .code(1)
        .stderr(contains("window.duration_seconds"));
}

#[test]
fn config_from_environment_is_used() {
    let home = TempDir::new().unwrap();
    let frames = TempDir::new().unwrap();
    blank_frames(frames.path(), 4);
    let config = home.path().join("qrseq.toml");
    std::fs::write(
        &config,
        "[window]\nduration_seconds = 0.25\nemit_empty_batches = true\n",
    )
    .unwrap();

    qrseq(&home)
        .env("QRSEQ_CONFIG", &config)
        .arg("run")
        .arg(frames.path())
        .assert()
        .success()
        .stdout("QR codes (left to right): []\n");
}

#[test]
fn annotate_dir_is_created() {
    let home = TempDir::new().unwrap();
    let frames = TempDir::new().unwrap();
    blank_frames(frames.path(), 2);
    let annotated = home.path().join("annotated");

    qrseq(&home)
        .arg("run")
        .arg("--annotate-dir")
        .arg(&annotated)
        .arg(frames.path())
        .assert()
        .success();
    assert!(annotated.is_dir());
    // Blank frames carry no outlines, so nothing is written.
    assert_eq!(std::fs::read_dir(&annotated).unwrap().count(), 0);
}

#[test]
fn usage_errors_exit_with_two() {
    let home = TempDir::new().unwrap();
    qrseq(&home).arg("run").assert().failure().code(2);
    qrseq(&home)
        .args(["run", "--dedup", "sideways", "frames"])
        .assert()
        .failure()
        .code(2)
        .stderr(contains("sideways"));
}

#[test]
fn config_default_prints_toml() {
    let home = TempDir::new().unwrap();
    qrseq(&home)
        .args(["config", "--default"])
        .assert()
        .success()
        .stdout(contains("[window]"))
        .stdout(contains("duration_seconds = 0.5"))
        .stdout(contains("dedup_policy = \"first-seen\""))
        .stdout(contains("[tone.frequencies]"));
}

#[test]
fn config_path_follows_the_environment() {
    let home = TempDir::new().unwrap();
    qrseq(&home)
        .env("QRSEQ_CONFIG", "/tmp/somewhere/qrseq.toml")
        .args(["config", "--path"])
        .assert()
        .success()
        .stdout("/tmp/somewhere/qrseq.toml\n");

    qrseq(&home)
        .args(["config", "--path"])
        .assert()
        .success()
        .stdout("(built-in defaults)\n");
}

#[test]
fn config_schema_is_json() {
    let home = TempDir::new().unwrap();
    let output = qrseq(&home).args(["config", "--schema"]).output().unwrap();
    assert!(output.status.success());
    let schema: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(schema["title"], "SequencerConfig");
    assert!(schema["properties"]["window"].is_object());
}

#[test]
fn help_lists_subcommands() {
    let home = TempDir::new().unwrap();
    qrseq(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(contains("run").and(contains("config")));
    qrseq(&home)
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(contains("--emit-empty"))
        .stdout(contains("--dedup"));
}
