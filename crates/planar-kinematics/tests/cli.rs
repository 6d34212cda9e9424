use assert_cmd::Command;
use nalgebra::{Matrix3, Vector3};
use planar_kinematics::core::{GrayImage, PatternSize};
use planar_kinematics::io::save_gray;
use predicates::prelude::*;
use std::path::{Path, PathBuf};

/// 5x4 inner corners, 30 px squares, 10 mm each.
const DB: &str = r#"{
    "bench": {
        "camera_matrix": [[500.0, 0.0, 120.0], [0.0, 500.0, 90.0], [0.0, 0.0, 1.0]],
        "dist_coefs": [[0.0, 0.0, 0.0, 0.0, 0.0]],
        "square_size": 10.0,
        "pattern_size": [5, 4]
    }
}"#;

fn board_h() -> Matrix3<f64> {
    Matrix3::new(
        30.0, 0.0, 60.0, //
        0.0, 30.0, 40.0, //
        0.0, 0.0, 1.0,
    )
}

fn render_board(h: &Matrix3<f64>, pattern: PatternSize, width: usize, height: usize) -> GrayImage {
    let h_inv = h.try_inverse().expect("invertible");
    let ss = 4;
    let mut img = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0u32;
            for sy in 0..ss {
                for sx in 0..ss {
                    let u = x as f64 + (sx as f64 + 0.5) / ss as f64 - 0.5;
                    let v = y as f64 + (sy as f64 + 0.5) / ss as f64 - 0.5;
                    let w = h_inv * Vector3::new(u, v, 1.0);
                    let (bx, by) = (w[0] / w[2], w[1] / w[2]);
                    let inside = bx >= -1.0
                        && by >= -1.0
                        && bx <= pattern.cols as f64
                        && by <= pattern.rows as f64;
                    let dark =
                        inside && ((bx.floor() as i64 + by.floor() as i64).rem_euclid(2) == 0);
                    acc += if dark { 30 } else { 220 };
                }
            }
            img.set(x, y, (acc / (ss * ss) as u32) as u8);
        }
    }
    img
}

/// Dark disk moving 3 px (1 mm) per frame along y = 90.
fn disk_frame(k: usize) -> GrayImage {
    let (cx, cy) = (40.0 + 3.0 * k as f64, 90.0);
    let mut img = GrayImage::new(240, 180);
    for y in 0..img.height {
        for x in 0..img.width {
            let d = ((x as f64 - cx).powi(2) + (y as f64 - cy).powi(2)).sqrt();
            img.set(x, y, if d <= 6.0 { 15 } else { 210 });
        }
    }
    img
}

struct Workspace {
    dir: tempfile::TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("db.json"), DB).unwrap();
        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("planar-kinematics").unwrap();
        cmd.arg("--db").arg(self.path("db.json"));
        cmd
    }

    fn reference(&self) -> PathBuf {
        let p = self.path("reference.png");
        save_gray(&p, &render_board(&board_h(), PatternSize::new(4, 5), 240, 180)).unwrap();
        p
    }

    fn frames(&self, count: usize) -> PathBuf {
        let dir = self.path("frames");
        std::fs::create_dir_all(&dir).unwrap();
        for k in 0..count {
            save_gray(dir.join(format!("frame_{k:03}.png")), &disk_frame(k)).unwrap();
        }
        dir
    }
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn profiles_list_and_show() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["profiles", "list"])
        .assert()
        .success()
        .stdout("bench\n");
    ws.cmd()
        .args(["profiles", "show", "bench"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"square_size\": 10.0"));
}

#[test]
fn unknown_profile_fails() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["profiles", "show", "phone"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::starts_with("error:").and(predicate::str::contains("phone")));
}

#[test]
fn removed_profile_is_gone() {
    let ws = Workspace::new();
    ws.cmd()
        .args(["profiles", "remove", "bench"])
        .assert()
        .success();
    ws.cmd()
        .args(["profiles", "list"])
        .assert()
        .success()
        .stdout("");
    ws.cmd()
        .args(["profiles", "remove", "bench"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

#[test]
fn missing_database_lists_nothing() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("planar-kinematics")
        .unwrap()
        .arg("--db")
        .arg(dir.path().join("absent.json"))
        .args(["profiles", "list"])
        .assert()
        .success()
        .stdout("");
}

#[test]
fn calibrate_without_pattern_fails() {
    let ws = Workspace::new();
    let blank = ws.path("blank.png");
    let mut img = GrayImage::new(64, 48);
    img.data.fill(128);
    save_gray(&blank, &img).unwrap();
    ws.cmd()
        .args(["calibrate", "--name", "new", "--rows", "4", "--cols", "5"])
        .args(["--square-size", "10"])
        .arg(&blank)
        .assert()
        .failure()
        .stdout(predicate::str::contains("skipped"));
    ws.cmd()
        .args(["profiles", "list"])
        .assert()
        .stdout("bench\n");
}

#[test]
fn homography_maps_pixels_onto_the_board() {
    let ws = Workspace::new();
    let reference = ws.reference();
    // Corners (0,0) and (3,0) of the grid: three squares apart.
    ws.cmd()
        .args(["homography", "--profile", "bench", "--image"])
        .arg(&reference)
        .args(["--pixel", "60,40", "--pixel", "150,40"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("condition number")
                .and(predicate::str::contains("distance 0.03")),
        );
}

#[test]
fn map_writes_one_line_per_pixel() {
    let ws = Workspace::new();
    let reference = ws.reference();
    let out = ws.path("map.txt");
    ws.cmd()
        .args(["map", "--profile", "bench", "--image"])
        .arg(&reference)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();
    let text = std::fs::read_to_string(&out).unwrap();
    assert_eq!(text.lines().count(), 240 * 180);
    let world = |line: &str| -> (f64, f64) {
        let v: Vec<f64> = line
            .split_whitespace()
            .map(|v| v.parse().unwrap())
            .collect();
        (v[2], v[3])
    };
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("0 0 "));
    // 30 px is one square on the reference board.
    let (a, b) = (world(lines[0]), world(lines[30]));
    let d = ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt();
    assert!((d - 1.0).abs() < 0.02, "{d}");
}

#[test]
fn analyze_reports_constant_speed() {
    let ws = Workspace::new();
    let reference = ws.reference();
    let frames = ws.frames(30);
    let json = ws.path("report.json");
    let out = ws.path("samples.txt");
    ws.cmd()
        .args(["analyze", "--profile", "bench", "--image"])
        .arg(&reference)
        .arg("--frames")
        .arg(&frames)
        .args(["--fps", "30", "--unit", "mm"])
        .arg("--json")
        .arg(&json)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("mean speed"));

    let report = read_json(&json);
    assert_eq!(report["unit"], "millimeter");
    let samples = report["samples"].as_array().unwrap();
    assert_eq!(samples.len(), 30);
    for s in &samples[12..] {
        let speed = s["speed"].as_f64().unwrap();
        assert!((speed - 30.0).abs() < 0.5, "frame {}: {speed}", s["frame_index"]);
    }

    let text = std::fs::read_to_string(&out).unwrap();
    assert!(text.starts_with("# frames 0..=29"));
    assert_eq!(text.lines().filter(|l| !l.starts_with('#')).count(), 30);
}

#[test]
fn analyze_rejects_bad_range() {
    let ws = Workspace::new();
    let reference = ws.reference();
    let frames = ws.frames(4);
    ws.cmd()
        .args(["analyze", "--profile", "bench", "--image"])
        .arg(&reference)
        .arg("--frames")
        .arg(&frames)
        .args(["--fps", "30", "--start", "3", "--end", "9"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("range"));
}
