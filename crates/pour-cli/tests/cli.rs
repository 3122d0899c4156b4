//! Integration tests for the pour CLI binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use sha2::{Digest, Sha256};
use tempfile::TempDir;

const LAUNCHED: &str = "pomodoro_for_mac.app/Contents/MacOS/pomodoro_for_mac";

/// Isolated pour home plus a scratch directory for formulas.
struct TestContext {
    temp_dir: TempDir,
    home: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let home = temp_dir.path().join("pour");
        Self { temp_dir, home }
    }

    fn pour(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_pour"))
            .env("HOME", self.temp_dir.path())
            .env_remove("POUR_HOME")
            .env_remove("RUST_LOG")
            .arg("--home")
            .arg(&self.home)
            .args(args)
            .output()
            .expect("failed to run pour")
    }

    fn write_formula(&self, file: &str, version: &str, url: &str, digest: &str) -> String {
        let path = self.temp_dir.path().join(file);
        std::fs::write(
            &path,
            format!(
                r#"
name = "pomodoromac"
description = "Basic pomodoro for macOS"
homepage = "https://github.com/0x3m1r/PomodoroMac"
source_url = "{url}"
content_hash = "{digest}"
version = "{version}"

[[install]]
action = "copy_into_prefix"
path = "pomodoro_for_mac.app"

[[install]]
action = "write_executable_wrapper"
target = "{LAUNCHED}"
"#
            ),
        )
        .unwrap();
        path.to_string_lossy().into_owned()
    }

    fn prefix(&self, version: &str) -> PathBuf {
        self.home.join("cellar/pomodoromac").join(version)
    }

    fn launcher(&self) -> PathBuf {
        self.home.join("bin/pomodoromac")
    }
}

/// A tar.gz holding one shell script at `LAUNCHED` that echoes its
/// arguments, prints `tag` and exits 3.
fn app_archive(tag: &str) -> Vec<u8> {
    let script = format!("#!/bin/sh\necho {tag}\nfor a in \"$@\"; do echo \"[$a]\"; done\nexit 3\n");
    let mut builder = tar::Builder::new(flate2::write::GzEncoder::new(
        Vec::new(),
        flate2::Compression::default(),
    ));
    let mut header = tar::Header::new_gnu();
    header.set_size(script.len() as u64);
    header.set_mode(0o755);
    header.set_cksum();
    builder
        .append_data(&mut header, LAUNCHED, script.as_bytes())
        .unwrap();
    builder.into_inner().unwrap().finish().unwrap()
}

fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn launcher_target(path: &Path) -> String {
    std::fs::read_to_string(path).expect("launcher missing")
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let out = ctx.pour(&["--help"]);
    assert!(out.status.success());
    assert!(stdout(&out).contains("Usage:"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    assert!(ctx.pour(&["--version"]).status.success());
}

#[test]
fn test_list_on_fresh_home_creates_state_db() {
    let ctx = TestContext::new();
    let out = ctx.pour(&["list"]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(stdout(&out).contains("No packages installed"));
    assert!(ctx.home.join("var/state.db").exists());
}

#[test]
fn test_install_places_prefix_and_working_launcher() {
    let ctx = TestContext::new();
    let bytes = app_archive("v1");
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/pomodoro_for_mac.tar.gz")
        .with_status(200)
        .with_body(&bytes)
        .expect(1)
        .create();
    let url = format!("{}/pomodoro_for_mac.tar.gz", server.url());
    let formula = ctx.write_formula("pomodoromac.toml", "0.1", &url, &sha256_hex(&bytes));

    let out = ctx.pour(&["install", &formula]);
    assert!(out.status.success(), "{}", stderr(&out));

    assert!(ctx.prefix("0.1").join(LAUNCHED).is_file());
    let script = launcher_target(&ctx.launcher());
    assert!(script.starts_with("#!/bin/sh\n# pour wrapper: pomodoromac 0.1\n"));
    assert!(script.contains(&ctx.prefix("0.1").join(LAUNCHED).display().to_string()));

    let run = Command::new(ctx.launcher())
        .args(["a b", "c"])
        .output()
        .unwrap();
    assert_eq!(run.status.code(), Some(3));
    assert_eq!(stdout(&run), "v1\n[a b]\n[c]\n");

    // Staging is gone; the verified download stays in the cache.
    let tmp_left = std::fs::read_dir(ctx.home.join("tmp")).map_or(0, Iterator::count);
    assert_eq!(tmp_left, 0);
    let cache_left = std::fs::read_dir(ctx.home.join("cache")).map_or(0, Iterator::count);
    assert_eq!(cache_left, 1);

    // Second run is a no-op and does not hit the network again.
    let again = ctx.pour(&["install", &formula]);
    assert!(again.status.success(), "{}", stderr(&again));
    assert!(stderr(&again).contains("already installed"));
    mock.assert();

    let list = ctx.pour(&["list"]);
    assert!(stdout(&list).contains("pomodoromac"));
    assert!(stdout(&list).contains("active"));

    let clean = ctx.pour(&["clean"]);
    assert!(clean.status.success(), "{}", stderr(&clean));
    let cache_left = std::fs::read_dir(ctx.home.join("cache")).map_or(0, Iterator::count);
    assert_eq!(cache_left, 0);
    assert!(ctx.prefix("0.1").join(LAUNCHED).is_file());
}

#[test]
fn test_install_by_name_from_formula_dir() {
    let ctx = TestContext::new();
    let bytes = app_archive("named");
    let mut server = mockito::Server::new();
    let _mock = server
        .mock("GET", "/app.tar.gz")
        .with_body(&bytes)
        .create();
    let url = format!("{}/app.tar.gz", server.url());
    let written = ctx.write_formula("scratch.toml", "0.1", &url, &sha256_hex(&bytes));
    std::fs::create_dir_all(ctx.home.join("formula")).unwrap();
    std::fs::copy(&written, ctx.home.join("formula/pomodoromac.toml")).unwrap();

    let out = ctx.pour(&["install", "pomodoromac"]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(ctx.launcher().is_file());
}

#[test]
fn test_corrupted_archive_fails_verification_without_side_effects() {
    let ctx = TestContext::new();
    let bytes = app_archive("v1");
    let mut corrupted = bytes.clone();
    let mid = corrupted.len() / 2;
    corrupted[mid] ^= 0xff;

    let mut server = mockito::Server::new();
    let _mock = server
        .mock("GET", "/pomodoro_for_mac.tar.gz")
        .with_body(&corrupted)
        .create();
    let url = format!("{}/pomodoro_for_mac.tar.gz", server.url());
    let formula = ctx.write_formula("pomodoromac.toml", "0.1", &url, &sha256_hex(&bytes));

    let out = ctx.pour(&["install", &formula]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("checksum mismatch"), "{}", stderr(&out));
    assert!(!ctx.prefix("0.1").exists());
    assert!(!ctx.launcher().exists());

    let list = ctx.pour(&["list"]);
    assert!(stdout(&list).contains("No packages installed"));
}

#[test]
fn test_missing_source_path_leaves_nothing_behind() {
    let ctx = TestContext::new();
    let bytes = app_archive("v1");
    let mut server = mockito::Server::new();
    let _mock = server.mock("GET", "/a.tar.gz").with_body(&bytes).create();
    let url = format!("{}/a.tar.gz", server.url());
    let path = ctx.temp_dir.path().join("broken.toml");
    std::fs::write(
        &path,
        format!(
            r#"
name = "pomodoromac"
source_url = "{url}"
content_hash = "{}"
version = "0.1"

[[install]]
action = "copy_into_prefix"
path = "NotInTheArchive.app"
"#,
            sha256_hex(&bytes)
        ),
    )
    .unwrap();

    let out = ctx.pour(&["install", path.to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("install failed"), "{}", stderr(&out));
    assert!(!ctx.home.join("cellar/pomodoromac").exists());
    let tmp_left = std::fs::read_dir(ctx.home.join("tmp")).map_or(0, Iterator::count);
    assert_eq!(tmp_left, 0);
}

#[test]
fn test_uninstall_round_trip() {
    let ctx = TestContext::new();
    let bytes = app_archive("v1");
    let mut server = mockito::Server::new();
    let _mock = server.mock("GET", "/a.tar.gz").with_body(&bytes).create();
    let url = format!("{}/a.tar.gz", server.url());
    let formula = ctx.write_formula("pomodoromac.toml", "0.1", &url, &sha256_hex(&bytes));

    assert!(ctx.pour(&["install", &formula]).status.success());
    let out = ctx.pour(&["uninstall", "pomodoromac@0.1"]);
    assert!(out.status.success(), "{}", stderr(&out));

    assert!(!ctx.prefix("0.1").exists());
    assert!(!ctx.home.join("cellar/pomodoromac").exists());
    assert!(!ctx.launcher().exists());
    assert!(stdout(&ctx.pour(&["list"])).contains("No packages installed"));
}

#[test]
fn test_uninstall_unknown_package_is_not_found() {
    let ctx = TestContext::new();
    let out = ctx.pour(&["uninstall", "pomodoromac@0.1"]);
    assert!(!out.status.success());
    assert!(stderr(&out).contains("is not installed"), "{}", stderr(&out));
}

#[test]
fn test_versions_switch_pin_and_reactivate() {
    let ctx = TestContext::new();
    let (one, two) = (app_archive("v1"), app_archive("v2"));
    let mut server = mockito::Server::new();
    let _m1 = server.mock("GET", "/v1.tar.gz").with_body(&one).create();
    let _m2 = server.mock("GET", "/v2.tar.gz").with_body(&two).create();
    let f1 = ctx.write_formula(
        "one.toml",
        "0.1",
        &format!("{}/v1.tar.gz", server.url()),
        &sha256_hex(&one),
    );
    let f2 = ctx.write_formula(
        "two.toml",
        "0.2",
        &format!("{}/v2.tar.gz", server.url()),
        &sha256_hex(&two),
    );

    assert!(ctx.pour(&["install", &f1]).status.success());
    assert!(ctx.pour(&["install", &f2]).status.success());
    assert!(ctx.prefix("0.1").is_dir());
    assert!(launcher_target(&ctx.launcher()).contains("/0.2/"));

    let out = ctx.pour(&["use", "pomodoromac@0.1"]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(launcher_target(&ctx.launcher()).contains("/0.1/"));

    assert!(ctx.pour(&["pin", "pomodoromac@0.2"]).status.success());
    assert!(launcher_target(&ctx.launcher()).contains("/0.2/"));

    let refused = ctx.pour(&["use", "pomodoromac@0.1"]);
    assert!(!refused.status.success());
    assert!(stderr(&refused).contains("pinned"), "{}", stderr(&refused));

    assert!(ctx.pour(&["unpin", "pomodoromac"]).status.success());
    assert!(ctx.pour(&["use", "pomodoromac@0.1"]).status.success());

    // Removing the active version hands the launcher to the remaining one.
    assert!(ctx.pour(&["uninstall", "pomodoromac@0.1"]).status.success());
    assert!(launcher_target(&ctx.launcher()).contains("/0.2/"));

    let history = ctx.pour(&["history", "pomodoromac"]);
    let text = stdout(&history);
    assert!(text.contains("Installed 0.1"));
    assert!(text.contains("Switched from 0.2 to 0.1"));
    assert!(text.contains("Pinned to 0.2"));

    assert!(ctx.pour(&["uninstall", "pomodoromac"]).status.success());
    assert!(!ctx.launcher().exists());
}

#[test]
fn test_dry_run_changes_nothing() {
    let ctx = TestContext::new();
    let bytes = app_archive("v1");
    let mut server = mockito::Server::new();
    let mock = server
        .mock("GET", "/a.tar.gz")
        .with_body(&bytes)
        .expect(0)
        .create();
    let url = format!("{}/a.tar.gz", server.url());
    let formula = ctx.write_formula("pomodoromac.toml", "0.1", &url, &sha256_hex(&bytes));

    let out = ctx.pour(&["--dry-run", "install", &formula]);
    assert!(out.status.success(), "{}", stderr(&out));
    assert!(!ctx.prefix("0.1").exists());
    assert!(!ctx.launcher().exists());
    mock.assert();
}

#[test]
fn test_hash_command() {
    let ctx = TestContext::new();
    let file = ctx.temp_dir.path().join("test.txt");
    std::fs::write(&file, b"hello pour").unwrap();
    let out = ctx.pour(&["hash", file.to_str().unwrap()]);
    assert!(out.status.success());
    assert!(stdout(&out).starts_with(&sha256_hex(b"hello pour")));
}
