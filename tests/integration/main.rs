//! Integration tests for webmedia

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    fn webmedia() -> Command {
        cargo_bin_cmd!("webmedia")
    }

    /// A config file whose derived root lives inside `dir`
    fn isolated_config(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("config.toml");
        let derived = dir.path().join("derived");
        std::fs::write(
            &path,
            format!("[paths]\nderived_root = \"{}\"\n", derived.display()),
        )
        .unwrap();
        path
    }

    fn with_config(path: &Path) -> Command {
        let mut cmd = webmedia();
        cmd.env("WEBMEDIA_CONFIG", path);
        cmd
    }

    #[test]
    fn help_displays() {
        webmedia()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("serve a directory of media over HTTP"));
    }

    #[test]
    fn version_displays() {
        webmedia()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("webmedia"));
    }

    #[test]
    fn config_path_honors_flag() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        webmedia()
            .args(["--config", path.to_str().unwrap(), "config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("custom.toml"));
    }

    #[test]
    fn config_show_uses_defaults() {
        let dir = TempDir::new().unwrap();
        with_config(&dir.path().join("missing.toml"))
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[server]"))
            .stdout(predicate::str::contains("port = 8000"));
    }

    #[test]
    fn config_init_writes_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fresh/config.toml");
        with_config(&path)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));
        assert!(path.exists());

        with_config(&path)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("already exists"));
    }

    #[test]
    fn invalid_config_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server\nport = ").unwrap();
        with_config(&path)
            .arg("status")
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn status_runs() {
        let dir = TempDir::new().unwrap();
        with_config(&isolated_config(&dir))
            .arg("status")
            .assert()
            .success()
            .stdout(predicate::str::contains("Tools:"))
            .stdout(predicate::str::contains("mode 1"));
    }

    #[test]
    fn probe_missing_file_fails() {
        webmedia()
            .args(["probe", "/definitely/not/a/file.mp4"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Error:"));
    }

    #[test]
    fn serve_rejects_file_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.txt");
        std::fs::write(&file, b"x").unwrap();
        with_config(&isolated_config(&dir))
            .args(["serve", file.to_str().unwrap()])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not a directory"));
    }

    #[test]
    fn serve_rejects_unknown_mode() {
        webmedia()
            .args(["serve", "--mode", "nine"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Unknown startup mode"));
    }

    #[test]
    fn cache_commands_on_empty_manifest() {
        let dir = TempDir::new().unwrap();
        let config = isolated_config(&dir);

        with_config(&config)
            .args(["cache", "list"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No derived artifacts recorded"));

        with_config(&config)
            .args(["cache", "list", "--format", "json"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[]"));

        with_config(&config)
            .args(["cache", "sweep"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Nothing to sweep"));

        with_config(&config)
            .args(["cache", "clear"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("--yes"));

        with_config(&config)
            .args(["cache", "clear", "--yes"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Removed 0 artifact(s)"));
    }

    #[test]
    fn cache_warm_rejects_file_root() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("a.jpg");
        std::fs::write(&file, b"x").unwrap();
        with_config(&isolated_config(&dir))
            .args(["cache", "warm", file.to_str().unwrap()])
            .assert()
            .failure()
            .stderr(predicate::str::contains("not a directory"));
    }
}
