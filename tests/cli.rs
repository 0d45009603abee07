//! CLI-level integration tests. These need a built binary (and, for the
//! happy path, live network access to the default geocoder/weather
//! providers), so they're marked `#[ignore]` and run manually, the way the
//! teacher's `tests/server.rs` and `tests/specs.rs` do.

use cli_test_dir::*;

const BIN: &str = env!("CARGO_PKG_NAME");

#[test]
fn prints_help_and_exits_zero() {
    let dir = TestDir::new(BIN, "prints_help_and_exits_zero");
    let output = dir.cmd().arg("--help").output().expect("could not run binary");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("--config"));
}

#[test]
fn missing_explicit_config_path_is_a_fatal_startup_error() {
    let dir = TestDir::new(BIN, "missing_explicit_config_path_is_a_fatal_startup_error");
    let output = dir.cmd().arg("--config").arg("does-not-exist.toml").output().expect("could not run binary");
    assert!(!output.status.success());
}

#[test]
#[ignore = "requires network access to the default geolocation/geocoder/weather providers"]
fn runs_and_prints_a_waybar_json_line() {
    let dir = TestDir::new(BIN, "runs_and_prints_a_waybar_json_line");
    let config = dir.path("config.toml");
    let location = dir.path("location");
    std::fs::write(&location, "52.5200,13.4050\n").unwrap();
    std::fs::write(
        &config,
        format!(
            "[geolocation]\ndisable_geolocation_file = false\ndisable_geoip = true\ngeolocation_file = {:?}\n",
            location
        ),
    )
    .unwrap();

    let mut child = dir
        .cmd()
        .arg("--config")
        .arg(&config)
        .spawn()
        .expect("could not spawn binary");
    std::thread::sleep(std::time::Duration::from_secs(5));
    let _ = child.kill();
}
