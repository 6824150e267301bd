use std::path::PathBuf;
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn bin_path() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_skstan"))
}

fn repo_root() -> PathBuf {
    // crates/sk-cli -> repo root
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..").canonicalize().unwrap()
}

fn fixture_path(name: &str) -> PathBuf {
    repo_root().join("tests/fixtures").join(name)
}

fn tmp_home(tag: &str) -> PathBuf {
    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let mut p = std::env::temp_dir();
    p.push(format!("skstan_cli_{}_{}_{}", std::process::id(), nanos, tag));
    std::fs::create_dir_all(&p).unwrap();
    p
}

fn run(args: &[&str]) -> Output {
    Command::new(bin_path())
        .args(args)
        .env_remove("SKSTAN_HOME")
        .env_remove("CMDSTAN")
        .output()
        .unwrap_or_else(|e| panic!("failed to run {:?} {:?}: {}", bin_path(), args, e))
}

fn stdout_json(out: &Output) -> serde_json::Value {
    assert!(
        out.status.success(),
        "command failed: stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );
    serde_json::from_slice(&out.stdout).expect("stdout should be JSON")
}

#[test]
fn config_defaults_to_stan() {
    let home = tmp_home("config");
    let v = stdout_json(&run(&["config", "--home", home.to_str().unwrap()]));
    assert_eq!(v["backend"], "stan");
    assert_eq!(v["config"], serde_json::Value::Null);
    assert_eq!(v["backends"], serde_json::json!(["stan", "tfp"]));
    assert!(v["config_path"].as_str().unwrap().ends_with("skstan.json"));
    std::fs::remove_dir_all(&home).ok();
}

#[test]
fn config_home_from_environment_is_verbatim() {
    let home = tmp_home("env_home");
    std::fs::write(home.join("skstan.json"), r#"{"backend": "tfp"}"#).unwrap();
    let missing = home.join("does/not/exist");
    for (dir, backend) in [(&home, "tfp"), (&missing, "stan")] {
        let out = Command::new(bin_path())
            .arg("config")
            .env("SKSTAN_HOME", dir)
            .env_remove("CMDSTAN")
            .output()
            .unwrap();
        let v = stdout_json(&out);
        assert_eq!(v["home"], dir.to_str().unwrap());
        assert_eq!(v["backend"], backend);
    }
    assert!(!missing.exists());
    std::fs::remove_dir_all(&home).ok();
}

#[test]
fn config_reads_backend_from_file() {
    let home = tmp_home("config_file");
    std::fs::write(home.join("skstan.json"), r#"{"backend": "tfp"}"#).unwrap();
    let v = stdout_json(&run(&["config", "--home", home.to_str().unwrap()]));
    assert_eq!(v["backend"], "tfp");
    assert_eq!(v["config"]["backend"], "tfp");
    std::fs::remove_dir_all(&home).ok();
}

#[test]
fn malformed_config_fails() {
    let home = tmp_home("bad_config");
    std::fs::write(home.join("skstan.json"), "{ nope").unwrap();
    let out = run(&["config", "--home", home.to_str().unwrap()]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("skstan.json"));
    std::fs::remove_dir_all(&home).ok();
}

#[test]
fn fit_tfp_linear_and_predict() {
    let home = tmp_home("fit");
    let home_s = home.to_str().unwrap();
    let input = fixture_path("data/linear.json");
    let out = run(&[
        "fit",
        "--home",
        home_s,
        "--backend",
        "tfp",
        "--input",
        input.to_str().unwrap(),
        "--family",
        "linear",
        "--chains",
        "2",
        "--samples",
        "200",
        "--save",
        "cli_linear",
    ]);
    let v = stdout_json(&out);
    assert_eq!(v["backend"], "tfp");
    assert_eq!(v["family"], "linear");
    assert_eq!(v["parameter_names"], serde_json::json!(["alpha", "beta.1", "beta.2"]));
    assert_eq!(v["mean"].as_array().unwrap().len(), 3);
    assert_eq!(v["total_draws"], 400);
    let mode = v["mode"].as_array().unwrap();
    assert!((mode[1].as_f64().unwrap() - 1.0).abs() < 0.5);
    assert!((mode[2].as_f64().unwrap() + 2.0).abs() < 0.5);

    let models = stdout_json(&run(&["models", "--home", home_s, "--backend", "tfp"]));
    assert_eq!(models["models"], serde_json::json!(["cli_linear"]));

    let pred = stdout_json(&run(&[
        "predict",
        "--home",
        home_s,
        "--model",
        "cli_linear",
        "--input",
        input.to_str().unwrap(),
    ]));
    assert_eq!(pred["predictions"].as_array().unwrap().len(), 8);
    std::fs::remove_dir_all(&home).ok();
}

#[test]
fn predict_unknown_model_fails() {
    let home = tmp_home("predict_missing");
    let out = run(&[
        "predict",
        "--home",
        home.to_str().unwrap(),
        "--model",
        "nonexistent_model",
        "--input",
        fixture_path("data/linear.json").to_str().unwrap(),
    ]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("not found"));
    std::fs::remove_dir_all(&home).ok();
}

#[test]
fn unknown_backend_fails() {
    let home = tmp_home("unknown");
    let out = run(&["models", "--home", home.to_str().unwrap(), "--backend", "pymc"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("unknown backend 'pymc'"));
    std::fs::remove_dir_all(&home).ok();
}

#[test]
fn version_prints_crate_version() {
    let out = run(&["version"]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).starts_with("skstan "));
}
