const CREDENTIAL_VARS: &[&str] = &[
    "CITEPIPE_GEMINI_API_KEY",
    "GOOGLE_API_KEY",
    "CITEPIPE_APIFY_API_TOKEN",
    "APIFY_API_TOKEN",
    "CITEPIPE_GOOGLE_SEARCH_API_KEY",
    "CITEPIPE_ENV_FILE",
];

fn doctor() -> std::process::Command {
    let bin = assert_cmd::cargo::cargo_bin!("citepipe");
    let mut cmd = std::process::Command::new(bin);
    cmd.arg("doctor");
    for k in CREDENTIAL_VARS {
        cmd.env_remove(k);
    }
    cmd
}

#[test]
fn citepipe_doctor_reports_missing_credentials() {
    let out = doctor().output().expect("run citepipe doctor");

    // Doctor diagnoses; it does not fail on missing config.
    assert!(out.status.success(), "citepipe doctor failed");
    let s = String::from_utf8_lossy(&out.stdout);
    let v: serde_json::Value = serde_json::from_str(&s).expect("parse doctor json");

    assert_eq!(v["schema_version"].as_u64(), Some(1));
    assert_eq!(v["name"].as_str(), Some("citepipe"));
    assert_eq!(v["ok"].as_bool(), Some(false));
    assert!(v.get("elapsed_ms").is_some());
    assert_eq!(v["configured"]["generation_configured"].as_bool(), Some(false));
    assert_eq!(v["configured"]["crawl_configured"].as_bool(), Some(false));

    let checks = v["checks"].as_array().expect("checks array");
    let config = checks
        .iter()
        .find(|c| c["name"].as_str() == Some("config"))
        .expect("config check");
    assert_eq!(config["ok"].as_bool(), Some(false));
    assert!(config["error"]
        .as_str()
        .unwrap_or("")
        .contains("CITEPIPE_GEMINI_API_KEY"));
}

#[test]
fn citepipe_doctor_never_prints_secret_values() {
    let out = doctor()
        .env("CITEPIPE_GEMINI_API_KEY", "gem-secret-123")
        .env("CITEPIPE_APIFY_API_TOKEN", "apify-secret-456")
        .output()
        .expect("run citepipe doctor");

    assert!(out.status.success());
    let s = String::from_utf8_lossy(&out.stdout);
    let v: serde_json::Value = serde_json::from_str(&s).expect("parse doctor json");
    assert_eq!(v["ok"].as_bool(), Some(true));
    assert!(v["configured"]["generation_configured"].is_boolean());
    assert!(v["configured"]["google_search_configured"].is_boolean());
    assert!(!s.contains("gem-secret-123"));
    assert!(!s.contains("apify-secret-456"));
}

#[test]
fn citepipe_doctor_reads_env_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let p = dir.path().join("citepipe.env");
    std::fs::write(
        &p,
        "# local keys\nCITEPIPE_GEMINI_API_KEY=from-file\nCITEPIPE_APIFY_API_TOKEN=from-file\n",
    )
    .expect("write env file");

    let out = doctor()
        .env("CITEPIPE_ENV_FILE", &p)
        .output()
        .expect("run citepipe doctor");
    assert!(out.status.success());
    let v: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("parse doctor json");
    assert_eq!(v["configured"]["generation_configured"].as_bool(), Some(true));
    assert_eq!(v["configured"]["crawl_configured"].as_bool(), Some(true));
}
