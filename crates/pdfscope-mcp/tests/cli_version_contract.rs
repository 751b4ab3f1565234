#[test]
fn pdfscope_version_contract() {
    let bin = assert_cmd::cargo::cargo_bin!("pdfscope");
    let out = std::process::Command::new(bin)
        .args(["version"])
        .env_remove("PDFSCOPE_ENV_FILE")
        .output()
        .expect("run pdfscope version");

    assert!(out.status.success(), "pdfscope version failed");
    let s = String::from_utf8_lossy(&out.stdout);
    let v: serde_json::Value = serde_json::from_str(&s).expect("parse version json");

    assert_eq!(v["schema_version"].as_u64(), Some(1));
    assert_eq!(v["name"].as_str(), Some("pdfscope"));
    assert!(!v["version"].as_str().unwrap_or("").is_empty());
}

#[test]
fn pdfscope_version_text_output() {
    let mut cmd = assert_cmd::Command::new(assert_cmd::cargo::cargo_bin!("pdfscope"));
    cmd.args(["version", "--output", "text"])
        .assert()
        .success()
        .stdout(predicates::str::starts_with("pdfscope "));
}
