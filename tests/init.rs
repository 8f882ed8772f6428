use std::process::Command;

#[test]
fn init_creates_valid_toml() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_dossier"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(output.status.success(), "dossier init failed: {}", String::from_utf8_lossy(&output.stderr));

    let config_path = dir.path().join(".dossier.toml");
    assert!(config_path.exists(), ".dossier.toml should exist");

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[embedding]"));
    assert!(content.contains("[retrieval]"));
    assert!(content.contains("[routing]"));

    // Verify it's valid TOML that dossier-core can parse and validate
    let _raw: toml::Value = toml::from_str(&content).unwrap();
    let config = dossier_core::DossierConfig::from_toml(&content).unwrap();
    assert_eq!(config.retrieval.max_chunks, 10);
}

#[test]
fn init_refuses_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".dossier.toml"), "# existing").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_dossier"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
    let content = std::fs::read_to_string(dir.path().join(".dossier.toml")).unwrap();
    assert_eq!(content, "# existing");
}

#[test]
fn init_template_project_example_builds() {
    let dir = tempfile::tempdir().unwrap();
    let dossier = || Command::new(env!("CARGO_BIN_EXE_dossier"));

    let output = dossier().arg("init").current_dir(dir.path()).output().unwrap();
    assert!(output.status.success());

    let config_path = dir.path().join(".dossier.toml");
    let mut content = std::fs::read_to_string(&config_path).unwrap();
    for key in ["[[projects]]", "id =", "display_name =", "root =", "index_dir =", "ocr_pipeline_project ="] {
        content = content.replace(&format!("# {key}"), key);
    }
    std::fs::write(&config_path, content).unwrap();

    let project = dir.path().join("projects/ocr_pipeline_project");
    std::fs::create_dir_all(&project).unwrap();
    std::fs::write(project.join("README.md"), "# OCR\nReads receipts with EasyOCR.").unwrap();

    let output = dossier()
        .args(["build", "--format", "json"])
        .current_dir(dir.path())
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let reports: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(reports[0]["project"], "ocr_pipeline_project");
    assert!(dir.path().join("indexes/ocr_pipeline/vectors.db").exists());
}
