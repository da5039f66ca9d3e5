use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::TempDir;

fn intake_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("intake");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    fs::create_dir_all(root.join("media")).unwrap();

    // Input files
    let files_dir = root.join("files");
    fs::create_dir_all(files_dir.join("nested")).unwrap();
    fs::write(files_dir.join("rows.csv"), "text,label\nfirst,a\nsecond,b\n").unwrap();
    fs::write(files_dir.join("lines.txt"), "alpha\nbeta\ngamma\n").unwrap();
    fs::write(files_dir.join("nested").join("more.json"), r#"[{"text": "deep"}]"#).unwrap();
    fs::write(files_dir.join("tool.exe"), "MZ").unwrap();

    fs::write(
        config_dir.join("label.xml"),
        r#"<View><Image name="img" value="$image"/><Choices name="c" toName="img"/></View>"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[limits]
max_task_count = 100

[storage]
media_root = "{root}/media"

[projects.1]
label_config = '<View><Text name="text" value="$text"/><Choices name="label" toName="text"/></View>'

[projects.2]
label_config_path = "{root}/config/label.xml"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("intake.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_intake(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = intake_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run intake binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn files_dir(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().parent().unwrap().join("files")
}

#[test]
fn test_check_lists_projects() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_intake(&config_path, &["check"]);
    assert!(success, "check failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Config OK"));
    assert!(stdout.contains("text"));
    assert!(stdout.contains("image"));
}

#[test]
fn test_schema_prints_fields() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_intake(&config_path, &["schema", "--project", "2"]);
    assert!(success, "schema failed: stdout={}, stderr={}", stdout, stderr);
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["fields"]["image"], "image");
}

#[test]
fn test_import_csv_and_txt() {
    let (_tmp, config_path) = setup_test_env();
    let files = files_dir(&config_path);

    let (stdout, stderr, success) = run_intake(
        &config_path,
        &[
            "import",
            "--project",
            "1",
            files.join("rows.csv").to_str().unwrap(),
            files.join("lines.txt").to_str().unwrap(),
        ],
    );
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);

    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["task_count"], 5);
    assert_eq!(report["could_be_tasks_list"], true);
    assert_eq!(report["found_formats"][".csv"], 1);
    assert_eq!(report["found_formats"][".txt"], 1);
    assert_eq!(report["data_columns"], serde_json::json!(["text"]));
}

#[test]
fn test_import_writes_uploads_and_emits_tasks() {
    let (tmp, config_path) = setup_test_env();
    let files = files_dir(&config_path);
    let emitted = tmp.path().join("tasks.json");

    let (stdout, stderr, success) = run_intake(
        &config_path,
        &[
            "import",
            "--project",
            "1",
            "--emit-tasks",
            emitted.to_str().unwrap(),
            files.join("lines.txt").to_str().unwrap(),
        ],
    );
    assert!(success, "import failed: stdout={}, stderr={}", stdout, stderr);

    let tasks: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&emitted).unwrap()).unwrap();
    assert_eq!(tasks.as_array().unwrap().len(), 3);
    assert_eq!(tasks[0]["data"]["text"], "alpha");

    let upload_dir = tmp.path().join("media").join("upload").join("1");
    let stored: Vec<_> = fs::read_dir(&upload_dir).unwrap().collect();
    assert_eq!(stored.len(), 1);
}

#[test]
fn test_import_unsupported_extension_fails() {
    let (_tmp, config_path) = setup_test_env();
    let files = files_dir(&config_path);

    let (_stdout, stderr, success) = run_intake(
        &config_path,
        &[
            "import",
            "--project",
            "1",
            files.join("tool.exe").to_str().unwrap(),
        ],
    );
    assert!(!success);
    assert!(stderr.contains("Error:"));
    assert!(stderr.contains(".exe extension is not supported"));
}

#[test]
fn test_import_dir_walks_nested_files() {
    let (_tmp, config_path) = setup_test_env();
    let files = files_dir(&config_path);

    let (stdout, stderr, success) = run_intake(
        &config_path,
        &[
            "import-dir",
            "--project",
            "1",
            "--dry-run",
            files.to_str().unwrap(),
        ],
    );
    assert!(success, "import-dir failed: stdout={}, stderr={}", stdout, stderr);

    let report: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["task_count"], 6);
    assert_eq!(report["annotation_count"], serde_json::Value::Null);
    assert_eq!(report["file_upload_ids"].as_array().unwrap().len(), 3);
}

#[test]
fn test_inline_from_stdin() {
    let (_tmp, config_path) = setup_test_env();

    let mut child = Command::new(intake_binary())
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(["inline", "--project", "1", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(br#"[{"text": "one"}, {"data": {"text": "two"}}]"#)
        .unwrap();
    let output = child.wait_with_output().unwrap();
    assert!(output.status.success());

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["task_count"], 2);
}

#[test]
fn test_inline_rejects_scalar_payload() {
    let (tmp, config_path) = setup_test_env();
    let payload = tmp.path().join("payload.json");
    fs::write(&payload, "42").unwrap();

    let (_stdout, stderr, success) = run_intake(
        &config_path,
        &["inline", "--project", "1", payload.to_str().unwrap()],
    );
    assert!(!success);
    assert!(stderr.contains("Data root must be list"));
}

#[test]
fn test_unknown_project_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_stdout, stderr, success) = run_intake(&config_path, &["schema", "--project", "9"]);
    assert!(!success);
    assert!(stderr.contains("Project 9 has no labeling config"));
}
