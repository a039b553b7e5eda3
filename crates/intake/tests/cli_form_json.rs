use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn intake_bin() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_intake"))
}

fn run_cli(args: &[String], envs: &[(&str, &str)]) -> Output {
    let mut cmd = Command::new(intake_bin());
    cmd.args(args);
    for (key, value) in envs {
        cmd.env(key, value);
    }
    cmd.env_remove("INTAKE_CONFIG");
    cmd.output().expect("failed to execute intake CLI")
}

fn parse_json_output(output: &Output) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json_start = stdout.find(|c| c == '{' || c == '[').unwrap_or_else(|| {
        panic!(
            "no JSON payload found in output\nstdout:\n{}\nstderr:\n{}",
            stdout,
            String::from_utf8_lossy(&output.stderr)
        )
    });
    let json_text = &stdout[json_start..];
    let mut deserializer = serde_json::Deserializer::from_str(json_text);
    serde_json::Value::deserialize(&mut deserializer).unwrap_or_else(|err| {
        panic!(
            "failed to parse JSON output: {}\nstdout:\n{}\nstderr:\n{}",
            err,
            stdout,
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

fn run_cli_json<T: DeserializeOwned>(args: &[String], envs: &[(&str, &str)]) -> T {
    let output = run_cli(args, envs);
    assert!(
        output.status.success(),
        "command failed: {}\nstdout:\n{}\nstderr:\n{}",
        args.join(" "),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let value = parse_json_output(&output);
    serde_json::from_value(value).unwrap_or_else(|err| {
        panic!(
            "failed to deserialize JSON output: {}\nstdout:\n{}\nstderr:\n{}",
            err,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        )
    })
}

fn run_cli_json_error(args: &[String], envs: &[(&str, &str)]) -> serde_json::Value {
    let output = run_cli(args, envs);
    assert!(
        !output.status.success(),
        "command unexpectedly succeeded: {}\nstdout:\n{}\nstderr:\n{}",
        args.join(" "),
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    parse_json_output(&output)
}

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().to_string()
}

#[derive(Debug, Deserialize)]
struct CheckResult {
    total_pages: usize,
    page_size: usize,
    pages: Vec<Vec<String>>,
}

#[derive(Debug, Deserialize)]
struct ImportResult {
    id: String,
    fields: usize,
}

#[derive(Debug, Deserialize)]
struct AssignResult {
    status: String,
    active: bool,
    total_pages: usize,
}

#[derive(Debug, Deserialize)]
struct SubmitResult {
    status: String,
    page: usize,
    next_page: Option<usize>,
    completed_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PageField {
    key: String,
    required: bool,
    value: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ShowPageResult {
    page: usize,
    total_pages: usize,
    status: String,
    fields: Vec<PageField>,
}

struct Env {
    _tmp: TempDir,
    home: String,
    dir: PathBuf,
}

impl Env {
    fn new() -> Self {
        let tmp = TempDir::new().expect("create temp dir");
        let dir = tmp.path().to_path_buf();
        fs::write(dir.join("config.toml"), "page_size = 2\n").unwrap();
        fs::write(
            dir.join("screening.json"),
            r#"{
                "name": "Screening",
                "fields": [
                    {"key": "full_name", "label": "Full name", "type": "text", "required": true},
                    {"key": "dob", "label": "Date of birth", "type": "date"},
                    {"key": "smoker", "label": "Smoker", "type": "boolean", "required": true}
                ]
            }"#,
        )
        .unwrap();
        Self {
            home: path_arg(&dir),
            dir,
            _tmp: tmp,
        }
    }

    fn envs(&self) -> Vec<(&str, &str)> {
        vec![("INTAKE_HOME", self.home.as_str()), ("RUST_LOG", "error")]
    }

    fn write(&self, name: &str, body: serde_json::Value) -> String {
        let path = self.dir.join(name);
        fs::write(&path, body.to_string()).unwrap();
        path_arg(&path)
    }

    fn schema_path(&self) -> String {
        path_arg(&self.dir.join("screening.json"))
    }
}

#[test]
fn test_check_schema_lists_pages() {
    let env = Env::new();
    let result: CheckResult = run_cli_json(&args(&["check-schema", &env.schema_path(), "--json"]), &env.envs());
    assert_eq!(result.page_size, 2);
    assert_eq!(result.total_pages, 2);
    assert_eq!(result.pages, vec![vec!["full_name", "dob"], vec!["smoker"]]);
}

#[test]
fn test_validate_prints_merged_or_errors() {
    let env = Env::new();
    let good = env.write(
        "good.json",
        serde_json::json!({"full_name": "Ada", "dob": "2024-01-01", "smoker": "no"}),
    );
    let merged: serde_json::Value = run_cli_json(&args(&["validate", &env.schema_path(), &good]), &env.envs());
    assert_eq!(merged["dob"], "2024-01-01");
    assert_eq!(merged["smoker"], false);

    let bad = env.write("bad.json", serde_json::json!({"dob": "yesterday", "extra": 1}));
    let errors = run_cli_json_error(&args(&["validate", &env.schema_path(), &bad]), &env.envs());
    for key in ["full_name", "dob", "smoker", "extra"] {
        assert!(errors.get(key).is_some(), "missing error for {}: {}", key, errors);
    }
}

#[test]
fn test_form_flow_end_to_end() {
    let env = Env::new();
    let envs = env.envs();

    let imported: ImportResult = run_cli_json(&args(&["import-schema", &env.schema_path(), "--json"]), &envs);
    assert_eq!(imported.fields, 3);
    let schema_id = imported.id;

    let assigned: AssignResult = run_cli_json(
        &args(&["assign", "--subject", "donor-1", "--schema", &schema_id, "--json"]),
        &envs,
    );
    assert_eq!(assigned.status, "PENDING");
    assert!(assigned.active);
    assert_eq!(assigned.total_pages, 2);

    let page1 = env.write("page1.json", serde_json::json!({"full_name": "Ada", "dob": "2024-01-01"}));
    let submitted: SubmitResult = run_cli_json(
        &args(&[
            "submit", "--subject", "donor-1", "--schema", &schema_id, "--page", "1", &page1, "--json",
        ]),
        &envs,
    );
    assert_eq!(submitted.status, "advance");
    assert_eq!(submitted.page, 1);
    assert_eq!(submitted.next_page, Some(2));

    let shown: ShowPageResult = run_cli_json(
        &args(&["show-page", "--subject", "donor-1", "--schema", &schema_id, "--page", "1", "--json"]),
        &envs,
    );
    assert_eq!((shown.page, shown.total_pages), (1, 2));
    assert_eq!(shown.status, "PENDING");
    assert_eq!(shown.fields[0].key, "full_name");
    assert!(shown.fields[0].required);
    assert_eq!(shown.fields[1].value, "2024-01-01");

    let bad = env.write("bad.json", serde_json::json!({"smoker": "sometimes"}));
    let error = run_cli_json_error(
        &args(&[
            "submit", "--subject", "donor-1", "--schema", &schema_id, "--page", "2", &bad, "--json",
        ]),
        &envs,
    );
    assert!(error["field_errors"]["smoker"].is_array(), "unexpected error payload: {}", error);

    let page2 = env.write("page2.json", serde_json::json!({"smoker": true}));
    let done: SubmitResult = run_cli_json(
        &args(&[
            "submit", "--subject", "donor-1", "--schema", &schema_id, "--page", "2", &page2, "--json",
        ]),
        &envs,
    );
    assert_eq!(done.status, "completed");
    assert!(done.completed_at.is_some());
}

#[test]
fn test_submit_for_unassigned_subject_fails() {
    let env = Env::new();
    let envs = env.envs();
    let imported: ImportResult = run_cli_json(&args(&["import-schema", &env.schema_path(), "--json"]), &envs);
    let page1 = env.write("page1.json", serde_json::json!({"full_name": "Ada"}));

    let error = run_cli_json_error(
        &args(&[
            "submit", "--subject", "stranger", "--schema", &imported.id, "--page", "1", &page1, "--json",
        ]),
        &envs,
    );
    let message = error["error"]["message"].as_str().unwrap_or_default();
    assert!(message.contains("Unknown subject"), "unexpected error payload: {}", error);
}

#[test]
fn test_config_json_reports_page_size() {
    let env = Env::new();
    let config: serde_json::Value = run_cli_json(&args(&["config", "--json"]), &env.envs());
    assert_eq!(config["page_size"], 2);
    assert_eq!(config["config_file"]["exists"], true);
}
