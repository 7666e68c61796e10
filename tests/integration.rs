use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ctxv_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ctxv");
    path
}

const PROJECT: &str = "demo";

/// Context root with the two-source scenario: one code chunk and one rule.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let project_dir = root.join("projects").join(PROJECT);
    fs::create_dir_all(&project_dir).unwrap();
    fs::write(
        project_dir.join("index.json"),
        r#"{"files": {"a/b.py": {}}, "chunks": [{"id": "a/b.py#1", "path": "a/b.py", "content": "def f(): pass"}]}"#,
    )
    .unwrap();

    let docs_dir = root.join("docs").join(PROJECT);
    fs::create_dir_all(&docs_dir).unwrap();
    fs::write(
        docs_dir.join("docs.jsonl"),
        "{\"id\":\"x\",\"content\":\"rule text\",\"type\":\"rule\",\"title\":\"R1\"}\n\n{\"id\":\"e\",\"content\":\"\",\"type\":\"note\"}\n",
    )
    .unwrap();

    let config_content = format!(
        r#"[paths]
context_root = "{}"

[embedding]
provider = "hashed"
dims = 384

[store]
backend = "sqlite"
"#,
        root.display()
    );
    let config_path = root.join("vectors.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn write_project_config(config_path: &Path, json: &str) {
    let root = config_path.parent().unwrap();
    fs::write(
        root.join("projects").join(PROJECT).join("config.json"),
        json,
    )
    .unwrap();
}

fn run_ctxv(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ctxv_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("OPENAI_API_KEY")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ctxv binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn total_items(config_path: &Path) -> u64 {
    let (stdout, stderr, success) = run_ctxv(config_path, &["stats", PROJECT, "--json"]);
    assert!(success, "stats failed: {}", stderr);
    let v: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    v["total_items"].as_u64().unwrap()
}

#[test]
fn test_index_scenario() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_ctxv(&config_path, &["index", PROJECT]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Indexed 2 items into project_demo"));
    assert_eq!(total_items(&config_path), 2);
}

#[test]
fn test_index_twice_no_duplicates() {
    let (_tmp, config_path) = setup_test_env();

    run_ctxv(&config_path, &["index", PROJECT]);
    let (_, stderr, success) = run_ctxv(&config_path, &["sync", PROJECT]);
    assert!(success, "sync failed: {}", stderr);
    assert_eq!(total_items(&config_path), 2);
}

#[test]
fn test_rebuild_removes_stale_entries() {
    let (_tmp, config_path) = setup_test_env();
    run_ctxv(&config_path, &["index", PROJECT]);

    let root = config_path.parent().unwrap();
    fs::write(
        root.join("docs").join(PROJECT).join("docs.jsonl"),
        "",
    )
    .unwrap();
    run_ctxv(&config_path, &["index", PROJECT]);
    assert_eq!(total_items(&config_path), 1);

    let (stdout, _, _) = run_ctxv(&config_path, &["search", PROJECT, "rule text", "--json"]);
    let results: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert!(results.iter().all(|r| r["type"] == "code"));
}

#[test]
fn test_search_top_hit_is_code() {
    let (_tmp, config_path) = setup_test_env();
    run_ctxv(&config_path, &["index", PROJECT]);

    let (stdout, stderr, success) =
        run_ctxv(&config_path, &["search", PROJECT, "pass", "-n", "1", "--json"]);
    assert!(success, "search failed: {}", stderr);
    let results: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["type"], "code");
    assert_eq!(results[0]["path"], "a/b.py");
    let relevance = results[0]["relevance"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&relevance));
}

#[test]
fn test_search_type_filter() {
    let (_tmp, config_path) = setup_test_env();
    run_ctxv(&config_path, &["index", PROJECT]);

    let (stdout, _, success) = run_ctxv(
        &config_path,
        &["search", PROJECT, "pass", "-t", "rule", "--json"],
    );
    assert!(success);
    let results: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["type"], "rule");
    assert_eq!(results[0]["path"], "R1");
}

#[test]
fn test_search_text_output() {
    let (_tmp, config_path) = setup_test_env();
    run_ctxv(&config_path, &["index", PROJECT]);

    let (stdout, _, success) = run_ctxv(&config_path, &["search", PROJECT, "pass"]);
    assert!(success);
    assert!(stdout.contains("--- Result 1 (relevance: "));
    assert!(stdout.contains("Type: code | Path: a/b.py"));
}

#[test]
fn test_search_empty_collection() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_ctxv(&config_path, &["search", PROJECT, "anything"]);
    assert!(success);
    assert!(stdout.contains("No results found"));
}

#[test]
fn test_search_requires_query() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_ctxv(&config_path, &["search", PROJECT]);
    assert!(!success);
    assert!(stderr.contains("Search query required"));
}

#[test]
fn test_query_without_synthesis_is_unavailable() {
    let (_tmp, config_path) = setup_test_env();
    run_ctxv(&config_path, &["index", PROJECT]);

    let (stdout, stderr, success) =
        run_ctxv(&config_path, &["query", PROJECT, "what does f do?", "--json"]);
    assert!(success, "query failed: {}", stderr);
    let v: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert!(v["answer"].as_str().unwrap().contains("unavailable"));
    assert_eq!(v["sources"].as_array().unwrap().len(), 0);
}

#[test]
fn test_query_requires_query() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_ctxv(&config_path, &["query", PROJECT, "  "]);
    assert!(!success);
    assert!(stderr.contains("Query required"));
}

#[test]
fn test_stats_text_output() {
    let (_tmp, config_path) = setup_test_env();
    write_project_config(&config_path, r#"{"name": "Demo Project"}"#);
    run_ctxv(&config_path, &["index", PROJECT]);

    let (stdout, _, success) = run_ctxv(&config_path, &["stats", PROJECT]);
    assert!(success);
    assert!(stdout.contains("Project: Demo Project (demo)"));
    assert!(stdout.contains("Total items: 2"));
    assert!(stdout.contains("DB path: "));
}

#[test]
fn test_stats_unknown_project_name() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_ctxv(&config_path, &["stats", PROJECT]);
    assert!(success);
    assert!(stdout.contains("Project: Unknown (demo)"));
    assert!(stdout.contains("Total items: 0"));
}

#[test]
fn test_index_without_content_keeps_collection() {
    let (_tmp, config_path) = setup_test_env();
    run_ctxv(&config_path, &["index", PROJECT]);

    let root = config_path.parent().unwrap();
    fs::remove_file(root.join("projects").join(PROJECT).join("index.json")).unwrap();
    fs::remove_file(root.join("docs").join(PROJECT).join("docs.jsonl")).unwrap();

    let (stdout, _, success) = run_ctxv(&config_path, &["index", PROJECT]);
    assert!(success);
    assert!(stdout.contains("No content to index"));
    assert_eq!(total_items(&config_path), 2);
}

#[test]
fn test_invalid_docs_line_fails() {
    let (_tmp, config_path) = setup_test_env();
    let root = config_path.parent().unwrap();
    fs::write(
        root.join("docs").join(PROJECT).join("docs.jsonl"),
        "{\"id\": \"ok\", \"content\": \"fine\"}\nnot json\n",
    )
    .unwrap();

    let (_, stderr, success) = run_ctxv(&config_path, &["index", PROJECT]);
    assert!(!success);
    assert!(stderr.contains("docs.jsonl:2"));
}

#[test]
fn test_index_dir_missing_path() {
    let (_tmp, config_path) = setup_test_env();
    write_project_config(&config_path, r#"{"path": "/definitely/not/here"}"#);
    run_ctxv(&config_path, &["index", PROJECT]);

    let (_, stderr, success) = run_ctxv(&config_path, &["index-dir", PROJECT]);
    assert!(success);
    assert!(stderr.contains("Error: Project path not found: /definitely/not/here"));
    assert_eq!(total_items(&config_path), 2);
}

#[test]
fn test_index_dir_scans_project() {
    let (tmp, config_path) = setup_test_env();
    let src = tmp.path().join("checkout");
    fs::create_dir_all(src.join("pkg")).unwrap();
    fs::create_dir_all(src.join("node_modules").join("dep")).unwrap();
    fs::write(src.join("pkg").join("app.py"), "def handler(event):\n    return event").unwrap();
    fs::write(src.join("pkg").join("util.ts"), "export const retry = 3;").unwrap();
    fs::write(src.join("README.md"), "# not indexed").unwrap();
    fs::write(src.join("node_modules").join("dep").join("x.js"), "ignored").unwrap();

    write_project_config(
        &config_path,
        &format!(r#"{{"name": "Demo", "path": "{}"}}"#, src.display()),
    );

    let (stdout, stderr, success) = run_ctxv(&config_path, &["index-dir", PROJECT]);
    assert!(success, "index-dir failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Loaded 2 documents"));
    assert!(stdout.contains("Added 2 manual documents"));
    // 2 files + 1 non-empty manual doc
    assert_eq!(total_items(&config_path), 3);

    let (stdout, _, _) = run_ctxv(
        &config_path,
        &["search", PROJECT, "handler event", "-n", "1", "--json"],
    );
    let results: Vec<serde_json::Value> = serde_json::from_str(&stdout).unwrap();
    assert_eq!(results[0]["path"], "pkg/app.py");
}

#[test]
fn test_json_progress_on_stderr() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_ctxv(&config_path, &["--progress", "json", "index", PROJECT]);
    assert!(success);
    assert!(!stdout.contains("\"event\""));
    let last = stderr
        .lines()
        .filter(|l| l.contains("\"phase\":\"indexing\""))
        .last()
        .expect("no indexing progress");
    let v: serde_json::Value = serde_json::from_str(last).unwrap();
    assert_eq!(v["n"], 2);
    assert_eq!(v["total"], 2);
}

#[test]
fn test_invalid_config_rejected() {
    let (_tmp, config_path) = setup_test_env();
    fs::write(&config_path, "[embedding]\nprovider = \"nope\"\n").unwrap();

    let (_, stderr, success) = run_ctxv(&config_path, &["stats", PROJECT]);
    assert!(!success);
    assert!(stderr.contains("nope"));
}
