//! Readers for the raw content sources of a project.
//!
//! All readers are best-effort: a missing file yields empty data, and only
//! structurally invalid JSON is reported as an error.
//!
//! | File | Reader |
//! |------|--------|
//! | `<projects_dir>/<id>/index.json` | [`load_project_index`] |
//! | `<docs_dir>/<id>/docs.jsonl` | [`load_project_docs`] |
//! | `<projects_dir>/<id>/config.json` | [`load_project_config`] |

use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

use crate::config::{PathsConfig, ProjectConfig};
use crate::models::{ManualDoc, ShellIndex};

/// Load the shell-generated chunk index for a project.
pub fn load_project_index(paths: &PathsConfig, project_id: &str) -> Result<ShellIndex> {
    let path = paths.projects_dir().join(project_id).join("index.json");
    match read_optional(&path)? {
        Some(content) => serde_json::from_str(&content)
            .with_context(|| format!("Invalid chunk index: {}", path.display())),
        None => Ok(ShellIndex::default()),
    }
}

/// Load manual docs, one JSON object per line. Blank lines are skipped.
pub fn load_project_docs(paths: &PathsConfig, project_id: &str) -> Result<Vec<ManualDoc>> {
    let path = paths.docs_dir().join(project_id).join("docs.jsonl");
    let content = match read_optional(&path)? {
        Some(content) => content,
        None => return Ok(Vec::new()),
    };

    let mut docs = Vec::new();
    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let doc: ManualDoc = serde_json::from_str(line).with_context(|| {
            format!("Invalid manual doc at {}:{}", path.display(), lineno + 1)
        })?;
        docs.push(doc);
    }
    Ok(docs)
}

/// Load the project's `config.json`, or defaults when it is absent.
pub fn load_project_config(paths: &PathsConfig, project_id: &str) -> Result<ProjectConfig> {
    let path = paths.projects_dir().join(project_id).join("config.json");
    match read_optional(&path)? {
        Some(content) => serde_json::from_str(&content)
            .with_context(|| format!("Invalid project config: {}", path.display())),
        None => Ok(ProjectConfig::default()),
    }
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "source file absent, treating as empty");
            Ok(None)
        }
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn paths_in(tmp: &TempDir) -> PathsConfig {
        PathsConfig {
            context_root: tmp.path().to_path_buf(),
            ..PathsConfig::default()
        }
    }

    #[test]
    fn test_missing_files_are_empty() {
        let tmp = TempDir::new().unwrap();
        let paths = paths_in(&tmp);

        let index = load_project_index(&paths, "ghost").unwrap();
        assert!(index.chunks.is_empty());
        assert!(index.files.is_empty());
        assert!(load_project_docs(&paths, "ghost").unwrap().is_empty());
        let cfg = load_project_config(&paths, "ghost").unwrap();
        assert!(cfg.name.is_none());
        assert_eq!(cfg.include_extensions.len(), 5);
    }

    #[test]
    fn test_docs_skip_blank_lines() {
        let tmp = TempDir::new().unwrap();
        let paths = paths_in(&tmp);
        let dir = paths.docs_dir().join("p");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("docs.jsonl"),
            "{\"id\":\"a\",\"content\":\"one\",\"type\":\"rule\",\"title\":\"A\"}\n\n   \n{\"id\":\"b\",\"content\":\"two\"}\n",
        )
        .unwrap();

        let docs = load_project_docs(&paths, "p").unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].doc_type.as_deref(), Some("rule"));
        assert_eq!(docs[1].id, "b");
    }

    #[test]
    fn test_malformed_docs_line_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let paths = paths_in(&tmp);
        let dir = paths.docs_dir().join("p");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("docs.jsonl"), "{\"id\":\"a\"}\n{not json\n").unwrap();

        let err = load_project_docs(&paths, "p").unwrap_err();
        assert!(format!("{:#}", err).contains("docs.jsonl:2"));
    }

    #[test]
    fn test_index_and_config_parse() {
        let tmp = TempDir::new().unwrap();
        let paths = paths_in(&tmp);
        let dir = paths.projects_dir().join("p");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("index.json"),
            r#"{"files": {}, "chunks": [{"id": "a/b.py#1", "path": "a/b.py", "content": "def f(): pass"}]}"#,
        )
        .unwrap();
        fs::write(
            dir.join("config.json"),
            r#"{"name": "Project P", "path": "/src/p", "include_extensions": [".rs"]}"#,
        )
        .unwrap();

        let index = load_project_index(&paths, "p").unwrap();
        assert_eq!(index.chunks.len(), 1);
        assert_eq!(index.chunks[0].path, "a/b.py");

        let cfg = load_project_config(&paths, "p").unwrap();
        assert_eq!(cfg.name.as_deref(), Some("Project P"));
        assert_eq!(cfg.include_extensions, vec![".rs"]);
        assert_eq!(cfg.exclude_patterns.len(), 4);
    }

    #[test]
    fn test_malformed_index_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let paths = paths_in(&tmp);
        let dir = paths.projects_dir().join("p");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("index.json"), "{\"chunks\": [").unwrap();

        assert!(load_project_index(&paths, "p").is_err());
    }
}
