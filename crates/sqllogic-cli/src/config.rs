use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use sqllogic::BackendConfig;

/// Backend configuration file: one `[[backend]]` table per backend.
///
/// ```toml
/// [[backend]]
/// label = "mysql"
/// protocol = "mysql"
/// host = "127.0.0.1"
/// port = 3307
/// user = "root"
/// password = "root"
/// database = "logictest"
///
/// [[backend]]
/// label = "http"
/// protocol = "http"
/// host = "127.0.0.1"
/// port = 8000
/// ```
#[derive(Debug, Deserialize)]
pub struct BackendsFile {
    pub backend: Vec<BackendConfig>,
}

impl BackendsFile {
    /// Load backend configurations from a TOML file.
    pub fn load(path: &Path) -> Result<Vec<BackendConfig>> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("could not read backend config {}", path.display()))?;
        let file: BackendsFile = toml::from_str(&contents)
            .with_context(|| format!("invalid backend config {}", path.display()))?;
        Ok(file.backend)
    }
}

/// Load the skip list: one fixture identifier per line, `#` comments and
/// blank lines ignored.
pub fn load_skip_list(path: &Path) -> Result<HashSet<String>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("could not read skip list {}", path.display()))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqllogic::BackendKind;

    #[test]
    fn backends_file_parses_two_backends() {
        let file: BackendsFile = toml::from_str(
            r#"
            [[backend]]
            label = "mysql"
            protocol = "mysql"
            host = "127.0.0.1"
            port = 3307
            user = "root"
            password = "root"
            database = "logictest"

            [[backend]]
            label = "http"
            protocol = "http"
            host = "127.0.0.1"
            port = 8000
            "#,
        )
        .expect("config should parse");

        assert_eq!(file.backend.len(), 2);
        assert_eq!(file.backend[0].label, "mysql");
        assert_eq!(file.backend[0].protocol, BackendKind::Mysql);
        assert_eq!(file.backend[0].database.as_deref(), Some("logictest"));
        assert_eq!(file.backend[1].protocol, BackendKind::Http);
        assert_eq!(file.backend[1].user, "");
    }

    #[test]
    fn skip_list_ignores_comments_and_blanks() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("skip.txt");
        std::fs::write(&path, "# broken upstream\nwindow.test\n\nretention/cohort.test\n")
            .expect("skip list should be writable");

        let skip = load_skip_list(&path).expect("skip list should load");
        assert_eq!(
            skip,
            HashSet::from(["window.test".to_string(), "retention/cohort.test".to_string()])
        );
    }
}
