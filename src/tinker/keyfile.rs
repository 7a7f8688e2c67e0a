//! Tinker key files
//!
//! A key file is a list of keyword lines (`parameters /abs/amoeba.prm`,
//! `a-axis 64.0`). Comment lines start with `#` and are not preserved.

use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use tracing::debug;

/// In-memory key file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyFile {
    entries: Vec<Vec<String>>,
}

impl KeyFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Self {
        let entries = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(|line| line.split_whitespace().map(str::to_string).collect())
            .collect();
        Self { entries }
    }

    /// Load a key file; a missing file is an empty key file
    pub fn load(path: &Path) -> io::Result<Self> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(Self::parse(&text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::new()),
            Err(e) => Err(e),
        }
    }

    /// Set a keyword, replacing its values if it is already present
    pub fn set(&mut self, keyword: &str, value: &str) {
        let values = value.split_whitespace().map(str::to_string);
        match self.entries.iter_mut().find(|e| e[0] == keyword) {
            Some(entry) => {
                debug!("Updating key `{} {}`", keyword, value);
                entry.truncate(1);
                entry.extend(values);
            }
            None => {
                debug!("Adding key `{} {}`", keyword, value);
                let mut entry = vec![keyword.to_string()];
                entry.extend(values);
                self.entries.push(entry);
            }
        }
    }

    /// Values following the keyword
    pub fn get(&self, keyword: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|e| e[0] == keyword)
            .map(|e| &e[1..])
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.get(keyword).is_some()
    }

    pub fn write(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.to_string())
    }
}

impl fmt::Display for KeyFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for entry in &self.entries {
            writeln!(f, "{}", entry.join(" "))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_skips_comments_and_blanks() {
        let key = KeyFile::parse("# header\n\nparameters  /ff/amoeba.prm\n  a-axis 64.0\n");
        assert_eq!(key.get("parameters"), Some(&["/ff/amoeba.prm".to_string()][..]));
        assert_eq!(key.get("a-axis"), Some(&["64.0".to_string()][..]));
        assert!(!key.contains("#"));
        assert_eq!(key.to_string(), "parameters /ff/amoeba.prm\na-axis 64.0\n");
    }

    #[test]
    fn test_set_replaces_existing() {
        let mut key = KeyFile::new();
        key.set("a-axis", "60.0");
        key.set("parameters", "/ff/amoeba.prm");
        key.set("a-axis", "64.0");

        assert_eq!(key.to_string(), "a-axis 64.0\nparameters /ff/amoeba.prm\n");
    }

    #[test]
    fn test_flag_keyword_without_value() {
        let mut key = KeyFile::new();
        key.set("verbose", "");
        assert_eq!(key.get("verbose"), Some(&[][..]));
        assert_eq!(key.to_string(), "verbose\n");
    }

    #[test]
    fn test_load_and_write() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("my_system.key");

        assert_eq!(KeyFile::load(&path).unwrap(), KeyFile::new());

        let mut key = KeyFile::new();
        key.set("parameters", "/ff/amoeba.prm");
        key.write(&path).unwrap();

        assert_eq!(KeyFile::load(&path).unwrap(), key);
    }
}
