// Remembered popup fields (admin / student / merchant addresses).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBook {
    #[serde(default, rename = "adminAddr", skip_serializing_if = "Option::is_none")]
    pub admin: Option<String>,
    #[serde(default, rename = "studentAddr", skip_serializing_if = "Option::is_none")]
    pub student: Option<String>,
    #[serde(default, rename = "merchantAddr", skip_serializing_if = "Option::is_none")]
    pub merchant: Option<String>,
}

impl AddressBook {
    /// Missing file → empty book.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .context(format!("Failed to read settings file: {}", path.display()))?;
        serde_json::from_str(&content).context("Failed to parse settings file")
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .context(format!("Failed to create settings dir: {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)
            .context(format!("Failed to write settings file: {}", path.display()))?;
        tracing::debug!("Saved addresses to {}", path.display());
        Ok(())
    }

    /// Overwrites the fields that were given, keeps the rest.
    pub fn merge(&mut self, admin: Option<String>, student: Option<String>, merchant: Option<String>) {
        if admin.is_some() {
            self.admin = admin;
        }
        if student.is_some() {
            self.student = student;
        }
        if merchant.is_some() {
            self.merchant = merchant;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir()
            .join(format!("greenpoints-settings-{}-{}", std::process::id(), name))
            .join("settings.json")
    }

    #[test]
    fn test_missing_file_is_empty() {
        let book = AddressBook::load(temp_path("missing")).unwrap();
        assert_eq!(book, AddressBook::default());
    }

    #[test]
    fn test_save_and_load() {
        let path = temp_path("roundtrip");
        let mut book = AddressBook::default();
        book.merge(Some("0xA".to_string()), Some("0xB".to_string()), None);
        book.save(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"adminAddr\""));
        assert!(!raw.contains("merchantAddr"));

        let loaded = AddressBook::load(&path).unwrap();
        assert_eq!(loaded, book);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_merge_keeps_unset_fields() {
        let mut book = AddressBook {
            admin: Some("0xA".to_string()),
            student: Some("0xB".to_string()),
            merchant: Some("0xM".to_string()),
        };
        book.merge(None, Some("0xC".to_string()), None);
        assert_eq!(book.admin.as_deref(), Some("0xA"));
        assert_eq!(book.student.as_deref(), Some("0xC"));
        assert_eq!(book.merchant.as_deref(), Some("0xM"));
    }
}
