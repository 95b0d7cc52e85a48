//! Company directory: normalized company name to CVR and GLN.
//!
//! Loaded once at startup and never mutated afterwards.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::debug;

use crate::error::{Error, Result};
use crate::validate::identifiers::{is_valid_cvr_format, is_valid_gln_format};

/// Legal-form suffixes stripped as a last lookup attempt.
const LEGAL_FORMS: &[&str] = &["a/s", "aps", "i/s", "k/s", "p/s", "amba", "a.m.b.a."];

/// On-disk format of the directory file.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DirectoryFile {
    company_cvr_map: HashMap<String, String>,
    company_gln_map: HashMap<String, String>,
    aliases: HashMap<String, String>,
}

/// Identifiers found for a company name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Directory key the name matched.
    pub key: String,
    pub cvr: Option<String>,
    pub gln: Option<String>,
}

/// Immutable lookup from company name to identifiers.
#[derive(Debug, Clone, Default)]
pub struct CompanyDirectory {
    cvr: HashMap<String, String>,
    gln: HashMap<String, String>,
    aliases: HashMap<String, String>,
}

/// Lowercase, trim and collapse inner whitespace.
pub fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn strip_legal_form(name: &str) -> Option<&str> {
    LEGAL_FORMS.iter().find_map(|form| {
        name.strip_suffix(form)
            .filter(|rest| rest.ends_with([' ', ',']))
            .map(|rest| rest.trim_end_matches([' ', ',']))
            .filter(|rest| !rest.is_empty())
    })
}

impl CompanyDirectory {
    /// Directory shipped with the binary.
    pub fn builtin() -> Self {
        let cvr = [
            ("lego", "47458714"),
            ("lego system", "47458714"),
            ("universal robots", "29138060"),
            ("danfoss", "20165715"),
            ("novo nordisk", "24256790"),
            ("carlsberg", "25508343"),
            ("carlsberg breweries", "25508343"),
        ];
        let gln = [
            ("lego", "5790000123456"),
            ("lego system", "5790000123456"),
            ("universal robots", "5790000234567"),
            ("danfoss", "5790000345678"),
            ("novo nordisk", "5790000456789"),
            ("carlsberg", "5790000567890"),
            ("carlsberg breweries", "5790000567890"),
        ];
        Self {
            cvr: cvr.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            gln: gln.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            aliases: HashMap::new(),
        }
    }

    /// Load a directory JSON file. Malformed identifiers are rejected.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Directory(format!("{}: {}", path.display(), e)))?;
        Self::from_json(&content)
            .map_err(|e| Error::Directory(format!("{}: {}", path.display(), e)))
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let file: DirectoryFile =
            serde_json::from_str(content).map_err(|e| Error::Directory(e.to_string()))?;

        let mut cvr = HashMap::new();
        for (name, value) in file.company_cvr_map {
            let value = value.trim().to_string();
            if !is_valid_cvr_format(&value) {
                return Err(Error::Directory(format!("CVR for '{}' is not 8 digits", name)));
            }
            cvr.insert(normalize_name(&name), value);
        }

        let mut gln = HashMap::new();
        for (name, value) in file.company_gln_map {
            let value = value.trim().to_string();
            if !is_valid_gln_format(&value) {
                return Err(Error::Directory(format!("GLN for '{}' is not 13 digits", name)));
            }
            gln.insert(normalize_name(&name), value);
        }

        let aliases = file
            .aliases
            .into_iter()
            .map(|(alias, target)| (normalize_name(&alias), normalize_name(&target)))
            .collect();

        debug!("Loaded company directory with {} CVR and {} GLN entries", cvr.len(), gln.len());
        Ok(Self { cvr, gln, aliases })
    }

    pub fn len(&self) -> usize {
        self.cvr.len().max(self.gln.len())
    }

    pub fn is_empty(&self) -> bool {
        self.cvr.is_empty() && self.gln.is_empty()
    }

    fn entry(&self, key: &str) -> Option<DirectoryEntry> {
        let cvr = self.cvr.get(key).cloned();
        let gln = self.gln.get(key).cloned();
        if cvr.is_none() && gln.is_none() {
            return None;
        }
        Some(DirectoryEntry {
            key: key.to_string(),
            cvr,
            gln,
        })
    }

    /// Resolve a company name: exact key, then alias, then without legal form.
    pub fn lookup(&self, name: &str) -> Option<DirectoryEntry> {
        let key = normalize_name(name);
        if key.is_empty() {
            return None;
        }
        self.entry(&key)
            .or_else(|| self.aliases.get(&key).and_then(|target| self.entry(target)))
            .or_else(|| strip_legal_form(&key).and_then(|base| self.entry(base)))
    }
}
