use std::collections::HashMap;
use std::fs;
use std::str::FromStr;

pub mod client_settings;
pub mod server_settings;

pub use client_settings::ClientSettings;
pub use server_settings::ServerSettings;

/// INI-style configuration: `[Section]` headers, `key = value` pairs,
/// `#` comments, optional double quotes around values. Keys before the first
/// section land in `globals`.
#[derive(Debug, Default)]
pub struct Config {
    pub globals: HashMap<String, String>,
    pub sections: HashMap<String, HashMap<String, String>>,
}

impl Config {
    pub fn load(path: &str) -> Result<Self, String> {
        let content =
            fs::read_to_string(path).map_err(|e| format!("Error reading file {path}: {e}"))?;
        Ok(Self::parse(&content))
    }

    /// Tries each path in order and returns the first one that loads.
    pub fn load_first(paths: &[&str]) -> Option<(Self, String)> {
        paths
            .iter()
            .find_map(|p| Self::load(p).ok().map(|c| (c, (*p).to_owned())))
    }

    pub fn parse(content: &str) -> Self {
        let mut cfg = Self::empty();
        let mut current_section: Option<String> = None;

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some(name) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                current_section = Some(name.trim().to_string());
                continue;
            }

            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let key = key.trim().to_string();
            let value = value.trim().trim_matches('"').to_string();

            match &current_section {
                None => {
                    cfg.globals.insert(key, value);
                }
                Some(sec) => {
                    cfg.sections.entry(sec.clone()).or_default().insert(key, value);
                }
            }
        }
        cfg
    }

    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.sections
            .get(section)
            .and_then(|sec| sec.get(key))
            .map(String::as_str)
    }

    #[must_use]
    pub fn get_non_empty(&self, section: &str, key: &str) -> Option<&str> {
        self.get(section, key).filter(|s| !s.is_empty())
    }

    #[must_use]
    pub fn get_global(&self, key: &str) -> Option<&str> {
        self.globals.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn get_or_default<'a>(&'a self, section: &str, key: &str, default: &'a str) -> &'a str {
        self.get_non_empty(section, key)
            .or_else(|| self.get_global(key).filter(|s| !s.is_empty()))
            .unwrap_or(default)
    }

    /// Parses `section.key` (falling back to the global key) as `T`.
    /// Missing or unparsable values yield `default`.
    #[must_use]
    pub fn get_parsed<T: FromStr>(&self, section: &str, key: &str, default: T) -> T {
        self.get_non_empty(section, key)
            .or_else(|| self.get_global(key))
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    #[must_use]
    pub fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
        match self.get_non_empty(section, key).map(str::to_ascii_lowercase) {
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
            _ => default,
        }
    }
}
