use std::env;

use anyhow::{anyhow, Result};

/// Computer ids returned in place of the stored value while the placeholder is on.
pub const PLACEHOLDER_COMPUTERS: &[&str] =
    &["24ba02d267cd4fcaae16eb69835fdfd7d89f023b5af23284d74981c70b5b371e"];

const TABLE_NAME_VAR: &str = "TABLE_NAME";
const USE_STORED_VAR: &str = "USE_STORED_COMPUTERS";

/// Process configuration for the lookup handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupConfig {
    pub table_name: String,
    /// When set, answered instead of the looked-up value.
    pub placeholder: Option<Vec<String>>,
}

impl LookupConfig {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            placeholder: Some(PLACEHOLDER_COMPUTERS.iter().map(|id| id.to_string()).collect()),
        }
    }

    /// Answers with the stored value instead of the placeholder list.
    pub fn with_stored_computers(mut self) -> Self {
        self.placeholder = None;
        self
    }

    /// Reads `TABLE_NAME` and the optional `USE_STORED_COMPUTERS` flag.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let table_name = lookup(TABLE_NAME_VAR)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .ok_or_else(|| anyhow!("{TABLE_NAME_VAR} must be set"))?;
        let config = Self::new(table_name);
        let use_stored = lookup(USE_STORED_VAR)
            .map(|value| parse_flag(&value))
            .transpose()?
            .unwrap_or(false);
        Ok(if use_stored {
            config.with_stored_computers()
        } else {
            config
        })
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "" | "0" | "false" | "no" | "off" => Ok(false),
        other => Err(anyhow!("{USE_STORED_VAR} has unexpected value {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn table_name_is_required() {
        assert!(LookupConfig::from_lookup(vars(&[])).is_err());
        assert!(LookupConfig::from_lookup(vars(&[("TABLE_NAME", "  ")])).is_err());
    }

    #[test]
    fn placeholder_is_on_by_default() {
        let config = LookupConfig::from_lookup(vars(&[("TABLE_NAME", "computers")])).unwrap();
        assert_eq!(config.table_name, "computers");
        assert_eq!(
            config.placeholder.as_deref(),
            Some(&[PLACEHOLDER_COMPUTERS[0].to_string()][..])
        );
    }

    #[test]
    fn stored_flag_disables_placeholder() {
        let config = LookupConfig::from_lookup(vars(&[
            ("TABLE_NAME", "computers"),
            ("USE_STORED_COMPUTERS", "TRUE"),
        ]))
        .unwrap();
        assert!(config.placeholder.is_none());
    }

    #[test]
    fn garbage_flag_is_rejected() {
        let result = LookupConfig::from_lookup(vars(&[
            ("TABLE_NAME", "computers"),
            ("USE_STORED_COMPUTERS", "maybe"),
        ]));
        assert!(result.is_err());
    }
}
