//! Resolver settings.

use kdl::{KdlDocument, KdlNode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::kdl_util::{children, first_integer_arg, required_string_args, unsigned};
use crate::{ConfigError, ConfigResult};

/// Which masked values may be added to the log redaction set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskingPolicy {
    /// Values shorter than this (in characters) are never redacted.
    pub min_length: usize,
    /// Any occurrence of one of these rejects the value.
    pub forbidden_chars: Vec<char>,
    /// Exact values that are known not to be secrets.
    pub placeholders: Vec<String>,
}

impl Default for MaskingPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            forbidden_chars: vec!['\n', '\r'],
            placeholders: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    pub instance_ttl: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            instance_ttl: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitSettings {
    pub max_value_length: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_value_length: 10_000,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolverConfig {
    pub masking: MaskingPolicy,
    pub cache: CacheSettings,
    pub limits: LimitSettings,
}

impl ResolverConfig {
    /// Read settings from a KDL file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let text = std::fs::read_to_string(path)?;
        parse_resolver_config(&text)
    }
}

/// Parse resolver settings from KDL text. Missing nodes keep their defaults.
pub fn parse_resolver_config(kdl: &str) -> ConfigResult<ResolverConfig> {
    let doc: KdlDocument = kdl.parse()?;
    let mut config = ResolverConfig::default();

    for node in doc.nodes() {
        let section = node.name().value();
        if !matches!(section, "masking" | "cache" | "limits") {
            return Err(ConfigError::InvalidReference(format!("unknown setting '{section}'")));
        }
        for child in children(node) {
            let setting = child.name().value();
            match (section, setting) {
                ("masking", "min-length") => {
                    config.masking.min_length = integer_setting(child, "masking min-length")?;
                }
                ("masking", "forbidden-chars") => {
                    let values = required_string_args(child, "masking forbidden-chars")?;
                    config.masking.forbidden_chars = parse_chars(&values)?;
                }
                ("masking", "placeholder") => {
                    let values = required_string_args(child, "masking placeholder")?;
                    config.masking.placeholders.extend(values);
                }
                ("cache", "instance-ttl-secs") => {
                    let secs: u64 = integer_setting(child, "cache instance-ttl-secs")?;
                    config.cache.instance_ttl = Duration::from_secs(secs);
                }
                ("limits", "max-value-length") => {
                    config.limits.max_value_length = integer_setting(child, "limits max-value-length")?;
                }
                (_, other) => {
                    return Err(ConfigError::InvalidReference(format!(
                        "unknown setting '{section} {other}'"
                    )));
                }
            }
        }
    }

    Ok(config)
}

fn integer_setting<T: TryFrom<i128>>(node: &KdlNode, field: &str) -> ConfigResult<T> {
    let value = first_integer_arg(node).ok_or_else(|| ConfigError::MissingField(field.to_string()))?;
    unsigned(value, field)
}

fn parse_chars(values: &[String]) -> ConfigResult<Vec<char>> {
    values
        .iter()
        .map(|s| {
            let mut chars = s.chars();
            match (chars.next(), chars.next()) {
                (Some(c), None) => Ok(c),
                _ => Err(ConfigError::InvalidValue {
                    field: "masking forbidden-chars".to_string(),
                    message: format!("{s:?} is not a single character"),
                }),
            }
        })
        .collect()
}
