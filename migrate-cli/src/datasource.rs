//! Datasource block parsing
//!
//! Only the first `datasource` block is read, and only its `provider` and
//! `url` keys. The url is either a string literal or `env("VAR")`.

use std::fmt;
use std::str::FromStr;

use crate::error::CliError;

/// Database family named by `provider`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    Sqlite,
    Postgresql,
    Mysql,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Postgresql => "postgresql",
            Self::Mysql => "mysql",
        }
    }

    /// Port assumed when the url names none
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::Sqlite => None,
            Self::Postgresql => Some(5432),
            Self::Mysql => Some(3306),
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = CliError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sqlite" => Ok(Self::Sqlite),
            "postgresql" | "postgres" => Ok(Self::Postgresql),
            "mysql" => Ok(Self::Mysql),
            other => Err(CliError::Schema(format!(
                "Datasource provider not known: \"{}\".",
                other
            ))),
        }
    }
}

/// The datasource a schema points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datasource {
    pub name: String,
    pub provider: Provider,
    pub url: String,
}

/// Strips a trailing `//` comment that is not inside a string literal
fn strip_comment(line: &str) -> &str {
    let mut in_string = false;
    let bytes = line.as_bytes();
    for (i, byte) in bytes.iter().enumerate() {
        match byte {
            b'"' => in_string = !in_string,
            b'/' if !in_string && bytes.get(i + 1) == Some(&b'/') => return &line[..i],
            _ => {}
        }
    }
    line
}

fn string_literal(value: &str) -> Option<&str> {
    value.strip_prefix('"')?.strip_suffix('"')
}

fn parse_url<F>(value: &str, env: F) -> Result<String, CliError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(literal) = string_literal(value) {
        return Ok(literal.to_string());
    }

    let var = value
        .strip_prefix("env(")
        .and_then(|rest| rest.strip_suffix(')'))
        .and_then(|inner| string_literal(inner.trim()))
        .ok_or_else(|| {
            CliError::Schema(format!(
                "The datasource url must be a string or env(\"VAR\"), got `{}`.",
                value
            ))
        })?;

    env(var).ok_or_else(|| CliError::Schema(format!("Environment variable not found: {}.", var)))
}

/// Parses the first datasource block of `source`
///
/// `env` resolves `env("VAR")` urls.
pub fn parse<F>(source: &str, env: F) -> Result<Datasource, CliError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut lines = source.lines().map(|l| strip_comment(l).trim());

    let name = lines
        .by_ref()
        .find_map(|line| {
            let rest = line.strip_prefix("datasource")?;
            let rest = rest.strip_suffix('{')?.trim();
            (!rest.is_empty()).then(|| rest.to_string())
        })
        .ok_or_else(|| {
            CliError::Schema("The schema file doesn't contain a datasource block.".to_string())
        })?;

    let mut provider = None;
    let mut url = None;
    for line in lines.by_ref() {
        if line == "}" {
            break;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        match key.trim() {
            "provider" => provider = Some(value.trim().to_string()),
            "url" => url = Some(value.trim().to_string()),
            _ => {}
        }
    }

    let provider = provider.ok_or_else(|| {
        CliError::Schema(format!("The datasource `{}` has no provider.", name))
    })?;
    let provider = string_literal(&provider)
        .ok_or_else(|| CliError::Schema(format!("Invalid provider value {}.", provider)))?
        .parse::<Provider>()?;

    let url = url.ok_or_else(|| CliError::Schema(format!("The datasource `{}` has no url.", name)))?;
    let url = parse_url(&url, env)?;

    log::debug!("datasource {} uses provider {}", name, provider);
    Ok(Datasource {
        name,
        provider,
        url,
    })
}
