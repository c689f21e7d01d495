//! Secret references in `config.toml`.
//!
//! - `pass::path/in/store` is the first line of `pass show path/in/store`
//! - `env::VAR_NAME` is read from the environment
//! - anything else is used as-is

use std::process::Command;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretRef<'a> {
    Pass(&'a str),
    Env(&'a str),
    Plain(&'a str),
}

impl<'a> SecretRef<'a> {
    pub fn parse(value: &'a str) -> Self {
        if let Some(path) = value.strip_prefix("pass::") {
            Self::Pass(path)
        } else if let Some(var) = value.strip_prefix("env::") {
            Self::Env(var)
        } else {
            Self::Plain(value)
        }
    }

    /// Whether the value lives outside the config file.
    pub fn is_reference(&self) -> bool {
        !matches!(self, Self::Plain(_))
    }

    pub fn resolve(&self) -> Result<String, String> {
        match self {
            Self::Pass(path) => from_pass(path),
            Self::Env(var) => {
                std::env::var(var).map_err(|_| format!("environment variable `{var}` is not set"))
            }
            Self::Plain(value) => Ok((*value).to_string()),
        }
    }
}

fn from_pass(path: &str) -> Result<String, String> {
    let output = Command::new("pass")
        .args(["show", path])
        .output()
        .map_err(|e| format!("failed to run `pass show {path}`: {e}"))?;

    if !output.status.success() {
        return Err(format!(
            "`pass show {path}` failed ({}): {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(str::to_string)
        .ok_or_else(|| format!("`pass show {path}` produced no output"))
}
