// ABOUTME: Docker-compatible container name validation.
// ABOUTME: Names start alphanumeric and continue with [a-zA-Z0-9_.-].

use std::fmt;
use thiserror::Error;

/// Suffix appended to a production container name for its canary sibling.
const CANARY_SUFFIX: &str = "-canary";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ContainerNameError {
    #[error("container name cannot be empty")]
    Empty,

    #[error("container name exceeds maximum length of 128 characters")]
    TooLong,

    #[error("container name must start with a letter or digit")]
    InvalidStart,

    #[error("invalid character in container name: '{0}'")]
    InvalidChar(char),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerName(String);

impl ContainerName {
    pub fn new(value: &str) -> Result<Self, ContainerNameError> {
        let mut chars = value.chars();
        let first = chars.next().ok_or(ContainerNameError::Empty)?;

        if value.len() > 128 {
            return Err(ContainerNameError::TooLong);
        }

        if !first.is_ascii_alphanumeric() {
            return Err(ContainerNameError::InvalidStart);
        }

        if let Some(c) = chars.find(|c| !c.is_ascii_alphanumeric() && !matches!(c, '_' | '.' | '-')) {
            return Err(ContainerNameError::InvalidChar(c));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name of the canary container that runs next to this one.
    pub fn canary(&self) -> ContainerName {
        ContainerName(format!("{}{}", self.0, CANARY_SUFFIX))
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_docker_style_names() {
        assert!(ContainerName::new("web").is_ok());
        assert!(ContainerName::new("web_1.blue-2").is_ok());
        assert!(ContainerName::new("9lives").is_ok());
    }

    #[test]
    fn rejects_bad_names() {
        assert_eq!(ContainerName::new(""), Err(ContainerNameError::Empty));
        assert_eq!(
            ContainerName::new("-web"),
            Err(ContainerNameError::InvalidStart)
        );
        assert_eq!(
            ContainerName::new("web app"),
            Err(ContainerNameError::InvalidChar(' '))
        );
        assert_eq!(
            ContainerName::new(&"a".repeat(129)),
            Err(ContainerNameError::TooLong)
        );
    }

    #[test]
    fn canary_name_appends_suffix() {
        let name = ContainerName::new("api").unwrap();
        assert_eq!(name.canary().as_str(), "api-canary");
    }
}
