use serde::Deserialize;
use std::env;

/// Deployment environment. Selects the log format and can be overridden
/// per service through its own configuration layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[serde(alias = "dev")]
    Development,
    #[serde(alias = "prod")]
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }

    pub fn from_env() -> Self {
        Self::parse(&env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()))
    }

    /// Unknown values fall back to development.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_parse_accepts_short_and_long_names() {
        assert_eq!(Environment::parse("prod"), Environment::Production);
        assert_eq!(Environment::parse(" Production "), Environment::Production);
        assert_eq!(Environment::parse("dev"), Environment::Development);
        assert_eq!(Environment::parse("staging"), Environment::Development);
    }

    #[test]
    #[serial]
    fn test_from_env_defaults_to_development() {
        // SAFETY: serialized with the other env-mutating tests in this module
        unsafe { env::remove_var("ENVIRONMENT") };
        assert_eq!(Environment::from_env(), Environment::Development);
    }

    #[test]
    #[serial]
    fn test_from_env_reads_production() {
        // SAFETY: serialized with the other env-mutating tests in this module
        unsafe { env::set_var("ENVIRONMENT", "production") };
        assert_eq!(Environment::from_env(), Environment::Production);
        unsafe { env::remove_var("ENVIRONMENT") };
    }

    #[test]
    fn test_as_str_round_trips_through_parse() {
        for environment in [Environment::Development, Environment::Production] {
            assert_eq!(Environment::parse(environment.as_str()), environment);
        }
    }
}
