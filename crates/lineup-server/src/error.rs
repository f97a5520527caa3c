use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {env_var}")]
    MissingEnvVar { env_var: String },

    #[error(transparent)]
    Other(#[from] config::ConfigError),
}

/// Convert a dotted settings path like "provider.api_key" into the
/// environment variable that supplies it, e.g. "LINEUP_PROVIDER__API_KEY".
pub fn to_env_var(field: &str) -> String {
    format!("LINEUP_{}", field.replace('.', "__").to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_env_var() {
        assert_eq!(to_env_var("provider.api_key"), "LINEUP_PROVIDER__API_KEY");
        assert_eq!(to_env_var("clerk.secret_key"), "LINEUP_CLERK__SECRET_KEY");
        assert_eq!(to_env_var("type"), "LINEUP_TYPE");
    }
}
