use crate::error::{to_env_var, ConfigError};
use config::{Config, Environment};
use lineup::auth;
use lineup::providers::configs::{OpenAiProviderConfig, ProviderConfig};
use lineup::voice;
use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Default, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ServerSettings {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| {
                ConfigError::Other(config::ConfigError::Message(format!(
                    "Invalid server address: {}",
                    e
                )))
            })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum ProviderSettings {
    OpenAi {
        #[serde(default = "default_openai_host")]
        host: String,
        api_key: String,
        #[serde(default = "default_model")]
        model: String,
        #[serde(default)]
        temperature: Option<f32>,
        #[serde(default)]
        max_tokens: Option<i32>,
    },
}

impl ProviderSettings {
    // Convert to the lineup ProviderConfig
    pub fn into_config(self) -> ProviderConfig {
        match self {
            ProviderSettings::OpenAi {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            } => ProviderConfig::OpenAi(OpenAiProviderConfig {
                host,
                api_key,
                model,
                temperature,
                max_tokens,
            }),
        }
    }
}

/// Credentials for the identity provider that holds users' OAuth tokens
#[derive(Debug, Clone, Deserialize)]
pub struct ClerkSettings {
    pub secret_key: String,
    #[serde(default = "default_clerk_host")]
    pub host: String,
}

/// Credentials for the speech synthesis provider
#[derive(Debug, Clone, Deserialize)]
pub struct VoiceSettings {
    pub api_key: String,
    #[serde(default = "default_voice_host")]
    pub host: String,
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    pub provider: ProviderSettings,
    pub clerk: ClerkSettings,
    pub voice: VoiceSettings,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::load_and_validate()
    }

    fn load_and_validate() -> Result<Self, ConfigError> {
        let config = Config::builder()
            // Server defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port())?
            // Provider defaults
            .set_default("provider.host", default_openai_host())?
            .set_default("provider.model", default_model())?
            // Upstream host defaults
            .set_default("clerk.host", default_clerk_host())?
            .set_default("voice.host", default_voice_host())?
            // Layer on the environment variables
            .add_source(
                Environment::with_prefix("LINEUP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let result: Result<Self, config::ConfigError> = config.try_deserialize();

        // Report missing fields as the environment variable that supplies them
        match result {
            Ok(settings) => Ok(settings),
            Err(err) => {
                tracing::debug!("Configuration error: {:?}", &err);

                let error_str = err.to_string();
                if error_str.starts_with("missing field") {
                    let field = error_str
                        .trim_start_matches("missing field `")
                        .trim_end_matches('`');
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else if let config::ConfigError::NotFound(field) = &err {
                    Err(ConfigError::MissingEnvVar {
                        env_var: to_env_var(field),
                    })
                } else {
                    Err(ConfigError::Other(err))
                }
            }
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_openai_host() -> String {
    "https://api.openai.com".to_string()
}

fn default_clerk_host() -> String {
    auth::CLERK_API_HOST.to_string()
}

fn default_voice_host() -> String {
    voice::ELEVENLABS_API_HOST.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    fn clean_env() {
        for (key, _) in env::vars() {
            if key.starts_with("LINEUP_") {
                env::remove_var(&key);
            }
        }
    }

    fn set_required() {
        env::set_var("LINEUP_PROVIDER__TYPE", "openai");
        env::set_var("LINEUP_PROVIDER__API_KEY", "test-key");
        env::set_var("LINEUP_CLERK__SECRET_KEY", "sk_test");
        env::set_var("LINEUP_VOICE__API_KEY", "xi_test");
    }

    #[test]
    #[serial]
    fn test_default_settings() {
        clean_env();
        set_required();

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.host, "127.0.0.1");
        assert_eq!(settings.server.port, 3000);
        assert_eq!(settings.clerk.host, "https://api.clerk.com");
        assert_eq!(settings.voice.host, "https://api.elevenlabs.io");

        let ProviderSettings::OpenAi {
            host,
            api_key,
            model,
            temperature,
            max_tokens,
        } = settings.provider;
        assert_eq!(host, "https://api.openai.com");
        assert_eq!(api_key, "test-key");
        assert_eq!(model, "gpt-4o");
        assert_eq!(temperature, None);
        assert_eq!(max_tokens, None);

        clean_env();
    }

    #[test]
    #[serial]
    fn test_environment_override() {
        clean_env();
        set_required();
        env::set_var("LINEUP_SERVER__PORT", "8080");
        env::set_var("LINEUP_PROVIDER__MODEL", "gpt-4o-mini");
        env::set_var("LINEUP_PROVIDER__TEMPERATURE", "0.8");

        let settings = Settings::new().unwrap();
        assert_eq!(settings.server.port, 8080);

        let ProviderSettings::OpenAi {
            model, temperature, ..
        } = settings.provider;
        assert_eq!(model, "gpt-4o-mini");
        assert_eq!(temperature, Some(0.8));

        clean_env();
    }

    #[test]
    #[serial]
    fn test_missing_clerk_key_reports_env_var() {
        clean_env();
        env::set_var("LINEUP_PROVIDER__TYPE", "openai");
        env::set_var("LINEUP_PROVIDER__API_KEY", "test-key");
        env::set_var("LINEUP_VOICE__API_KEY", "xi_test");

        let err = Settings::new().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingEnvVar { env_var } if env_var.contains("SECRET_KEY")
        ));

        clean_env();
    }

    #[test]
    fn test_socket_addr_conversion() {
        let server_settings = ServerSettings {
            host: "127.0.0.1".to_string(),
            port: 3000,
        };
        let addr = server_settings.socket_addr().unwrap();
        assert_eq!(addr.to_string(), "127.0.0.1:3000");
    }
}
