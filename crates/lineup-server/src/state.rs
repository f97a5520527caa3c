use crate::configuration::{ClerkSettings, VoiceSettings};
use lineup::auth::TokenResolver;
use lineup::providers::configs::ProviderConfig;
use lineup::voice::VoiceClient;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub provider_config: ProviderConfig,
    pub clerk: ClerkSettings,
    pub voice: VoiceSettings,
}

impl AppState {
    /// Build a token resolver for the configured identity provider
    pub fn token_resolver(&self) -> TokenResolver {
        TokenResolver::with_host(self.clerk.host.clone(), self.clerk.secret_key.clone())
    }

    /// Build a voice client for the configured speech provider
    pub fn voice_client(&self) -> VoiceClient {
        VoiceClient::with_host(self.voice.host.clone(), self.voice.api_key.clone())
    }
}
