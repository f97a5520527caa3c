use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Default host for the ElevenLabs API
pub const ELEVENLABS_API_HOST: &str = "https://api.elevenlabs.io";

const DEFAULT_TTS_MODEL: &str = "eleven_multilingual_v2";

/// A voice available for speech synthesis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// A conversational agent configured on the voice platform
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceAgent {
    pub agent_id: String,
    pub name: String,
}

/// One past conversation held with a voice agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub call_duration_secs: Option<u32>,
}

/// HTTP client for the ElevenLabs voice API.
///
/// Unlike tool calls inside the agent loop, voice failures are hard errors:
/// a non-success status aborts the operation without retry.
pub struct VoiceClient {
    client: Client,
    host: String,
    api_key: String,
}

impl VoiceClient {
    pub fn new<S: Into<String>>(api_key: S) -> Self {
        Self::with_host(ELEVENLABS_API_HOST, api_key)
    }

    pub fn with_host<H: Into<String>, S: Into<String>>(host: H, api_key: S) -> Self {
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(60))
                .build()
                .unwrap_or_default(),
            host: host.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.host.trim_end_matches('/'), path)
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Voice API error: {} - {}", status, body));
        }
        Ok(response)
    }

    /// List the voices available to the account
    pub async fn voices(&self) -> Result<Vec<Voice>> {
        let response = self
            .client
            .get(self.url("/v1/voices"))
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;
        let body: Value = self.check(response).await?.json().await?;
        let voices = body
            .get("voices")
            .cloned()
            .ok_or_else(|| anyhow!("No voices in response"))?;
        Ok(serde_json::from_value(voices)?)
    }

    /// Synthesize speech for the given text and return it as a
    /// `data:audio/mpeg;base64` URI, ready to feed into an audio element.
    pub async fn synthesize(
        &self,
        text: &str,
        voice_id: &str,
        model_id: Option<&str>,
    ) -> Result<String> {
        let response = self
            .client
            .post(self.url(&format!("/v1/text-to-speech/{}", voice_id)))
            .header("xi-api-key", &self.api_key)
            .json(&json!({
                "text": text,
                "model_id": model_id.unwrap_or(DEFAULT_TTS_MODEL),
                "voice_settings": {
                    "stability": 0.5,
                    "similarity_boost": 0.75
                }
            }))
            .send()
            .await?;
        let audio = self.check(response).await?.bytes().await?;
        Ok(format!("data:audio/mpeg;base64,{}", BASE64.encode(&audio)))
    }

    /// List the account's conversational agents
    pub async fn agents(&self) -> Result<Vec<VoiceAgent>> {
        let response = self
            .client
            .get(self.url("/v1/convai/agents"))
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;
        let body: Value = self.check(response).await?.json().await?;
        let agents = body
            .get("agents")
            .cloned()
            .ok_or_else(|| anyhow!("No agents in response"))?;
        Ok(serde_json::from_value(agents)?)
    }

    /// Create a conversational agent speaking with the given voice
    pub async fn create_agent(
        &self,
        name: &str,
        voice_id: &str,
        first_message: &str,
        system_prompt: &str,
    ) -> Result<VoiceAgent> {
        let response = self
            .client
            .post(self.url("/v1/convai/agents/create"))
            .header("xi-api-key", &self.api_key)
            .json(&json!({
                "name": name,
                "conversation_config": {
                    "agent": {
                        "first_message": first_message,
                        "language": "en",
                        "prompt": {"prompt": system_prompt}
                    },
                    "tts": {"voice_id": voice_id},
                    "turn": {"turn_timeout": 7, "mode": "server_vad"}
                }
            }))
            .send()
            .await?;
        let body: Value = self.check(response).await?.json().await?;
        let agent_id = body
            .get("agent_id")
            .and_then(|id| id.as_str())
            .ok_or_else(|| anyhow!("No agent_id in response"))?;
        Ok(VoiceAgent {
            agent_id: agent_id.to_string(),
            name: name.to_string(),
        })
    }

    /// Delete a conversational agent
    pub async fn delete_agent(&self, agent_id: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/v1/convai/agents/{}", agent_id)))
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;
        self.check(response).await?;
        Ok(())
    }

    /// List past conversations held with one agent
    pub async fn conversations(&self, agent_id: &str) -> Result<Vec<Conversation>> {
        let response = self
            .client
            .get(self.url("/v1/convai/conversations"))
            .query(&[("agent_id", agent_id)])
            .header("xi-api-key", &self.api_key)
            .send()
            .await?;
        let body: Value = self.check(response).await?.json().await?;
        let conversations = body
            .get("conversations")
            .cloned()
            .ok_or_else(|| anyhow!("No conversations in response"))?;
        Ok(serde_json::from_value(conversations)?)
    }
}
