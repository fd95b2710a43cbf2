//! HTTP text-to-speech client

use super::SpeechSynthesizer;
use crate::error::{Error, Result};
use futures::future::BoxFuture;
use pv_common::events::Language;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("pv-vision/", env!("CARGO_PKG_VERSION"));

/// Neural voice used for a language
pub fn voice_for(language: Language) -> &'static str {
    match language {
        Language::En => "en-US-JennyNeural",
        Language::Ur => "ur-PK-UzmaNeural",
    }
}

#[derive(Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    language: &'static str,
    voice: &'static str,
}

/// Posts `{text, language, voice}` to a synthesis endpoint and returns the
/// response body as audio bytes
pub struct HttpSpeechSynthesizer {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpSpeechSynthesizer {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Speech(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn request(&self, text: &str, language: Language) -> Result<Vec<u8>> {
        let body = SynthesisRequest {
            text,
            language: language.code(),
            voice: voice_for(language),
        };
        debug!(voice = body.voice, chars = text.len(), "Requesting speech");

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Speech(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Speech(format!("HTTP {}: {}", status.as_u16(), error_text)));
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| Error::Speech(e.to_string()))?;
        if audio.is_empty() {
            return Err(Error::Speech("empty audio response".to_string()));
        }
        Ok(audio.to_vec())
    }
}

impl SpeechSynthesizer for HttpSpeechSynthesizer {
    fn synthesize<'a>(&'a self, text: &'a str, language: Language) -> BoxFuture<'a, Result<Vec<u8>>> {
        Box::pin(self.request(text, language))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voices_follow_language() {
        assert_eq!(voice_for(Language::En), "en-US-JennyNeural");
        assert_eq!(voice_for(Language::Ur), "ur-PK-UzmaNeural");
    }

    #[test]
    fn request_body_shape() {
        let body = SynthesisRequest {
            text: "Keep your back straight",
            language: Language::Ur.code(),
            voice: voice_for(Language::Ur),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "text": "Keep your back straight",
                "language": "ur",
                "voice": "ur-PK-UzmaNeural",
            })
        );
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_speech_error() {
        let synth =
            HttpSpeechSynthesizer::new("http://127.0.0.1:9/speak", Duration::from_millis(500)).unwrap();
        let err = synth.synthesize("hello", Language::En).await.unwrap_err();
        assert!(matches!(err, Error::Speech(_)));
    }
}
