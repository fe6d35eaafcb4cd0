//! services/api/src/adapters/tts.rs
//!
//! This module contains the adapter for OpenAI's Text-to-Speech (TTS) service.
//! It implements the `Narrator` port from the `core` crate.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::audio::{CreateSpeechRequest, SpeechModel, Voice},
    Client,
};
use async_trait::async_trait;
use bubble_words_core::ports::{Narrator, PortError, PortResult};
use regex::Regex;
use tracing::debug;

//=========================================================================================
// Speech Text Cleanup
//=========================================================================================

/// Strips annotations that should not be read aloud: parenthesised notes in
/// ASCII or full-width brackets and phonetic transcriptions between slashes.
pub struct SpeechCleaner {
    annotations: Regex,
    whitespace: Regex,
}

impl SpeechCleaner {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            annotations: Regex::new(r"\([^)]*\)|（[^）]*）|/[^/]*/")?,
            whitespace: Regex::new(r"\s+")?,
        })
    }

    pub fn clean(&self, text: &str) -> String {
        let stripped = self.annotations.replace_all(text, " ");
        self.whitespace.replace_all(stripped.trim(), " ").into_owned()
    }
}

/// Maps a voice name to an OpenAI voice. Unknown names yield `None`.
pub fn parse_voice(name: &str) -> Option<Voice> {
    match name.trim().to_lowercase().as_str() {
        "alloy" => Some(Voice::Alloy),
        "ash" => Some(Voice::Ash),
        "coral" => Some(Voice::Coral),
        "echo" => Some(Voice::Echo),
        "fable" => Some(Voice::Fable),
        "onyx" => Some(Voice::Onyx),
        "nova" => Some(Voice::Nova),
        "sage" => Some(Voice::Sage),
        "shimmer" => Some(Voice::Shimmer),
        _ => None,
    }
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements the `Narrator` port using the OpenAI TTS API.
pub struct OpenAiTtsAdapter {
    client: Client<OpenAIConfig>,
    model: SpeechModel,
    default_voice: Voice,
    cleaner: SpeechCleaner,
}

impl OpenAiTtsAdapter {
    /// Creates a new `OpenAiTtsAdapter`.
    pub fn new(
        client: Client<OpenAIConfig>,
        model: SpeechModel,
        default_voice: Voice,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            client,
            model,
            default_voice,
            cleaner: SpeechCleaner::new()?,
        })
    }
}

//=========================================================================================
// `Narrator` Trait Implementation
//=========================================================================================

#[async_trait]
impl Narrator for OpenAiTtsAdapter {
    /// Generates a vector of audio data (`Vec<u8>`) from the given text.
    async fn speak(&self, text: &str, voice_id: &str) -> PortResult<Vec<u8>> {
        let input = self.cleaner.clean(text);
        if input.is_empty() {
            return Ok(Vec::new());
        }

        let voice = parse_voice(voice_id).unwrap_or_else(|| {
            debug!(voice_id, "Unknown voice requested, using the default");
            self.default_voice.clone()
        });

        let request = CreateSpeechRequest {
            model: self.model.clone(),
            input,
            voice,
            ..Default::default()
        };

        let response = self
            .client
            .audio()
            .speech()
            .create(request)
            .await
            .map_err(|e: OpenAIError| PortError::Unavailable(e.to_string()))?;

        Ok(response.bytes.to_vec())
    }
}

/// A narrator used when no speech backend is configured. It produces no audio.
pub struct SilentNarrator;

#[async_trait]
impl Narrator for SilentNarrator {
    async fn speak(&self, _text: &str, _voice_id: &str) -> PortResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleaner_drops_bracketed_notes_and_phonetics() {
        let cleaner = SpeechCleaner::new().unwrap();
        assert_eq!(cleaner.clean("apple (n.) /ˈæpəl/"), "apple");
        assert_eq!(cleaner.clean("苹果（水果）"), "苹果");
        assert_eq!(cleaner.clean("  take  off (v.)  away "), "take off away");
    }

    #[test]
    fn cleaner_keeps_plain_text() {
        let cleaner = SpeechCleaner::new().unwrap();
        assert_eq!(cleaner.clean("good morning"), "good morning");
    }

    #[test]
    fn voices_parse_case_insensitively() {
        assert!(matches!(parse_voice("Nova"), Some(Voice::Nova)));
        assert!(parse_voice("robot").is_none());
    }

    #[tokio::test]
    async fn silent_narrator_returns_no_audio() {
        let audio = SilentNarrator.speak("apple", "alloy").await.unwrap();
        assert!(audio.is_empty());
    }
}
