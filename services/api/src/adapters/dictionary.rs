//! services/api/src/adapters/dictionary.rs
//!
//! Phonetic lookups against a free dictionary HTTP API.

use async_trait::async_trait;
use bubble_words_core::ports::{PhoneticLookup, PortError, PortResult};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct EntryResponse {
    #[serde(default)]
    phonetics: Vec<PhoneticResponse>,
}

#[derive(Debug, Deserialize)]
struct PhoneticResponse {
    text: Option<String>,
}

/// Picks the first non-empty phonetic text of the first entry.
fn first_phonetic(entries: Vec<EntryResponse>) -> Option<String> {
    entries
        .into_iter()
        .next()?
        .phonetics
        .into_iter()
        .filter_map(|p| p.text)
        .map(|text| text.trim().to_string())
        .find(|text| !text.is_empty())
}

/// An adapter that implements `PhoneticLookup` with `reqwest`.
#[derive(Clone)]
pub struct DictionaryAdapter {
    client: Client,
    base_url: Url,
}

impl DictionaryAdapter {
    pub fn new(client: Client, base_url: &str) -> PortResult<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| PortError::Unexpected(format!("invalid dictionary URL: {}", e)))?;
        if base_url.cannot_be_a_base() {
            return Err(PortError::Unexpected(format!(
                "dictionary URL {} cannot take a path",
                base_url
            )));
        }
        Ok(Self { client, base_url })
    }

    /// The entry URL for `word`, which always stays a single path segment.
    fn entry_url(&self, word: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_query(None);
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(word);
        }
        url
    }
}

#[async_trait]
impl PhoneticLookup for DictionaryAdapter {
    async fn lookup_phonetic(&self, english: &str) -> PortResult<Option<String>> {
        let word = english.trim();
        if word.is_empty() {
            return Ok(None);
        }

        let response = self
            .client
            .get(self.entry_url(word))
            .send()
            .await
            .map_err(|e| PortError::Unavailable(e.to_string()))?;

        // The dictionary answers unknown words with a 404 body.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let entries: Vec<EntryResponse> = response
            .error_for_status()
            .map_err(|e| PortError::Unavailable(e.to_string()))?
            .json()
            .await
            .map_err(|e| PortError::Unexpected(e.to_string()))?;

        Ok(first_phonetic(entries))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skips_empty_phonetics() {
        let body = r#"[
            {"word": "apple", "phonetics": [{"audio": "x.mp3"}, {"text": ""}, {"text": "/ˈæp.əl/"}]},
            {"word": "apple", "phonetics": [{"text": "/ignored/"}]}
        ]"#;
        let entries: Vec<EntryResponse> = serde_json::from_str(body).unwrap();
        assert_eq!(first_phonetic(entries), Some("/ˈæp.əl/".to_string()));
    }

    fn adapter() -> DictionaryAdapter {
        DictionaryAdapter::new(Client::new(), "https://api.dictionaryapi.dev/api/v2/entries/en/")
            .unwrap()
    }

    #[test]
    fn words_are_encoded_into_one_path_segment() {
        let url = adapter().entry_url("ice cream?x=1");
        assert_eq!(url.path(), "/api/v2/entries/en/ice%20cream%3Fx=1");
        assert_eq!(url.query(), None);

        let url = adapter().entry_url("../../admin");
        assert_eq!(url.path(), "/api/v2/entries/en/..%2F..%2Fadmin");
    }

    #[test]
    fn base_urls_without_a_path_are_rejected() {
        assert!(DictionaryAdapter::new(Client::new(), "mailto:someone@example.com").is_err());
        assert!(DictionaryAdapter::new(Client::new(), "not a url").is_err());
    }

    #[test]
    fn entries_without_phonetics_yield_nothing() {
        let entries: Vec<EntryResponse> = serde_json::from_str(r#"[{"word": "x"}]"#).unwrap();
        assert_eq!(first_phonetic(entries), None);
        assert_eq!(first_phonetic(Vec::new()), None);
    }
}
