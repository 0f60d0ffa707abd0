//! Remote catalogue access
//!
//! Catalogue players pull their playlist from an HTTP catalogue
//! service: one request lists the tracks of a profile, another fetches
//! the encoded audio bytes for playback. All requests are blocking and
//! run on worker threads, never on the API runtime.

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};

use crate::audio::decoder::SymphoniaSource;
use crate::audio::source::AudioSource;
use crate::config::CatalogConfig;
use crate::error::{Error, Result};
use crate::player::provider::{PlaylistProvider, TrackInfo, TrackLocation};

/// One track as described by the catalogue service.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogTrack {
    pub id: u64,
    pub title: String,
    #[serde(default)]
    pub artist: Option<String>,
    pub url: String,
}

impl CatalogTrack {
    /// "Artist - Title", or the bare title when the artist is unknown.
    pub fn display_name(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{} - {}", artist, self.title),
            None => self.title.clone(),
        }
    }
}

/// Blocking HTTP client for the catalogue service.
pub struct CatalogClient {
    base_url: String,
    token: Option<String>,
    http: reqwest::blocking::Client,
}

impl CatalogClient {
    pub fn new(config: &CatalogConfig) -> Result<Self> {
        let http = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Catalog(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            http,
        })
    }

    /// List the tracks of a catalogue profile.
    pub fn profile_tracks(&self, profile_id: u64) -> Result<Vec<CatalogTrack>> {
        let url = format!("{}/users/{}/tracks", self.base_url, profile_id);
        debug!("Fetching track list from {}", url);
        let response = self
            .authorized(self.http.get(&url))
            .send()
            .map_err(|e| Error::Catalog(format!("Request to {} failed: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(Error::Catalog(format!(
                "Catalogue returned {} for {}",
                response.status(),
                url
            )));
        }
        response
            .json()
            .map_err(|e| Error::Catalog(format!("Malformed track list from {}: {}", url, e)))
    }

    /// Download the encoded audio bytes behind `url`.
    pub fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        debug!("Fetching audio from {}", url);
        let response = self
            .authorized(self.http.get(url))
            .send()
            .map_err(|e| Error::Catalog(format!("Request to {} failed: {}", url, e)))?;
        if !response.status().is_success() {
            return Err(Error::Catalog(format!(
                "Catalogue returned {} for {}",
                response.status(),
                url
            )));
        }
        let bytes = response
            .bytes()
            .map_err(|e| Error::Catalog(format!("Failed to read body of {}: {}", url, e)))?;
        Ok(bytes.to_vec())
    }

    fn authorized(
        &self,
        request: reqwest::blocking::RequestBuilder,
    ) -> reqwest::blocking::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

/// Playlist built from a catalogue profile.
pub struct CatalogProvider {
    client: Arc<CatalogClient>,
    profile_id: u64,
}

impl CatalogProvider {
    pub fn new(client: Arc<CatalogClient>, profile_id: u64) -> Result<Self> {
        if profile_id == 0 {
            return Err(Error::BadRequest(
                "profile_id must be greater than zero".to_string(),
            ));
        }
        Ok(Self { client, profile_id })
    }
}

impl PlaylistProvider for CatalogProvider {
    fn tracks(&self) -> Result<Vec<TrackInfo>> {
        let tracks = self.client.profile_tracks(self.profile_id)?;
        info!(
            "Catalogue profile {} has {} tracks",
            self.profile_id,
            tracks.len()
        );
        Ok(tracks
            .into_iter()
            .map(|t| TrackInfo {
                name: t.display_name(),
                location: TrackLocation::Remote(t.url),
            })
            .collect())
    }

    fn open(&self, track: &TrackInfo) -> Result<Box<dyn AudioSource>> {
        match &track.location {
            TrackLocation::Remote(url) => {
                let bytes = self.client.fetch(url)?;
                let source = SymphoniaSource::from_bytes(bytes, extension_hint(url))?;
                Ok(Box::new(source))
            }
            TrackLocation::File(_) => Err(Error::BadRequest(
                "Catalogue players cannot open local tracks".to_string(),
            )),
        }
    }
}

/// Extension hint from the URL path, ignoring query and fragment.
fn extension_hint(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let (_, ext) = path.rsplit_once('.')?;
    if !ext.is_empty() && ext.len() <= 4 && ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        Some(ext)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> Arc<CatalogClient> {
        Arc::new(
            CatalogClient::new(&CatalogConfig {
                base_url: "https://catalog.example.com/api/".to_string(),
                token: Some("secret".to_string()),
            })
            .unwrap(),
        )
    }

    #[test]
    fn test_track_list_json_shape() {
        let json = r#"[
            {"id": 1, "title": "Song A", "artist": "Band", "url": "https://cdn.example.com/1.mp3"},
            {"id": 2, "title": "Song B", "url": "https://cdn.example.com/2.ogg"}
        ]"#;
        let tracks: Vec<CatalogTrack> = serde_json::from_str(json).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[0].display_name(), "Band - Song A");
        assert_eq!(tracks[1].display_name(), "Song B");
    }

    #[test]
    fn test_base_url_trailing_slash_is_trimmed() {
        let client = client();
        assert_eq!(client.base_url, "https://catalog.example.com/api");
    }

    #[test]
    fn test_zero_profile_is_rejected() {
        assert!(matches!(
            CatalogProvider::new(client(), 0),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn test_extension_hint_handles_urls() {
        assert_eq!(
            extension_hint("https://cdn.example.com/track.mp3"),
            Some("mp3")
        );
        assert_eq!(
            extension_hint("https://cdn.example.com/track.ogg?token=abc.def"),
            Some("ogg")
        );
        assert_eq!(
            extension_hint("https://cdn.example.com/track.flac#t=10"),
            Some("flac")
        );
        assert_eq!(extension_hint("https://cdn.example.com/track"), None);
    }
}
