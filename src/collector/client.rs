use std::cell::RefCell;
use std::time::{Duration, Instant};

use base64::Engine;
use serde::de::DeserializeOwned;

use super::models::{ApiArtist, ApiTrack, AudioFeatures, PlaylistTracksPage, TokenResponse};
use super::{FetchError, StreamingApi};
use crate::config::Credentials;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

/// Page size for playlist item listing (API maximum).
const PLAYLIST_PAGE_LIMIT: u32 = 100;

/// Refresh the token this long before it actually expires.
const TOKEN_SLACK: Duration = Duration::from_secs(60);

struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Blocking Web API client using the client-credentials flow.
///
/// Construct once per process and pass it to the collector.
pub struct SpotifyClient {
    agent: ureq::Agent,
    client_id: String,
    client_secret: String,
    token: RefCell<Option<AccessToken>>,
}

fn map_ureq_err(url: &str, e: ureq::Error) -> FetchError {
    match e {
        ureq::Error::StatusCode(status) => FetchError::Status {
            status,
            url: url.to_string(),
        },
        other => FetchError::Transport(format!("{url}: {other}")),
    }
}

impl SpotifyClient {
    pub fn new(credentials: &Credentials) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            client_id: credentials.client_id.clone(),
            client_secret: credentials.client_secret.clone(),
            token: RefCell::new(None),
        }
    }

    fn request_token(&self) -> Result<AccessToken, FetchError> {
        let basic = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.client_id, self.client_secret));

        let resp: TokenResponse = self
            .agent
            .post(TOKEN_URL)
            .header("Authorization", &format!("Basic {basic}"))
            .send_form([("grant_type", "client_credentials")])
            .map_err(|e| match e {
                ureq::Error::StatusCode(status) => {
                    FetchError::Auth(format!("token endpoint returned HTTP {status}"))
                }
                other => FetchError::Transport(other.to_string()),
            })?
            .body_mut()
            .read_json()
            .map_err(|e| FetchError::Decode(format!("token response: {e}")))?;

        log::debug!("Obtained access token (expires in {}s)", resp.expires_in);
        Ok(AccessToken {
            value: resp.access_token,
            expires_at: Instant::now() + Duration::from_secs(resp.expires_in),
        })
    }

    /// Current bearer token, refreshed when close to expiry.
    fn bearer(&self) -> Result<String, FetchError> {
        let mut slot = self.token.borrow_mut();
        let fresh = matches!(
            slot.as_ref(),
            Some(t) if t.expires_at > Instant::now() + TOKEN_SLACK
        );
        if !fresh {
            *slot = Some(self.request_token()?);
        }
        Ok(slot.as_ref().map(|t| t.value.clone()).unwrap_or_default())
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, FetchError> {
        let token = self.bearer()?;
        log::trace!("GET {url}");
        self.agent
            .get(url)
            .header("Authorization", &format!("Bearer {token}"))
            .call()
            .map_err(|e| map_ureq_err(url, e))?
            .body_mut()
            .read_json()
            .map_err(|e| FetchError::Decode(format!("{url}: {e}")))
    }
}

impl StreamingApi for SpotifyClient {
    fn playlist_page(
        &self,
        playlist_id: &str,
        next: Option<&str>,
    ) -> Result<PlaylistTracksPage, FetchError> {
        let url = match next {
            Some(u) => u.to_string(),
            None => format!(
                "{API_BASE}/playlists/{playlist_id}/tracks?limit={PLAYLIST_PAGE_LIMIT}&fields=items(track(id)),next"
            ),
        };
        self.get_json(&url)
    }

    fn track(&self, id: &str) -> Result<ApiTrack, FetchError> {
        self.get_json(&format!("{API_BASE}/tracks/{id}"))
    }

    fn audio_features(&self, id: &str) -> Result<AudioFeatures, FetchError> {
        self.get_json(&format!("{API_BASE}/audio-features/{id}"))
    }

    fn artist(&self, id: &str) -> Result<ApiArtist, FetchError> {
        self.get_json(&format!("{API_BASE}/artists/{id}"))
    }
}
