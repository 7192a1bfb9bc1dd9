/// Social identity verification
///
/// Turns a client-held provider credential into a verified `SocialProfile`:
/// - Google: ID token checked through the `tokeninfo` endpoint (signature,
///   audience, issuer, expiry)
/// - Facebook: user access token checked with `debug_token` against our
///   app, then the profile is read from the Graph API
///
/// All provider calls go over HTTPS with a bounded timeout.
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::OAuthSettings;
use crate::error::{IdentityError, Result};
use crate::models::{SocialProfile, SocialProvider};

const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const GOOGLE_ISSUERS: [&str; 2] = ["accounts.google.com", "https://accounts.google.com"];
const FACEBOOK_GRAPH_URL: &str = "https://graph.facebook.com";
const PROVIDER_TIMEOUT_SECS: u64 = 10;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SocialVerifier: Send + Sync {
    /// Verify `token` with `provider` and return the asserted identity
    async fn verify(&self, provider: SocialProvider, token: &str) -> Result<SocialProfile>;
}

/// Verifier backed by the providers' public HTTP endpoints
#[derive(Clone)]
pub struct HttpSocialVerifier {
    http: Client,
    settings: OAuthSettings,
}

impl HttpSocialVerifier {
    pub fn new(settings: OAuthSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(PROVIDER_TIMEOUT_SECS))
            .build()?;

        Ok(Self { http, settings })
    }

    async fn verify_google(&self, id_token: &str) -> Result<SocialProfile> {
        if !self.settings.google_configured() {
            return Err(IdentityError::Internal(
                "Google sign-in is not configured".to_string(),
            ));
        }

        let response = self
            .http
            .get(GOOGLE_TOKENINFO_URL)
            .query(&[("id_token", id_token)])
            .send()
            .await?;

        if !response.status().is_success() {
            debug!(status = %response.status(), "Google rejected ID token");
            return Err(IdentityError::ProviderVerification(
                "invalid google token".to_string(),
            ));
        }

        let info = response.json::<GoogleTokenInfo>().await.map_err(|e| {
            IdentityError::ProviderVerification(format!("malformed google response: {}", e))
        })?;

        google_profile(info, &self.settings.google_client_id, Utc::now().timestamp())
    }

    async fn verify_facebook(&self, access_token: &str) -> Result<SocialProfile> {
        if !self.settings.facebook_configured() {
            return Err(IdentityError::Internal(
                "Facebook sign-in is not configured".to_string(),
            ));
        }

        let app_token = format!(
            "{}|{}",
            self.settings.facebook_app_id, self.settings.facebook_app_secret
        );
        let debug = self
            .http
            .get(format!("{}/debug_token", FACEBOOK_GRAPH_URL))
            .query(&[("input_token", access_token), ("access_token", app_token.as_str())])
            .send()
            .await?
            .json::<FacebookDebugResponse>()
            .await
            .map_err(|e| {
                IdentityError::ProviderVerification(format!("malformed facebook response: {}", e))
            })?;

        let token_user_id = check_facebook_token(debug, &self.settings.facebook_app_id)?;

        let me = self
            .http
            .get(format!("{}/me", FACEBOOK_GRAPH_URL))
            .query(&[
                ("fields", "id,name,email,picture"),
                ("access_token", access_token),
            ])
            .send()
            .await?
            .json::<FacebookProfile>()
            .await
            .map_err(|e| {
                IdentityError::ProviderVerification(format!("malformed facebook profile: {}", e))
            })?;

        facebook_profile(me, token_user_id.as_deref())
    }
}

#[async_trait]
impl SocialVerifier for HttpSocialVerifier {
    async fn verify(&self, provider: SocialProvider, token: &str) -> Result<SocialProfile> {
        let result = match provider {
            SocialProvider::Google => self.verify_google(token).await,
            SocialProvider::Facebook => self.verify_facebook(token).await,
        };

        if let Err(e) = &result {
            warn!(provider = provider.as_str(), error = %e, "Social token verification failed");
        }
        result
    }
}

/// Subset of Google's `tokeninfo` response. Numeric claims arrive as strings.
#[derive(Debug, Deserialize)]
struct GoogleTokenInfo {
    sub: String,
    aud: String,
    iss: String,
    exp: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

fn google_profile(info: GoogleTokenInfo, client_id: &str, now: i64) -> Result<SocialProfile> {
    if info.aud != client_id {
        return Err(IdentityError::ProviderVerification(
            "google token audience mismatch".to_string(),
        ));
    }
    if !GOOGLE_ISSUERS.contains(&info.iss.as_str()) {
        return Err(IdentityError::ProviderVerification(
            "google token issuer mismatch".to_string(),
        ));
    }
    let exp: i64 = info.exp.parse().map_err(|_| {
        IdentityError::ProviderVerification("google token has no valid exp".to_string())
    })?;
    if exp <= now {
        return Err(IdentityError::ProviderVerification(
            "google token expired".to_string(),
        ));
    }
    if info.sub.is_empty() {
        return Err(IdentityError::ProviderVerification(
            "google token has no subject".to_string(),
        ));
    }

    Ok(SocialProfile {
        provider: SocialProvider::Google,
        provider_user_id: info.sub,
        email: info.email,
        display_name: info.name,
        avatar_url: info.picture,
    })
}

#[derive(Debug, Deserialize)]
struct FacebookDebugResponse {
    data: FacebookDebugData,
}

#[derive(Debug, Deserialize)]
struct FacebookDebugData {
    #[serde(default)]
    is_valid: bool,
    app_id: Option<String>,
    user_id: Option<String>,
}

/// Token must be valid and issued for our app. Returns the token's user id.
fn check_facebook_token(debug: FacebookDebugResponse, app_id: &str) -> Result<Option<String>> {
    let data = debug.data;
    if !data.is_valid {
        return Err(IdentityError::ProviderVerification(
            "invalid facebook token".to_string(),
        ));
    }
    if data.app_id.as_deref() != Some(app_id) {
        return Err(IdentityError::ProviderVerification(
            "facebook token issued for another app".to_string(),
        ));
    }
    Ok(data.user_id)
}

#[derive(Debug, Deserialize)]
struct FacebookProfile {
    id: String,
    name: Option<String>,
    email: Option<String>,
    picture: Option<FacebookPicture>,
}

#[derive(Debug, Deserialize)]
struct FacebookPicture {
    data: Option<FacebookPictureData>,
}

#[derive(Debug, Deserialize)]
struct FacebookPictureData {
    url: Option<String>,
}

fn facebook_profile(me: FacebookProfile, token_user_id: Option<&str>) -> Result<SocialProfile> {
    if let Some(expected) = token_user_id {
        if expected != me.id {
            return Err(IdentityError::ProviderVerification(
                "facebook profile does not match token".to_string(),
            ));
        }
    }

    Ok(SocialProfile {
        provider: SocialProvider::Facebook,
        provider_user_id: me.id,
        email: me.email,
        display_name: me.name,
        avatar_url: me.picture.and_then(|p| p.data).and_then(|d| d.url),
    })
}
