//! OAuth client-credentials token acquisition.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::Provider;
use crate::request::{ApiRequest, RequestBody};
use crate::transport::HttpTransport;
use crate::utils::DotPath;
use crate::{Error, Result};

/// Where the client credentials travel on the token request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OauthClientAuth {
    /// `Authorization: Basic base64(client_id:client_secret)`
    BasicHeader,
    /// `client_id`/`client_secret` fields in the form body.
    FormBody,
}

impl Default for OauthClientAuth {
    fn default() -> Self {
        OauthClientAuth::BasicHeader
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OauthConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub client_auth: OauthClientAuth,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// Seconds before nominal expiry at which a token stops being reused.
    #[serde(default = "default_skew")]
    pub expiry_skew_secs: i64,
}

fn default_skew() -> i64 {
    60
}

impl OauthConfig {
    pub fn expiry_skew(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.expiry_skew_secs)
    }
}

/// Access token scoped to one Provider, with absolute expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OauthAccessToken {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl OauthAccessToken {
    pub fn is_valid(&self, skew: ChronoDuration) -> bool {
        Utc::now() + skew < self.expires_at
    }
}

/// Build and send the token request, parse `access_token` + `expires_in`.
///
/// A non-2xx token response aborts with an authentication error carrying the
/// echoed request and raw response; it is never retried here.
pub(crate) async fn acquire_token(
    transport: &HttpTransport,
    provider: &Provider,
    config: &OauthConfig,
) -> Result<OauthAccessToken> {
    let mut form: Vec<(String, String)> = vec![(
        "grant_type".to_string(),
        "client_credentials".to_string(),
    )];
    if let Some(ref scope) = config.scope {
        form.push(("scope".to_string(), scope.clone()));
    }

    let mut request = ApiRequest::new("POST", &config.token_url);
    match config.client_auth {
        OauthClientAuth::BasicHeader => {
            let basic = super::ResolvedAuth::Basic {
                username: config.client_id.clone(),
                password: config.client_secret.clone(),
            };
            if let Some(value) = basic.header_value() {
                request.headers.insert("authorization".to_string(), value);
            }
        }
        OauthClientAuth::FormBody => {
            form.push(("client_id".to_string(), config.client_id.clone()));
            form.push(("client_secret".to_string(), config.client_secret.clone()));
        }
    }
    request.body = RequestBody::Form(form);

    let request_echo = request.echo();
    let response = transport.execute(request).await?;

    if !response.is_success() {
        return Err(Error::Authentication {
            message: format!(
                "token endpoint for provider '{}' returned HTTP {}",
                provider.name, response.status
            ),
            request_echo: Some(request_echo),
            response_echo: Some(response.echo()),
        });
    }

    let body: serde_json::Value =
        serde_json::from_slice(&response.body).map_err(|e| Error::Authentication {
            message: format!(
                "token response for provider '{}' is not valid JSON: {}",
                provider.name, e
            ),
            request_echo: Some(request_echo.clone()),
            response_echo: Some(response.echo()),
        })?;

    let access_token = DotPath::get_string(&body, "access_token")
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::Authentication {
            message: format!(
                "token response for provider '{}' has no access_token",
                provider.name
            ),
            request_echo: Some(request_echo),
            response_echo: Some(response.echo()),
        })?;
    let expires_in = DotPath::get(&body, "expires_in")
        .and_then(|v| v.as_i64())
        .unwrap_or(3600);

    info!(
        provider = provider.name.as_str(),
        expires_in, "acquired oauth access token"
    );

    Ok(OauthAccessToken {
        access_token,
        expires_at: Utc::now() + ChronoDuration::seconds(expires_in),
    })
}
