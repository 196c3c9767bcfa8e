use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_TOKEN_URL: &str = "https://llmfoundry.straive.com/token";
pub const DEFAULT_LOGIN_URL: &str = "https://llmfoundry.straive.com/login";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("token request failed: {source}")]
    Request {
        #[source]
        source: reqwest::Error,
    },

    #[error("token endpoint returned HTTP {status}")]
    Status { status: u16 },

    #[error("token endpoint returned an unreadable body: {source}")]
    Body {
        #[source]
        source: reqwest::Error,
    },
}

#[derive(Debug, Default, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
}

/// Where the bearer token came from, for the run summary.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TokenOrigin {
    Explicit,
    Endpoint,
    Missing,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedToken {
    pub token: Option<String>,
    pub origin: TokenOrigin,
}

/// Asks the token endpoint for a session token, sending `cookie` as the
/// session credential. A body without a token (logged out) is `Ok(None)`.
pub async fn fetch_token(
    client: &reqwest::Client,
    token_url: &str,
    cookie: Option<&str>,
) -> Result<Option<String>, AuthError> {
    let mut request = client.get(token_url);
    if let Some(cookie) = cookie.map(str::trim).filter(|c| !c.is_empty()) {
        request = request.header(reqwest::header::COOKIE, cookie);
    }
    let response = request
        .send()
        .await
        .map_err(|source| AuthError::Request { source })?;
    let status = response.status();
    if !status.is_success() {
        return Err(AuthError::Status {
            status: status.as_u16(),
        });
    }
    let body: TokenResponse = response
        .json()
        .await
        .map_err(|source| AuthError::Body { source })?;
    Ok(body.token.filter(|t| !t.trim().is_empty()))
}

/// Picks an explicitly configured token, otherwise asks the token endpoint.
/// Endpoint failures are logged and treated as "no token"; they never abort.
pub async fn resolve_token(
    client: &reqwest::Client,
    explicit: Option<&str>,
    token_url: &str,
    cookie: Option<&str>,
) -> ResolvedToken {
    if let Some(token) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return ResolvedToken {
            token: Some(token.to_string()),
            origin: TokenOrigin::Explicit,
        };
    }
    match fetch_token(client, token_url, cookie).await {
        Ok(Some(token)) => ResolvedToken {
            token: Some(token),
            origin: TokenOrigin::Endpoint,
        },
        Ok(None) => ResolvedToken {
            token: None,
            origin: TokenOrigin::Missing,
        },
        Err(e) => {
            tracing::warn!(error = %e, url = token_url, "could not obtain a session token");
            ResolvedToken {
                token: None,
                origin: TokenOrigin::Missing,
            }
        }
    }
}

/// Login link that returns to `next` afterwards.
pub fn login_url(login_base: &str, next: &str) -> String {
    match reqwest::Url::parse(login_base) {
        Ok(mut url) => {
            url.query_pairs_mut().append_pair("next", next);
            url.to_string()
        }
        Err(_) => login_base.to_string(),
    }
}
