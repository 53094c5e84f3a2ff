use super::token::{Credential, OAuthClient, TokenResponse, GOOGLE_TOKEN_URI};
use crate::config::Config;
use crate::error::{auth_error, config_error, AppResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use url::Url;

/// Google's OAuth authorization endpoint
pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

/// OAuth client id and secret from the Cloud Console download
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApplicationSecret {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Deserialize)]
struct SecretFile {
    installed: Option<ApplicationSecret>,
    web: Option<ApplicationSecret>,
}

impl ApplicationSecret {
    /// Parse a client secrets document with an `installed` or `web` section
    pub fn from_json(contents: &str) -> AppResult<Self> {
        let file: SecretFile = serde_json::from_str(contents)?;
        file.installed
            .or(file.web)
            .ok_or_else(|| config_error("Client secrets file has no 'installed' or 'web' section"))
    }

    /// Read the client secrets file
    pub async fn read(path: &Path) -> AppResult<Self> {
        let contents = tokio::fs::read_to_string(path).await.map_err(|e| {
            config_error(&format!(
                "Failed to read client secrets file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&contents)
    }
}

/// What arrived on the redirect listener
#[derive(Debug, PartialEq, Eq)]
pub enum Callback {
    /// Authorization code to exchange
    Code(String),
    /// The user or Google refused the request
    Denied(String),
    /// Unrelated request such as a favicon fetch
    Ignored,
}

/// Interpret a request path received by the redirect listener
pub fn parse_callback(request_url: &str, expected_state: &str) -> AppResult<Callback> {
    let url = Url::parse("http://localhost")
        .and_then(|base| base.join(request_url))
        .map_err(|e| auth_error(&format!("Malformed callback URL: {}", e)))?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if code.is_none() && error.is_none() {
        return Ok(Callback::Ignored);
    }
    if state.as_deref() != Some(expected_state) {
        return Err(auth_error("State mismatch in authorization callback"));
    }

    Ok(match (code, error) {
        (_, Some(error)) => Callback::Denied(error),
        (Some(code), None) => Callback::Code(code),
        (None, None) => Callback::Ignored,
    })
}

/// Build the consent URL the user is sent to
pub fn authorization_url(
    secret: &ApplicationSecret,
    redirect_uri: &str,
    scopes: &[String],
    state: &str,
) -> AppResult<Url> {
    let scope = scopes.join(" ");
    Url::parse_with_params(
        &secret.auth_uri,
        &[
            ("client_id", secret.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("access_type", "offline"),
            ("prompt", "consent"),
            ("scope", scope.as_str()),
            ("state", state),
        ],
    )
    .map_err(|e| config_error(&format!("Invalid authorization URI: {}", e)))
}

/// Block until the redirect listener receives the authorization code
fn wait_for_code(server: tiny_http::Server, state: &str) -> AppResult<String> {
    loop {
        let request = server
            .recv()
            .map_err(|e| auth_error(&format!("Redirect listener failed: {}", e)))?;

        let callback = parse_callback(request.url(), state);
        let (status, body) = match &callback {
            Ok(Callback::Code(_)) => (
                200u16,
                "The authentication flow has completed. You may close this window.",
            ),
            Ok(Callback::Denied(_)) | Err(_) => {
                (400, "Authorization failed. You may close this window.")
            }
            Ok(Callback::Ignored) => (404, "Not found"),
        };
        let response = tiny_http::Response::from_string(body).with_status_code(status);
        if let Err(e) = request.respond(response) {
            warn!("Failed to answer authorization callback: {}", e);
        }

        match callback? {
            Callback::Code(code) => return Ok(code),
            Callback::Denied(reason) => {
                return Err(auth_error(&format!("Authorization denied: {}", reason)))
            }
            Callback::Ignored => continue,
        }
    }
}

/// OAuth client for Google's installed-application flow
#[derive(Clone)]
pub struct GoogleOAuthClient {
    config: Arc<RwLock<Config>>,
    client: Client,
}

impl GoogleOAuthClient {
    pub fn new(config: Arc<RwLock<Config>>) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    async fn request_token(
        &self,
        token_uri: &str,
        params: &[(&str, &str)],
    ) -> AppResult<TokenResponse> {
        let response = self
            .client
            .post(token_uri)
            .form(params)
            .send()
            .await
            .map_err(|e| auth_error(&format!("Token request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Could not read error response".to_string());
            return Err(auth_error(&format!(
                "Token request failed: HTTP {} - {}",
                status, error_body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| auth_error(&format!("Failed to parse token response: {}", e)))
    }
}

#[async_trait]
impl OAuthClient for GoogleOAuthClient {
    async fn refresh(&self, credential: &Credential) -> AppResult<Credential> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or_else(|| auth_error("No refresh token in token data"))?;

        let response = self
            .request_token(
                &credential.token_uri,
                &[
                    ("client_id", credential.client_id.as_str()),
                    ("client_secret", credential.client_secret.as_str()),
                    ("refresh_token", refresh_token),
                    ("grant_type", "refresh_token"),
                ],
            )
            .await?;

        Ok(Credential::from_response(
            response,
            &credential.client_id,
            &credential.client_secret,
            &credential.token_uri,
            Some(credential),
            &credential.scopes,
        ))
    }

    async fn authorize(&self, scopes: &[String]) -> AppResult<Credential> {
        let (credentials_path, port, open_browser) = {
            let config = self.config.read().await;
            (
                config.credentials_path.clone(),
                config.redirect_port,
                config.open_browser,
            )
        };
        let secret = ApplicationSecret::read(&credentials_path).await?;

        // Start local server to receive the callback
        let server = tiny_http::Server::http(("127.0.0.1", port))
            .map_err(|e| auth_error(&format!("Failed to start redirect listener: {}", e)))?;
        let port = server
            .server_addr()
            .to_ip()
            .map(|addr| addr.port())
            .ok_or_else(|| auth_error("Redirect listener is not bound to a TCP port"))?;
        let redirect_uri = format!("http://localhost:{}/", port);

        // Random state ties the callback to this flow
        let state = uuid::Uuid::new_v4().to_string();
        let auth_url = authorization_url(&secret, &redirect_uri, scopes, &state)?;

        // stdout may carry the tool protocol, so the prompt goes to stderr
        eprintln!(
            "Please visit this URL to authorize this application: {}",
            auth_url
        );
        if open_browser {
            if let Err(e) = webbrowser::open(auth_url.as_str()) {
                warn!("Could not open a browser: {}", e);
            }
        }

        info!("Waiting for authorization callback on port {}", port);
        let code = tokio::task::spawn_blocking(move || wait_for_code(server, &state))
            .await
            .map_err(|e| auth_error(&format!("Redirect listener task failed: {}", e)))??;

        let response = self
            .request_token(
                &secret.token_uri,
                &[
                    ("client_id", secret.client_id.as_str()),
                    ("client_secret", secret.client_secret.as_str()),
                    ("code", code.as_str()),
                    ("redirect_uri", redirect_uri.as_str()),
                    ("grant_type", "authorization_code"),
                ],
            )
            .await?;

        Ok(Credential::from_response(
            response,
            &secret.client_id,
            &secret.client_secret,
            &secret.token_uri,
            None,
            scopes,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret() -> ApplicationSecret {
        ApplicationSecret::from_json(
            r#"{"installed":{"client_id":"id.apps.googleusercontent.com","project_id":"p",
            "auth_uri":"https://accounts.google.com/o/oauth2/auth",
            "token_uri":"https://oauth2.googleapis.com/token",
            "client_secret":"shh","redirect_uris":["http://localhost"]}}"#,
        )
        .unwrap()
    }

    #[test]
    fn reads_installed_and_web_secrets() {
        assert_eq!(secret().client_secret, "shh");

        let web =
            ApplicationSecret::from_json(r#"{"web":{"client_id":"w","client_secret":"s"}}"#)
                .unwrap();
        assert_eq!(web.token_uri, GOOGLE_TOKEN_URI);
        assert!(ApplicationSecret::from_json(r#"{"other":{}}"#).is_err());
    }

    #[test]
    fn authorization_url_carries_scope_and_state() {
        let scopes = vec![crate::config::CALENDAR_SCOPE.to_string()];
        let url = authorization_url(&secret(), "http://localhost:4242/", &scopes, "xyz").unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();

        assert!(pairs.contains(&("state".to_string(), "xyz".to_string())));
        assert!(pairs.contains(&("access_type".to_string(), "offline".to_string())));
        assert!(pairs.contains(&("scope".to_string(), crate::config::CALENDAR_SCOPE.to_string())));
        assert!(pairs.contains(&(
            "redirect_uri".to_string(),
            "http://localhost:4242/".to_string()
        )));
    }

    #[test]
    fn callback_parsing() {
        assert_eq!(
            parse_callback("/?state=abc&code=4%2F0Ad&scope=x", "abc").unwrap(),
            Callback::Code("4/0Ad".to_string())
        );
        assert_eq!(
            parse_callback("/?error=access_denied&state=abc", "abc").unwrap(),
            Callback::Denied("access_denied".to_string())
        );
        assert_eq!(parse_callback("/favicon.ico", "abc").unwrap(), Callback::Ignored);
        assert!(parse_callback("/?code=1&state=other", "abc").is_err());
    }
}
