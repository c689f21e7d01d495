//! OAuth 2.0 token acquisition for Google Photos.
//!
//! [`AuthEngine::authenticate`] first tries the stored refresh token. If that
//! fails the refresh token is discarded and the interactive flow of the
//! configured [`AuthStrategy`] runs:
//!
//! - **Direct**: the consent URL is shown on a [`ConsentPrompt`]; the redirected
//!   URL it returns carries the code, which is exchanged before returning.
//! - **Proxy**: the consent URL is opened in the browser and the call returns
//!   `false` at once. The code arrives later through [`AuthEngine::complete`].
//! - **Loopback**: an ephemeral `127.0.0.1` listener receives the redirect. The
//!   request carries a PKCE challenge and a random state that must round-trip.
//!
//! No error crosses `authenticate`; every failure is logged and reported as
//! `false`.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use reqwest::StatusCode;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::error::{ProviderError, ProviderResult};
use crate::provider::BoxFuture;

use super::config::{AuthStrategy, GoogleConfig};
use super::tokens::{TokenGrant, TokenStore};

const CODE_VERIFIER_LENGTH: usize = 32;

/// How long the loopback listener waits for the browser.
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// How long a single loopback connection may take to send its request.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(10);

/// A window or tab opened for the user.
pub trait BrowserWindow: Send + Sync {
    /// Closes the window if the launcher is able to.
    fn close(&mut self);
}

/// Opens URLs for the user.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> ProviderResult<Box<dyn BrowserWindow>>;
}

/// Launches the system default browser. Its tabs cannot be closed.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

#[derive(Debug)]
struct DetachedWindow;

impl BrowserWindow for DetachedWindow {
    fn close(&mut self) {
        debug!("system browser tab is left open");
    }
}

impl BrowserLauncher for SystemBrowser {
    fn open(&self, url: &str) -> ProviderResult<Box<dyn BrowserWindow>> {
        open::that(url).map_err(|e| {
            ProviderError::internal(format!("failed to open browser: {e}")).with_source(e)
        })?;
        Ok(Box::new(DetachedWindow))
    }
}

/// A surface that shows the consent page and hands back where it redirected.
pub trait ConsentPrompt: Send + Sync {
    /// Resolves to the redirected URL (or bare code), or `None` if the user
    /// cancelled.
    fn prompt<'a>(&'a self, consent_url: &'a str) -> BoxFuture<'a, Option<String>>;
}

/// PKCE verifier/challenge pair plus the CSRF state (RFC 7636).
#[derive(Debug)]
pub struct PkceFlow {
    pub verifier: String,
    pub challenge: String,
    pub state: String,
}

impl PkceFlow {
    pub fn new() -> Self {
        let verifier = random_token(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        Self {
            verifier,
            challenge,
            state: random_token(16),
        }
    }

    fn compute_challenge(verifier: &str) -> String {
        URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_token(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// The code (and state, if any) carried by an authorization redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationCode {
    pub code: String,
    pub state: Option<String>,
}

impl AuthorizationCode {
    /// Parses a redirect URL, a bare query string, or a bare code.
    pub fn parse(input: &str) -> ProviderResult<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(ProviderError::unauthenticated("empty authorization response"));
        }

        let query = match Url::parse(input) {
            Ok(url) => url.query().unwrap_or_default().to_string(),
            Err(_) if input.contains("code=") || input.contains("error=") => {
                input.trim_start_matches(['/', '?']).to_string()
            }
            Err(_) => {
                return Ok(Self {
                    code: input.to_string(),
                    state: None,
                });
            }
        };
        Self::from_query(&query)
    }

    fn from_query(query: &str) -> ProviderResult<Self> {
        let mut code = None;
        let mut state = None;
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => {
                    return Err(ProviderError::unauthenticated(format!(
                        "authorization denied: {value}"
                    )));
                }
                _ => {}
            }
        }
        match code.filter(|c| !c.is_empty()) {
            Some(code) => Ok(Self { code, state }),
            None => Err(ProviderError::unauthenticated(
                "missing authorization code in redirect",
            )),
        }
    }
}

/// Google's token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

/// The exchange proxy's response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProxyTokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    3600
}

enum TokenRequest<'a> {
    Code {
        code: &'a str,
        redirect_uri: &'a str,
        verifier: Option<&'a str>,
    },
    Refresh {
        refresh_token: &'a str,
    },
}

/// Acquires and refreshes access tokens, writing them to a [`TokenStore`].
pub struct AuthEngine {
    config: GoogleConfig,
    tokens: Arc<TokenStore>,
    http_client: reqwest::Client,
    browser: Arc<dyn BrowserLauncher>,
    consent: Option<Arc<dyn ConsentPrompt>>,
    callback_timeout: Duration,
    /// Serialises `authenticate` so only one interactive flow runs.
    in_flight: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for AuthEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthEngine")
            .field("strategy", &self.config.strategy)
            .field("token_path", &self.tokens.path())
            .finish_non_exhaustive()
    }
}

impl AuthEngine {
    pub fn new(config: GoogleConfig, tokens: Arc<TokenStore>) -> ProviderResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| {
                ProviderError::configuration(format!("failed to create HTTP client: {e}"))
            })?;

        Ok(Self {
            config,
            tokens,
            http_client,
            browser: Arc::new(SystemBrowser),
            consent: None,
            callback_timeout: CALLBACK_TIMEOUT,
            in_flight: tokio::sync::Mutex::new(()),
        })
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_consent_prompt(mut self, prompt: Arc<dyn ConsentPrompt>) -> Self {
        self.consent = Some(prompt);
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    pub fn config(&self) -> &GoogleConfig {
        &self.config
    }

    /// Ensures a fresh access token, returning whether one was obtained.
    ///
    /// Callers that queued behind another authentication reuse its token
    /// when it replaced the one they held on entry.
    pub async fn authenticate(&self) -> bool {
        let held = self.tokens.access_token();
        let _guard = self.in_flight.lock().await;

        let current = self.tokens.access_token();
        if current.is_some() && current != held {
            debug!("access token renewed while waiting, skipping authentication");
            return true;
        }

        if let Some(refresh_token) = self.tokens.refresh_token() {
            debug!("attempting refresh token grant");
            match self.request_tokens(TokenRequest::Refresh {
                refresh_token: &refresh_token,
            })
            .await
            {
                Ok(grant) => {
                    info!("refreshed access token");
                    self.store(grant);
                    return true;
                }
                Err(e) => {
                    warn!("refresh token rejected, discarding it: {}", e);
                    if let Err(e) = self.tokens.clear_refresh_token() {
                        error!("failed to persist cleared refresh token: {}", e);
                    }
                }
            }
        }

        match self.interactive().await {
            Ok(authenticated) => authenticated,
            Err(e) => {
                warn!("authentication failed: {}", e);
                false
            }
        }
    }

    /// Finishes an out-of-band authorization with the code (or redirect URL)
    /// delivered by the relay page.
    pub async fn complete(&self, response: &str) -> bool {
        let result = async {
            let code = AuthorizationCode::parse(response)?;
            let redirect_uri = self.redirect_uri()?;
            self.request_tokens(TokenRequest::Code {
                code: &code.code,
                redirect_uri: &redirect_uri,
                verifier: None,
            })
            .await
        }
        .await;

        match result {
            Ok(grant) => {
                info!("authorization code exchanged");
                self.store(grant);
                true
            }
            Err(e) => {
                warn!("failed to complete authorization: {}", e);
                false
            }
        }
    }

    fn redirect_uri(&self) -> ProviderResult<String> {
        match &self.config.strategy {
            AuthStrategy::Direct { redirect_uri } | AuthStrategy::Proxy { redirect_uri, .. } => {
                Ok(redirect_uri.clone())
            }
            AuthStrategy::Loopback => Err(ProviderError::configuration(
                "loopback authorization cannot be completed out of band",
            )),
        }
    }

    fn store(&self, grant: TokenGrant) {
        if let Err(e) = self.tokens.apply(grant) {
            error!("failed to persist tokens: {}", e);
        }
    }

    async fn interactive(&self) -> ProviderResult<bool> {
        match &self.config.strategy {
            AuthStrategy::Direct { redirect_uri } => self.direct_flow(redirect_uri).await,
            AuthStrategy::Proxy { redirect_uri, .. } => {
                let url = self.consent_url(redirect_uri, &random_token(16), None)?;
                info!("opening browser for authorization");
                self.browser.open(&url)?;
                Ok(false)
            }
            AuthStrategy::Loopback => self.loopback_flow().await,
        }
    }

    async fn direct_flow(&self, redirect_uri: &str) -> ProviderResult<bool> {
        let prompt = self.consent.as_ref().ok_or_else(|| {
            ProviderError::configuration("direct authorization needs a consent prompt")
        })?;

        let state = random_token(16);
        let url = self.consent_url(redirect_uri, &state, None)?;
        let Some(response) = prompt.prompt(&url).await else {
            info!("authorization cancelled");
            return Ok(false);
        };

        let code = AuthorizationCode::parse(&response)?;
        if code.state.as_deref().is_some_and(|s| s != state) {
            return Err(ProviderError::unauthenticated("OAuth state mismatch"));
        }

        let grant = self
            .request_tokens(TokenRequest::Code {
                code: &code.code,
                redirect_uri,
                verifier: None,
            })
            .await?;
        self.store(grant);
        Ok(true)
    }

    async fn loopback_flow(&self) -> ProviderResult<bool> {
        let pkce = PkceFlow::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.map_err(|e| {
            ProviderError::io(format!("failed to bind loopback listener: {e}")).with_source(e)
        })?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://127.0.0.1:{port}/callback");
        debug!("loopback listener on port {}", port);

        let url = self.consent_url(&redirect_uri, &pkce.state, Some(&pkce.challenge))?;
        info!("starting OAuth flow, opening browser");
        if let Err(e) = self.browser.open(&url) {
            warn!("{}", e);
            eprintln!("\nPlease open this URL in your browser:\n\n{url}\n");
        }

        let code = tokio::time::timeout(self.callback_timeout, wait_for_callback(listener))
            .await
            .map_err(|_| ProviderError::unauthenticated("OAuth callback timeout"))??;

        if code.state.as_deref() != Some(pkce.state.as_str()) {
            return Err(ProviderError::unauthenticated("OAuth state mismatch"));
        }

        info!("received authorization code, exchanging for tokens");
        let grant = self
            .request_tokens(TokenRequest::Code {
                code: &code.code,
                redirect_uri: &redirect_uri,
                verifier: Some(&pkce.verifier),
            })
            .await?;
        self.store(grant);
        Ok(true)
    }

    /// Builds the consent page URL.
    pub fn consent_url(
        &self,
        redirect_uri: &str,
        state: &str,
        challenge: Option<&str>,
    ) -> ProviderResult<String> {
        let mut url = Url::parse(&self.config.endpoints.auth_url).map_err(|e| {
            ProviderError::configuration(format!("invalid authorization URL: {e}"))
        })?;
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("scope", &self.config.scopes.join(" "))
                .append_pair("include_granted_scopes", "true")
                .append_pair("response_type", "code")
                .append_pair("access_type", "offline")
                .append_pair("prompt", "consent")
                .append_pair("state", state)
                .append_pair("redirect_uri", redirect_uri)
                .append_pair("client_id", &self.config.credentials.client_id);
            if let Some(challenge) = challenge {
                query
                    .append_pair("code_challenge", challenge)
                    .append_pair("code_challenge_method", "S256");
            }
        }
        Ok(url.into())
    }

    async fn request_tokens(&self, request: TokenRequest<'_>) -> ProviderResult<TokenGrant> {
        if let AuthStrategy::Proxy {
            exchange_url: Some(exchange_url),
            ..
        } = &self.config.strategy
        {
            return self.request_tokens_via_proxy(exchange_url, request).await;
        }

        let creds = &self.config.credentials;
        let mut params = vec![
            ("client_id", creds.client_id.as_str()),
            ("client_secret", creds.client_secret.as_str()),
        ];
        match request {
            TokenRequest::Code {
                code,
                redirect_uri,
                verifier,
            } => {
                params.push(("grant_type", "authorization_code"));
                params.push(("code", code));
                params.push(("redirect_uri", redirect_uri));
                if let Some(verifier) = verifier {
                    params.push(("code_verifier", verifier));
                }
            }
            TokenRequest::Refresh { refresh_token } => {
                params.push(("grant_type", "refresh_token"));
                params.push(("refresh_token", refresh_token));
            }
        }

        let response = self
            .http_client
            .post(&self.config.endpoints.token_url)
            .form(&params)
            .send()
            .await?;
        let body = read_token_body(response).await?;
        let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("invalid token response: {e}"))
        })?;

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
        })
    }

    async fn request_tokens_via_proxy(
        &self,
        exchange_url: &str,
        request: TokenRequest<'_>,
    ) -> ProviderResult<TokenGrant> {
        let body = match request {
            TokenRequest::Code { code, .. } => {
                serde_json::json!({ "action": "getAccessToken", "code": code })
            }
            TokenRequest::Refresh { refresh_token } => {
                serde_json::json!({ "action": "refreshToken", "refreshToken": refresh_token })
            }
        };

        let response = self
            .http_client
            .post(exchange_url)
            .json(&body)
            .send()
            .await?;
        let body = read_token_body(response).await?;
        let token: ProxyTokenResponse = serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("invalid proxy token response: {e}"))
        })?;

        Ok(TokenGrant {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: token.expires_in,
        })
    }
}

async fn read_token_body(response: reqwest::Response) -> ProviderResult<String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ProviderError::network(format!("failed to read response: {e}")))?;

    if status != StatusCode::OK {
        return Err(ProviderError::unauthenticated(format!(
            "token exchange failed ({status}): {body}"
        ))
        .with_status(status.as_u16()));
    }
    Ok(body)
}

/// Accepts connections until one carries the authorization redirect.
///
/// The listener is dropped, and the port released, when this returns or when
/// the surrounding timeout cancels it.
/// Serves each connection on its own task so an idle or slow client cannot
/// hold up the redirect. Pending connections are aborted once a result lands.
async fn wait_for_callback(listener: TcpListener) -> ProviderResult<AuthorizationCode> {
    let (tx, mut rx) = mpsc::channel(1);
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                debug!("callback connection from {}", peer);
                let tx = tx.clone();
                connections.spawn(async move {
                    match tokio::time::timeout(REQUEST_READ_TIMEOUT, handle_callback(stream)).await {
                        Ok(Some(result)) => {
                            let _ = tx.send(result).await;
                        }
                        Ok(None) => {}
                        Err(_) => debug!("dropping idle callback connection from {}", peer),
                    }
                });
            }
            Some(result) = rx.recv() => return result,
        }
    }
}

/// Answers one request on the loopback listener. Requests that are not the
/// redirect (favicon requests and the like) yield `None`.
async fn handle_callback(stream: TcpStream) -> Option<ProviderResult<AuthorizationCode>> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).await.is_err() {
        return None;
    }

    // GET /callback?code=...&state=... HTTP/1.1
    let mut parts = request_line.split_whitespace();
    let (Some("GET"), Some(path)) = (parts.next(), parts.next()) else {
        return None;
    };
    let (route, query) = path.split_once('?').unwrap_or((path, ""));
    if route != "/callback" {
        let _ = write_half
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
            .await;
        return None;
    }

    let result = AuthorizationCode::from_query(query);
    let page = if result.is_ok() {
        "<html><body><h1>Authorization Successful</h1>\
         <p>You can close this window and return to photolink.</p></body></html>"
    } else {
        "<html><body><h1>Authorization Failed</h1>\
         <p>You can close this window.</p></body></html>"
    };
    let status = if result.is_ok() { "200 OK" } else { "400 Bad Request" };
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{page}",
        page.len()
    );
    let _ = write_half.write_all(response.as_bytes()).await;
    let _ = write_half.flush().await;

    Some(result)
}
