//! HTTP client for the ChatterBox REST API.
//!
//! [`ApiClient`] wraps `reqwest::Client` and provides typed methods for each
//! endpoint under `<server>/chatterbox/v1`:
//!
//! | Method | Path       | Auth | Description                            |
//! |--------|------------|------|----------------------------------------|
//! | POST   | `/login/`  | No   | Exchange email/password for a token    |
//! | PUT    | `/signup/` | No   | Create account (multipart, avatar opt.)|
//! | GET    | `/me/`     | Yes  | Profile: identity, avatar, language    |
//! | PUT    | `/me/`     | Yes  | Replace avatar (multipart `avatar`)    |
//! | POST   | `/logout/` | Yes  | Revoke the token server-side           |
//!
//! ## Authentication
//!
//! Authenticated endpoints use the token scheme: `Authorization: Token <key>`.
//! The token is issued by login/signup and held by the client until
//! [`ApiClient::logout`] clears it.
//!
//! ## Error handling
//!
//! Non-2xx responses are parsed for a `detail` field in the JSON body. If
//! parsing fails, the raw response body is returned as the error message.

use std::time::Duration;

use serde::Deserialize;

/// Credentials issued by login or signup.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthGrant {
    /// The account identity (an email address); the `client` response field.
    pub client: String,
    /// Opaque token for subsequent requests.
    pub token: String,
}

/// Profile returned by `GET /me/`.
#[derive(Debug, Clone, Deserialize)]
pub struct Profile {
    pub client: String,
    pub avatar_url: Option<String>,
    pub language: Option<String>,
}

/// An image payload for avatar endpoints: bytes, file name, content type.
pub type AvatarUpload = (Vec<u8>, String, String);

/// HTTP client for one ChatterBox server.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a client for the server at `server_url` (scheme + host).
    pub fn new(server_url: &str) -> Self {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");
        let base_url = format!("{}/chatterbox/v1", server_url.trim_end_matches('/'));
        Self {
            http,
            base_url,
            token: None,
        }
    }

    /// The token issued by the last login/signup, if any.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// `POST /login/` — exchange email/password for a token. The token is
    /// retained for subsequent authenticated calls.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<AuthGrant, ClientError> {
        let body = serde_json::json!({ "email": email, "password": password });
        let resp = self
            .http
            .post(format!("{}/login/", self.base_url))
            .json(&body)
            .send()
            .await
            .map_err(ClientError::Request)?;
        let body = Self::handle_response(resp).await?;
        let grant: AuthGrant = serde_json::from_str(&body)
            .map_err(|e| ClientError::Protocol(format!("Invalid login response: {e}")))?;
        self.token = Some(grant.token.clone());
        Ok(grant)
    }

    /// `PUT /signup/` — create an account. Multipart like the web client:
    /// `email`, `password`, `language`, and an optional `avatar` file.
    /// Issues a token on success.
    pub async fn signup(
        &mut self,
        email: &str,
        password: &str,
        language: &str,
        avatar: Option<AvatarUpload>,
    ) -> Result<AuthGrant, ClientError> {
        let mut form = reqwest::multipart::Form::new()
            .text("email", email.to_string())
            .text("password", password.to_string())
            .text("language", language.to_string());
        if let Some((bytes, file_name, content_type)) = avatar {
            form = form.part("avatar", Self::image_part(bytes, file_name, &content_type)?);
        }

        let resp = self
            .http
            .put(format!("{}/signup/", self.base_url))
            .multipart(form)
            .send()
            .await
            .map_err(ClientError::Request)?;
        let body = Self::handle_response(resp).await?;
        let grant: AuthGrant = serde_json::from_str(&body)
            .map_err(|e| ClientError::Protocol(format!("Invalid signup response: {e}")))?;
        self.token = Some(grant.token.clone());
        Ok(grant)
    }

    /// `GET /me/` — fetch the profile behind the token.
    pub async fn me(&self) -> Result<Profile, ClientError> {
        let req = self.authed(self.http.get(format!("{}/me/", self.base_url)))?;
        let resp = req.send().await.map_err(ClientError::Request)?;
        let body = Self::handle_response(resp).await?;
        serde_json::from_str(&body)
            .map_err(|e| ClientError::Protocol(format!("Invalid profile response: {e}")))
    }

    /// `PUT /me/` — replace the avatar. Returns the new avatar reference.
    pub async fn update_avatar(&self, upload: AvatarUpload) -> Result<String, ClientError> {
        let (bytes, file_name, content_type) = upload;
        let form = reqwest::multipart::Form::new()
            .part("avatar", Self::image_part(bytes, file_name, &content_type)?);

        let req = self.authed(self.http.put(format!("{}/me/", self.base_url)))?;
        let resp = req
            .multipart(form)
            .send()
            .await
            .map_err(ClientError::Request)?;
        let body = Self::handle_response(resp).await?;

        #[derive(Deserialize)]
        struct AvatarResponse {
            avatar_url: String,
        }
        let parsed: AvatarResponse = serde_json::from_str(&body)
            .map_err(|e| ClientError::Protocol(format!("Invalid avatar response: {e}")))?;
        Ok(parsed.avatar_url)
    }

    /// `POST /logout/` — revoke the token server-side. Best-effort: the
    /// local credential is cleared even when the request fails, and a call
    /// without a token is a no-op.
    pub async fn logout(&mut self) -> Result<(), ClientError> {
        let Some(token) = self.token.take() else {
            return Ok(());
        };
        let resp = self
            .http
            .post(format!("{}/logout/", self.base_url))
            .header(reqwest::header::AUTHORIZATION, format!("Token {token}"))
            .send()
            .await
            .map_err(ClientError::Request)?;
        Self::handle_response(resp).await.map(|_| ())
    }

    /// Attach the `Authorization: Token` header, failing when no token has
    /// been issued yet.
    fn authed(&self, req: reqwest::RequestBuilder) -> Result<reqwest::RequestBuilder, ClientError> {
        match &self.token {
            Some(token) => {
                Ok(req.header(reqwest::header::AUTHORIZATION, format!("Token {token}")))
            }
            None => Err(ClientError::NoCredential),
        }
    }

    fn image_part(
        bytes: Vec<u8>,
        file_name: String,
        content_type: &str,
    ) -> Result<reqwest::multipart::Part, ClientError> {
        reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(content_type)
            .map_err(|e| ClientError::Protocol(format!("Invalid content type: {e}")))
    }

    /// Parse an HTTP response: the body text on success, or a
    /// [`ClientError`] carrying the server's `detail` message on failure.
    async fn handle_response(resp: reqwest::Response) -> Result<String, ClientError> {
        let status = resp.status();
        let body = resp.text().await.map_err(ClientError::Request)?;

        if status.is_success() {
            Ok(body)
        } else {
            let detail = serde_json::from_str::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v["detail"].as_str().map(String::from))
                .unwrap_or(body);
            Err(ClientError::Api {
                status: status.as_u16(),
                detail,
            })
        }
    }
}

/// Errors returned by [`ApiClient`] methods.
#[derive(Debug)]
pub enum ClientError {
    /// HTTP transport error (connection refused, timeout, DNS failure, etc.).
    Request(reqwest::Error),
    /// The server returned a non-2xx HTTP status.
    Api { status: u16, detail: String },
    /// The response body was not in the expected shape.
    Protocol(String),
    /// An authenticated endpoint was called without a token.
    NoCredential,
}

impl ClientError {
    /// Returns `true` when the server rejected the credential itself.
    pub fn is_unauthorized(&self) -> bool {
        matches!(
            self,
            ClientError::Api {
                status: 401 | 403,
                ..
            }
        )
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Request(e) => write!(f, "HTTP request failed: {e}"),
            ClientError::Api { status, detail } => {
                write!(f, "Server error (HTTP {status}): {detail}")
            }
            ClientError::Protocol(msg) => write!(f, "Protocol error: {msg}"),
            ClientError::NoCredential => write!(f, "No credential: log in first"),
        }
    }
}
