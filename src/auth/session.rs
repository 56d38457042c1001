//! Session management
//!
//! Sessions travel in an AES-GCM encrypted cookie.
//! No server-side session storage needed.

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Cookie carrying the encrypted session token
pub const SESSION_COOKIE: &str = "session";

/// Per-browser session data
///
/// Stored in an encrypted cookie. The session is authorized once it carries a
/// GitHub OAuth access token; `login` is only ever filled in by the gate
/// after a successful identity fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    login: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    previous_url: Option<String>,
    /// When session was created
    pub created_at: DateTime<Utc>,
    /// When session expires
    pub expires_at: DateTime<Utc>,
}

impl Session {
    /// Create an empty, unauthorized session living `max_age` seconds
    pub fn new(max_age: i64) -> Self {
        let now = Utc::now();
        Self {
            access_token: None,
            login: None,
            previous_url: None,
            created_at: now,
            expires_at: now + Duration::seconds(max_age),
        }
    }

    /// Create a session authorized by an OAuth access token
    ///
    /// The identity behind the token is resolved later by the gate.
    pub fn with_access_token(access_token: impl Into<String>, max_age: i64) -> Self {
        let mut session = Self::new(max_age);
        session.access_token = Some(access_token.into());
        session
    }

    /// Check if session is expired
    pub fn is_expired(&self) -> bool {
        self.expires_at < Utc::now()
    }

    /// Whether the OAuth handshake has completed for this session
    pub fn is_authorized(&self) -> bool {
        self.access_token.is_some()
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    /// Cached GitHub login, trusted once set
    pub fn login(&self) -> Option<&str> {
        self.login.as_deref()
    }

    pub fn previous_url(&self) -> Option<&str> {
        self.previous_url.as_deref()
    }

    /// Store a fresh access token; any identity cached for an earlier token is dropped.
    pub(super) fn set_access_token(&mut self, access_token: String) {
        self.access_token = Some(access_token);
        self.login = None;
    }

    pub(super) fn remember_login(&mut self, login: String) {
        debug_assert!(self.is_authorized());
        self.login = Some(login);
    }

    pub(super) fn forget_login(&mut self) {
        self.login = None;
    }

    /// Remember where to return after login.
    ///
    /// Only site-relative paths are kept so the value can never redirect
    /// off-site.
    pub fn remember_previous_url(&mut self, path: &str) {
        if is_site_relative(path) {
            self.previous_url = Some(path.to_string());
        }
    }

    /// Remove and return the pending deep link
    pub fn take_previous_url(&mut self) -> Option<String> {
        self.previous_url.take().filter(|path| is_site_relative(path))
    }

    /// Drop every field, keeping only the lifetime
    pub fn clear(&mut self) {
        self.access_token = None;
        self.login = None;
        self.previous_url = None;
    }
}

/// 32 random bytes, URL-safe base64
pub(crate) fn random_token() -> String {
    use base64::{Engine as _, engine::general_purpose};
    use rand::RngCore;

    let mut bytes = [0_u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn is_site_relative(path: &str) -> bool {
    path.starts_with('/') && !path.starts_with("//") && !path.starts_with("/\\")
}

const AES_GCM_NONCE_BYTES: usize = 12;

/// Context mixed into the secret when deriving the cookie encryption key
const SESSION_KEY_CONTEXT: &[u8] = b"gitgate session cookie v1";

/// Derive the AES-256 key for session cookies from the configured secret
fn session_cipher(secret: &str) -> Result<aes_gcm::Aes256Gcm, AppError> {
    use aes_gcm::{Aes256Gcm, aead::KeyInit};
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid session key: {e}")))?;
    mac.update(SESSION_KEY_CONTEXT);
    let key = mac.finalize().into_bytes();

    Aes256Gcm::new_from_slice(&key)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("invalid session key length: {e}")))
}

/// Create an encrypted session token
///
/// Token format: base64(nonce || aes_256_gcm(payload)). The access token
/// inside is unreadable to the browser and any change to the token fails
/// authentication on the way back in.
///
/// # Arguments
/// * `session` - Session data to encode
/// * `secret` - Secret the encryption key is derived from
pub fn create_session_token(session: &Session, secret: &str) -> Result<String, AppError> {
    use aes_gcm::{Nonce, aead::Aead};
    use base64::{Engine as _, engine::general_purpose};
    use rand::RngCore;

    let payload = serde_json::to_vec(session).map_err(|e| AppError::Internal(e.into()))?;
    let cipher = session_cipher(secret)?;

    let mut nonce = [0_u8; AES_GCM_NONCE_BYTES];
    rand::thread_rng().fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), payload.as_slice())
        .map_err(|_| AppError::Internal(anyhow::anyhow!("session encryption failed")))?;

    let mut out = Vec::with_capacity(AES_GCM_NONCE_BYTES + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(general_purpose::URL_SAFE_NO_PAD.encode(out))
}

/// Decrypt and decode a session token
///
/// # Errors
/// Returns `Unauthorized` if the token fails authentication, is
/// malformed or the session has expired
pub fn verify_session_token(token: &str, secret: &str) -> Result<Session, AppError> {
    use aes_gcm::{Nonce, aead::Aead};
    use base64::{Engine as _, engine::general_purpose};

    let data = general_purpose::URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| AppError::Unauthorized)?;
    if data.len() <= AES_GCM_NONCE_BYTES {
        return Err(AppError::Unauthorized);
    }

    let cipher = session_cipher(secret)?;
    let (nonce, ciphertext) = data.split_at(AES_GCM_NONCE_BYTES);
    let payload = cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| AppError::Unauthorized)?;

    let session: Session = serde_json::from_slice(&payload).map_err(|_| AppError::Unauthorized)?;
    if session.is_expired() {
        return Err(AppError::Unauthorized);
    }

    Ok(session)
}

/// Read the session from the cookie jar
///
/// A missing, tampered or expired cookie yields a fresh session.
pub fn load_session(jar: &CookieJar, secret: &str, max_age: i64) -> Session {
    jar.get(SESSION_COOKIE)
        .and_then(|cookie| match verify_session_token(cookie.value(), secret) {
            Ok(session) => Some(session),
            Err(error) => {
                tracing::debug!(%error, "Discarding invalid session cookie");
                None
            }
        })
        .unwrap_or_else(|| Session::new(max_age))
}

/// Write the session back into the cookie jar
pub fn store_session(
    jar: CookieJar,
    session: &Session,
    secret: &str,
    secure: bool,
) -> Result<CookieJar, AppError> {
    let token = create_session_token(session, secret)?;
    let cookie = Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .build();
    Ok(jar.add(cookie))
}

/// Remove the session cookie entirely
pub fn remove_session(jar: CookieJar) -> CookieJar {
    jar.remove(Cookie::build(SESSION_COOKIE).path("/").build())
}
