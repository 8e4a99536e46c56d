//! HTTP client for GoTrue (Supabase Auth).
//!
//! [`GoTrueClient`] covers the flows the app's auth screens need and
//! implements [`AuthProvider`] so it can drive a
//! [`SessionCoordinator`](crate::SessionCoordinator). Every state change
//! (sign-in, refresh, sign-out) is persisted through the [`SessionStore`]
//! and then broadcast to subscribers as a [`RawAuthEvent`].

mod refresh;

use std::sync::Arc;

use parking_lot::Mutex;
use reqwest::Method;
use serde::Deserialize;
use serde_json::{Value as JsonValue, json};
use time::OffsetDateTime;
use tokio::sync::Mutex as AsyncMutex;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::config::ProviderConfig;
use crate::error::Error;
use crate::forms::{SignInForm, SignUpForm};
use crate::pkce::PkcePair;
use crate::provider::AuthProvider;
use crate::store::{MemorySessionStore, SessionStore};
use crate::types::{AuthEvent, EmailAddress, RawAuthEvent, Session, User};

/// Third-party identity providers offered on the sign-in screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum OAuthProvider {
    Google,
    Apple,
}

impl OAuthProvider {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Apple => "apple",
        }
    }
}

/// Authorize URL plus the PKCE verifier to keep until the redirect comes back.
#[derive(Debug)]
#[non_exhaustive]
pub struct OAuthRequest {
    pub url: Url,
    pub pkce: PkcePair,
}

/// Result of a sign-up.
#[derive(Debug, Clone)]
pub enum SignUpOutcome {
    /// Email confirmation is off; the user is signed in.
    SignedIn(Session),
    /// A confirmation email was sent; no session until the link is followed.
    ConfirmationRequired { user: User },
}

/// GoTrue client, generic over where the session is persisted.
pub struct GoTrueClient<S = MemorySessionStore> {
    inner: Arc<Inner<S>>,
}

// Manual Clone: avoid derive adding an `S: Clone` bound.
impl<S> Clone for GoTrueClient<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct Inner<S> {
    config: ProviderConfig,
    http: reqwest::Client,
    store: S,
    listeners: Mutex<Vec<UnboundedSender<RawAuthEvent>>>,
    ticker: Mutex<Option<Ticker>>,
    /// Bumped by every sign-in and sign-out. Store writes happen under this
    /// lock, so a refresh started in an older epoch cannot commit.
    epoch: AsyncMutex<u64>,
    /// At most one refresh request in flight.
    refresh_flight: AsyncMutex<()>,
}

struct Ticker {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl GoTrueClient<MemorySessionStore> {
    /// Client with an in-memory session store.
    #[must_use]
    pub fn new(config: ProviderConfig) -> Self {
        Self::with_store(config, MemorySessionStore::new())
    }
}

impl<S: SessionStore> GoTrueClient<S> {
    #[must_use]
    pub fn with_store(config: ProviderConfig, store: S) -> Self {
        Self::from_parts(config, store, reqwest::Client::new())
    }

    /// Use a custom HTTP client (for connection pool reuse or testing).
    #[must_use]
    pub fn from_parts(config: ProviderConfig, store: S, http: reqwest::Client) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                http,
                store,
                listeners: Mutex::new(Vec::new()),
                ticker: Mutex::new(None),
                epoch: AsyncMutex::new(0),
                refresh_flight: AsyncMutex::new(()),
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ProviderConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn store(&self) -> &S {
        &self.inner.store
    }

    /// Whether the auto-refresh ticker is running.
    #[must_use]
    pub fn is_auto_refreshing(&self) -> bool {
        self.inner
            .ticker
            .lock()
            .as_ref()
            .is_some_and(|ticker| !ticker.task.is_finished())
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Form validation errors, [`Error::Provider`] for rejected credentials,
    /// [`Error::Http`] on network failure.
    pub async fn sign_in_with_password(&self, form: &SignInForm) -> Result<Session, Error> {
        let email = form.validate()?;
        let session = self
            .inner
            .token_grant(
                "password",
                json!({ "email": email.as_str(), "password": form.password }),
                "password sign-in",
            )
            .await?;
        tracing::info!(user_id = %session.subject(), "Password sign-in successful");
        self.inner.install(session, AuthEvent::SignedIn).await
    }

    /// Register a new account. `full_name` goes into user metadata.
    ///
    /// # Errors
    ///
    /// Form validation errors, [`Error::Provider`] if the provider refuses
    /// the registration, [`Error::Http`] on network failure.
    pub async fn sign_up(&self, form: &SignUpForm) -> Result<SignUpOutcome, Error> {
        let valid = form.validate()?;
        let mut request = self.inner.request(Method::POST, "signup")?;
        if let Some(redirect) = self.inner.config.redirect_to() {
            request = request.query(&[("redirect_to", redirect.as_str())]);
        }
        let response = request
            .json(&json!({
                "email": valid.email.as_str(),
                "password": valid.password,
                "data": { "full_name": valid.full_name },
            }))
            .send()
            .await?;
        let body: JsonValue = ensure_success(response, "sign-up").await?.json().await?;

        if body.get("access_token").is_some() {
            let session = decode_session(body, "sign-up")?;
            tracing::info!(user_id = %session.subject(), "Sign-up successful");
            let session = self.inner.install(session, AuthEvent::SignedIn).await?;
            return Ok(SignUpOutcome::SignedIn(session));
        }

        let user_json = body.get("user").cloned().unwrap_or(body);
        let user: User = serde_json::from_value(user_json).map_err(|e| Error::Provider {
            operation: "sign-up",
            status: None,
            detail: format!("unexpected response: {e}"),
        })?;
        tracing::info!(user_id = %user.id, "Sign-up pending email confirmation");
        Ok(SignUpOutcome::ConfirmationRequired { user })
    }

    /// Send the signup confirmation email again.
    ///
    /// # Errors
    ///
    /// [`Error::Provider`] (e.g. rate limited), [`Error::Http`] on network failure.
    pub async fn resend_signup_confirmation(&self, email: &EmailAddress) -> Result<(), Error> {
        let response = self
            .inner
            .request(Method::POST, "resend")?
            .json(&json!({ "type": "signup", "email": email.as_str() }))
            .send()
            .await?;
        ensure_success(response, "resend confirmation").await?;
        Ok(())
    }

    /// Email a password reset link, redirecting to the configured deep link.
    ///
    /// # Errors
    ///
    /// [`Error::Provider`], [`Error::Http`] on network failure.
    pub async fn reset_password_for_email(&self, email: &EmailAddress) -> Result<(), Error> {
        let mut request = self.inner.request(Method::POST, "recover")?;
        if let Some(redirect) = self.inner.config.redirect_to() {
            request = request.query(&[("redirect_to", redirect.as_str())]);
        }
        let response = request
            .json(&json!({ "email": email.as_str() }))
            .send()
            .await?;
        ensure_success(response, "password recovery").await?;
        Ok(())
    }

    /// Fetch the signed-in user fresh from the provider.
    ///
    /// Used by the verification screen to check `email_confirmed_at`.
    ///
    /// # Errors
    ///
    /// [`Error::NoSession`] when signed out, [`Error::Provider`], [`Error::Http`].
    pub async fn get_user(&self) -> Result<User, Error> {
        let session = self.inner.current_session().await?.ok_or(Error::NoSession)?;
        let response = self
            .inner
            .request(Method::GET, "user")?
            .bearer_auth(&session.access_token)
            .send()
            .await?;
        let response = ensure_success(response, "user request").await?;
        Ok(response.json::<User>().await?)
    }

    /// Build the authorize URL for a third-party sign-in.
    ///
    /// # Errors
    ///
    /// [`Error::Config`] if no `redirect_to` is configured.
    pub fn oauth_sign_in_url(&self, provider: OAuthProvider) -> Result<OAuthRequest, Error> {
        let redirect = self.inner.config.redirect_to().ok_or_else(|| {
            Error::Config("OAuth sign-in needs a redirect_to deep link".into())
        })?;
        let pkce = PkcePair::generate();
        let mut url = self.inner.config.endpoint("authorize")?;
        url.query_pairs_mut()
            .append_pair("provider", provider.as_str())
            .append_pair("redirect_to", redirect.as_str())
            .append_pair("code_challenge", pkce.challenge())
            .append_pair("code_challenge_method", pkce.method());
        Ok(OAuthRequest { url, pkce })
    }

    /// Exchange the `code` from the OAuth redirect for a session.
    ///
    /// # Errors
    ///
    /// [`Error::Provider`] if the code is invalid or expired, [`Error::Http`].
    pub async fn exchange_code(&self, auth_code: &str, pkce: &PkcePair) -> Result<Session, Error> {
        let session = self
            .inner
            .token_grant(
                "pkce",
                json!({ "auth_code": auth_code, "code_verifier": pkce.verifier() }),
                "code exchange",
            )
            .await?;
        tracing::info!(user_id = %session.subject(), "OAuth sign-in successful");
        self.inner.install(session, AuthEvent::SignedIn).await
    }

    /// Trade the refresh token for new token material.
    ///
    /// A refresh token the provider rejects ends the session. New tokens that
    /// arrive after a sign-out or a new sign-in are dropped.
    ///
    /// # Errors
    ///
    /// [`Error::NoSession`] when signed out (including mid-request),
    /// [`Error::Provider`], [`Error::Http`].
    pub async fn refresh_session(&self) -> Result<Session, Error> {
        self.inner.refresh(true).await
    }
}

impl<S: SessionStore> Inner<S> {
    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, Error> {
        let url = self.config.endpoint(path)?;
        Ok(self
            .http
            .request(method, url)
            .header("apikey", &self.config.anon_key))
    }

    async fn token_grant(
        &self,
        grant_type: &'static str,
        body: JsonValue,
        operation: &'static str,
    ) -> Result<Session, Error> {
        let response = self
            .request(Method::POST, "token")?
            .query(&[("grant_type", grant_type)])
            .bearer_auth(&self.config.anon_key)
            .json(&body)
            .send()
            .await?;
        let body: JsonValue = ensure_success(response, operation).await?.json().await?;
        decode_session(body, operation)
    }

    async fn current_session(&self) -> Result<Option<Session>, Error> {
        self.store
            .load()
            .await
            .map_err(|e| Error::Store(e.to_string()))
    }

    /// Persist a new sign-in, then broadcast.
    async fn install(&self, session: Session, event: AuthEvent) -> Result<Session, Error> {
        let mut epoch = self.epoch.lock().await;
        *epoch += 1;
        self.save(&session).await?;
        self.emit(event, Some(&session));
        Ok(session)
    }

    async fn discard(&self) -> Result<(), Error> {
        let mut epoch = self.epoch.lock().await;
        self.clear(&mut epoch).await
    }

    async fn clear(&self, epoch: &mut u64) -> Result<(), Error> {
        *epoch += 1;
        self.store
            .clear()
            .await
            .map_err(|e| Error::Store(e.to_string()))?;
        self.emit(AuthEvent::SignedOut, None);
        Ok(())
    }

    async fn save(&self, session: &Session) -> Result<(), Error> {
        self.store
            .save(session)
            .await
            .map_err(|e| Error::Store(e.to_string()))
    }

    /// Trade the stored refresh token for new tokens.
    ///
    /// Callers queue behind one another; without `force`, a caller that finds
    /// the session already renewed by the one before it sends nothing.
    async fn refresh(&self, force: bool) -> Result<Session, Error> {
        let _flight = self.refresh_flight.lock().await;
        let (started, current) = {
            let epoch = self.epoch.lock().await;
            (*epoch, self.current_session().await?)
        };
        let current = current.ok_or(Error::NoSession)?;
        if !force && !self.is_expiring(&current) {
            return Ok(current);
        }

        let result = self
            .token_grant(
                "refresh_token",
                json!({ "refresh_token": current.refresh_token }),
                "token refresh",
            )
            .await;

        let mut epoch = self.epoch.lock().await;
        if *epoch != started {
            tracing::debug!("Session changed during refresh; dropping the result");
            return Err(Error::NoSession);
        }
        match result {
            Ok(session) => {
                self.save(&session).await?;
                tracing::debug!(user_id = %session.subject(), "Session refreshed");
                self.emit(AuthEvent::TokenRefreshed, Some(&session));
                Ok(session)
            }
            Err(e @ Error::Provider { status: Some(400 | 401), .. }) => {
                tracing::warn!(error = %e, "Refresh token rejected; ending session");
                self.clear(&mut epoch).await?;
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    async fn refresh_if_expiring(&self) {
        let session = match self.current_session().await {
            Ok(Some(session)) => session,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "Auto-refresh could not read session");
                return;
            }
        };
        if !self.is_expiring(&session) {
            return;
        }
        match self.refresh(false).await {
            Ok(_) | Err(Error::NoSession) => {}
            Err(e) => tracing::warn!(error = %e, "Auto-refresh failed"),
        }
    }

    fn is_expiring(&self, session: &Session) -> bool {
        let margin = time::Duration::try_from(self.config.refresh_margin())
            .unwrap_or(time::Duration::MAX);
        session.expires_within(margin, OffsetDateTime::now_utc())
    }

    fn emit(&self, event: AuthEvent, session: Option<&Session>) {
        let raw = RawAuthEvent::new(event, session);
        let mut listeners = self.listeners.lock();
        listeners.retain(|tx| tx.send(raw.clone()).is_ok());
        tracing::debug!(event = %event, listeners = listeners.len(), "Auth event emitted");
    }
}

impl<S> Drop for Inner<S> {
    fn drop(&mut self) {
        if let Some(ticker) = self.ticker.get_mut().take() {
            ticker.cancel.cancel();
        }
    }
}

impl<S: SessionStore> AuthProvider for GoTrueClient<S> {
    async fn get_session(&self) -> Result<Option<Session>, Error> {
        let Some(session) = self.inner.current_session().await? else {
            return Ok(None);
        };
        if !self.inner.is_expiring(&session) {
            return Ok(Some(session));
        }
        match self.inner.refresh(false).await {
            Ok(session) => Ok(Some(session)),
            Err(Error::NoSession) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn subscribe(&self) -> UnboundedReceiver<RawAuthEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.listeners.lock().push(tx);
        rx
    }

    async fn sign_out(&self) -> Result<(), Error> {
        if let Some(session) = self.inner.current_session().await? {
            let response = self
                .inner
                .request(Method::POST, "logout")?
                .query(&[("scope", "global")])
                .bearer_auth(&session.access_token)
                .send()
                .await?;
            ensure_success(response, "sign-out").await?;
        }
        self.inner.discard().await
    }

    fn start_auto_refresh(&self) {
        let mut ticker = self.inner.ticker.lock();
        if ticker.as_ref().is_some_and(|t| !t.task.is_finished()) {
            return;
        }
        let cancel = CancellationToken::new();
        *ticker = refresh::spawn_ticker(
            Arc::downgrade(&self.inner),
            self.inner.config.auto_refresh_tick(),
            cancel.clone(),
        )
        .map(|task| Ticker { cancel, task });
    }

    /// Stops between ticks; a refresh already in flight runs to completion.
    fn stop_auto_refresh(&self) {
        if let Some(ticker) = self.inner.ticker.lock().take() {
            ticker.cancel.cancel();
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error_description: Option<String>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Checks HTTP response status; returns the response on success or an error with details.
async fn ensure_success(
    response: reqwest::Response,
    operation: &'static str,
) -> Result<reqwest::Response, Error> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.error_description.or(b.msg).or(b.message).or(b.error))
        .unwrap_or(body);
    Err(Error::Provider {
        operation,
        status: Some(status),
        detail,
    })
}

fn decode_session(body: JsonValue, operation: &'static str) -> Result<Session, Error> {
    let session: Session = serde_json::from_value(body).map_err(|e| Error::Provider {
        operation,
        status: None,
        detail: format!("unexpected response: {e}"),
    })?;
    session
        .stamped(OffsetDateTime::now_utc())
        .validate()
        .map_err(|e| Error::Provider {
            operation,
            status: None,
            detail: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(redirect: Option<&str>) -> GoTrueClient {
        let mut config = ProviderConfig::new("https://abc.supabase.co".parse().unwrap(), "anon");
        if let Some(redirect) = redirect {
            config = config.with_redirect_to(redirect.parse().unwrap());
        }
        GoTrueClient::new(config)
    }

    #[test]
    fn oauth_url_carries_pkce_challenge() {
        let client = client(Some("nomnom://auth-callback"));
        let req = client.oauth_sign_in_url(OAuthProvider::Google).unwrap();

        assert_eq!(req.url.path(), "/auth/v1/authorize");
        let pairs: Vec<(String, String)> = req.url.query_pairs().into_owned().collect();
        let get = |k: &str| {
            pairs
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };
        assert_eq!(get("provider"), Some("google"));
        assert_eq!(get("redirect_to"), Some("nomnom://auth-callback"));
        assert_eq!(get("code_challenge"), Some(req.pkce.challenge()));
        assert_eq!(get("code_challenge_method"), Some("s256"));
    }

    #[test]
    fn oauth_url_requires_redirect() {
        let err = client(None).oauth_sign_in_url(OAuthProvider::Apple).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn decode_session_stamps_expiry() {
        let body = json!({
            "access_token": "at",
            "token_type": "bearer",
            "expires_in": 3600,
            "refresh_token": "rt",
            "user": { "id": "u1" }
        });
        let session = decode_session(body, "test").unwrap();
        assert!(session.expires_at.is_some());
    }

    #[test]
    fn decode_session_rejects_partial() {
        let body = json!({ "access_token": "at", "refresh_token": "", "user": { "id": "u1" } });
        assert!(matches!(
            decode_session(body, "test"),
            Err(Error::Provider { status: None, .. })
        ));
    }

    #[tokio::test]
    async fn auto_refresh_start_is_idempotent() {
        let client = client(None);
        client.start_auto_refresh();
        assert!(client.is_auto_refreshing());
        client.start_auto_refresh();
        assert!(client.is_auto_refreshing());

        // A single stop ends the one ticker.
        client.stop_auto_refresh();
        assert!(!client.is_auto_refreshing());
        client.stop_auto_refresh();
        client.stop_auto_refresh();
        assert!(!client.is_auto_refreshing());
    }

    #[tokio::test]
    async fn subscribers_receive_sign_out() {
        let client = client(None);
        let mut events = client.subscribe();
        client.sign_out().await.unwrap();
        let raw = events.recv().await.unwrap();
        assert_eq!(raw.event, "SIGNED_OUT");
        assert!(raw.session.is_none());
    }
}
