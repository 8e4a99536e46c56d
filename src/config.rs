use std::time::Duration;

use url::Url;

use crate::error::Error;

const DEFAULT_REFRESH_TICK: Duration = Duration::from_secs(30);
const DEFAULT_REFRESH_MARGIN_TICKS: u32 = 3;
const MAX_REFRESH_TICK_SECS: u64 = 3600;

/// Auth provider (GoTrue / Supabase Auth) configuration.
///
/// Required fields are constructor parameters; everything else has a default
/// and a `with_*` override.
///
/// ```rust,ignore
/// use nomnom_session::ProviderConfig;
///
/// let config = ProviderConfig::new("https://abc.supabase.co".parse()?, "anon-key")
///     .with_redirect_to("nomnom://auth-callback".parse()?);
/// ```
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ProviderConfig {
    pub(crate) project_url: Url,
    pub(crate) anon_key: String,
    pub(crate) redirect_to: Option<Url>,
    pub(crate) auto_refresh_tick: Duration,
    pub(crate) refresh_margin_ticks: u32,
}

impl ProviderConfig {
    #[must_use]
    pub fn new(project_url: Url, anon_key: impl Into<String>) -> Self {
        Self {
            project_url,
            anon_key: anon_key.into(),
            redirect_to: None,
            auto_refresh_tick: DEFAULT_REFRESH_TICK,
            refresh_margin_ticks: DEFAULT_REFRESH_MARGIN_TICKS,
        }
    }

    /// Create config from environment variables.
    ///
    /// # Required env vars
    /// - `SUPABASE_URL`: project base URL
    /// - `SUPABASE_ANON_KEY`: public API key sent as `apikey`
    ///
    /// # Optional env vars
    /// - `SUPABASE_REDIRECT_TO`: deep link for email and OAuth redirects
    /// - `SUPABASE_REFRESH_TICK_SECS`: auto-refresh check interval, 1 to 3600
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required variable is missing or a value is invalid.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let url_str = lookup("SUPABASE_URL")
            .ok_or_else(|| Error::Config("SUPABASE_URL is required".into()))?;
        let project_url: Url = url_str
            .parse()
            .map_err(|e| Error::Config(format!("SUPABASE_URL: {e}")))?;
        let anon_key = lookup("SUPABASE_ANON_KEY")
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::Config("SUPABASE_ANON_KEY is required".into()))?;

        let mut config = Self::new(project_url, anon_key);

        if let Some(redirect) = lookup("SUPABASE_REDIRECT_TO") {
            let url: Url = redirect
                .parse()
                .map_err(|e| Error::Config(format!("SUPABASE_REDIRECT_TO: {e}")))?;
            config = config.with_redirect_to(url);
        }
        if let Some(secs) = lookup("SUPABASE_REFRESH_TICK_SECS") {
            let secs: u64 = secs
                .parse()
                .ok()
                .filter(|s| (1..=MAX_REFRESH_TICK_SECS).contains(s))
                .ok_or_else(|| {
                    Error::Config(format!("SUPABASE_REFRESH_TICK_SECS: invalid value {secs:?}"))
                })?;
            config = config.with_auto_refresh_tick(Duration::from_secs(secs));
        }

        Ok(config)
    }

    /// Deep link used by confirmation, recovery and OAuth redirects.
    #[must_use]
    pub fn with_redirect_to(mut self, url: Url) -> Self {
        self.redirect_to = Some(url);
        self
    }

    /// How often the auto-refresh task checks the session (default 30s).
    #[must_use]
    pub fn with_auto_refresh_tick(mut self, tick: Duration) -> Self {
        self.auto_refresh_tick = tick;
        self
    }

    /// Refresh once the session expires within this many ticks (default 3).
    #[must_use]
    pub fn with_refresh_margin_ticks(mut self, ticks: u32) -> Self {
        self.refresh_margin_ticks = ticks;
        self
    }

    #[must_use]
    pub fn project_url(&self) -> &Url {
        &self.project_url
    }

    #[must_use]
    pub fn anon_key(&self) -> &str {
        &self.anon_key
    }

    #[must_use]
    pub fn redirect_to(&self) -> Option<&Url> {
        self.redirect_to.as_ref()
    }

    #[must_use]
    pub fn auto_refresh_tick(&self) -> Duration {
        self.auto_refresh_tick
    }

    /// Expiry margin that triggers a refresh. Saturates at [`Duration::MAX`].
    #[must_use]
    pub fn refresh_margin(&self) -> Duration {
        self.auto_refresh_tick.saturating_mul(self.refresh_margin_ticks)
    }

    /// Resolve an auth endpoint under `/auth/v1/`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the project URL cannot be a base.
    pub(crate) fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let mut url = self.project_url.clone();
        url.path_segments_mut()
            .map_err(|()| Error::Config("SUPABASE_URL cannot be a base URL".into()))?
            .pop_if_empty()
            .extend(["auth", "v1"])
            .extend(path.split('/'));
        Ok(url)
    }
}
