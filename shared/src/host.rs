//! Rust-side answers to the core's effects.
//!
//! A shell that runs in Rust (desktop, tests, a CLI harness) forwards
//! `Effect::Http` to [`ServiceHost::http`], `Effect::KeyValue` to
//! [`ServiceHost::kv`] and `Effect::Browser` to [`ServiceHost::open`], then
//! resolves each request with what came back. Native shells do the same with
//! their platform HTTP client and storage; no session logic lives here.

use std::sync::Arc;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::capabilities::{
    ApiGateway, ApiRequest, HttpGateway, HttpResult, KvOperation, KvResult, OpenUrl,
    SessionStore, StoreKey,
};
use crate::config::Config;
use crate::event::ClientSettings;
use crate::theme::{ColorScheme, ThemeContext};
use crate::{AppError, AppResult, ErrorKind};

/// Fire-and-forget URL opening.
pub trait LinkOpener: Send + Sync {
    fn open(&self, url: &Url) -> AppResult<()>;
}

/// Hands the URL to the platform browser.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLinkOpener;

impl LinkOpener for SystemLinkOpener {
    fn open(&self, url: &Url) -> AppResult<()> {
        open::that(url.as_str()).map_err(|e| {
            AppError::new(ErrorKind::Internal, "Impossible d'ouvrir le lien")
                .with_internal(e.to_string())
                .with_context("url", url.as_str())
        })
    }
}

pub struct ServiceHost<G: ApiGateway, S: SessionStore, L: LinkOpener = SystemLinkOpener> {
    gateway: Arc<G>,
    store: Arc<S>,
    theme: Arc<ThemeContext<S>>,
    opener: L,
    settings: ClientSettings,
}

impl<S: SessionStore> ServiceHost<HttpGateway, S, SystemLinkOpener> {
    /// Production wiring: reqwest gateway, theme read from `store`.
    pub async fn from_config(
        config: &Config,
        store: Arc<S>,
        platform: Option<ColorScheme>,
    ) -> AppResult<Self> {
        let gateway = Arc::new(HttpGateway::new(config)?);
        let theme = Arc::new(ThemeContext::init(store.clone(), platform).await);
        Ok(Self::new(gateway, store, theme, SystemLinkOpener).with_settings(config.client_settings()))
    }
}

impl<G: ApiGateway, S: SessionStore, L: LinkOpener> ServiceHost<G, S, L> {
    pub fn new(gateway: Arc<G>, store: Arc<S>, theme: Arc<ThemeContext<S>>, opener: L) -> Self {
        Self {
            gateway,
            store,
            theme,
            opener,
            settings: Config::default().client_settings(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: ClientSettings) -> Self {
        self.settings = settings;
        self
    }

    /// What to send the core with `Event::ClientConfigured` before `AppStarted`.
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn theme(&self) -> &Arc<ThemeContext<S>> {
        &self.theme
    }

    #[instrument(skip(self, request), fields(path = %request.path()))]
    pub async fn http(&self, request: ApiRequest) -> HttpResult {
        let result = self.gateway.execute(request).await;
        if let Err(e) = &result {
            warn!(error = %e, "http effect failed");
        }
        result
    }

    /// Runs the store operation; a successful theme write also updates the
    /// shared [`ThemeContext`].
    #[instrument(skip(self, operation), fields(op = operation.name()))]
    pub async fn kv(&self, operation: KvOperation) -> KvResult {
        let theme_write = match &operation {
            KvOperation::Write { entries } => entries
                .iter()
                .find(|(key, _)| *key == StoreKey::ThemeMode)
                .map(|(_, value)| value.clone()),
            _ => None,
        };

        let result = self.store.execute(operation).await;
        match &result {
            Ok(_) => {
                if let Some(raw) = theme_write {
                    self.theme.observe_stored(&raw);
                }
                debug!("kv effect completed");
            }
            Err(e) => warn!(error = %e, "kv effect failed"),
        }
        result
    }

    pub fn open(&self, operation: &OpenUrl) -> Result<(), AppError> {
        debug!(url = %operation.url, "opening external link");
        self.opener.open(&operation.url)
    }
}
