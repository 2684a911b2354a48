use std::sync::Arc;

use crate::{
    clock::Clock,
    config::Config,
    repos::Repos,
    services::{SessionConfig, SessionService, TokenService, ViewService},
    stores::Stores,
};

#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Config,
    /// Database repositories.
    pub repos: Repos,
    /// Ephemeral stores (Redis).
    pub stores: Stores,
    /// Token signing and validation.
    pub tokens: Arc<TokenService>,
    /// Signup, login, logout and refresh.
    pub sessions: Arc<SessionService>,
    /// Page view recording and totals.
    pub views: Arc<ViewService>,
}

impl AppState {
    /// Wires the services on top of the given repos and stores.
    pub fn new(config: Config, repos: Repos, stores: Stores, clock: Arc<dyn Clock>) -> Self {
        let tokens = Arc::new(TokenService::new(config.jwt_secret.as_bytes(), clock));
        let sessions = Arc::new(SessionService::new(
            repos.users.clone(),
            stores.blacklist.clone(),
            tokens.clone(),
            SessionConfig::from(&config),
        ));
        let views = Arc::new(ViewService::new(
            stores.page_views.clone(),
            repos.articles.clone(),
        ));

        Self {
            config,
            repos,
            stores,
            tokens,
            sessions,
            views,
        }
    }
}
