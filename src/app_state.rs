use crate::{Config, rate_limit::KeyedRateLimiter, service::LibraryService};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub library: LibraryService,
    pub config: Config,
    pub rate_limiter: Arc<KeyedRateLimiter>,
}
