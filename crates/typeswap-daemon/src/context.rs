use std::sync::Arc;

use typeswap_core::{Config, Platform, Store};

/// Everything the pipeline needs from its host, constructed once and passed
/// down explicitly.
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<Config>,
    pub store: Arc<dyn Store>,
    pub platform: Arc<dyn Platform>,
}

impl AppContext {
    pub fn new(config: Config, store: Arc<dyn Store>, platform: Arc<dyn Platform>) -> Self {
        Self {
            config: Arc::new(config),
            store,
            platform,
        }
    }
}
