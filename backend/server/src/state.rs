use std::sync::Arc;

use super::{bookmaker::Bookmaker, config::Config, database::Store};

pub struct AppState<S> {
    pub config: Config,
    pub bookmaker: Bookmaker<S>,
}

impl<S: Store> AppState<S> {
    pub fn new(config: Config, store: S) -> Arc<Self> {
        let bookmaker = Bookmaker::new(store, config.retry_policy());

        Arc::new(Self { config, bookmaker })
    }
}
