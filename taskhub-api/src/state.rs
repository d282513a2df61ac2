//! Shared handler state.

use std::sync::Arc;

use taskhub_market::Market;

use crate::config::ApiConfig;

#[derive(Clone)]
pub struct AppState {
    pub market: Market,
    pub config: Arc<ApiConfig>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(market: Market, config: ApiConfig) -> Self {
        Self {
            market,
            config: Arc::new(config),
            start_time: std::time::Instant::now(),
        }
    }
}
