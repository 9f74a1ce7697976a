use std::sync::Arc;

use modelgate_provider::{
    CircuitBreakerRegistry, ProviderRepository, RateLimitGuard, StickySessions, UsageLedger,
};

use crate::auth::AuthProvider;
use crate::collaborators::{PriceBook, SensitiveWordGuard, StatisticsSink};
use crate::upstream::UpstreamClient;

/// Everything the pipeline shares across concurrent sessions.
pub struct GatewayState {
    pub repo: Arc<dyn ProviderRepository>,
    pub auth: Arc<dyn AuthProvider>,
    pub sensitive: Arc<dyn SensitiveWordGuard>,
    pub price_book: Arc<dyn PriceBook>,
    pub stats: Arc<dyn StatisticsSink>,
    pub circuit: Arc<CircuitBreakerRegistry>,
    pub ledger: Arc<UsageLedger>,
    pub limits: RateLimitGuard,
    pub sticky: Arc<StickySessions>,
    pub client: Arc<dyn UpstreamClient>,
}

impl GatewayState {
    pub fn now_unix() -> i64 {
        time::OffsetDateTime::now_utc().unix_timestamp()
    }
}
