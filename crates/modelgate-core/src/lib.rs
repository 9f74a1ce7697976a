//! The request-forwarding pipeline: session envelope, guard chain,
//! retry/failover loop, and the streaming response dispatcher.

pub mod auth;
pub mod collaborators;
pub mod dispatch;
pub mod error;
pub mod forward;
pub mod handler;
pub mod session;
pub mod state;
pub mod upstream;

pub use auth::{AuthContext, AuthKeyEntry, AuthProvider, MemoryAuth, NoopAuth};
pub use collaborators::{
    ListSensitiveWordGuard, NoopSensitiveWordGuard, NoopStatisticsSink, PriceBook,
    RequestOutcome, SensitiveWordGuard, StaticPriceBook, StatisticsRecord, StatisticsSink,
    TracingStatisticsSink,
};
pub use error::{GatewayError, UpstreamAttemptError, UpstreamErrorClass};
pub use forward::{forward, ForwardOutcome, MAX_RETRY_ATTEMPTS};
pub use handler::router;
pub use session::{DecisionEntry, ProxySession};
pub use state::GatewayState;
pub use upstream::{
    ByteStream, UpstreamBody, UpstreamClient, UpstreamClientConfig, UpstreamHttpRequest,
    UpstreamHttpResponse, UpstreamTransportError, WreqUpstreamClient,
};
