//! Separating limiter conditions from genuine failures

use crate::gateway::GatewayError;
use crate::models::SearchLimitSignal;
use crate::scheduler::SchedulerError;

/// Why a scheduled vendor call produced no answer
#[derive(Debug, Clone, PartialEq)]
pub enum SearchFailure {
    /// Never started because the scheduler queue was full
    Dropped,
    Gateway(GatewayError),
}

impl From<SchedulerError> for SearchFailure {
    fn from(_: SchedulerError) -> Self {
        SearchFailure::Dropped
    }
}

impl From<GatewayError> for SearchFailure {
    fn from(error: GatewayError) -> Self {
        SearchFailure::Gateway(error)
    }
}

/// Map a failure onto the limiter signal it represents, if any.
///
/// 429 is the API key limit; 500, 502 and 504 are the vendor gateway timing
/// out. Every other failure is a genuine error.
pub fn reached_search_limit(failure: &SearchFailure) -> Option<SearchLimitSignal> {
    match failure {
        SearchFailure::Dropped => Some(SearchLimitSignal::queue_limit()),
        SearchFailure::Gateway(error) => gateway_limit(error),
    }
}

/// The limiter signal behind a classified vendor error, if any
pub fn gateway_limit(error: &GatewayError) -> Option<SearchLimitSignal> {
    match error {
        GatewayError::Network {
            connection_reset: true,
            ..
        } => Some(SearchLimitSignal::connection_reset()),
        GatewayError::Throttled { status: 429, .. } => Some(SearchLimitSignal::api_key_limit()),
        GatewayError::Throttled {
            status: 500 | 502 | 504,
            ..
        } => Some(SearchLimitSignal::gateway_timeout()),
        _ => None,
    }
}

/// Limiter events seen while serving one request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LimitCounters {
    pub connection_reset: u32,
    pub throttled: u32,
    pub quota_limited: u32,
}

impl LimitCounters {
    pub fn record(&mut self, signal: &SearchLimitSignal) {
        if signal.is_connection_reset {
            self.connection_reset += 1;
            metrics::counter!("ptintel_search_limit_total", "reason" => "connection_reset")
                .increment(1);
        }
        if signal.is_gateway_timeout || signal.max_request_queue_limit_hit {
            self.throttled += 1;
            metrics::counter!("ptintel_search_limit_total", "reason" => "throttled").increment(1);
        }
        if signal.api_key_limit_reached {
            self.quota_limited += 1;
            metrics::counter!("ptintel_search_limit_total", "reason" => "quota_limited")
                .increment(1);
        }
    }

    pub fn any(&self) -> bool {
        self.connection_reset + self.throttled + self.quota_limited > 0
    }

    /// Warn once per request when anything was limited
    pub fn log_summary(&self) {
        if self.any() {
            tracing::warn!(
                connection_reset = self.connection_reset,
                throttled = self.throttled,
                quota_limited = self.quota_limited,
                "PassiveTotal search limits were reached; affected results are volatile"
            );
        }
    }
}
