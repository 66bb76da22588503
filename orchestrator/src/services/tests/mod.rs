//! Service-specific tests
//!
//! Each service has its own test file. HTTP collaborators are exercised
//! against `wiremock` servers, file stores against temporary directories.

mod openai_filter;

// Common test utilities for services
pub mod common {
    use std::time::Duration;

    /// Client timeout used against mock servers
    pub const CLIENT_TIMEOUT: Duration = Duration::from_millis(500);

    /// Response delay that always exceeds `CLIENT_TIMEOUT`
    pub const SLOW_RESPONSE: Duration = Duration::from_secs(3);
}
