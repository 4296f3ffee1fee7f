//! Authenticated session bound to one credential set and one region.

use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_smithy_types::timeout::TimeoutConfig;
use aws_types::region::Region;
use aws_types::SdkConfig;
use std::time::Duration;
use tracing::debug;

/// A single remote call may not exceed this before the transport gives up
/// on the attempt and retries.
const ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Upper bound on one operation across all retry attempts. Without this a
/// hung call would pin a worker slot for the rest of the run.
const OPERATION_TIMEOUT: Duration = Duration::from_secs(300);

/// One authenticated (credentials, region) context. Owned by a single
/// collection run; tasks share its config through the client cache.
pub struct Session {
    config: SdkConfig,
    region: String,
}

impl Session {
    pub async fn new(credentials: Credentials, region: &str) -> Self {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(region.to_string()))
            .credentials_provider(credentials)
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_attempt_timeout(ATTEMPT_TIMEOUT)
                    .operation_timeout(OPERATION_TIMEOUT)
                    .build(),
            )
            .load()
            .await;
        debug!(region, "created session config");
        Self {
            config,
            region: region.to_string(),
        }
    }

    pub fn config(&self) -> &SdkConfig {
        &self.config
    }

    pub fn region(&self) -> &str {
        &self.region
    }
}
