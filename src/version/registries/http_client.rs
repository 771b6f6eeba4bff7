//! Shared HTTP client and response checks for registry clients

use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use tracing::warn;

use crate::config::FETCH_TIMEOUT_MS;
use crate::version::error::RegistryError;

const USER_AGENT: &str = concat!("manifest-lens/", env!("CARGO_PKG_VERSION"));

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

/// One client for every registry so connections and TLS sessions are reused
pub fn create_shared_client() -> Result<Arc<Client>, RegistryError> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_millis(FETCH_TIMEOUT_MS))
        .connect_timeout(CONNECT_TIMEOUT)
        .pool_idle_timeout(POOL_IDLE_TIMEOUT)
        .pool_max_idle_per_host(10)
        .build()?;

    Ok(Arc::new(client))
}

/// Map non-success statuses to registry errors
pub(crate) fn check_status(
    response: Response,
    package_name: &str,
) -> Result<Response, RegistryError> {
    let status = response.status();

    if status == StatusCode::NOT_FOUND {
        return Err(RegistryError::NotFound(package_name.to_string()));
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        return Err(RegistryError::RateLimited {
            retry_after_secs: retry_after,
        });
    }

    if !status.is_success() {
        warn!("Registry returned status {}: {}", status, response.url());
        return Err(RegistryError::InvalidResponse(format!(
            "Unexpected status: {}",
            status
        )));
    }

    Ok(response)
}
