//! Announces the plugin to the node agent.
//!
//! Registration is a single unary call on the agent's socket carrying the
//! plugin's socket file name and resource name. The agent may not be up yet
//! when the plugin starts, so unreachable sockets and `UNAVAILABLE` replies
//! are retried with bounded exponential backoff. Any other reply is final.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tonic::Code;
use tracing::{info, warn};

use dummydev_api::VERSION;
use dummydev_api::v1beta1::RegisterRequest;
use dummydev_api::v1beta1::registration_client::RegistrationClient;
use dummydev_config::Config;

use crate::service::plugin_options;
use crate::transport::connect_unix;

const REGISTRATION_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::registration");

/// Bounded exponential backoff between registration attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts before giving up, including the first.
    pub max_attempts: u32,
    /// Delay after the first failed attempt.
    pub initial_delay: Duration,
    /// Ceiling for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Policy described by the registration settings in `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.registration_attempts,
            initial_delay: config.registration_backoff(),
            max_delay: config.registration_backoff_max(),
        }
    }

    /// Delay to wait after the `attempt`-th failure (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1_u32 << exponent)
            .min(self.max_delay)
    }
}

/// Errors that abort registration.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The node agent answered with a non-retryable status.
    #[error("node agent rejected registration ({code:?}): {message}")]
    Rejected {
        /// gRPC status code returned by the agent.
        code: Code,
        /// Status message returned by the agent.
        message: String,
    },
    /// Every attempt failed with a retryable error.
    #[error("registration failed after {attempts} attempts: {last}")]
    Exhausted {
        /// Attempts made.
        attempts: u32,
        /// Description of the final failure.
        last: String,
    },
}

enum AttemptError {
    Retry(String),
    Reject { code: Code, message: String },
}

/// Sends the registration request to the node agent.
#[derive(Debug, Clone)]
pub struct Registrar {
    host_socket: Utf8PathBuf,
    request: RegisterRequest,
    policy: RetryPolicy,
    dial_timeout: Duration,
}

impl Registrar {
    /// Builds a registrar for `endpoint` (a socket file name) and
    /// `resource_name`.
    #[must_use]
    pub fn new(
        host_socket: &Utf8Path,
        endpoint: &str,
        resource_name: &str,
        policy: RetryPolicy,
        dial_timeout: Duration,
    ) -> Self {
        Self {
            host_socket: host_socket.to_path_buf(),
            request: RegisterRequest {
                version: VERSION.to_owned(),
                endpoint: endpoint.to_owned(),
                resource_name: resource_name.to_owned(),
                options: Some(plugin_options()),
            },
            policy,
            dial_timeout,
        }
    }

    /// Registrar described by `config`.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let paths = config.paths();
        Self::new(
            paths.host_socket_path(),
            paths.endpoint(),
            &config.resource_name,
            RetryPolicy::from_config(config),
            config.dial_timeout(),
        )
    }

    /// Request sent on every attempt.
    #[must_use]
    pub fn request(&self) -> &RegisterRequest {
        &self.request
    }

    /// Registers, retrying transient failures.
    ///
    /// Returns the number of attempts used.
    pub async fn register(&self) -> Result<u32, RegistrationError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.attempt().await {
                Ok(()) => {
                    info!(
                        target: REGISTRATION_TARGET,
                        host = %self.host_socket,
                        endpoint = %self.request.endpoint,
                        resource = %self.request.resource_name,
                        attempt,
                        "registered with node agent"
                    );
                    return Ok(attempt);
                }
                Err(AttemptError::Reject { code, message }) => {
                    return Err(RegistrationError::Rejected { code, message });
                }
                Err(AttemptError::Retry(reason)) => {
                    if attempt >= self.policy.max_attempts {
                        return Err(RegistrationError::Exhausted {
                            attempts: attempt,
                            last: reason,
                        });
                    }
                    let delay = self.policy.delay_after(attempt);
                    warn!(
                        target: REGISTRATION_TARGET,
                        host = %self.host_socket,
                        attempt,
                        delay_ms = delay.as_millis(),
                        reason = %reason,
                        "registration attempt failed; retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn attempt(&self) -> Result<(), AttemptError> {
        let channel = connect_unix(&self.host_socket, self.dial_timeout)
            .await
            .map_err(|error| AttemptError::Retry(error.to_string()))?;
        let mut client = RegistrationClient::new(channel);
        let call = client.register(self.request.clone());
        match tokio::time::timeout(self.dial_timeout, call).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(status)) if status.code() == Code::Unavailable => {
                Err(AttemptError::Retry(status.message().to_owned()))
            }
            Ok(Err(status)) => Err(AttemptError::Reject {
                code: status.code(),
                message: status.message().to_owned(),
            }),
            Err(_) => Err(AttemptError::Retry(format!(
                "no reply within {}ms",
                self.dial_timeout.as_millis()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(1, 500)]
    #[case(2, 1_000)]
    #[case(4, 4_000)]
    #[case(5, 8_000)]
    #[case(9, 8_000)]
    #[case(u32::MAX, 8_000)]
    fn backoff_doubles_up_to_the_ceiling(#[case] attempt: u32, #[case] expected_ms: u64) {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(attempt), Duration::from_millis(expected_ms));
    }

    #[test]
    fn request_names_the_socket_file_not_its_path() {
        let config = Config::default();
        let registrar = Registrar::from_config(&config);
        let request = registrar.request();

        assert_eq!(request.version, "v1beta1");
        assert_eq!(request.endpoint, "dummy.sock");
        assert_eq!(request.resource_name, "dummy/dummyDev");
        assert_eq!(request.options, Some(plugin_options()));
    }
}
