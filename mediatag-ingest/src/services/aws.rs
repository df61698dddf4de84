//! Shared AWS SDK configuration and error classification

use aws_config::retry::RetryConfig;
use aws_config::timeout::TimeoutConfig;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use std::time::Duration;
use tracing::debug;

use crate::config::AwsSettings;

/// Load the SDK configuration shared by every client
///
/// Retries are disabled: a failed call fails the invocation and the event
/// source redelivers the whole event.
pub async fn load_sdk_config(settings: &AwsSettings) -> SdkConfig {
    let mut loader =
        aws_config::defaults(BehaviorVersion::latest()).retry_config(RetryConfig::disabled());

    if let Some(region) = &settings.region {
        loader = loader.region(Region::new(region.clone()));
    }

    if let Some(endpoint) = &settings.endpoint_url {
        debug!(endpoint = %endpoint, "Using AWS endpoint override");
        loader = loader.endpoint_url(endpoint);
    }

    if let Some(timeout_ms) = settings.timeout_ms {
        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(Duration::from_millis(timeout_ms))
            .build();
        loader = loader.timeout_config(timeout_config);
    }

    loader.load().await
}

/// Transport-independent view of an `SdkError`
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SdkFailure {
    /// The service answered with an error code
    Service { code: String, message: String },
    Timeout(String),
    Dispatch(String),
    Construction(String),
    Response(String),
}

/// Classify an `SdkError` from any AWS client
pub(crate) fn classify_sdk_error<E, R>(err: &SdkError<E, R>) -> SdkFailure
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = DisplayErrorContext(err).to_string();
    match err {
        SdkError::ServiceError(service_err) => SdkFailure::Service {
            code: service_err.err().code().unwrap_or("Unknown").to_string(),
            message,
        },
        SdkError::TimeoutError(_) => SdkFailure::Timeout(message),
        SdkError::DispatchFailure(_) => SdkFailure::Dispatch(message),
        SdkError::ConstructionFailure(_) => SdkFailure::Construction(message),
        _ => SdkFailure::Response(message),
    }
}
