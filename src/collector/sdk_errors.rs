//! AWS SDK error inspection.
//!
//! Collection tasks need two things from an error: an exact error code, to
//! recognize expected-empty conditions (an entity that disappeared between
//! the listing and the detail call, a policy that was never attached), and a
//! coarse category for the per-task failure report. Anything that is not an
//! expected-empty condition propagates out of the task untouched.

use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;

/// The modeled error code of a service error, if the SDK surfaced one.
pub fn error_code<E, R>(err: &SdkError<E, R>) -> Option<&str>
where
    E: ProvideErrorMetadata,
{
    err.code()
}

/// True when the service returned exactly the given error code.
pub fn is_code<E, R>(err: &SdkError<E, R>, code: &str) -> bool
where
    E: ProvideErrorMetadata,
{
    error_code(err) == Some(code)
}

/// True when the service returned any of the given error codes.
pub fn is_any_code<E, R>(err: &SdkError<E, R>, codes: &[&str]) -> bool
where
    E: ProvideErrorMetadata,
{
    error_code(err).is_some_and(|code| codes.contains(&code))
}

/// Coarse failure categories for the scheduler's failure report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Request was throttled by the service
    Throttled,
    /// Request or operation deadline elapsed
    Timeout,
    /// Connection-level failure before a response arrived
    Network,
    /// AWS-side transient failure
    ServiceUnavailable,
    /// Permissions, validation, and everything else
    Other,
}

impl ErrorCategory {
    /// Short label for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            ErrorCategory::Throttled => "throttled",
            ErrorCategory::Timeout => "timeout",
            ErrorCategory::Network => "network",
            ErrorCategory::ServiceUnavailable => "unavailable",
            ErrorCategory::Other => "error",
        }
    }

    /// Categorize a task failure by its debug representation. The SDK's
    /// typed errors are long gone by the time a failure reaches the report,
    /// so this matches the known code patterns in the rendered chain.
    pub fn from_error(error: &anyhow::Error) -> Self {
        Self::from_error_string(&format!("{:?}", error))
    }

    fn from_error_string(detail: &str) -> Self {
        if detail.contains("ThrottlingException")
            || detail.contains("Throttling")
            || detail.contains("TooManyRequestsException")
            || detail.contains("RequestLimitExceeded")
            || detail.contains("RateExceeded")
        {
            return ErrorCategory::Throttled;
        }
        if detail.contains("TimeoutError") || detail.contains("timed out") {
            return ErrorCategory::Timeout;
        }
        if detail.contains("DispatchFailure")
            || detail.contains("ConnectorError")
            || detail.contains("connection")
        {
            return ErrorCategory::Network;
        }
        if detail.contains("ServiceUnavailable")
            || detail.contains("InternalServerError")
            || detail.contains("InternalServerException")
        {
            return ErrorCategory::ServiceUnavailable;
        }
        ErrorCategory::Other
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn throttling_is_categorized() {
        let cat = ErrorCategory::from_error_string("ThrottlingException: Rate exceeded");
        assert_eq!(cat, ErrorCategory::Throttled);
        assert_eq!(cat.label(), "throttled");
    }

    #[test]
    fn timeouts_are_categorized() {
        let cat = ErrorCategory::from_error_string("request timed out after 30s");
        assert_eq!(cat, ErrorCategory::Timeout);
    }

    #[test]
    fn dispatch_failures_are_network() {
        let cat = ErrorCategory::from_error_string("DispatchFailure: connection refused");
        assert_eq!(cat, ErrorCategory::Network);
    }

    #[test]
    fn server_faults_are_unavailable() {
        let cat = ErrorCategory::from_error_string("InternalServerException: try again");
        assert_eq!(cat, ErrorCategory::ServiceUnavailable);
    }

    #[test]
    fn unknown_errors_fall_through() {
        let cat = ErrorCategory::from_error_string("AccessDeniedException: not authorized");
        assert_eq!(cat, ErrorCategory::Other);
        assert_eq!(cat.label(), "error");
    }
}
