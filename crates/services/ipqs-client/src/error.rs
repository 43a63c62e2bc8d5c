use crate::verdict::Verdict;
use thiserror::Error;

/// Errors produced while validating a proxy URL.
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("proxy protocol '{0}' is not supported, expected one of: http, https, socks5")]
    InvalidProtocol(String),

    #[error("invalid proxy URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

/// Errors that can occur while provisioning a client.
#[derive(Error, Debug)]
pub enum ProvisionError {
    #[error(transparent)]
    Proxy(#[from] ProxyError),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

/// Outcome of a lookup that did not classify the key as clean.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupError {
    #[error("bad ip reputation")]
    BadReputation,

    #[error("ip reputation could not be classified")]
    Unclassified,

    #[error("lookup cancelled")]
    Cancelled,

    #[error("lookup deadline exceeded")]
    DeadlineExceeded,
}

impl LookupError {
    /// The verdict behind this error, if the lookup reached a classification.
    pub fn verdict(&self) -> Option<Verdict> {
        match self {
            LookupError::BadReputation => Some(Verdict::Bad),
            LookupError::Unclassified => Some(Verdict::Unknown),
            LookupError::Cancelled | LookupError::DeadlineExceeded => None,
        }
    }

    /// True for `Cancelled` and `DeadlineExceeded`.
    pub fn is_cancellation(&self) -> bool {
        self.verdict().is_none()
    }
}

/// Converts a verdict into the result a caller of `lookup` observes.
pub(crate) fn verdict_result(verdict: Verdict) -> Result<(), LookupError> {
    match verdict {
        Verdict::Good => Ok(()),
        Verdict::Bad => Err(LookupError::BadReputation),
        Verdict::Unknown => Err(LookupError::Unclassified),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verdict_round_trips_through_result() {
        for verdict in [Verdict::Good, Verdict::Bad, Verdict::Unknown] {
            let observed = match verdict_result(verdict) {
                Ok(()) => Verdict::Good,
                Err(e) => e.verdict().expect("classified error carries a verdict"),
            };
            assert_eq!(observed, verdict);
        }
    }

    #[test]
    fn cancellation_has_no_verdict() {
        assert!(LookupError::Cancelled.is_cancellation());
        assert!(LookupError::DeadlineExceeded.is_cancellation());
        assert!(!LookupError::BadReputation.is_cancellation());
    }
}
