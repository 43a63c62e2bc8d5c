use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Trust classification assigned to a lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// The service has no record of abuse for the key.
    Good,
    /// The service reports the key negatively.
    Bad,
    /// The lookup could not be classified (transport failure, unexpected status).
    Unknown,
}

impl Verdict {
    /// Maps a backend status code onto a verdict.
    ///
    /// 404 means the backend holds no record, 200 means a record exists.
    /// Every other status is unclassified.
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => Verdict::Good,
            200 => Verdict::Bad,
            _ => Verdict::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Good => "good",
            Verdict::Bad => "bad",
            Verdict::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unrecognised verdict '{0}', expected one of: good, bad, unknown")]
pub struct ParseVerdictError(pub String);

impl FromStr for Verdict {
    type Err = ParseVerdictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "good" => Ok(Verdict::Good),
            "bad" => Ok(Verdict::Bad),
            "unknown" => Ok(Verdict::Unknown),
            _ => Err(ParseVerdictError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_is_total() {
        assert_eq!(Verdict::from_status(404), Verdict::Good);
        assert_eq!(Verdict::from_status(200), Verdict::Bad);
        for status in [100, 201, 204, 301, 400, 401, 403, 429, 500, 502, 503] {
            assert_eq!(Verdict::from_status(status), Verdict::Unknown, "status {}", status);
        }
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("GOOD".parse::<Verdict>(), Ok(Verdict::Good));
        assert_eq!("Bad".parse::<Verdict>(), Ok(Verdict::Bad));
        assert!("meh".parse::<Verdict>().is_err());
    }
}
