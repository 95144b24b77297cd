use std::fmt;
use thiserror::Error;

const NON_INDEXED_FILTER_CODE: &str = "invalidrequest";
const NON_INDEXED_FILTER_DETAIL: &str =
    "cannot be referenced in filter or orderby as it is not indexed";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShiftError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),
    #[error("{0}")]
    Remote(RemoteStoreError),
    #[error("generation stopped after creating {created} instance(s) ({skipped} skipped): {reason}")]
    GenerationIncomplete {
        created: usize,
        skipped: usize,
        reason: String,
    },
}

impl ShiftError {
    pub fn remote_status(&self) -> Option<u16> {
        match self {
            Self::Remote(remote) => Some(remote.status),
            _ => None,
        }
    }

    pub fn is_non_indexed_filter_rejection(&self) -> bool {
        match self {
            Self::Remote(remote) => remote.is_non_indexed_filter_rejection(),
            _ => false,
        }
    }
}

/// A non-success answer from the list store, with the store's own error code
/// and the raw response body kept in `details`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStoreError {
    pub status: u16,
    pub code: Option<String>,
    pub message: String,
    pub details: String,
}

impl RemoteStoreError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            code: None,
            message: message.into(),
            details: String::new(),
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }

    pub fn is_non_indexed_filter_rejection(&self) -> bool {
        if self.status != 400 {
            return false;
        }

        let code_matches = self
            .code
            .as_deref()
            .map(|code| code == "invalidRequest")
            .unwrap_or(false)
            || self
                .message
                .to_ascii_lowercase()
                .contains(NON_INDEXED_FILTER_CODE);

        code_matches
            && self
                .details
                .to_ascii_lowercase()
                .contains(NON_INDEXED_FILTER_DETAIL)
    }
}

impl fmt::Display for RemoteStoreError {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.message)
    }
}
