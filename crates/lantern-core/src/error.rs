use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Graph construction error: {0}")]
    GraphConstruction(String),

    #[error("No quiet window found: {0}")]
    NoQuietWindow(String),

    #[error("Metric prerequisite not met: {0}")]
    MetricPrerequisite(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Stable machine-readable code for this error, suitable for surfacing
    /// to a report layer alongside the human-readable message.
    pub fn code(&self) -> &'static str {
        match self {
            Error::GraphConstruction(_) => "GRAPH_CONSTRUCTION",
            Error::NoQuietWindow(_) => "NO_QUIET_WINDOW",
            Error::MetricPrerequisite(_) => "METRIC_PREREQUISITE",
            Error::MalformedInput(_) => "MALFORMED_INPUT",
            Error::Serialization(_) => "SERIALIZATION",
            Error::Other(_) => "OTHER",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            Error::GraphConstruction("x".to_string()).code(),
            "GRAPH_CONSTRUCTION"
        );
        assert_eq!(Error::NoQuietWindow("x".to_string()).code(), "NO_QUIET_WINDOW");
        assert_eq!(
            Error::MetricPrerequisite("x".to_string()).code(),
            "METRIC_PREREQUISITE"
        );
    }

    #[test]
    fn test_error_display_includes_message() {
        let err = Error::GraphConstruction("root node is not related to the main document".into());
        assert!(err.to_string().contains("main document"));
    }
}
