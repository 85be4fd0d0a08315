use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouteError {
    #[error("invalid route request: {0}")]
    Validation(&'static str),
    #[error("backend request failed: {0}")]
    Network(String),
    /// A newer request or a selection change was issued while this one was in flight.
    #[error("route response superseded by a newer request")]
    Superseded,
}

impl From<reqwest::Error> for RouteError {
    fn from(err: reqwest::Error) -> Self {
        RouteError::Network(err.to_string())
    }
}
