#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("no store endpoints configured")]
    NoEndpoints,
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("cannot resolve address: {0}")]
    Resolve(String),
    #[error("no tokio runtime available")]
    NoRuntime,
    #[error("client pool shut down")]
    Stopped,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
