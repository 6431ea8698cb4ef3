/// Shared error type used across all gateway crates.
///
/// Variants map onto the error kinds in the design: `InvalidInput`,
/// `NotFound`, `CycleDetected`, `Conflict`, `Unavailable`, `Timeout`, and
/// `Internal` are first-class so the Gateway RPC layer can translate them
/// into the wire failure shape by matching on kind rather than string
/// sniffing.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("cycle detected: assigning parent would make {offending_id} its own ancestor")]
    CycleDetected { offending_id: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("database: {0}")]
    Db(String),
}

impl Error {
    /// The error-kind name, used by the Gateway RPC wire translation and by
    /// tests asserting on kind rather than message text.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "InvalidInput",
            Error::NotFound(_) => "NotFound",
            Error::CycleDetected { .. } => "CycleDetected",
            Error::Conflict(_) => "Conflict",
            Error::Unavailable(_) => "Unavailable",
            Error::Timeout(_) => "Timeout",
            Error::Internal(_) => "Internal",
            Error::ToolNotFound(_) => "NotFound",
            Error::Io(_) => "Internal",
            Error::Json(_) => "InvalidInput",
            Error::Db(_) => "Internal",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
