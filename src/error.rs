/// every failure mode of the engine, by kind rather than by origin.
///
/// the split mirrors how callers recover: configuration and graph
/// errors are fatal and surfaced at init, encoding errors are caught
/// and retried inside mutation, and operand faults are skippable
/// during lenient program execution.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// parameters contradict structural requirements. fatal at init.
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// a program line write does not fit the encoding widths.
    #[error("line encoding overflow: {0}")]
    InvalidEncoding(String),

    /// an operand address falls outside the handler's address space.
    #[error("address {address} out of range for space of size {space}")]
    OutOfRange { address: u64, space: usize },

    /// a handler cannot provide the requested operand type.
    #[error("type mismatch: handler cannot provide {0}")]
    TypeMismatch(String),

    /// graph API misuse, e.g. adding an outgoing edge to an action.
    #[error("graph constraint violated: {0}")]
    GraphConstraint(String),

    /// substituted data sources do not match the program's environment.
    #[error("incompatible data sources: {0}")]
    IncompatibleDataSources(String),

    /// multi-threaded evaluation requested on a non-copyable environment.
    #[error("concurrency violation: {0}")]
    ConcurrencyViolation(String),

    /// graph deserialization failure.
    #[error("import error: {0}")]
    Import(String),
}

pub type Result<T> = std::result::Result<T, Error>;
