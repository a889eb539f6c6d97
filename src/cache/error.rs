//! Error taxonomy for cache operations
//!
//! Runtime failures are classified so call sites can decide between retrying,
//! degrading to the memory tier, or surfacing a miss. Only configuration
//! errors are fatal, and only at construction time.

/// Cache operation error types with retry classification
///
/// Shared-tier failures never escape `get`/`set`; they are recorded and the
/// operation degrades. The variants here describe what went wrong on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Invalid configuration detected at construction
    Configuration(String),
    /// Connection establishment or transport failure
    Connection(String),
    /// An operation exceeded its timeout or deadline
    Timeout(String),
    /// No pooled connection became available within the checkout timeout
    PoolExhausted,
    /// The circuit breaker is open; the call was short-circuited
    CircuitOpen,
    /// A stored payload or envelope could not be decoded
    Serialization(String),
    /// A payload could not be decompressed
    Compression(String),
    /// The shared store rejected a command (e.g. authorization failure)
    Protocol(String),
    /// Caller passed an invalid argument
    InvalidArgument(String),
    /// The cache has been shut down
    ShuttingDown,
}

impl std::fmt::Display for CacheError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            CacheError::Connection(msg) => write!(f, "Connection error: {}", msg),
            CacheError::Timeout(msg) => write!(f, "Operation timed out: {}", msg),
            CacheError::PoolExhausted => write!(f, "Connection pool exhausted"),
            CacheError::CircuitOpen => write!(f, "Shared tier circuit is open"),
            CacheError::Serialization(msg) => write!(f, "Serialization error: {}", msg),
            CacheError::Compression(msg) => write!(f, "Compression error: {}", msg),
            CacheError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            CacheError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CacheError::ShuttingDown => write!(f, "Cache is shutting down"),
        }
    }
}

impl std::error::Error for CacheError {}

impl CacheError {
    /// Create configuration error
    #[inline(always)]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create connection error
    #[inline(always)]
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    /// Create timeout error
    #[inline(always)]
    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    /// Create serialization error
    #[inline(always)]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create compression error
    #[inline(always)]
    pub fn compression(msg: impl Into<String>) -> Self {
        Self::Compression(msg.into())
    }

    /// Create protocol error
    #[inline(always)]
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create invalid argument error
    #[inline(always)]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Whether a bounded retry of the same operation may succeed
    ///
    /// Transport failures and timeouts are transient. Protocol rejections
    /// (authorization and friends), pool starvation, and decode failures are
    /// not; retrying those only burns the attempt budget.
    pub fn retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Timeout(_))
    }

    /// Whether this error marks the shared tier as failing for circuit purposes
    ///
    /// Pool starvation is local resource pressure, not remote failure, so it
    /// does not feed the breaker.
    pub fn counts_against_circuit(&self) -> bool {
        matches!(
            self,
            Self::Connection(_) | Self::Timeout(_) | Self::Protocol(_)
        )
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_classification() {
        assert!(CacheError::connection("reset").retryable());
        assert!(CacheError::timeout("read").retryable());
        assert!(!CacheError::PoolExhausted.retryable());
        assert!(!CacheError::protocol("NOAUTH").retryable());
        assert!(!CacheError::serialization("bad envelope").retryable());
        assert!(!CacheError::CircuitOpen.retryable());
    }

    #[test]
    fn circuit_classification() {
        assert!(CacheError::connection("refused").counts_against_circuit());
        assert!(CacheError::protocol("NOAUTH").counts_against_circuit());
        assert!(!CacheError::PoolExhausted.counts_against_circuit());
        assert!(!CacheError::CircuitOpen.counts_against_circuit());
    }
}
