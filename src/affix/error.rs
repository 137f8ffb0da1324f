//! Error definitions for the affix stack.

use thiserror::Error;

/// Errors that can occur while assembling or driving an affix stack.
#[derive(Debug, Error)]
pub enum AffixError {
    /// An operation was invoked that the component does not provide.
    #[error("{component} does not implement {operation}")]
    Unimplemented {
        component: String,
        operation: &'static str,
    },

    /// `pop` was called on a node whose successor is the network sentinel.
    #[error("Stack underflow: nothing beneath {0} to pop")]
    StackUnderflow(String),

    /// The node was popped off its chain and no longer has a successor.
    #[error("Affix {0} is detached from its stack")]
    Detached(String),

    /// Pushing the node would link the chain back onto itself.
    #[error("Pushing {pushed} beneath {target} would create a cycle")]
    Cycle { pushed: String, target: String },

    /// A stack description named an affix the registry does not know.
    #[error("Unknown affix: {0}")]
    UnknownAffix(String),

    /// A stack description could not be parsed.
    #[error("Malformed stack description at byte {position}: {reason}")]
    MalformedStack { position: usize, reason: String },

    /// An affix rejected the arguments it was constructed with.
    #[error("Invalid arguments for {affix}: {reason}")]
    InvalidArguments { affix: String, reason: String },

    /// The handle was already closed.
    #[error("Socket closed")]
    SocketClosed,

    /// I/O failure from the primitive network API.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AffixError {
    pub fn unimplemented(component: impl Into<String>, operation: &'static str) -> Self {
        Self::Unimplemented {
            component: component.into(),
            operation,
        }
    }

    /// True for the two stack-shape failures a caller is expected to handle.
    pub fn is_stack_error(&self) -> bool {
        matches!(self, Self::StackUnderflow(_) | Self::Detached(_) | Self::Cycle { .. })
    }
}

/// Result type for affix operations.
pub type AffixResult<T> = Result<T, AffixError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AffixError::StackUnderflow("(NoopAffix)".into());
        assert_eq!(err.to_string(), "Stack underflow: nothing beneath (NoopAffix) to pop");

        let err = AffixError::unimplemented("MemoryNetwork", "resolve_name");
        assert_eq!(err.to_string(), "MemoryNetwork does not implement resolve_name");
    }

    #[test]
    fn test_io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        let err: AffixError = io.into();
        assert!(matches!(err, AffixError::Io(ref e) if e.kind() == std::io::ErrorKind::ConnectionRefused));
        assert!(!err.is_stack_error());
    }
}
