//! Failures from rebinding a notebook session to a kernel.

use serde::Serialize;

/// Error returned when a session could not be bound to a kernel.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("Failed to start a session for kernel {kernel}: {reason}")]
    SessionStart { kernel: String, reason: String },

    #[error("Kernel {kernel} is not valid: {reason}")]
    InvalidKernel { kernel: String, reason: String },

    #[error("Failed to start a raw kernel session for {kernel}: {reason}")]
    RawSessionStart { kernel: String, reason: String },

    #[error("Kernel {kernel} did not respond within {timeout_ms}ms")]
    Timeout { kernel: String, timeout_ms: u64 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Discriminant of [`KernelError`], without the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    SessionStart,
    InvalidKernel,
    RawSessionStart,
    Timeout,
    Other,
}

impl FailureKind {
    /// Kinds for which asking the user for a different kernel can help.
    pub const RECOVERABLE: [FailureKind; 3] = [
        FailureKind::SessionStart,
        FailureKind::InvalidKernel,
        FailureKind::RawSessionStart,
    ];

    pub fn is_recoverable(self) -> bool {
        match self {
            FailureKind::SessionStart | FailureKind::InvalidKernel | FailureKind::RawSessionStart => {
                true
            }
            FailureKind::Timeout | FailureKind::Other => false,
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::SessionStart => write!(f, "session_start"),
            FailureKind::InvalidKernel => write!(f, "invalid_kernel"),
            FailureKind::RawSessionStart => write!(f, "raw_session_start"),
            FailureKind::Timeout => write!(f, "timeout"),
            FailureKind::Other => write!(f, "other"),
        }
    }
}

impl KernelError {
    pub fn kind(&self) -> FailureKind {
        match self {
            KernelError::SessionStart { .. } => FailureKind::SessionStart,
            KernelError::InvalidKernel { .. } => FailureKind::InvalidKernel,
            KernelError::RawSessionStart { .. } => FailureKind::RawSessionStart,
            KernelError::Timeout { .. } => FailureKind::Timeout,
            KernelError::Other(_) => FailureKind::Other,
        }
    }

    /// Whether re-prompting for a different kernel is a meaningful remedy.
    pub fn is_recoverable(&self) -> bool {
        self.kind().is_recoverable()
    }

    pub fn session_start(kernel: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        KernelError::SessionStart {
            kernel: kernel.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_kernel(kernel: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        KernelError::InvalidKernel {
            kernel: kernel.into(),
            reason: reason.to_string(),
        }
    }

    pub fn raw_session_start(kernel: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        KernelError::RawSessionStart {
            kernel: kernel.into(),
            reason: reason.to_string(),
        }
    }
}
