//! Kernel connection identities.

use serde::{Deserialize, Serialize};

/// How a notebook reaches its kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionKind {
    /// Launch a kernel from a kernelspec installed on this machine.
    LocalKernelspec,
    /// Launch ipykernel from a specific Python interpreter.
    PythonInterpreter,
    /// Start a kernel from a kernelspec on a remote Jupyter server.
    RemoteKernelspec,
    /// Attach to a kernel that is already running on a remote server.
    LiveRemoteKernel,
}

impl ConnectionKind {
    fn tag(self) -> &'static str {
        match self {
            ConnectionKind::LocalKernelspec => "local_kernelspec",
            ConnectionKind::PythonInterpreter => "python_interpreter",
            ConnectionKind::RemoteKernelspec => "remote_kernelspec",
            ConnectionKind::LiveRemoteKernel => "live_remote_kernel",
        }
    }

    /// Whether kernels of this kind run on the same machine as the editor.
    pub fn is_local_launch(self) -> bool {
        matches!(
            self,
            ConnectionKind::LocalKernelspec | ConnectionKind::PythonInterpreter
        )
    }
}

impl std::fmt::Display for ConnectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionKind::LocalKernelspec => write!(f, "local kernelspec"),
            ConnectionKind::PythonInterpreter => write!(f, "python interpreter"),
            ConnectionKind::RemoteKernelspec => write!(f, "remote kernelspec"),
            ConnectionKind::LiveRemoteKernel => write!(f, "live remote kernel"),
        }
    }
}

/// Which kernel a notebook is (or should be) bound to.
///
/// Connections are treated as opaque values and compared by `id` only, so a
/// display name change does not make two connections differ.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelConnection {
    /// Stable identity of this connection.
    pub id: String,
    /// Human-readable name shown in pickers and progress titles.
    pub display_name: String,
    /// Kernelspec used to launch the kernel.
    pub kernelspec_name: String,
    pub kind: ConnectionKind,
    /// Whether the kernel process runs on this machine.
    pub local_launch: bool,
}

impl KernelConnection {
    /// A connection that launches the named kernelspec locally.
    pub fn local_kernelspec(
        kernelspec_name: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self::new(ConnectionKind::LocalKernelspec, kernelspec_name, display_name)
    }

    /// A connection that starts the named kernelspec on a remote server.
    pub fn remote_kernelspec(
        kernelspec_name: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        Self::new(ConnectionKind::RemoteKernelspec, kernelspec_name, display_name)
    }

    /// Build a connection of the given kind. The id is derived from the kind
    /// and kernelspec name, and locality follows the kind.
    pub fn new(
        kind: ConnectionKind,
        kernelspec_name: impl Into<String>,
        display_name: impl Into<String>,
    ) -> Self {
        let kernelspec_name = kernelspec_name.into();
        Self {
            id: format!("{}:{}", kind.tag(), kernelspec_name),
            display_name: display_name.into(),
            kernelspec_name,
            kind,
            local_launch: kind.is_local_launch(),
        }
    }

    /// A connection without an id carries no kernel to switch to.
    pub fn is_empty(&self) -> bool {
        self.id.trim().is_empty()
    }
}

impl PartialEq for KernelConnection {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for KernelConnection {}

impl std::fmt::Display for KernelConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.display_name.is_empty() {
            write!(f, "{}", self.kernelspec_name)
        } else {
            write!(f, "{}", self.display_name)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_kernelspec_is_local_launch() {
        let conn = KernelConnection::local_kernelspec("python3", "Python 3");
        assert_eq!(conn.id, "local_kernelspec:python3");
        assert_eq!(conn.kind, ConnectionKind::LocalKernelspec);
        assert!(conn.local_launch);
    }

    #[test]
    fn test_remote_kernelspec_is_not_local_launch() {
        let conn = KernelConnection::remote_kernelspec("python3", "Python 3 (remote)");
        assert_eq!(conn.id, "remote_kernelspec:python3");
        assert!(!conn.local_launch);
        assert_ne!(conn, KernelConnection::local_kernelspec("python3", "Python 3"));
    }

    #[test]
    fn test_equality_ignores_display_name() {
        let a = KernelConnection::local_kernelspec("deno", "Deno");
        let b = KernelConnection::local_kernelspec("deno", "Deno 2.1");
        assert_eq!(a, b);
    }

    #[test]
    fn test_is_empty() {
        let mut conn = KernelConnection::local_kernelspec("python3", "Python 3");
        assert!(!conn.is_empty());
        conn.id = "  ".into();
        assert!(conn.is_empty());
    }

    #[test]
    fn test_display_falls_back_to_kernelspec_name() {
        let mut conn = KernelConnection::local_kernelspec("julia-1.10", "Julia 1.10");
        assert_eq!(conn.to_string(), "Julia 1.10");
        conn.display_name.clear();
        assert_eq!(conn.to_string(), "julia-1.10");
    }

    #[test]
    fn test_connection_kind_serde() {
        assert_eq!(
            serde_json::to_string(&ConnectionKind::LiveRemoteKernel).unwrap(),
            "\"live_remote_kernel\""
        );
        let parsed: ConnectionKind = serde_json::from_str("\"python_interpreter\"").unwrap();
        assert_eq!(parsed, ConnectionKind::PythonInterpreter);
        assert!(parsed.is_local_launch());
    }
}
