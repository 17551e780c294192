//! Collaborators the switcher drives: the notebook session being rebound and
//! the picker that offers a replacement kernel.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::connection::KernelConnection;
use crate::error::KernelError;

/// One open notebook's execution context.
///
/// Owns at most one kernel connection at a time. Rebinding takes `&mut self`,
/// so a session can never see two attempts in flight.
#[async_trait]
pub trait NotebookSession: Send {
    /// Notebook file the session belongs to, if it has been saved.
    fn resource(&self) -> Option<&Path>;

    /// The kernel the session is currently bound to.
    fn connection(&self) -> Option<&KernelConnection>;

    /// (Re)associate the session with `connection`, waiting at most `timeout`
    /// for the kernel to come up.
    async fn rebind_kernel(
        &mut self,
        connection: &KernelConnection,
        timeout: Duration,
    ) -> Result<(), KernelError>;
}

/// Asks the user for a different kernel after one failed to start.
#[async_trait]
pub trait KernelPicker: Send + Sync {
    /// Returns `None` when the user declined to pick a kernel.
    async fn ask_for_replacement(
        &self,
        resource: Option<&Path>,
        current: Option<&KernelConnection>,
        failing: &KernelConnection,
    ) -> Option<KernelConnection>;
}
