//! Local collaborators for kernel switching.
//!
//! - [`LocalNotebookSession`] launches kernels from kernelspecs installed on
//!   this machine and binds them to a notebook.
//! - [`KernelspecPicker`] offers the other installed kernelspecs when one
//!   fails to start.
//!
//! ```ignore
//! use std::sync::Arc;
//! use kernel_launch::{KernelspecPicker, LocalNotebookSession};
//! use kernel_switch::{KernelSwitcher, LogHandler};
//!
//! let picker = KernelspecPicker::new(Arc::new(|offered, _failing| Some(0)));
//! let switcher = KernelSwitcher::new(settings, Arc::new(picker), Arc::new(LogHandler));
//! let mut session = LocalNotebookSession::new(Some(notebook_path));
//! switcher.switch_kernel_with_retry(&mut session, target).await?;
//! ```

pub mod local_session;
pub mod picker;

// Re-export commonly used items
pub use local_session::LocalNotebookSession;
pub use picker::{list_kernelspec_choices, KernelspecChoice, KernelspecPicker};
