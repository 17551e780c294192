//! Switch a notebook session to another Jupyter kernel.
//!
//! The interesting part is [`KernelSwitcher::switch_kernel_with_retry`]: for
//! locally launched sessions, a kernel that fails to start (bad kernelspec,
//! broken environment, session startup failure) triggers a prompt for a
//! replacement kernel instead of failing outright. Remote sessions get a
//! single attempt.
//!
//! The crate does not launch kernels itself. Callers provide:
//!
//! - a [`NotebookSession`] that knows how to rebind itself to a kernel
//! - a [`KernelPicker`] that asks the user for a replacement
//! - a [`ProgressHandler`] that shows (and dismisses) progress per attempt
//!
//! ```ignore
//! use std::sync::Arc;
//! use kernel_switch::{KernelSwitcher, LogHandler};
//!
//! let settings = kernel_switch::settings::load_settings();
//! let switcher = KernelSwitcher::new(settings, Arc::new(picker), Arc::new(LogHandler));
//! switcher.switch_kernel_with_retry(&mut session, target).await?;
//! ```

pub mod connection;
pub mod error;
pub mod progress;
pub mod session;
pub mod settings;
pub mod switcher;

// Re-export key types
pub use connection::{ConnectionKind, KernelConnection};
pub use error::{FailureKind, KernelError};
pub use progress::{with_progress, LogHandler, ProgressHandler, ProgressOptions, SwitchProgressPhase};
pub use session::{KernelPicker, NotebookSession};
pub use settings::{ServerType, SwitchSettings};
pub use switcher::KernelSwitcher;
