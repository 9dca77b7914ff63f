//! # remote
//!
//! The channel between the workstation and a node: run commands, upload
//! files, mirror kitchen directories.
//!
//! Everything goes through the [`Transport`] trait. [`SshTransport`] shells
//! out to `ssh` and `rsync`; [`MemoryTransport`] keeps a fake node in memory
//! for tests.
//!
//! ## Example
//!
//! ```no_run
//! use remote::{Connector, SshConnector, Target, Transport};
//!
//! let transport = SshConnector.connect(&Target::new("web1.example.com"))?;
//! let uptime = transport.run("uptime", false)?;
//! println!("{uptime}");
//! # Ok::<(), remote::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod error;
pub mod types;

pub use backend::memory::MemoryTransport;
pub use backend::ssh::SshTransport;
pub use backend::{Connector, SshConnector, Transport};
pub use error::{Error, ErrorCategory, Result};
pub use types::{CommandOutput, MirrorOptions, Target, VCS_EXCLUDES, shell_quote};
