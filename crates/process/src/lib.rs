//! Supervision of external programs.
//!
//! This crate runs third-party binaries (the message broker, its admin CLI,
//! the proxy) as child processes, forwarding their output into `tracing`.
//!
//! # Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use warren_process::{ManagedApplication, Result, spawn};
//!
//! struct MyApp {
//!     executable: String,
//! }
//!
//! #[async_trait]
//! impl ManagedApplication for MyApp {
//!     fn args(&self) -> Vec<String> {
//!         vec!["--config=/etc/my-app.conf".to_string()]
//!     }
//!
//!     fn executable(&self) -> &str {
//!         &self.executable
//!     }
//!
//!     fn name(&self) -> &str {
//!         "my-app"
//!     }
//! }
//!
//! async fn run() -> Result<()> {
//!     let process = spawn(MyApp {
//!         executable: "/usr/local/bin/my-app".to_string(),
//!     })
//!     .await?;
//!
//!     // App is now running and ready
//!
//!     process.shutdown().await;
//!
//!     Ok(())
//! }
//! ```
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::redundant_pub_crate)]

mod application;
mod command;
mod error;
mod spawn;

pub use application::ManagedApplication;
pub use command::{CommandOutput, run_to_completion};
pub use error::{Error, Result};
pub use spawn::{ManagedProcess, spawn};

pub use nix::sys::signal::Signal;
