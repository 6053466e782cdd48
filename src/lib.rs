//! Core engine for HireXpert's proctored one-way video interviews.
//!
//! The host environment supplies the platform seams (capture backend,
//! video sink, face detector, fullscreen surface, state store) and drives
//! an [`InterviewSession`] with events; this crate owns the session state
//! machine, the proctoring policy, and the backend API access.

pub mod cancel;
pub mod config;
pub mod error;
pub mod face;
pub mod gateway;
pub mod guard;
pub mod interview;
pub mod media;
pub mod proctor;
pub mod progress;
pub mod session;
pub mod setup;

pub use config::AppConfig;
pub use error::{AppError, AppResult};
pub use gateway::{ApiClient, Gateway};
pub use guard::{Redirect, RedirectReason};
pub use session::{InterviewSession, SessionLoad, SessionPlatform, Stage};

use std::io::Write;

/// Initializes logging for host binaries. `RUST_LOG` overrides the
/// default `info` filter.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .try_init();
}
