//! Paperdesk core - client-side session and task orchestration for the
//! document backend.
//!
//! - [`api`]: the request pipeline every backend call goes through
//! - [`auth`]: session state, credential storage and session lifecycle
//! - [`tasks`]: polling of long-running backend jobs such as mailbox scans
//! - [`navigation`], [`notify`]: the UI side-channels the pipeline reports to

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod navigation;
pub mod notify;
pub mod tasks;

pub use api::{ApiClient, ApiError, ApiRequest, ApiResponse, ErrorCategory};
pub use auth::{AuthError, RestoreOutcome, Session, SessionManager, SharedSession};
pub use config::{Config, CredentialBackend};
pub use models::{Credentials, UserProfile};
pub use navigation::{Navigator, View, ViewTracker};
pub use notify::{ChannelSink, NotificationSink, Notice, Severity, TracingSink};
pub use tasks::{TaskOutcome, TaskPoller, TaskStatus};
