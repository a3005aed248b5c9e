//! Multi-user file storage service: token sessions, a per-user file tree
//! with public/private visibility, and asynchronous thumbnail generation.

pub mod api;
pub mod app;
pub mod blob;
pub mod cache;
pub mod config;
pub mod error;
pub mod extract;
pub mod files;
pub mod jobs;
pub mod logging;
pub mod models;
pub mod resize;
pub mod session;
pub mod storage;
pub mod user_models;
pub mod users;
pub mod worker;

pub use app::App;
pub use config::Config;
pub use error::{ApiError, FileError, JobError, SessionError, UserError};
