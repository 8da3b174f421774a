//! REST API access for the document backend.
//!
//! This module provides the `ApiClient` request pipeline through which every
//! backend call is made, the `ApiRequest`/`ApiResponse` envelope types, and
//! the closed `ApiError` taxonomy failures are classified into.
//!
//! The backend authenticates with a bearer token obtained from `/auth/login`.

pub mod client;
pub mod error;
pub mod request;

pub use client::ApiClient;
pub use error::{ApiError, ErrorCategory};
pub use request::{ApiRequest, ApiResponse, RequestBody};
