pub mod client;
pub mod error;
pub mod middleware;
pub mod models;
pub mod transport;

pub use client::{ApiClient, ImageUpload};
pub use error::ApiError;
pub use transport::{ReqwestTransport, Transport};
