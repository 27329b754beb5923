pub mod client;
pub mod connector;
pub mod error;

pub use crate::client::{ClientConfig, Headers, HttpClient, JsonClient, RequestBody};
pub use crate::error::ClientError;
use std::future::Future;
use std::pin::Pin;
pub type FutureResponse<T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send>>;
