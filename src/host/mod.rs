//! Host-Side Components
//!
//! Implements the client side of the build service API: the HTTP transport
//! with retry, and the typed endpoint client built on top of it.

pub mod client;
pub mod transport;

pub use client::{ApiClient, ClientError, ClientResult};
pub use transport::{
    FilePart, HttpExecutor, HttpRequest, HttpResponse, Method, MultipartForm, RequestBody,
    ReqwestExecutor, ResilientTransport, RetryPolicy, TransportError,
};
