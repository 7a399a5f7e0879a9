//! HTTP middleware applied to every route

pub mod security_headers;

pub use security_headers::security_headers_middleware;
