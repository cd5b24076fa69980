//! Gateway to the remote text-generation service.

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::{DEFAULT_API_BASE, GatewayConfig, GatewayError, OpenRouterClient};
