//! Session Router and HTTP/SSE surface: the pieces that turn the
//! Backend Pool, Profile Engine, Context Injector and feature
//! side-channels into one MCP-speaking proxy.

pub mod http;
pub mod router;
pub mod sse;

pub use http::{app, serve};
pub use router::{RequestContext, SessionRouter};
pub use sse::{SharedSseClients, SseClients};
