//! fleetgrid-proxy: publishes the running worker set to nginx.
//!
//! [`render`] turns a list of worker addresses into a complete nginx
//! config (one upstream block plus one listener). [`ProxyPublisher`]
//! writes it atomically and runs the reload command.

pub mod error;
pub mod nginx;
pub mod publisher;

pub use error::{ProxyError, ProxyResult};
pub use nginx::{render, NginxSettings};
pub use publisher::{CommandReloader, ProxyPublisher, Reloader, UpstreamPublisher};
