//! Portlets and the HTTP server hosting them.

pub mod portlet;
pub mod server;

pub use portlet::Portlet;
pub use server::RestfrontServer;
