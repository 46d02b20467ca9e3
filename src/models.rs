//! Request and response bodies of the HTTP API.

mod params; // Request payloads
mod responses; // Response payloads

pub use params::*;
pub use responses::*;
