//! Headless cubeview: runs a YAML session against the layer stack and
//! writes composites and histogram tables to disk.

pub mod config;
pub mod session;
pub mod source;

pub use config::SessionConfig;
pub use session::{Session, SessionReport};
pub use source::CubeSource;
