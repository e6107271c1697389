pub mod ca_server;
pub mod fake_docker;
pub mod helpers;

pub use ca_server::*;
pub use fake_docker::*;
pub use helpers::*;
