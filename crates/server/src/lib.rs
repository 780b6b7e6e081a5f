pub mod admission;
pub mod config;
pub mod emit;
pub mod fault;
pub mod http;
pub mod metrics;
pub mod parse;
pub mod server;
pub mod tls;

pub use admission::AdmissionController;
pub use config::{CommsConfig, HandlerKind, MockConfig, StartupError};
pub use fault::FaultSwitch;
pub use server::MockServer;
pub use tls::TlsSource;
