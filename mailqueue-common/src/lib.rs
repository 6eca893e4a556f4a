pub mod address;
pub mod address_parser;
pub mod domain;
pub mod envelope;
pub mod error;
pub mod logging;
pub mod message;

pub use address::{Address, AddressList};
pub use domain::Domain;
pub use envelope::Envelope;
pub use message::Message;
pub use tracing;
