pub mod config;
pub mod connection;
pub mod counters;
pub mod error;
pub mod export;
pub mod generator;
pub mod message;
pub mod mock;
pub mod phase;
pub mod queue;
pub mod retry;
pub mod samples;
pub mod sender;
pub mod shutdown;
pub mod stats;
pub mod ws;

pub use config::*;
pub use connection::*;
pub use counters::*;
pub use error::*;
pub use export::*;
pub use generator::*;
pub use message::*;
pub use mock::*;
pub use phase::*;
pub use retry::*;
pub use samples::*;
pub use sender::*;
pub use stats::*;
pub use ws::*;
