//! Calendar and block explorer collaborators, and the operations built on them

pub mod calendar;
pub mod client;
pub mod engine;
pub mod error;
pub mod explorer;
pub mod types;

#[cfg(test)]
pub(crate) mod fixtures;
#[cfg(test)]
pub(crate) mod mock;

pub use calendar::CalendarClient;
#[cfg(feature = "http")]
pub use calendar::HttpCalendar;
pub use client::OpenTimestampsClient;
pub use error::AnchorError;
pub use explorer::BlockExplorer;
#[cfg(feature = "http")]
pub use explorer::EsploraExplorer;
pub use types::{BlockInfo, InconclusiveReason, VerifyOutcome};
