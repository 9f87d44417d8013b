//! brandloc Pipeline - Campaign orchestration
//!
//! Wires the localization stages together: merge a master configuration
//! into region requests, generate each region through a provider on the
//! batch engine, persist the outputs, and snapshot unfinished work so a
//! partially failed campaign can be resumed.

pub mod campaign;
pub mod logging;

pub use campaign::{CampaignReport, CampaignRunner};
pub use logging::LogFormat;
