//! Actor implementations

pub mod campaign;

pub use campaign::{CampaignActor, CampaignActorArgs, pending_groups};
