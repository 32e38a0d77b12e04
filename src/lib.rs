pub mod campaign;
pub mod clients;
pub mod cohort;
pub mod config;
pub mod model;
pub mod report;
pub mod scheduler;
pub mod segment;
pub mod server;
pub mod service;
pub mod snapshot;

#[cfg(test)]
mod testing;

pub use campaign::{CampaignError, CampaignExecutor, CampaignRequest, CampaignResult, Trigger};
pub use clients::{ClientError, Clients};
pub use cohort::{classify, CohortSet};
pub use config::Config;
pub use model::{Lead, MessageRecord};
pub use segment::{Segment, SegmentResolver};
pub use service::OutreachService;
