mod postgres;

pub use crate::traits::{CampaignStore, InsertOutcome};
pub use postgres::PgStore;
