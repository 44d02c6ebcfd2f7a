pub mod accounts;
pub mod assist;
pub mod cost;
pub mod delivery;
pub mod entitlement;
pub mod usage;

pub use accounts::{AccountStore, PgAccountStore};
pub use cost::CostExtractor;
pub use delivery::DeliveryService;
pub use entitlement::{admit_pull_request, Admission, EntitlementResolver};
pub use usage::{PgUsageStore, UsageStore};
