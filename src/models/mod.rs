pub mod entitlement;
pub mod events;
pub mod usage;

pub use entitlement::{Entitlement, Subscription};
pub use events::{
    Account, InstallationEvent, IssueLabeledEvent, PullRequestClosedEvent, RepoRef,
    ReviewState, ReviewSubmittedEvent, WebhookEvent,
};
pub use usage::{InstallationUsage, PullRequestUsage, Session};
