//! The scraping pipeline.

pub mod claim;
pub mod completion;
pub mod games;
pub mod retry_policy;
pub mod rounds;
pub mod runner;
pub mod session_pool;

pub use claim::JobClaimer;
pub use completion::{CompletionCheck, CompletionDetector};
pub use games::{DrainReport, GameFetcher, GameOutcome};
pub use retry_policy::LocalRetryPolicy;
pub use rounds::{PopulateOutcome, RoundPopulator};
pub use runner::{Pipeline, RunSummary, StopReason};
pub use session_pool::{PooledSession, SessionHandle, SessionPool};
