//! Claim, ticker and verdict types shared across the crate.

pub mod claim;
pub mod outcome;
pub mod ticker;
pub mod ticker_match;
pub mod timestamp;

pub use claim::{ClaimKind, ClaimValue, FinancialClaim, Scale, ValueUnit};
pub use outcome::{FactCheckResult, VerificationStatus};
pub use ticker::Ticker;
pub use ticker_match::{ResolutionMethod, TickerMatch};
pub use timestamp::UtcDateTime;
