pub mod archive;
pub mod claims;
pub mod classifier;
pub mod config;
pub mod error;
pub mod message;
pub mod report;
pub mod scanner;
pub mod scoreboard;
pub mod spark;
pub mod typedstream;

pub use archive::{ArchiveReader, Normalizer, RawMessage};
pub use claims::{Claim, ClaimEngine, ClaimRules, ClaimableMessage};
pub use classifier::{ClaimKind, Classification, Classifier};
pub use config::Config;
pub use error::{DecodeError, ScanError};
pub use message::NormalizedMessage;
pub use scanner::{ScanSummary, Scanner};
pub use scoreboard::{Scoreboard, UserTally};
pub use spark::SparkTracker;
