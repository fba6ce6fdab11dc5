pub mod config;
pub mod domain;
pub mod errors;
pub mod listing;
pub mod store;

pub use domain::submission::{SourceMessageId, Submission, SubmissionDraft, SubmissionId};
pub use errors::{InterfaceError, SubmissionError};
pub use listing::{parse_listing, ListingFields};
pub use store::SubmissionStore;
