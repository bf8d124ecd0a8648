mod errors;
pub mod import;
mod service;

pub use errors::AppError;
pub use service::{Candidate, EntryView, RecognitionService};
