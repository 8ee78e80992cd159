//! MediaMerge Suggestions
//!
//! Client side of the title/description suggestion flow. The service is an
//! external collaborator: composition never waits on it, and every failure
//! (timeout, error, malformed answer) degrades to "no suggestions".

pub mod prompt;
pub mod service;

pub use prompt::{build_prompt, AssetNames};
pub use service::{
    suggest, suggest_with_fallback, CommandService, SuggestError, SuggestionService,
    VideoMetadata,
};
