pub mod entry;
pub mod error;
pub mod member;
pub mod page;
pub mod prompt;
pub mod response;
pub mod services;
pub mod settings;

// Re-export common error type
pub use error::ThistleError;

pub use entry::JournalEntry;
pub use member::Member;
pub use page::{PageCursor, PageResult};
pub use prompt::{PromptContent, SentPrompt};
pub use response::ReflectionResponse;
pub use settings::AppSettings;
