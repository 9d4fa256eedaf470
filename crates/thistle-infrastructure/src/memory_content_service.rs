//! In-memory prompt-content store.

use std::collections::HashMap;
use std::collections::HashSet;

use async_trait::async_trait;

use thistle_core::services::PromptContentService;
use thistle_core::{PromptContent, ThistleError};

/// In-memory [`PromptContentService`].
///
/// `get_by_prompt_id` answers `Ok(None)` for unknown prompts (a definitive
/// empty that settles the entry join) unless the prompt id has been marked
/// failing.
#[derive(Default)]
pub struct MemoryContentService {
    contents: std::sync::RwLock<HashMap<String, PromptContent>>,
    failing: std::sync::RwLock<HashSet<String>>,
}

impl MemoryContentService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers content, keyed by its prompt id.
    pub fn set_content(&self, content: PromptContent) {
        if let Ok(mut contents) = self.contents.write() {
            contents.insert(content.prompt_id.clone(), content);
        }
    }

    /// Makes every fetch for `prompt_id` fail, for error-path tests.
    pub fn fail_for(&self, prompt_id: impl Into<String>) {
        if let Ok(mut failing) = self.failing.write() {
            failing.insert(prompt_id.into());
        }
    }
}

#[async_trait]
impl PromptContentService for MemoryContentService {
    async fn get_by_prompt_id(
        &self,
        prompt_id: &str,
    ) -> Result<Option<PromptContent>, ThistleError> {
        let failing = self
            .failing
            .read()
            .map(|set| set.contains(prompt_id))
            .unwrap_or(false);
        if failing {
            return Err(ThistleError::query(format!(
                "content fetch failed for prompt {prompt_id}"
            )));
        }
        let contents = self
            .contents
            .read()
            .map_err(|_| ThistleError::Internal("content lock poisoned".to_string()))?;
        Ok(contents.get(prompt_id).cloned())
    }
}
