//! In-memory reflection-response store with live per-prompt subscriptions.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use thistle_core::services::{ReflectionResponseService, ResponseSubscription};
use thistle_core::{Member, ReflectionResponse, ThistleError};

struct ResponseWatcher {
    member_id: String,
    prompt_id: String,
    tx: mpsc::UnboundedSender<Result<Vec<ReflectionResponse>, ThistleError>>,
    cancel: CancellationToken,
}

#[derive(Default)]
struct ResponseLog {
    responses: Vec<ReflectionResponse>,
    watchers: Vec<ResponseWatcher>,
}

/// In-memory [`ReflectionResponseService`].
///
/// Subscribers get the current list immediately (possibly empty) and a
/// replacement list on every save.
#[derive(Default)]
pub struct MemoryResponseService {
    inner: std::sync::RwLock<ResponseLog>,
}

impl MemoryResponseService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Saves a response (insert or replace by id) and re-emits to the
    /// prompt's watchers.
    pub fn save_response(&self, response: ReflectionResponse) {
        if let Ok(mut log) = self.inner.write() {
            match log.responses.iter_mut().find(|r| r.id == response.id) {
                Some(existing) => *existing = response.clone(),
                None => log.responses.push(response.clone()),
            }
            Self::broadcast(&mut log, &response.member_id, &response.prompt_id);
        }
    }

    /// Deletes a response and re-emits to the prompt's watchers.
    pub fn delete_response(&self, response_id: &str) {
        if let Ok(mut log) = self.inner.write() {
            let Some(position) = log.responses.iter().position(|r| r.id == response_id) else {
                return;
            };
            let removed = log.responses.remove(position);
            Self::broadcast(&mut log, &removed.member_id, &removed.prompt_id);
        }
    }

    fn current(
        responses: &[ReflectionResponse],
        member_id: &str,
        prompt_id: &str,
    ) -> Vec<ReflectionResponse> {
        responses
            .iter()
            .filter(|r| r.member_id == member_id && r.prompt_id == prompt_id)
            .cloned()
            .collect()
    }

    fn broadcast(log: &mut ResponseLog, member_id: &str, prompt_id: &str) {
        let responses = log.responses.clone();
        log.watchers.retain(|watcher| {
            if watcher.cancel.is_cancelled() {
                return false;
            }
            if watcher.member_id != member_id || watcher.prompt_id != prompt_id {
                return true;
            }
            let list = Self::current(&responses, member_id, prompt_id);
            watcher.tx.send(Ok(list)).is_ok()
        });
    }
}

impl ReflectionResponseService for MemoryResponseService {
    fn observe_for_prompt_id(&self, member: &Member, prompt_id: &str) -> ResponseSubscription {
        let (tx, receiver) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        if let Ok(mut log) = self.inner.write() {
            let list = Self::current(&log.responses, &member.id, prompt_id);
            let _ = tx.send(Ok(list));
            log.watchers.push(ResponseWatcher {
                member_id: member.id.clone(),
                prompt_id: prompt_id.to_string(),
                tx,
                cancel: cancel.clone(),
            });
        }
        ResponseSubscription { receiver, cancel }
    }
}
