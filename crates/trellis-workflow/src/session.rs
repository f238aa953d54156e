use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use tracing::debug;

use trellis_core::config::WorkflowConfig;
use trellis_core::error::Result;
use trellis_core::traits::ConversationStore;
use trellis_core::types::{ChatMessage, RunOutput};

use crate::dispatcher::WorkflowRuntime;
use crate::message::AgentRequest;

/// Ties a [`WorkflowRuntime`] to a [`ConversationStore`].
///
/// For each inbound user turn: load the prior history, append the new turn,
/// run the workflow, persist the turn and whatever the run yielded, and
/// hand the outputs back. The store is only touched before and after a run;
/// the dispatcher itself never sees it.
pub struct ConversationRouter {
    runtime: WorkflowRuntime,
    store: Arc<dyn ConversationStore>,
    history_limit: usize,
}

impl ConversationRouter {
    pub fn new(
        runtime: WorkflowRuntime,
        store: Arc<dyn ConversationStore>,
        config: &WorkflowConfig,
    ) -> Self {
        Self {
            runtime,
            store,
            history_limit: config.history_limit,
        }
    }

    /// Route one user turn through the workflow.
    pub async fn handle_turn(
        &self,
        conversation_id: &str,
        user_text: impl Into<String>,
    ) -> Result<Vec<RunOutput>> {
        let user_turn = ChatMessage::user(user_text);

        let mut history = self
            .store
            .load_history(conversation_id, self.history_limit)
            .await?;
        history.push(user_turn.clone());
        debug!(
            conversation_id,
            turns = history.len(),
            "Dispatching conversation turn"
        );

        let outputs = self
            .runtime
            .run(AgentRequest::new(history))
            .outputs()
            .await?;

        let mut persisted = vec![user_turn];
        persisted.extend(
            outputs
                .iter()
                .filter_map(RunOutput::as_text)
                .map(ChatMessage::assistant),
        );
        self.store
            .append_messages(conversation_id, &persisted)
            .await?;

        Ok(outputs)
    }
}

/// In-memory conversation store, for tests and single-process embedding.
#[derive(Default)]
pub struct MemoryConversationStore {
    conversations: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ConversationStore for MemoryConversationStore {
    fn load_history(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<ChatMessage>>> {
        let history = {
            let conversations = self.conversations.lock().unwrap();
            let turns = conversations
                .get(conversation_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let skip = turns.len().saturating_sub(limit);
            turns[skip..].to_vec()
        };
        Box::pin(async move { Ok(history) })
    }

    fn append_messages(
        &self,
        conversation_id: &str,
        messages: &[ChatMessage],
    ) -> BoxFuture<'_, Result<()>> {
        let mut conversations = self.conversations.lock().unwrap();
        conversations
            .entry(conversation_id.to_string())
            .or_default()
            .extend_from_slice(messages);
        Box::pin(async move { Ok(()) })
    }
}
