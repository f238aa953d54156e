use futures::future::BoxFuture;

use crate::error::Result;
use crate::types::{AgentReply, ChatMessage};

/// Agent capability boundary.
///
/// Everything the dispatcher knows about an agent: given an ordered message
/// history, asynchronously produce text and optionally a typed value. The
/// underlying capability may be an LLM call, a retrieval pipeline, or a
/// fixture in tests; the dispatcher never calls one directly.
///
/// Implementations must not fail on "the capability declined" or "no
/// structured value" outcomes — callers observe those as an empty `value`.
/// Timeouts are the adapter's responsibility; a timed-out invocation should
/// return an error, which the dispatcher downgrades to an empty reply.
pub trait AgentAdapter: Send + Sync + 'static {
    /// Adapter name, used as log context.
    fn name(&self) -> &str;

    /// Invoke the capability with the given history.
    fn invoke(&self, history: &[ChatMessage]) -> BoxFuture<'_, Result<AgentReply>>;
}

/// Conversation persistence boundary.
///
/// A key-ordered append log of prior turns, read before a run starts and
/// written after it completes. The dispatcher neither knows nor cares about
/// the storage medium.
pub trait ConversationStore: Send + Sync + 'static {
    /// Load up to `limit` most recent turns for a conversation, oldest first.
    fn load_history(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> BoxFuture<'_, Result<Vec<ChatMessage>>>;

    /// Append turns to a conversation.
    fn append_messages(
        &self,
        conversation_id: &str,
        messages: &[ChatMessage],
    ) -> BoxFuture<'_, Result<()>>;
}
