use std::sync::Arc;

use async_trait::async_trait;
use hickory_proto::op::Message;
use tracing::debug;

use crate::error::ResolveError;
use crate::proto_utils::{answer_strings, first_query, question_string, reply_to};
use crate::resolver::Resolver;
use crate::rules::RuleStore;

/// Answers from stored rules only; never touches the network.
pub struct ReplayResolver {
    store: Arc<RuleStore>,
}

impl ReplayResolver {
    pub fn new(store: Arc<RuleStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Resolver for ReplayResolver {
    async fn resolve(&self, request: &Message) -> Result<Option<Message>, ResolveError> {
        let Some(query) = first_query(request) else {
            return Ok(None);
        };
        // templates are expanded with the name exactly as asked
        let name = query.name().to_ascii();
        let Some(records) = self.store.find(&name, query.query_type())? else {
            debug!(target = "replay", question = %question_string(request), "no rule found");
            return Ok(None);
        };

        let mut reply = reply_to(request);
        reply.add_answers(records);
        debug!(
            target = "replay",
            question = %question_string(request),
            answers = ?answer_strings(&reply),
            "replaying rule"
        );
        Ok(Some(reply))
    }

    fn describe(&self) -> String {
        "replay".to_string()
    }
}
