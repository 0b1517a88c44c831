use std::sync::Arc;

use async_trait::async_trait;
use hickory_proto::op::Message;
use tracing::debug;

use crate::error::ResolveError;
use crate::proto_utils::{answer_strings, first_query, question_string};
use crate::resolver::Resolver;
use crate::rules::RuleStore;

/// Passes requests to `inner` and stores every non-empty answer.
///
/// The caller sees exactly what `inner` returned.
pub struct RecorderResolver<R> {
    inner: R,
    store: Arc<RuleStore>,
}

impl<R: Resolver> RecorderResolver<R> {
    pub fn new(inner: R, store: Arc<RuleStore>) -> Self {
        Self { inner, store }
    }
}

#[async_trait]
impl<R: Resolver> Resolver for RecorderResolver<R> {
    async fn resolve(&self, request: &Message) -> Result<Option<Message>, ResolveError> {
        let response = self.inner.resolve(request).await?;

        if let (Some(query), Some(msg)) = (first_query(request), response.as_ref()) {
            if !msg.answers().is_empty() {
                let answers = answer_strings(msg);
                debug!(
                    target = "recorder",
                    question = %question_string(request),
                    answers = ?answers,
                    "recording response"
                );
                self.store
                    .add(&query.name().to_ascii(), query.query_type(), answers);
            }
        }
        Ok(response)
    }

    fn describe(&self) -> String {
        format!("recorder({})", self.inner.describe())
    }
}
