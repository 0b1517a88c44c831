use std::sync::Arc;

use async_trait::async_trait;
use hickory_proto::op::Message;
use tracing::debug;

use crate::error::ResolveError;
use crate::proto_utils::{has_answers, question_string};
use crate::resolver::Resolver;

/// Tries resolvers one after another and returns the first non-empty answer.
///
/// Transient failures move on to the next resolver; configuration and
/// fixture errors stop the walk. Running out of resolvers is `Ok(None)`.
#[derive(Default)]
pub struct MultiResolver {
    resolvers: Vec<Arc<dyn Resolver>>,
}

impl MultiResolver {
    pub fn new(resolvers: Vec<Arc<dyn Resolver>>) -> Self {
        Self { resolvers }
    }
}

#[async_trait]
impl Resolver for MultiResolver {
    async fn resolve(&self, request: &Message) -> Result<Option<Message>, ResolveError> {
        for (idx, resolver) in self.resolvers.iter().enumerate() {
            let response = match resolver.resolve(request).await {
                Ok(response) => response,
                Err(err) if err.is_transient() => {
                    debug!(
                        target = "multi",
                        resolver = idx,
                        question = %question_string(request),
                        error = %err,
                        "resolver failed, trying next"
                    );
                    continue;
                }
                Err(err) => return Err(err),
            };
            if has_answers(&response) {
                return Ok(response);
            }
        }
        Ok(None)
    }

    fn describe(&self) -> String {
        let inner: Vec<String> = self.resolvers.iter().map(|r| r.describe()).collect();
        format!("multi[{}]", inner.join(", "))
    }
}
