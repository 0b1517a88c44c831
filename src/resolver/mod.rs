pub mod chain;
pub mod forward;
pub mod multi;
pub mod recorder;
pub mod replay;
pub mod system;

use std::sync::Arc;

use async_trait::async_trait;
use hickory_proto::op::Message;

use crate::error::ResolveError;

/// Answers DNS requests.
///
/// - `Ok(None)`: no opinion, the caller should try something else.
/// - `Ok(Some(msg))` with answers: authoritative result.
/// - `Err(_)`: the resolver could not do its job, see [`ResolveError::is_transient`].
#[async_trait]
pub trait Resolver: Send + Sync {
    async fn resolve(&self, request: &Message) -> Result<Option<Message>, ResolveError>;

    /// Short description of this resolver and what it wraps, e.g.
    /// `recorder(multi[replay, forward(8.8.8.8:53)])`.
    fn describe(&self) -> String;
}

// Shared resolvers are handy for spawned per-request tasks.
#[async_trait]
impl<R: Resolver + ?Sized> Resolver for Arc<R> {
    #[inline]
    async fn resolve(&self, request: &Message) -> Result<Option<Message>, ResolveError> {
        self.as_ref().resolve(request).await
    }

    fn describe(&self) -> String {
        self.as_ref().describe()
    }
}

#[async_trait]
impl<R: Resolver + ?Sized> Resolver for Box<R> {
    #[inline]
    async fn resolve(&self, request: &Message) -> Result<Option<Message>, ResolveError> {
        self.as_ref().resolve(request).await
    }

    fn describe(&self) -> String {
        self.as_ref().describe()
    }
}
