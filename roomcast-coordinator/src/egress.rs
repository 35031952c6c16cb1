//! The `Egress` capability. Every adapter registers one `Egress`; the
//! coordinator holds a handle to each and fans a published `StatusEvent` out
//! to all of them except the originator.

use crate::command::SourceProtocol;
use crate::status::StatusEvent;

#[async_trait::async_trait]
pub trait Egress: Send + Sync + 'static {
    fn protocol(&self) -> SourceProtocol;

    /// Best-effort: a failing adapter must not block or fail the others
    ///. Implementations should log and return rather than panic.
    async fn publish(&self, event: &StatusEvent);
}
