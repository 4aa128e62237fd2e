//! The `DBS.Update` RPC boundary. RPC transport is an external collaborator
//! assumed to deliver peer calls and allow outbound calls to named nodes:
//! no transport is implemented here, only the `async_trait` boundary a real
//! gRPC/HTTP client would satisfy.

use crate::error::Result;
use crate::types::DbsUpdateRequest;
use async_trait::async_trait;

/// Outbound `DBS.Update` calls this node issues to miner nodes it is
/// provisioning (or tearing down) a database instance on.
#[async_trait]
pub trait DbsTransport: Send + Sync {
    /// `DBS.Update`: ask `node_id` to apply `request` (a signed
    /// `CreateDb`/`DropDb` directive).
    async fn update(&self, node_id: &str, request: &DbsUpdateRequest) -> Result<()>;
}
