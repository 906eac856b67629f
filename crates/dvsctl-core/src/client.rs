//! The remote management client seam
//!
//! The watcher and the workflows only ever talk to the server through this
//! trait. [`crate::vsphere::Session`] is the production implementation;
//! tests script their own.

use crate::error::Result;
use crate::operation::OperationHandle;
use crate::request::OperationRequest;
use async_trait::async_trait;

#[async_trait]
pub trait RemoteManagementClient: Send + Sync {
    /// Validate and submit a request, returning a handle to the server-side job
    async fn submit_operation(&self, request: &OperationRequest) -> Result<OperationHandle>;

    /// Re-fetch the current state, result and error of a handle
    async fn refresh(&self, handle: &OperationHandle) -> Result<OperationHandle>;
}
