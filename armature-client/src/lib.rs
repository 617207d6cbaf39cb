//! Armature Client
//!
//! HTTP plumbing shared by Armature providers: a minimal transport
//! abstraction over reqwest, and a poller for long-running operations
//! (LROs) — server-side operations whose completion is observed by
//! repeatedly checking a status endpoint rather than by the initiating
//! response.
//!
//! # Overview
//!
//! A mutating request against a cloud API either completes synchronously or
//! returns a tracking signal (a status header or a provisioning-state body).
//! [`OperationHandle::from_response`] classifies the initiating response,
//! and [`Poller::poll_until_done`] drives the operation to a terminal state
//! with exponential backoff, transient-error retry, and prompt caller
//! cancellation:
//!
//! ```ignore
//! let response = transport.send(TransportRequest::put(url, body)).await?;
//! let mut handle = OperationHandle::from_response(&response, &url)?;
//! let poller = Poller::new(transport);
//! let final_body = poller.poll_until_done(&mut handle, &policy, &cancel).await?;
//! ```

pub mod error;
pub mod poller;
pub mod transport;

pub use error::{ClientError, ClientResult, TransportError};
pub use poller::{OperationHandle, OperationStatus, PollPolicy, Poller, TrackingSignal};
pub use transport::{HttpTransport, Method, Transport, TransportRequest, TransportResponse};
