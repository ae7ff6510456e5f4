//! Generic REST dispatch bridge.
//!
//! # Overview
//! Every backend operation has the same shape: encode a request record,
//! send it with a fixed verb to a templated path, decode the JSON reply and
//! map failures onto one small status vocabulary. This crate implements
//! that shape once. An operation is just data, an [`OperationDescriptor`],
//! and [`BridgeClient`] executes any descriptor.
//!
//! # Design
//! - The request/response halves are pure (host-does-IO). The bundled
//!   [`UreqTransport`] performs the round-trip for callers that do not
//!   bring their own [`Transport`].
//! - Session state lives in one [`SessionContext`] owned by the client and
//!   shared through `Arc`; login, sudo and logout descriptors update it.
//! - List calls can be walked page by page through the backend's `Link`
//!   headers ([`paging`]).
//! - Records are defined independently from the mock-server crate;
//!   integration tests catch schema drift.

pub mod cancel;
pub mod client;
pub mod codec;
pub mod descriptor;
pub mod error;
pub mod http;
pub mod ops;
pub mod outcome;
pub mod paging;
pub mod path;
pub mod session;
pub mod settings;
pub mod transport;
pub mod types;

pub use cancel::CancelToken;
pub use client::{BridgeClient, Pager};
pub use descriptor::{Operation, OperationDescriptor, OperationTable, SessionEffect};
pub use error::{BridgeError, Code};
pub use http::{HttpMethod, HttpRequest, HttpResponse};
pub use outcome::RawOutcome;
pub use paging::{Page, PageInfo, PageLink};
pub use session::{Credential, SessionContext, SessionState};
pub use settings::BridgeSettings;
pub use transport::{Transport, TransportFailure, UreqTransport};
