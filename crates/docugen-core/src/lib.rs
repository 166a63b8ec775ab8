//! # DocuGen Core Library
//!
//! Declarative mapping engine for the DocuGenerate REST API. A host picks a
//! resource and operation, supplies field values, and gets back a complete
//! request plan; the crate can also send it, load selector options, and test
//! credentials.
//!

pub mod config;
pub mod credentials;
pub mod error;
pub mod integrations;
pub mod loaders;
pub mod node;
pub mod request;
pub mod transport;

pub use error::{DocuGenError, Result};
pub use integrations::registry::{FieldSpec, OperationSpec, Registry, ResourceKind};
pub use node::DocuGenerateNode;
pub use request::{RequestInput, RequestPlan};

/// Field name to value, as supplied by the host.
pub type FieldValues = serde_json::Map<String, serde_json::Value>;
