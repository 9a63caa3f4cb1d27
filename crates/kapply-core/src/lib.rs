//! kapply core - documents, decoding and merge logic
//!
//! This crate holds everything that does not need a cluster:
//! - `ResourceDocument`: a decoded declarative object and its identity
//! - `decode_documents`: single, list and multi-document manifest decoding
//! - `three_way_merge`: kubectl-style merge of desired, last-applied and live state

pub mod decode;
pub mod document;
pub mod error;
pub mod merge;

pub use decode::{decode_documents, ensure_unique};
pub use document::{
    DEFAULT_NAMESPACE, ResourceDocument, ResourceIdentity, ResourceKey, is_cluster_scoped,
};
pub use error::DecodeError;
pub use merge::{
    LAST_APPLIED_ANNOTATION, annotate_last_applied, changed_paths, read_last_applied,
    three_way_merge,
};
