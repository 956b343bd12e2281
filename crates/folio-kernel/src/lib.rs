//! Folio kernel: versioned block storage for collaborative documents.
//!
//! The kernel owns persistence and every rule about how a document's block
//! set may change. It knows nothing about connections, locks, or sessions;
//! those live in `folio-server`.
//!
//! # Modules
//!
//! - [`db`]: SQLite schema and queries (documents, versions, block rows)
//! - [`layout`]: pure derivation of the next version's block set
//! - [`store`]: [`DocumentStore`], the mutation and read API
//! - [`templates`]: template persistence behind [`TemplateStore`]
//! - [`table`]: table grids and template export
//! - [`render`]: HTML projection of a block list

pub mod db;
pub mod error;
pub mod layout;
pub mod render;
pub mod store;
pub mod table;
pub mod templates;

pub use db::{DocumentDb, Slot};
pub use error::{ErrorKind, StoreError, StoreResult};
pub use layout::Layout;
pub use render::{render, strip_tags};
pub use store::{
    BlockUpdate, DocumentStore, DocumentView, Insertion, Removal, RowInsertion,
    SharedDocumentStore, VersionView, shared_document_store,
};
pub use templates::{DirTemplateStore, MemoryTemplateStore, TemplateStore, sanitize_name};
