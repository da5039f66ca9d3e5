//! # Task Intake Core
//!
//! Pure ingestion logic for Task Intake: file formats, target schemas,
//! per-format readers, key reconciliation, the common-field reducer, the
//! normalizer, and the storage/store collaborator traits.
//!
//! This crate performs no filesystem or network I/O of its own. File bodies
//! arrive through a [`storage::FileStorage`] implementation and tasks leave
//! through a [`store::TaskStore`].
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`error`] | `ValidationFailure` and per-file `ReadError` |
//! | [`format`] | Closed set of file formats resolved from extensions |
//! | [`schema`] | Target schema parsed from a labeling config |
//! | [`models`] | Tasks, uploaded files, ingestion batches |
//! | [`readers`] | CSV/TSV, text, JSON and media extraction |
//! | [`reconcile`] | Configurable key aliasing and value coercion |
//! | [`fields`] | Running intersection of data fields across files |
//! | [`normalize`] | The normalizer and its limits |
//! | [`storage`] | File byte storage trait plus an in-memory backend |
//! | [`store`] | Task store trait plus an in-memory backend |

pub mod error;
pub mod fields;
pub mod format;
pub mod models;
pub mod normalize;
pub mod readers;
pub mod reconcile;
pub mod schema;
pub mod storage;
pub mod store;

pub use error::{ReadError, ValidationFailure};
pub use models::{IngestionBatch, Task, TaskData, UploadedFile};
pub use normalize::{IngestSettings, Limits, NormalizeOptions, Normalizer};
pub use schema::{FieldKind, SchemaProvider, StaticSchemaProvider, TargetSchema};
