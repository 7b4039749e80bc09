//! Typed entities mapped onto versioned records.
//!
//! An entity carries its own id and version the way a JPA entity carries
//! `@Id` and `@Version`; the remaining state maps to a [`FieldMap`].

pub mod article;

use crate::model::{FieldMap, Record, RecordId, Version};
use crate::Result;

pub use article::Article;

/// Conversion between a typed entity and a stored [`Record`].
pub trait Entity: Sized {
    /// `None` until the entity has been saved.
    fn id(&self) -> Option<RecordId>;

    /// `None` until the entity has been saved.
    fn version(&self) -> Option<Version>;

    /// Everything except id and version.
    fn to_fields(&self) -> FieldMap;

    /// Rebuild from a record, taking id and version from it.
    fn from_record(record: &Record) -> Result<Self>;
}
