//! # Record Model
//!
//! Clean DTOs shared by every layer: storage ↔ transactions ↔ service ↔ user.
//!
//! Design rule: this module is pure data. No locks, no I/O, no transaction
//! state. Everything here is `Clone` and `serde`-serializable.

pub mod record;
pub mod value;
pub mod field_map;

pub use record::{Record, RecordId, Version};
pub use value::Value;
pub use field_map::FieldMap;
