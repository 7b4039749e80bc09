//! FieldMap — the name → value payload of a record.

use std::collections::HashMap;
use super::Value;

/// A map of field names to values.
pub type FieldMap = HashMap<String, Value>;

/// Build a `FieldMap` from `(name, value)` pairs.
///
/// ```rust
/// use optlock::model::field_map::fields;
/// use optlock::Value;
///
/// let f = fields([("title", "A")]);
/// assert_eq!(f.get("title"), Some(&Value::from("A")));
/// ```
pub fn fields<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> FieldMap
where
    K: Into<String>,
    V: Into<Value>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}
