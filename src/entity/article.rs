//! `Article`: id, title, version.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::{FieldMap, Record, RecordId, Value, Version};
use crate::{Error, Result};
use super::Entity;

const TITLE: &str = "title";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    pub id: Option<RecordId>,
    pub title: String,
    pub version: Option<Version>,
}

impl Article {
    /// A transient article; id and version are assigned on save.
    pub fn new(title: impl Into<String>) -> Self {
        Self { id: None, title: title.into(), version: None }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }
}

impl Entity for Article {
    fn id(&self) -> Option<RecordId> { self.id }
    fn version(&self) -> Option<Version> { self.version }

    fn to_fields(&self) -> FieldMap {
        let mut fields = FieldMap::new();
        fields.insert(TITLE.to_string(), Value::from(self.title.as_str()));
        fields
    }

    fn from_record(record: &Record) -> Result<Self> {
        let title = match record.get(TITLE) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => {
                return Err(Error::Mapping(format!(
                    "record {}: `{TITLE}` is {}, expected STRING",
                    record.id,
                    other.type_name()
                )));
            }
            None => return Err(Error::Mapping(format!("record {}: missing `{TITLE}`", record.id))),
        };
        Ok(Self { id: Some(record.id), title, version: Some(record.version) })
    }
}

impl fmt::Display for Article {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Article(id=")?;
        match self.id {
            Some(id) => write!(f, "{id}")?,
            None => write!(f, "null")?,
        }
        write!(f, ", title={}, version=", self.title)?;
        match self.version {
            Some(v) => write!(f, "{}", v.0)?,
            None => write!(f, "null")?,
        }
        write!(f, ")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::field_map::fields;

    #[test]
    fn test_transient_article_has_no_id_or_version() {
        let a = Article::new("A");
        assert_eq!(a.id(), None);
        assert_eq!(a.version(), None);
        assert_eq!(a.to_string(), "Article(id=null, title=A, version=null)");
    }

    #[test]
    fn test_from_record() {
        let rec = Record::new(RecordId(3), fields([("title", "A")]));
        let a = Article::from_record(&rec).unwrap();
        assert_eq!(a, Article { id: Some(RecordId(3)), title: "A".into(), version: Some(Version(0)) });
        assert_eq!(a.to_string(), "Article(id=3, title=A, version=0)");
        assert_eq!(a.to_fields(), rec.fields);
    }

    #[test]
    fn test_from_record_rejects_bad_title() {
        let rec = Record::new(RecordId(1), fields([("title", 5)]));
        assert!(matches!(Article::from_record(&rec), Err(Error::Mapping(_))));

        let rec = Record::new(RecordId(1), FieldMap::new());
        assert!(matches!(Article::from_record(&rec), Err(Error::Mapping(_))));
    }
}
