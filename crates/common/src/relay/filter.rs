use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use super::event::RelayEvent;

/// One subscription filter.
///
/// Present clauses are ANDed; a tag clause matches if the event carries any
/// of its values. A present but empty list matches nothing. Unknown keys are
/// ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub ids: Option<Vec<String>>,
    pub authors: Option<Vec<String>>,
    pub kinds: Option<Vec<u32>>,
    pub since: Option<i64>,
    pub until: Option<i64>,
    pub limit: Option<u64>,
    /// Tag name (without the `#`) to accepted values
    pub tags: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid filter: {0}")]
pub struct FilterError(pub String);

fn field<T: serde::de::DeserializeOwned>(key: &str, value: &Value) -> Result<T, FilterError> {
    serde_json::from_value(value.clone()).map_err(|e| FilterError(format!("{}: {}", key, e)))
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ids<I: IntoIterator<Item = S>, S: Into<String>>(mut self, ids: I) -> Self {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn authors<I: IntoIterator<Item = S>, S: Into<String>>(mut self, authors: I) -> Self {
        self.authors = Some(authors.into_iter().map(Into::into).collect());
        self
    }

    pub fn kinds<I: IntoIterator<Item = u32>>(mut self, kinds: I) -> Self {
        self.kinds = Some(kinds.into_iter().collect());
        self
    }

    pub fn since(mut self, since: i64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: i64) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn tag<I: IntoIterator<Item = S>, S: Into<String>>(mut self, name: &str, values: I) -> Self {
        self.tags.insert(
            name.to_string(),
            values.into_iter().map(Into::into).collect(),
        );
        self
    }

    pub fn from_value(value: &Value) -> Result<Self, FilterError> {
        let object = value
            .as_object()
            .ok_or_else(|| FilterError("filter must be an object".into()))?;

        let mut filter = Filter::default();
        for (key, value) in object {
            match key.as_str() {
                "ids" => filter.ids = Some(field(key, value)?),
                "authors" => filter.authors = Some(field(key, value)?),
                "kinds" => filter.kinds = Some(field(key, value)?),
                "since" => filter.since = Some(field(key, value)?),
                "until" => filter.until = Some(field(key, value)?),
                "limit" => filter.limit = Some(field(key, value)?),
                tag if tag.len() > 1 && tag.starts_with('#') => {
                    filter.tags.insert(tag[1..].to_string(), field(key, value)?);
                }
                _ => {}
            }
        }
        Ok(filter)
    }

    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        if let Some(ids) = &self.ids {
            object.insert("ids".into(), Value::from(ids.clone()));
        }
        if let Some(authors) = &self.authors {
            object.insert("authors".into(), Value::from(authors.clone()));
        }
        if let Some(kinds) = &self.kinds {
            object.insert("kinds".into(), Value::from(kinds.clone()));
        }
        if let Some(since) = self.since {
            object.insert("since".into(), Value::from(since));
        }
        if let Some(until) = self.until {
            object.insert("until".into(), Value::from(until));
        }
        if let Some(limit) = self.limit {
            object.insert("limit".into(), Value::from(limit));
        }
        for (name, values) in &self.tags {
            object.insert(format!("#{}", name), Value::from(values.clone()));
        }
        Value::Object(object)
    }

    /// True if any list clause is present but empty
    pub fn is_unsatisfiable(&self) -> bool {
        self.ids.as_ref().is_some_and(Vec::is_empty)
            || self.authors.as_ref().is_some_and(Vec::is_empty)
            || self.kinds.as_ref().is_some_and(Vec::is_empty)
            || self.tags.values().any(Vec::is_empty)
    }

    /// Does `event` satisfy every clause? `limit` only applies to stored
    /// queries and is ignored here.
    pub fn matches(&self, event: &RelayEvent) -> bool {
        if let Some(ids) = &self.ids {
            if !ids.contains(&event.id) {
                return false;
            }
        }
        if let Some(authors) = &self.authors {
            if !authors.contains(&event.pubkey) {
                return false;
            }
        }
        if let Some(kinds) = &self.kinds {
            if !kinds.contains(&event.kind) {
                return false;
            }
        }
        if self.since.is_some_and(|since| event.created_at < since) {
            return false;
        }
        if self.until.is_some_and(|until| event.created_at > until) {
            return false;
        }
        self.tags
            .iter()
            .all(|(name, values)| values.iter().any(|value| event.has_tag(name, value)))
    }
}

impl Serialize for Filter {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Filter::from_value(&value).map_err(serde::de::Error::custom)
    }
}
