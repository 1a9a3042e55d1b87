//! Ordered field maps for the document backend.

use crate::row::Row;
use crate::value::Value;

/// An ordered set of named fields.
///
/// Used as the write payload and as the filter for document operations.
/// Operator expressions such as `{"$gt": 5}` are carried as [`Value::Json`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing an existing one in place.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        let key = key.into();
        let value = value.into();
        if let Some(slot) = self.fields.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
        } else {
            self.fields.push((key, value));
        }
    }

    /// Builder form of [`Document::insert`].
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(k, _)| k == key)?;
        Some(self.fields.remove(pos).1)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.iter().any(|(k, _)| k == key)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Copy every column of a row into a document, keeping column order.
    pub fn from_row(row: &Row) -> Self {
        row.iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    /// Turn the document into a row with the same field order.
    pub fn into_row(self) -> Row {
        let (names, values) = self.fields.into_iter().unzip();
        Row::new(names, values)
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (k, v) in iter {
            doc.insert(k, v);
        }
        doc
    }
}

impl IntoIterator for Document {
    type Item = (String, Value);
    type IntoIter = std::vec::IntoIter<(String, Value)>;

    fn into_iter(self) -> Self::IntoIter {
        self.fields.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_keeps_order_and_replaces_in_place() {
        let mut doc = Document::new().with("b", 1).with("a", 2);
        doc.insert("b", 3);
        assert_eq!(doc.keys().collect::<Vec<_>>(), ["b", "a"]);
        assert_eq!(doc.get("b"), Some(&Value::BigInt(3)));
        assert_eq!(doc.remove("a"), Some(Value::BigInt(2)));
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn converts_to_and_from_rows() {
        let doc = Document::new()
            .with("_id", "65f0c0ffee")
            .with("qty", 4)
            .with("tags", Value::Array(vec![Value::from("x")]));
        let row = doc.clone().into_row();
        assert_eq!(row.get_by_name("qty"), Some(&Value::BigInt(4)));
        assert_eq!(Document::from_row(&row), doc);
    }
}
