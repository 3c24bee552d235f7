use crate::spreadsheet::value::Value;
use indexmap::IndexMap;
use std::borrow::Borrow;
use std::fmt::Display;

/// A column name taken from the header row.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Key(String);

impl Key {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Key {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key(value.to_owned())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key(value)
    }
}

/// One data row keyed by header, in header order. Missing cells are explicit `None`.
pub type Record = IndexMap<Key, Option<Value>>;

/// One element handed to `encode`.
#[derive(Clone, Debug, PartialEq)]
pub enum Entry {
    Record(Record),
    Row(Vec<Option<Value>>),
    /// Neither a record nor a row; rejected by `encode`.
    Value(Value),
}

impl From<Record> for Entry {
    fn from(value: Record) -> Self {
        Entry::Record(value)
    }
}

impl From<Vec<Option<Value>>> for Entry {
    fn from(value: Vec<Option<Value>>) -> Self {
        Entry::Row(value)
    }
}

impl From<Value> for Entry {
    fn from(value: Value) -> Self {
        Entry::Value(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_looked_up_by_str() {
        let mut record = Record::new();
        record.insert(Key::from("name"), Some(Value::from("Ada")));
        record.insert(Key::from("age".to_owned()), None);
        assert_eq!(record.get("name"), Some(&Some(Value::from("Ada"))));
        assert_eq!(record.get("age"), Some(&None));
        assert_eq!(record.keys().map(Key::as_str).collect::<Vec<_>>(), vec!["name", "age"]);
        assert_eq!(Key::from("name").to_string(), "name");
    }
}
