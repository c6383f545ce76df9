use crate::{log::Error, render::Value};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::to_value;

/// Provides storage for data that templates can be rendered against.
///
/// Values are converted into [`Value`] when they are inserted, so a
/// `Store` can be rendered any number of times without converting again.
#[derive(Debug, Clone, Default)]
pub struct Store {
    data: IndexMap<String, Value>,
}

impl Store {
    /// Create a new Store.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new Store from the fields of a serializable struct or map.
    ///
    /// # Errors
    ///
    /// Returns an error if the serialization fails, or the value does not
    /// serialize to a map.
    ///
    /// # Examples
    ///
    /// ```
    /// use kiln::Store;
    /// use serde::Serialize;
    ///
    /// #[derive(Serialize)]
    /// struct Page {
    ///     title: String,
    /// }
    ///
    /// let store = Store::from_serialize(Page { title: "Home".into() }).unwrap();
    /// assert!(store.get("title").is_some());
    /// ```
    pub fn from_serialize<T>(value: T) -> Result<Self, Error>
    where
        T: Serialize,
    {
        match convert(value)? {
            Value::Map(map) => Ok(Self {
                data: map.as_ref().clone(),
            }),
            other => Err(Error::build(format!(
                "a store can only be created from a map, not `{}`",
                other.kind()
            ))),
        }
    }

    /// Insert the value into the Store.
    ///
    /// # Errors
    ///
    /// Returns an error if the serialization fails.
    pub fn insert<S, T>(&mut self, key: S, value: T) -> Result<(), Error>
    where
        S: Into<String>,
        T: Serialize,
    {
        let value = convert(value)?;
        self.data.insert(key.into(), value);
        Ok(())
    }

    /// Insert the value into the Store.
    ///
    /// # Panics
    ///
    /// Will panic if the serialization fails.
    #[inline]
    pub fn insert_must<S, T>(&mut self, key: S, value: T)
    where
        S: Into<String>,
        T: Serialize,
    {
        self.insert(key, value).unwrap();
    }

    /// Insert a [`Value`] into the Store without serializing it.
    ///
    /// Used for values that have no serialized form, such as objects.
    #[inline]
    pub fn insert_value<S, T>(&mut self, key: S, value: T)
    where
        S: Into<String>,
        T: Into<Value>,
    {
        self.data.insert(key.into(), value.into());
    }

    /// Insert the value into the Store.
    ///
    /// Returns the Store, so additional methods may be chained.
    ///
    /// # Errors
    ///
    /// Returns an error if the serialization fails.
    pub fn with<S, T>(mut self, key: S, value: T) -> Result<Self, Error>
    where
        S: Into<String>,
        T: Serialize,
    {
        self.insert(key, value)?;
        Ok(self)
    }

    /// Insert the value into the Store.
    ///
    /// Returns the Store, so additional methods may be chained.
    ///
    /// # Panics
    ///
    /// Will panic if the serialization fails.
    #[inline]
    pub fn with_must<S, T>(mut self, key: S, value: T) -> Self
    where
        S: Into<String>,
        T: Serialize,
    {
        self.insert_must(key, value);
        self
    }

    /// Insert a [`Value`] into the Store without serializing it.
    ///
    /// Returns the Store, so additional methods may be chained.
    #[inline]
    pub fn with_value<S, T>(mut self, key: S, value: T) -> Self
    where
        S: Into<String>,
        T: Into<Value>,
    {
        self.insert_value(key, value);
        self
    }

    /// Get the value of the given key, if any.
    #[inline]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Return every value in the Store, in insertion order.
    #[inline]
    pub(crate) fn data(&self) -> &IndexMap<String, Value> {
        &self.data
    }
}

/// Serialize a value into a [`Value`].
pub(crate) fn convert<T>(value: T) -> Result<Value, Error>
where
    T: Serialize,
{
    to_value(value)
        .map(Value::from)
        .map_err(|e| Error::build(format!("value is unserializable: {e}")))
}

#[cfg(test)]
mod tests {
    use crate::{render::Value, Store};
    use serde::Serialize;
    use std::collections::BTreeMap;

    #[test]
    fn test_insert() {
        let mut store = Store::new();
        store.insert_must("one", "two");

        assert!(store.get("one").is_some_and(|t| t.as_str() == Some("two")));
    }

    #[test]
    fn test_insert_fluent() {
        assert!(Store::new()
            .with_must("three", "four")
            .get("three")
            .is_some_and(|t| t.as_str() == Some("four")))
    }

    #[test]
    fn test_insert_nested() {
        let mut map = BTreeMap::new();
        map.insert("n", vec![1, 2]);
        let store = Store::new().with_must("m", map);

        assert_eq!(store.get("m").unwrap().get_path("n.1"), Value::Int(2));
    }

    #[test]
    fn test_from_serialize() {
        #[derive(Serialize)]
        struct User {
            name: &'static str,
            age: u8,
        }

        let store = Store::from_serialize(User {
            name: "taylor",
            age: 30,
        })
        .unwrap();
        assert_eq!(store.get("age"), Some(&Value::Int(30)));
        assert!(Store::from_serialize(5).is_err());
    }

    #[test]
    fn test_insert_value() {
        let store = Store::new().with_value("safe", Value::markup("<b>"));
        assert!(store.get("safe").is_some_and(Value::is_markup));
    }
}
