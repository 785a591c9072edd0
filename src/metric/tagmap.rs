//! tagmap is the key, value collection that distinguishes identically named
//! metrics from one another. Think of it as a specialized hashmap: entries are
//! kept sorted by key so that iteration order -- and therefore the canonical
//! serialization used for identity -- never depends on insertion order.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::slice::Iter;

/// A small sorted-vector map from tag name to tag value. Both sides are
/// strings; scalar tag values are canonicalized to strings at the ingress
/// boundary. Lookup and insertion are binary searches, which beats hashing
/// for the handful of tags a metric realistically carries.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TagMap {
    inner: Vec<(String, String)>,
}

impl Default for TagMap {
    fn default() -> TagMap {
        TagMap {
            inner: Vec::with_capacity(8),
        }
    }
}

impl TagMap {
    /// Create an empty `TagMap`.
    pub fn new() -> TagMap {
        Default::default()
    }

    /// Iterate the key, value pairs in ascending key order.
    pub fn iter(&self) -> Iter<(String, String)> {
        self.inner.iter()
    }

    /// Get a value from the tagmap, if it exists.
    pub fn get(&self, key: &str) -> Option<&str> {
        match self
            .inner
            .binary_search_by(|probe| probe.0.as_str().cmp(key))
        {
            Ok(idx) => Some(&self.inner[idx].1),
            Err(_) => None,
        }
    }

    /// Insert a key / value into self.
    ///
    /// Returns the value previously stored under the given key, if there was
    /// such a value.
    pub fn insert<K, V>(&mut self, key: K, val: V) -> Option<String>
    where
        K: Into<String>,
        V: Into<String>,
    {
        let key = key.into();
        let val = val.into();
        match self.inner.binary_search_by(|probe| probe.0.cmp(&key)) {
            Ok(idx) => {
                self.inner.push((key, val));
                let old = self.inner.swap_remove(idx);
                Some(old.1)
            }
            Err(idx) => {
                self.inner.insert(idx, (key, val));
                None
            }
        }
    }

    /// Merge another tagmap underneath self.
    ///
    /// Keys already present in self are left alone: existing entries take
    /// precedence over `other`. This is exactly the rule for overlaying
    /// derived global tags beneath event-supplied tags.
    pub fn merge(&mut self, other: &TagMap) {
        for &(ref key, ref val) in &other.inner {
            match self.inner.binary_search_by(|probe| probe.0.cmp(key)) {
                Ok(_) => {}
                Err(idx) => {
                    self.inner.insert(idx, (key.clone(), val.clone()));
                }
            }
        }
    }

    /// Render the canonical `key:value` serialization, entries joined by
    /// commas. Two tagmaps with equal contents always render identically, no
    /// matter the order their entries arrived in. The empty map renders as
    /// the empty string.
    pub fn to_segment(&self) -> String {
        let mut segment = String::new();
        for (idx, &(ref k, ref v)) in self.inner.iter().enumerate() {
            if idx > 0 {
                segment.push(',');
            }
            segment.push_str(k);
            segment.push(':');
            segment.push_str(v);
        }
        segment
    }

    /// Determine if the tagmap is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// The total number of key / values stored in the map.
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

impl Serialize for TagMap {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.inner.len()))?;
        for &(ref k, ref v) in &self.inner {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

struct TagMapVisitor;

impl<'de> Visitor<'de> for TagMapVisitor {
    type Value = TagMap;

    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        formatter.write_str("a map of tag names to tag values")
    }

    fn visit_map<M>(self, mut access: M) -> Result<TagMap, M::Error>
    where
        M: MapAccess<'de>,
    {
        let mut tags = TagMap::new();
        while let Some((key, val)) = access.next_entry::<String, String>()? {
            tags.insert(key, val);
        }
        Ok(tags)
    }
}

impl<'de> Deserialize<'de> for TagMap {
    fn deserialize<D>(deserializer: D) -> Result<TagMap, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_map(TagMapVisitor)
    }
}
