//! Ordered list persistence.
//!
//! [`PersistList`] stores items under monotonically increasing numeric
//! string keys, giving ordered push/pop over a [`PersistBase`] directory.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;

use hive_core::errors::Result;

use crate::base::PersistBase;

/// An ordered list of JSON entities on disk.
#[derive(Debug)]
pub struct PersistList {
    base: PersistBase,
    last_key: Mutex<u64>,
}

impl PersistList {
    /// Open a list over `base`. Runs `base.init()` and seeds the key
    /// counter from the largest existing key.
    pub fn open(base: PersistBase) -> Result<Self> {
        base.init()?;
        let last = base
            .keys()?
            .into_iter()
            .filter_map(|k| k.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        Ok(Self {
            base,
            last_key: Mutex::new(last),
        })
    }

    /// Append a value; returns its numeric key.
    pub fn push<T: Serialize>(&self, value: &T) -> Result<u64> {
        let key = {
            let mut last = self.last_key.lock();
            *last += 1;
            *last
        };
        self.base.write_value(&key.to_string(), value)?;
        Ok(key)
    }

    /// Remove and return the most recently pushed value.
    pub fn pop<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        loop {
            let Some(key) = self
                .base
                .keys()?
                .into_iter()
                .filter_map(|k| k.parse::<u64>().ok())
                .max()
            else {
                return Ok(None);
            };
            let value: Option<T> = self.base.read_value(&key.to_string())?;
            let _ = self.base.remove(&key.to_string())?;
            if value.is_some() {
                return Ok(value);
            }
            // Raced with a concurrent pop; retry with the next key down.
        }
    }

    /// All values in push order.
    pub fn values<T: DeserializeOwned>(&self) -> Result<Vec<T>> {
        let mut keys: Vec<u64> = self
            .base
            .keys()?
            .into_iter()
            .filter_map(|k| k.parse::<u64>().ok())
            .collect();
        keys.sort_unstable();
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = self.base.read_value(&key.to_string())? {
                values.push(value);
            }
        }
        Ok(values)
    }

    /// Number of stored items.
    pub fn len(&self) -> Result<usize> {
        Ok(self
            .base
            .keys()?
            .into_iter()
            .filter(|k| k.parse::<u64>().is_ok())
            .count())
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
