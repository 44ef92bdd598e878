//! In-value collection codec
//!
//! Lists and vectors are stored as ONE engine value: an escaped, colon-joined
//! ordered sequence of strings. This module owns that codec plus every
//! in-memory operation the list/vector verbs need.
//!
//! The empty collection is never written: an empty list means the backing key
//! is absent. The codec therefore only ever sees non-empty sequences on disk;
//! callers watch the size it reports and delete the key when it reaches zero.

use crate::error::Access;
use crate::keys::{escape, split_escaped, unescape, DELIMITER};
use crate::pattern::glob_match;

/// Aggregate statistics over a numeric collection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Stats {
    pub sum: f64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// An ordered sequence of strings, decoded from one engine value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Items {
    elements: Vec<String>,
}

impl Items {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a stored value.
    ///
    /// The stored form is never empty (empty collection = absent key), so an
    /// empty input decodes to a single empty element.
    pub fn from_value(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let elements = split_escaped(&text, usize::MAX)
            .into_iter()
            .map(unescape)
            .collect();
        Self { elements }
    }

    /// Encode back into one engine value
    pub fn to_value(&self) -> Vec<u8> {
        let mut out = String::new();
        for (i, element) in self.elements.iter().enumerate() {
            if i > 0 {
                out.push(DELIMITER);
            }
            out.push_str(&escape(element));
        }
        out.into_bytes()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn elements(&self) -> &[String] {
        &self.elements
    }

    pub fn into_elements(self) -> Vec<String> {
        self.elements
    }

    // -------------------------------------------------------------------------
    // Mutations
    // -------------------------------------------------------------------------

    /// Append an element (insertion order is list order)
    pub fn push(&mut self, value: impl Into<String>) {
        self.elements.push(value.into());
    }

    /// Remove and return the first element
    pub fn pop_front(&mut self) -> (Access, Option<String>) {
        if self.elements.is_empty() {
            return (Access::NotFound, None);
        }
        (Access::Ok, Some(self.elements.remove(0)))
    }

    /// Remove and return the last element
    pub fn pop_back(&mut self) -> (Access, Option<String>) {
        match self.elements.pop() {
            Some(v) => (Access::Ok, Some(v)),
            None => (Access::NotFound, None),
        }
    }

    /// Remove matching elements; `only_first` stops after one removal.
    /// Returns how many were removed (zero reports `NotFound`).
    pub fn remove(&mut self, value: &str, only_first: bool) -> (Access, usize) {
        let before = self.elements.len();
        if only_first {
            if let Some(pos) = self.elements.iter().position(|e| e == value) {
                self.elements.remove(pos);
            }
        } else {
            self.elements.retain(|e| e != value);
        }
        let removed = before - self.elements.len();
        if removed == 0 {
            (Access::NotFound, 0)
        } else {
            (Access::Ok, removed)
        }
    }

    /// Replace the element at `n`
    pub fn set(&mut self, n: usize, value: impl Into<String>) -> Access {
        match self.elements.get_mut(n) {
            Some(slot) => {
                *slot = value.into();
                Access::Ok
            }
            None => Access::NotFound,
        }
    }

    /// Truncate to `n` elements; growing is not supported, so a larger `n`
    /// leaves the collection untouched
    pub fn resize(&mut self, n: usize) -> Access {
        if n < self.elements.len() {
            self.elements.truncate(n);
        }
        Access::Ok
    }

    /// Sort in place: numerically when every element parses, otherwise
    /// lexicographically
    pub fn sort(&mut self) {
        let numeric: Option<Vec<(f64, String)>> = self
            .elements
            .iter()
            .map(|e| e.parse::<f64>().ok().map(|n| (n, e.clone())))
            .collect();
        match numeric {
            Some(mut decorated) => {
                decorated.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
                self.elements = decorated.into_iter().map(|(_, e)| e).collect();
            }
            None => self.elements.sort_unstable(),
        }
    }

    /// Reverse the element order in place
    pub fn reverse(&mut self) {
        self.elements.reverse();
    }

    // -------------------------------------------------------------------------
    // Lookups
    // -------------------------------------------------------------------------

    /// Whether an exact element exists
    pub fn exists(&self, value: &str) -> bool {
        self.elements.iter().any(|e| e == value)
    }

    /// Element at position `n`
    pub fn index(&self, n: usize) -> (Access, Option<&str>) {
        match self.elements.get(n) {
            Some(v) => (Access::Ok, Some(v.as_str())),
            None => (Access::NotFound, None),
        }
    }

    /// Every element matching a glob pattern, in order
    pub fn find(&self, pattern: &str) -> Vec<String> {
        self.elements
            .iter()
            .filter(|e| glob_match(pattern, e))
            .cloned()
            .collect()
    }

    /// How many elements equal `value`
    pub fn repeats(&self, value: &str) -> usize {
        self.elements.iter().filter(|e| *e == value).count()
    }

    /// Numeric aggregate over all elements.
    ///
    /// `NotFound` on an empty collection, `NotNumeric` when any element fails
    /// to parse.
    pub fn stats(&self) -> (Access, Option<Stats>) {
        if self.elements.is_empty() {
            return (Access::NotFound, None);
        }
        let mut values = Vec::with_capacity(self.elements.len());
        for element in &self.elements {
            match element.parse::<f64>() {
                Ok(v) => values.push(v),
                Err(_) => return (Access::NotNumeric, None),
            }
        }
        let sum: f64 = values.iter().sum();
        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let stats = Stats {
            sum,
            avg: sum / values.len() as f64,
            min,
            max,
        };
        (Access::Ok, Some(stats))
    }
}

impl FromIterator<String> for Items {
    fn from_iter<T: IntoIterator<Item = String>>(iter: T) -> Self {
        Self {
            elements: iter.into_iter().collect(),
        }
    }
}
