//! Search space definitions and the parameter vectors that live inside them.

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;

use crate::errors::SpsaResult;
use crate::invalid_spec;

/// A single tunable dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Engine option name (e.g. "ContinuationHistoryScale").
    pub name: String,
    /// Inclusive lower bound.
    pub min: f64,
    /// Inclusive upper bound.
    pub max: f64,
    /// Suggested granularity. Informational only, clipping ignores it.
    #[serde(default)]
    pub step: f64,
    /// Starting value for a fresh run.
    pub default: f64,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, min: f64, max: f64, step: f64, default: f64) -> Self {
        Self {
            name: name.into(),
            min,
            max,
            step,
            default,
        }
    }

    /// Project `value` onto `[min, max]`.
    #[inline]
    pub fn clip(&self, value: f64) -> f64 {
        self.min.max(self.max.min(value))
    }

    #[inline]
    pub fn contains(&self, value: f64) -> bool {
        self.min <= value && value <= self.max
    }

    pub fn validate(&self) -> SpsaResult<()> {
        if self.name.trim().is_empty() {
            return Err(invalid_spec!(&self.name, "name must not be empty"));
        }
        for (field, value) in [("min", self.min), ("max", self.max), ("default", self.default)] {
            if !value.is_finite() {
                return Err(invalid_spec!(&self.name, "{field} must be finite, got {value}"));
            }
        }
        if self.min > self.max {
            return Err(invalid_spec!(
                &self.name,
                "min {} is greater than max {}",
                self.min,
                self.max
            ));
        }
        if !self.contains(self.default) {
            return Err(invalid_spec!(
                &self.name,
                "default {} outside [{}, {}]",
                self.default,
                self.min,
                self.max
            ));
        }
        if !self.step.is_finite() || self.step < 0.0 {
            return Err(invalid_spec!(
                &self.name,
                "step must be finite and non-negative, got {}",
                self.step
            ));
        }
        Ok(())
    }
}

/// The full search space: an ordered list of parameter specs, unique by name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchSpace {
    pub parameters: Vec<ParameterSpec>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self {
            parameters: Vec::new(),
        }
    }

    pub fn add(mut self, spec: ParameterSpec) -> Self {
        self.parameters.push(spec);
        self
    }

    pub fn add_parameter(
        self,
        name: impl Into<String>,
        min: f64,
        max: f64,
        step: f64,
        default: f64,
    ) -> Self {
        self.add(ParameterSpec::new(name, min, max, step, default))
    }

    pub fn len(&self) -> usize {
        self.parameters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parameters.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|p| p.name == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ParameterSpec> {
        self.parameters.iter()
    }

    /// Check every spec and reject duplicate names or an empty space.
    pub fn validate(&self) -> SpsaResult<()> {
        if self.parameters.is_empty() {
            return Err(invalid_spec!("<search space>", "no parameters defined"));
        }
        let mut seen = HashSet::with_capacity(self.parameters.len());
        for spec in &self.parameters {
            spec.validate()?;
            if !seen.insert(spec.name.as_str()) {
                return Err(invalid_spec!(&spec.name, "duplicate parameter name"));
            }
        }
        Ok(())
    }

    /// Vector holding every parameter's default, in declaration order.
    pub fn defaults(&self) -> ParameterVector {
        self.parameters
            .iter()
            .map(|p| (p.name.clone(), p.default))
            .collect()
    }

    /// Build a vector from raw values in declaration order, clipping each one
    /// to its bounds.
    pub fn clipped<I>(&self, values: I) -> ParameterVector
    where
        I: IntoIterator<Item = f64>,
    {
        self.parameters
            .iter()
            .zip(values)
            .map(|(p, v)| (p.name.clone(), p.clip(v)))
            .collect()
    }

    /// Whether `vector` names exactly these parameters and every value is in
    /// bounds.
    pub fn contains(&self, vector: &ParameterVector) -> bool {
        vector.len() == self.parameters.len()
            && self
                .parameters
                .iter()
                .zip(vector.iter())
                .all(|(p, (name, value))| p.name == name && p.contains(value))
    }
}

/// Ordered mapping from parameter name to its current value.
///
/// Serializes as a JSON object whose keys keep insertion order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParameterVector {
    entries: Vec<(String, f64)>,
}

impl ParameterVector {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Set `name` to `value`, appending it if not present.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        let name = name.into();
        match self.entries.iter_mut().find(|(n, _)| *n == name) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.entries.iter().map(|(n, v)| (n.as_str(), *v))
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.entries.iter().map(|(_, v)| *v)
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for ParameterVector {
    fn from_iter<T: IntoIterator<Item = (S, f64)>>(iter: T) -> Self {
        let mut vector = ParameterVector::new();
        for (name, value) in iter {
            vector.insert(name, value);
        }
        vector
    }
}

impl fmt::Display for ParameterVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {value:.4}")?;
        }
        write!(f, "}}")
    }
}

impl Serialize for ParameterVector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, value) in &self.entries {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for ParameterVector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct VectorVisitor;

        impl<'de> Visitor<'de> for VectorVisitor {
            type Value = ParameterVector;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map from parameter name to number")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
                let mut vector = ParameterVector::new();
                while let Some((name, value)) = access.next_entry::<String, f64>()? {
                    vector.insert(name, value);
                }
                Ok(vector)
            }
        }

        deserializer.deserialize_map(VectorVisitor)
    }
}
