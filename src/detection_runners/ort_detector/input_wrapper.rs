//! File/code adapted from https://github.com/jamjamjon/usls

use anyhow::{anyhow, Result};
use ndarray::{Array, IxDyn};

/// Model input, wrapper over [`Array<f32, IxDyn>`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct X(pub Array<f32, IxDyn>);

impl From<Array<f32, IxDyn>> for X {
    fn from(x: Array<f32, IxDyn>) -> Self {
        Self(x)
    }
}

impl From<Vec<f32>> for X {
    fn from(x: Vec<f32>) -> Self {
        Self(Array::from_vec(x).into_dyn())
    }
}

impl std::ops::Deref for X {
    type Target = Array<f32, IxDyn>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl X {
    pub fn from_shape_vec(shape: &[usize], xs: Vec<f32>) -> Result<Self> {
        Ok(Self::from(Array::from_shape_vec(shape, xs)?))
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self(Array::zeros(shape))
    }

    pub fn ndim(&self) -> usize {
        self.0.ndim()
    }

    pub fn into_inner(self) -> Array<f32, IxDyn> {
        self.0
    }
}

/// Ordered, optionally named collection of [`X`] tensors passed to and from an engine.
#[derive(Debug, Clone, Default)]
pub struct Xs {
    names: Vec<String>,
    values: Vec<X>,
}

impl From<X> for Xs {
    fn from(x: X) -> Self {
        let mut xs = Self::new();
        xs.push(x);
        xs
    }
}

impl From<Vec<X>> for Xs {
    fn from(values: Vec<X>) -> Self {
        let names = (0..values.len()).map(|i| i.to_string()).collect();
        Self { names, values }
    }
}

impl std::ops::Index<usize> for Xs {
    type Output = X;

    fn index(&self, index: usize) -> &Self::Output {
        &self.values[index]
    }
}

impl IntoIterator for Xs {
    type Item = X;
    type IntoIter = std::vec::IntoIter<X>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

impl Xs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, x: X) {
        self.names.push(self.values.len().to_string());
        self.values.push(x);
    }

    pub fn push_kv(&mut self, key: &str, x: X) -> Result<()> {
        if self.names.iter().any(|n| n == key) {
            return Err(anyhow!("Xs already holds a tensor named `{key}`"));
        }
        self.names.push(key.to_string());
        self.values.push(x);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&X> {
        self.names.iter().position(|n| n == key).map(|i| &self.values[i])
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &X)> {
        self.names.iter().map(String::as_str).zip(self.values.iter())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
