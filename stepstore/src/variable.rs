//! Variables and the variable catalog.
//!
//! A [`Variable`] describes one N-dimensional array and the block of it held by the local rank.
//! The [`VariableCatalog`] is the ordered set of variables an engine writes; it is built before the engine
//! is opened and shared with it through an [`Arc`](std::sync::Arc).

use std::collections::{BTreeMap, HashMap};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use stepstore_decomposition::ArrayDecomposition;
use thiserror::Error;

/// The element type of a variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    /// `i8`
    #[display("int8")]
    #[serde(alias = "char")]
    Int8,
    /// `i16`
    #[display("int16")]
    Int16,
    /// `i32`
    #[display("int32")]
    #[serde(alias = "int")]
    Int32,
    /// `i64`
    #[display("int64")]
    Int64,
    /// `u8`
    #[display("uint8")]
    UInt8,
    /// `u16`
    #[display("uint16")]
    UInt16,
    /// `u32`
    #[display("uint32")]
    UInt32,
    /// `u64`
    #[display("uint64")]
    UInt64,
    /// `f32`
    #[display("float32")]
    #[serde(alias = "float")]
    Float32,
    /// `f64`
    #[display("float64")]
    #[serde(alias = "double")]
    Float64,
    /// A UTF-8 string.
    #[display("string")]
    String,
}

impl ElementType {
    /// Returns the size in bytes of one element, or [`None`] for variable sized elements.
    #[must_use]
    pub const fn size(&self) -> Option<usize> {
        match self {
            Self::Int8 | Self::UInt8 => Some(1),
            Self::Int16 | Self::UInt16 => Some(2),
            Self::Int32 | Self::UInt32 | Self::Float32 => Some(4),
            Self::Int64 | Self::UInt64 | Self::Float64 => Some(8),
            Self::String => None,
        }
    }
}

/// A variable creation error.
#[derive(Clone, Debug, Error)]
pub enum VariableCreateError {
    /// Shape, start and count have different lengths.
    #[error("variable {name}: shape {shape:?}, start {start:?} and count {count:?} have different dimensionality")]
    IncompatibleDimensionality {
        /// The variable name.
        name: String,
        /// The global shape.
        shape: Vec<u64>,
        /// The local start.
        start: Vec<u64>,
        /// The local count.
        count: Vec<u64>,
    },
    /// The local block extends past the global shape.
    #[error("variable {name}: start {start} + count {count} exceeds shape {shape} on axis {axis}")]
    OutOfBounds {
        /// The variable name.
        name: String,
        /// The axis.
        axis: usize,
        /// The global extent.
        shape: u64,
        /// The local start.
        start: u64,
        /// The local count.
        count: u64,
    },
    /// The variable name is empty.
    #[error("variable name is empty")]
    EmptyName,
    /// A variable with the same name is already declared.
    #[error("variable {0} is already declared")]
    Duplicate(String),
    /// The variable to redeclare is not declared.
    #[error("variable {0} is not declared")]
    Undeclared(String),
}

/// A variable: a global array and the block of it written by the local rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    name: String,
    element_type: ElementType,
    shape: Vec<u64>,
    start: Vec<u64>,
    count: Vec<u64>,
    version: u64,
    params: BTreeMap<String, String>,
}

impl Variable {
    /// Create a new variable.
    ///
    /// An empty `shape` declares a scalar (or a single string).
    ///
    /// # Errors
    /// Returns a [`VariableCreateError`] if the name is empty, `shape`, `start` and `count` differ in length,
    /// or `start + count` exceeds `shape` on any axis.
    pub fn new(
        name: impl Into<String>,
        element_type: ElementType,
        shape: Vec<u64>,
        start: Vec<u64>,
        count: Vec<u64>,
    ) -> Result<Self, VariableCreateError> {
        let name = name.into();
        if name.is_empty() {
            return Err(VariableCreateError::EmptyName);
        }
        if shape.len() != start.len() || shape.len() != count.len() {
            return Err(VariableCreateError::IncompatibleDimensionality {
                name,
                shape,
                start,
                count,
            });
        }
        for (axis, ((&s, &st), &c)) in shape.iter().zip(&start).zip(&count).enumerate() {
            if st.checked_add(c).is_none_or(|end| end > s) {
                return Err(VariableCreateError::OutOfBounds {
                    name,
                    axis,
                    shape: s,
                    start: st,
                    count: c,
                });
            }
        }
        Ok(Self {
            name,
            element_type,
            shape,
            start,
            count,
            version: 0,
            params: BTreeMap::new(),
        })
    }

    /// Create a variable covering the block of `decomposition`.
    ///
    /// # Errors
    /// Returns a [`VariableCreateError`] if the name is empty.
    pub fn from_decomposition(
        name: impl Into<String>,
        element_type: ElementType,
        decomposition: &ArrayDecomposition,
    ) -> Result<Self, VariableCreateError> {
        Self::new(
            name,
            element_type,
            decomposition.global_shape().to_vec(),
            decomposition.offset().to_vec(),
            decomposition.local_shape().to_vec(),
        )
    }

    /// Set the version.
    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Add a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// The name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The element type.
    #[must_use]
    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    /// The global shape.
    #[must_use]
    pub fn shape(&self) -> &[u64] {
        &self.shape
    }

    /// The global start of the local block.
    #[must_use]
    pub fn start(&self) -> &[u64] {
        &self.start
    }

    /// The shape of the local block.
    #[must_use]
    pub fn count(&self) -> &[u64] {
        &self.count
    }

    /// The version.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    /// The parameters.
    #[must_use]
    pub fn params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// The number of elements in the local block. A scalar has one element.
    #[must_use]
    pub fn num_elements(&self) -> u64 {
        self.count.iter().product()
    }

    /// The size in bytes of the local block, or [`None`] for variable sized elements.
    #[must_use]
    pub fn local_size(&self) -> Option<u64> {
        self.element_type
            .size()
            .and_then(|size| (size as u64).checked_mul(self.num_elements()))
    }
}

/// An ordered set of uniquely named variables.
///
/// Iteration follows declaration order.
#[derive(Debug, Clone, Default)]
pub struct VariableCatalog {
    variables: Vec<Variable>,
    index: HashMap<String, usize>,
}

impl VariableCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a variable.
    ///
    /// # Errors
    /// Returns [`VariableCreateError::Duplicate`] if a variable of the same name is declared.
    pub fn declare(&mut self, variable: Variable) -> Result<(), VariableCreateError> {
        if self.index.contains_key(variable.name()) {
            return Err(VariableCreateError::Duplicate(variable.name));
        }
        self.index
            .insert(variable.name.clone(), self.variables.len());
        self.variables.push(variable);
        Ok(())
    }

    /// Replace a declared variable, bumping its version. Returns the new version.
    ///
    /// # Errors
    /// Returns [`VariableCreateError::Undeclared`] if no variable of the same name is declared.
    pub fn redeclare(&mut self, variable: Variable) -> Result<u64, VariableCreateError> {
        let Some(&index) = self.index.get(variable.name()) else {
            return Err(VariableCreateError::Undeclared(variable.name));
        };
        let version = self.variables[index].version + 1;
        self.variables[index] = variable.with_version(version);
        Ok(version)
    }

    /// Returns the variable named `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.index.get(name).map(|&index| &self.variables[index])
    }

    /// Returns true if a variable named `name` is declared.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Iterate over the variables in declaration order.
    pub fn iter(&self) -> std::slice::Iter<'_, Variable> {
        self.variables.iter()
    }

    /// The number of variables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// Returns true if no variables are declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }
}

impl<'a> IntoIterator for &'a VariableCatalog {
    type Item = &'a Variable;
    type IntoIter = std::slice::Iter<'a, Variable>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl TryFrom<Vec<Variable>> for VariableCatalog {
    type Error = VariableCreateError;

    fn try_from(variables: Vec<Variable>) -> Result<Self, Self::Error> {
        let mut catalog = Self::new();
        for variable in variables {
            catalog.declare(variable)?;
        }
        Ok(catalog)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_new() {
        let variable =
            Variable::new("T", ElementType::Float64, vec![4, 4], vec![2, 0], vec![2, 4]).unwrap();
        assert_eq!(variable.num_elements(), 8);
        assert_eq!(variable.local_size(), Some(64));
        assert_eq!(variable.version(), 0);

        assert!(matches!(
            Variable::new("T", ElementType::Float64, vec![4, 4], vec![3, 0], vec![2, 4]),
            Err(VariableCreateError::OutOfBounds { axis: 0, .. })
        ));
        assert!(matches!(
            Variable::new("T", ElementType::Float64, vec![4], vec![0, 0], vec![4]),
            Err(VariableCreateError::IncompatibleDimensionality { .. })
        ));
        assert!(matches!(
            Variable::new("", ElementType::Float64, vec![], vec![], vec![]),
            Err(VariableCreateError::EmptyName)
        ));
        assert!(matches!(
            Variable::new("T", ElementType::UInt8, vec![4], vec![u64::MAX], vec![1]),
            Err(VariableCreateError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn variable_scalar_string() {
        let variable = Variable::new("name", ElementType::String, vec![], vec![], vec![]).unwrap();
        assert_eq!(variable.num_elements(), 1);
        assert_eq!(variable.local_size(), None);
    }

    #[test]
    fn element_type_serde() {
        let element_type: ElementType = serde_json::from_str(r#""double""#).unwrap();
        assert_eq!(element_type, ElementType::Float64);
        assert_eq!(element_type.to_string(), "float64");
        assert_eq!(
            serde_json::to_string(&ElementType::UInt16).unwrap(),
            r#""uint16""#
        );
    }

    #[test]
    fn catalog_order_and_versions() {
        let a = Variable::new("b", ElementType::Int32, vec![], vec![], vec![]).unwrap();
        let b = Variable::new("a", ElementType::Int32, vec![], vec![], vec![]).unwrap();
        let mut catalog = VariableCatalog::try_from(vec![a.clone(), b]).unwrap();
        assert_eq!(
            catalog.iter().map(Variable::name).collect::<Vec<_>>(),
            vec!["b", "a"]
        );
        assert!(matches!(
            catalog.declare(a.clone()),
            Err(VariableCreateError::Duplicate(_))
        ));
        assert_eq!(catalog.redeclare(a.clone()).unwrap(), 1);
        assert_eq!(catalog.redeclare(a).unwrap(), 2);
        assert_eq!(catalog.get("b").unwrap().version(), 2);
        assert!(catalog.contains("a"));
        assert!(!catalog.contains("c"));
        let c = Variable::new("c", ElementType::Int32, vec![], vec![], vec![]).unwrap();
        assert!(matches!(
            catalog.redeclare(c),
            Err(VariableCreateError::Undeclared(_))
        ));
    }
}
