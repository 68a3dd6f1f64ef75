//! Input signature of the compiled UTC graph.
//!
//! The signature is a fixed constant shared by the exporter, which compiles the
//! graph against it, and by the inference side, which checks every batch
//! against it before handing tensors to an engine.

use candle_core::{DType, Tensor};
use thiserror::Error;

/// Element type of a graph input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Int64,
    Float32,
}

impl ElementType {
    /// Name used by the Paddle runtime.
    pub fn as_str(&self) -> &'static str {
        match self {
            ElementType::Int64 => "int64",
            ElementType::Float32 => "float32",
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            ElementType::Int64 => DType::I64,
            ElementType::Float32 => DType::F32,
        }
    }
}

impl std::fmt::Display for ElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One dimension of a tensor shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dim {
    /// Any size; batch and sequence dimensions.
    Dynamic,
    Fixed(usize),
}

impl Dim {
    fn accepts(&self, size: usize) -> bool {
        match self {
            Dim::Dynamic => true,
            Dim::Fixed(n) => *n == size,
        }
    }
}

/// Named tensor descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TensorSpec {
    pub name: &'static str,
    pub shape: &'static [Dim],
    pub dtype: ElementType,
}

impl TensorSpec {
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Shape as a Python list literal, `None` standing for dynamic dimensions.
    pub fn python_shape(&self) -> String {
        let dims: Vec<String> = self
            .shape
            .iter()
            .map(|d| match d {
                Dim::Dynamic => "None".to_string(),
                Dim::Fixed(n) => n.to_string(),
            })
            .collect();
        format!("[{}]", dims.join(", "))
    }

    fn check(&self, tensor: &Tensor) -> Result<(), SignatureError> {
        if tensor.dtype() != self.dtype.dtype() {
            return Err(SignatureError::DType {
                name: self.name,
                expected: self.dtype,
                found: tensor.dtype(),
            });
        }
        let dims = tensor.dims();
        if dims.len() != self.rank() || !self.shape.iter().zip(dims).all(|(d, &s)| d.accepts(s)) {
            return Err(SignatureError::Shape {
                name: self.name,
                expected: self.python_shape(),
                found: dims.to_vec(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("expected {expected} input tensors, got {found}")]
    Arity { expected: usize, found: usize },

    #[error("input `{name}` must be {expected}, got {found:?}")]
    DType {
        name: &'static str,
        expected: ElementType,
        found: DType,
    },

    #[error("input `{name}` must have shape {expected}, got {found:?}")]
    Shape {
        name: &'static str,
        expected: String,
        found: Vec<usize>,
    },
}

/// Ordered list of the tensors a compiled artifact expects at call time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSignature(&'static [TensorSpec]);

const MATRIX: &[Dim] = &[Dim::Dynamic, Dim::Dynamic];

impl InputSignature {
    /// Calling convention of the UTC model.
    pub const UTC: InputSignature = InputSignature(&[
        TensorSpec {
            name: "input_ids",
            shape: MATRIX,
            dtype: ElementType::Int64,
        },
        TensorSpec {
            name: "token_type_ids",
            shape: MATRIX,
            dtype: ElementType::Int64,
        },
        TensorSpec {
            name: "position_ids",
            shape: MATRIX,
            dtype: ElementType::Int64,
        },
        TensorSpec {
            name: "attention_mask",
            shape: &[Dim::Dynamic, Dim::Dynamic, Dim::Dynamic, Dim::Dynamic],
            dtype: ElementType::Float32,
        },
        TensorSpec {
            name: "omask_positions",
            shape: MATRIX,
            dtype: ElementType::Int64,
        },
        TensorSpec {
            name: "cls_positions",
            shape: &[Dim::Dynamic],
            dtype: ElementType::Int64,
        },
    ]);

    pub const fn new(specs: &'static [TensorSpec]) -> Self {
        Self(specs)
    }

    pub fn specs(&self) -> &'static [TensorSpec] {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> {
        self.0.iter().map(|s| s.name)
    }

    /// Check that `inputs` match the signature positionally.
    pub fn validate(&self, inputs: &[Tensor]) -> Result<(), SignatureError> {
        if inputs.len() != self.len() {
            return Err(SignatureError::Arity {
                expected: self.len(),
                found: inputs.len(),
            });
        }
        self.0
            .iter()
            .zip(inputs)
            .try_for_each(|(spec, tensor)| spec.check(tensor))
    }
}
