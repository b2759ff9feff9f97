//! Composite elements assembled from other elements.
use crate::element::{ElementDefinition, ElementError, FiniteElement};
use itertools::Itertools;

fn check_same_cell(elements: &[ElementDefinition]) -> Result<(), ElementError> {
    let first = elements
        .first()
        .ok_or_else(|| ElementError::InvalidComposite("a composite element needs at least one sub-element".into()))?;
    for element in elements {
        if element.shape != first.shape || element.geometric_dimension != first.geometric_dimension {
            return Err(ElementError::InvalidComposite(format!(
                "sub-elements {} and {} are defined on different cells",
                first.signature, element.signature
            )));
        }
    }
    Ok(())
}

/// Concatenates the bases of `sub_elements`, shifting component offsets so that each
/// sub-element occupies its own block of (reference) value components.
fn concatenate(
    signature: String,
    family: String,
    value_shape: Vec<usize>,
    reference_value_shape: Vec<usize>,
    sub_elements: Vec<ElementDefinition>,
) -> ElementDefinition {
    let mut reference_offset = 0;
    let mut physical_offset = 0;
    let mut basis = Vec::new();
    for sub in &sub_elements {
        basis.extend(sub.basis.iter().cloned().map(|mut phi| {
            phi.reference_offset += reference_offset;
            phi.physical_offset += physical_offset;
            phi
        }));
        reference_offset += sub.reference_value_size();
        physical_offset += sub.value_size();
    }

    let first = &sub_elements[0];
    ElementDefinition {
        signature,
        family,
        shape: first.shape,
        geometric_dimension: first.geometric_dimension,
        degree: sub_elements.iter().map(|e| e.degree).max().unwrap_or(0),
        value_shape,
        reference_value_shape,
        basis,
        sub_elements,
    }
}

/// A mixed element whose value is the concatenation of the flattened values of its
/// sub-elements.
pub fn mixed(sub_elements: Vec<ElementDefinition>) -> Result<ElementDefinition, ElementError> {
    check_same_cell(&sub_elements)?;
    let value_size = sub_elements.iter().map(|e| e.value_size()).sum();
    let reference_value_size = sub_elements.iter().map(|e| e.reference_value_size()).sum();
    let signature = format!(
        "MixedElement({})",
        sub_elements.iter().map(|e| e.signature.as_str()).join(", ")
    );
    Ok(concatenate(
        signature,
        "Mixed".to_string(),
        vec![value_size],
        vec![reference_value_size],
        sub_elements,
    ))
}

fn check_scalar(element: &ElementDefinition, kind: &str) -> Result<(), ElementError> {
    if element.value_rank() != 0 {
        Err(ElementError::InvalidComposite(format!(
            "{} elements must be built from scalar elements, got {}",
            kind, element.signature
        )))
    } else {
        Ok(())
    }
}

/// `dim` copies of a scalar element, one per vector component.
pub fn vector(element: ElementDefinition, dim: usize) -> Result<ElementDefinition, ElementError> {
    check_scalar(&element, "vector")?;
    if dim == 0 {
        return Err(ElementError::InvalidComposite("vector dimension must be positive".into()));
    }
    let signature = format!("VectorElement({}, dim={})", element.signature, dim);
    let family = element.family.clone();
    Ok(concatenate(
        signature,
        family,
        vec![dim],
        vec![dim],
        vec![element; dim],
    ))
}

/// `shape[0] * shape[1]` copies of a scalar element, stored row-major.
pub fn tensor(element: ElementDefinition, shape: [usize; 2]) -> Result<ElementDefinition, ElementError> {
    check_scalar(&element, "tensor")?;
    let [rows, cols] = shape;
    if rows == 0 || cols == 0 {
        return Err(ElementError::InvalidComposite("tensor shape must be non-empty".into()));
    }
    let signature = format!("TensorElement({}, shape=({}, {}))", element.signature, rows, cols);
    let family = element.family.clone();
    Ok(concatenate(
        signature,
        family,
        vec![rows, cols],
        vec![rows, cols],
        vec![element; rows * cols],
    ))
}
