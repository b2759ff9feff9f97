//! Local assembly interface between a form compiler and a finite element host.
//!
//! Generated code provides [`form::Form`]s, which own factories for
//! [`coordinate_mapping::CoordinateMapping`]s, [`element::FiniteElement`]s,
//! [`dofmap::Dofmap`]s and the integral kernels in [`integral`]. A host discovers them through
//! the records in [`registry`] and evaluates local tensors with the dispatch in [`assembly`].
pub mod assembly;
pub mod cell;
pub mod coordinate_mapping;
pub mod dofmap;
pub mod element;
pub mod form;
pub mod integral;
pub mod polynomial;
pub mod registry;
pub mod version;

#[cfg(feature = "proptest-support")]
pub mod proptest;

pub extern crate eyre;
pub extern crate nalgebra;
