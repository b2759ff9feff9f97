//! Load-time registration records.
//!
//! A generated unit exposes plain records of factory functions. They are the only entry points
//! a host resolves by name; everything else is reached through them.
use crate::coordinate_mapping::CoordinateMapping;
use crate::dofmap::Dofmap;
use crate::element::FiniteElement;
use crate::form::{bind_coefficients, Form};
use crate::version::ensure_compatible;
use eyre::{eyre, WrapErr};
use log::debug;
use rustc_hash::FxHashMap;

/// The three factories describing a function space.
#[derive(Copy, Clone)]
pub struct FunctionSpaceRecord {
    pub create_finite_element: fn() -> Box<dyn FiniteElement>,
    pub create_dofmap: fn() -> Box<dyn Dofmap>,
    pub create_coordinate_mapping: fn() -> Box<dyn CoordinateMapping>,
}

/// A form factory together with name lookups for its coefficients.
#[derive(Copy, Clone)]
pub struct FormRecord {
    pub create_form: fn() -> Box<dyn Form>,
    /// The name of the coefficient with generated index `i`.
    pub coefficient_name_map: fn(usize) -> Option<&'static str>,
    /// The generated index of the coefficient named `name`.
    pub coefficient_number_map: fn(&str) -> Option<usize>,
}

impl FormRecord {
    /// Orders named user coefficients by generated coefficient index.
    pub fn bind_coefficients_by_name<'a, T>(&self, named: &'a [(&str, T)]) -> eyre::Result<Vec<&'a T>> {
        let form = (self.create_form)();
        let mut bound: Vec<Option<&T>> = vec![None; form.num_coefficients()];
        for (name, value) in named {
            let i = (self.coefficient_number_map)(name)
                .ok_or_else(|| eyre!("form {} has no coefficient named {}", form.signature(), name))?;
            let slot = bound
                .get_mut(i)
                .ok_or_else(|| eyre!("coefficient {} maps to invalid index {}", name, i))?;
            *slot = Some(value);
        }
        bound
            .into_iter()
            .enumerate()
            .map(|(i, value)| {
                value.ok_or_else(|| {
                    let name = (self.coefficient_name_map)(i).unwrap_or("<unnamed>");
                    eyre!("no value supplied for coefficient {} ({})", i, name)
                })
            })
            .collect()
    }

    /// Orders positional user coefficients by generated coefficient index.
    pub fn bind_coefficients<'a, T>(&self, user_coefficients: &'a [T]) -> eyre::Result<Vec<&'a T>> {
        let form = (self.create_form)();
        bind_coefficients(form.as_ref(), user_coefficients)
    }
}

/// The registration surface of one generated unit.
#[derive(Clone)]
pub struct GeneratedUnit {
    /// The interface version the unit was generated against.
    pub version: &'static str,
    pub function_spaces: Vec<(&'static str, FunctionSpaceRecord)>,
    pub forms: Vec<(&'static str, FormRecord)>,
}

/// Records loaded from generated units, resolved by name.
#[derive(Clone, Default)]
pub struct Registry {
    function_spaces: FxHashMap<String, FunctionSpaceRecord>,
    forms: FxHashMap<String, FormRecord>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers all records of `unit` after checking its version. Names already present are
    /// rejected and leave the registry unchanged.
    pub fn load(&mut self, unit: &GeneratedUnit) -> eyre::Result<()> {
        ensure_compatible(unit.version).wrap_err("refusing to load generated unit")?;

        let clash = unit
            .function_spaces
            .iter()
            .map(|(name, _)| name)
            .find(|name| self.function_spaces.contains_key(**name))
            .or_else(|| {
                unit.forms
                    .iter()
                    .map(|(name, _)| name)
                    .find(|name| self.forms.contains_key(**name))
            });
        if let Some(name) = clash {
            return Err(eyre!("record {} is already registered", name));
        }

        for (name, record) in &unit.function_spaces {
            debug!("Registering function space {}", name);
            self.function_spaces.insert(name.to_string(), *record);
        }
        for (name, record) in &unit.forms {
            debug!("Registering form {}", name);
            self.forms.insert(name.to_string(), *record);
        }
        Ok(())
    }

    pub fn function_space(&self, name: &str) -> Option<&FunctionSpaceRecord> {
        self.function_spaces.get(name)
    }

    pub fn form(&self, name: &str) -> Option<&FormRecord> {
        self.forms.get(name)
    }

    pub fn create_form(&self, name: &str) -> eyre::Result<Box<dyn Form>> {
        self.form(name)
            .map(|record| (record.create_form)())
            .ok_or_else(|| eyre!("no form named {} is registered", name))
    }
}
