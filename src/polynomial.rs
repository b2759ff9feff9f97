//! Multivariate polynomials on reference cells.
//!
//! Reference bases are small, so polynomials are stored as a flat list of monomials. This keeps
//! differentiation of any order exact and trivial.
use std::collections::BTreeMap;
use std::ops::{Add, Mul, Neg, Sub};

/// Maximum number of variables, i.e. the largest supported topological dimension.
pub const MAX_VARIABLES: usize = 3;

type Exponents = [u32; MAX_VARIABLES];

#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    num_variables: usize,
    // Invariant: no zero coefficients, no duplicate exponents
    terms: Vec<(Exponents, f64)>,
}

impl Polynomial {
    fn from_map(num_variables: usize, map: BTreeMap<Exponents, f64>) -> Self {
        Self {
            num_variables,
            terms: map.into_iter().filter(|(_, c)| *c != 0.0).collect(),
        }
    }

    pub fn zero(num_variables: usize) -> Self {
        assert!(num_variables <= MAX_VARIABLES);
        Self {
            num_variables,
            terms: Vec::new(),
        }
    }

    pub fn constant(num_variables: usize, value: f64) -> Self {
        let mut map = BTreeMap::new();
        map.insert([0; MAX_VARIABLES], value);
        Self::from_map(num_variables, map)
    }

    /// The polynomial `x_i`.
    pub fn variable(num_variables: usize, i: usize) -> Self {
        assert!(i < num_variables, "Variable index out of bounds.");
        let mut exponents = [0; MAX_VARIABLES];
        exponents[i] = 1;
        Self {
            num_variables,
            terms: vec![(exponents, 1.0)],
        }
    }

    pub fn num_variables(&self) -> usize {
        self.num_variables
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn degree(&self) -> u32 {
        self.terms
            .iter()
            .map(|(e, _)| e.iter().sum())
            .max()
            .unwrap_or(0)
    }

    pub fn evaluate(&self, x: &[f64]) -> f64 {
        assert_eq!(x.len(), self.num_variables, "Point dimension must match number of variables.");
        self.terms
            .iter()
            .map(|(exponents, c)| {
                x.iter()
                    .zip(exponents)
                    .fold(*c, |acc, (xi, &e)| acc * xi.powi(e as i32))
            })
            .sum()
    }

    /// The partial derivative with respect to `x_i`.
    pub fn derivative(&self, i: usize) -> Self {
        assert!(i < self.num_variables, "Variable index out of bounds.");
        let mut map = BTreeMap::new();
        for (exponents, c) in &self.terms {
            if exponents[i] > 0 {
                let mut lowered = *exponents;
                lowered[i] -= 1;
                *map.entry(lowered).or_insert(0.0) += c * exponents[i] as f64;
            }
        }
        Self::from_map(self.num_variables, map)
    }

    /// Differentiates successively with respect to each variable in `indices`.
    pub fn mixed_derivative(&self, indices: &[usize]) -> Self {
        indices
            .iter()
            .fold(self.clone(), |p, &i| p.derivative(i))
    }

    pub fn scale(&self, factor: f64) -> Self {
        let mut map = BTreeMap::new();
        for (exponents, c) in &self.terms {
            map.insert(*exponents, c * factor);
        }
        Self::from_map(self.num_variables, map)
    }
}

impl<'a> Add<&'a Polynomial> for &'a Polynomial {
    type Output = Polynomial;

    fn add(self, rhs: &'a Polynomial) -> Polynomial {
        assert_eq!(self.num_variables, rhs.num_variables);
        let mut map: BTreeMap<Exponents, f64> = self.terms.iter().copied().collect();
        for (exponents, c) in &rhs.terms {
            *map.entry(*exponents).or_insert(0.0) += c;
        }
        Polynomial::from_map(self.num_variables, map)
    }
}

impl<'a> Sub<&'a Polynomial> for &'a Polynomial {
    type Output = Polynomial;

    fn sub(self, rhs: &'a Polynomial) -> Polynomial {
        self + &(-rhs)
    }
}

impl<'a> Neg for &'a Polynomial {
    type Output = Polynomial;

    fn neg(self) -> Polynomial {
        self.scale(-1.0)
    }
}

impl<'a> Mul<&'a Polynomial> for &'a Polynomial {
    type Output = Polynomial;

    fn mul(self, rhs: &'a Polynomial) -> Polynomial {
        assert_eq!(self.num_variables, rhs.num_variables);
        let mut map = BTreeMap::new();
        for (e1, c1) in &self.terms {
            for (e2, c2) in &rhs.terms {
                let mut exponents = [0; MAX_VARIABLES];
                for k in 0..MAX_VARIABLES {
                    exponents[k] = e1[k] + e2[k];
                }
                *map.entry(exponents).or_insert(0.0) += c1 * c2;
            }
        }
        Polynomial::from_map(self.num_variables, map)
    }
}

impl<'a> Mul<f64> for &'a Polynomial {
    type Output = Polynomial;

    fn mul(self, rhs: f64) -> Polynomial {
        self.scale(rhs)
    }
}

/// Barycentric coordinates `[1 - sum(x), x_0, x_1, ...]` of the reference simplex in `dim` variables.
pub fn barycentric_coordinates(dim: usize) -> Vec<Polynomial> {
    let one = Polynomial::constant(dim, 1.0);
    let coords: Vec<_> = (0..dim).map(|i| Polynomial::variable(dim, i)).collect();
    let lambda_0 = coords.iter().fold(one, |acc, x| &acc - x);
    std::iter::once(lambda_0).chain(coords).collect()
}
