//! Quasi-random points from a scrambled Sobol sequence.
//!
//! Each arm maps to one Sobol sequence index and each parameter to one Sobol
//! dimension, so the `k`-th point of an experiment is fully determined by the
//! seed and `k`. Points live in the unit cube; the engine scales them to the
//! declared bounds.

use sobol_burley::{NUM_DIMENSIONS, sample};

use crate::error::{Error, Result};

/// Scrambled (Burley 2020) Sobol point generator.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SobolSequence {
    seed: u32,
}

impl SobolSequence {
    #[allow(clippy::cast_possible_truncation)]
    pub(crate) fn with_seed(seed: u64) -> Self {
        Self { seed: seed as u32 }
    }

    /// The point at sequence position `index` in `[0, 1)^dims`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidSearchSpace`] when `dims` exceeds the number of
    /// supported Sobol dimensions or `index` leaves the 32-bit sequence.
    pub(crate) fn point(&self, index: u64, dims: usize) -> Result<Vec<f64>> {
        if dims > NUM_DIMENSIONS as usize {
            return Err(Error::InvalidSearchSpace(format!(
                "Sobol sampling supports at most {NUM_DIMENSIONS} parameters, got {dims}"
            )));
        }
        let index = u32::try_from(index).map_err(|_| {
            Error::InvalidSearchSpace("Sobol sequence exhausted".to_string())
        })?;
        #[allow(clippy::cast_possible_truncation)]
        let point = (0..dims as u32)
            .map(|dim| f64::from(sample(index, dim, self.seed)))
            .collect();
        Ok(point)
    }
}
