use std::marker::PhantomData;

use anyhow::{anyhow, Result};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::tensor::{numel, Tensor};

/// Deterministic tensor generator backed by a seeded `StdRng`.
pub struct Random<T> {
    rng: StdRng,
    _marker: PhantomData<T>,
}

impl<T> Random<T>
where
    T: RandomValue,
{
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            _marker: PhantomData,
        }
    }

    pub fn generate(range: (T, T), shapes: &[usize]) -> Result<Tensor<T>> {
        Self::generate_with_seed(0, range, shapes)
    }

    pub fn generate_with_seed(seed: u64, range: (T, T), shapes: &[usize]) -> Result<Tensor<T>> {
        let mut rng = StdRng::seed_from_u64(seed);
        generate_with_rng::<T>(&mut rng, range, shapes)
    }

    pub fn next(&mut self, range: (T, T), shapes: &[usize]) -> Result<Tensor<T>> {
        generate_with_rng::<T>(&mut self.rng, range, shapes)
    }

    /// Draw `batch` tensors of the same shape.
    pub fn next_batch(
        &mut self,
        range: (T, T),
        shapes: &[usize],
        batch: usize,
    ) -> Result<Vec<Tensor<T>>> {
        (0..batch).map(|_| self.next(range, shapes)).collect()
    }
}

fn generate_with_rng<T: RandomValue>(
    rng: &mut StdRng,
    range: (T, T),
    shapes: &[usize],
) -> Result<Tensor<T>> {
    if shapes.is_empty() {
        return Err(anyhow!("random tensor requires an explicit shape"));
    }
    let len = numel(shapes);
    let mut data = Vec::with_capacity(len);
    for _ in 0..len {
        data.push(T::sample(rng, range)?);
    }
    Tensor::from_vec(shapes, data)
}

pub trait RandomValue: Sized + Copy + Default {
    fn sample(rng: &mut StdRng, range: (Self, Self)) -> Result<Self>;
}

impl RandomValue for f32 {
    fn sample(rng: &mut StdRng, range: (Self, Self)) -> Result<Self> {
        if range.0 > range.1 {
            return Err(anyhow!("invalid random range {}..={}", range.0, range.1));
        }
        Ok(rng.gen_range(range.0..=range.1))
    }
}

impl RandomValue for f64 {
    fn sample(rng: &mut StdRng, range: (Self, Self)) -> Result<Self> {
        if range.0 > range.1 {
            return Err(anyhow!("invalid random range {}..={}", range.0, range.1));
        }
        Ok(rng.gen_range(range.0..=range.1))
    }
}

impl RandomValue for i32 {
    fn sample(rng: &mut StdRng, range: (Self, Self)) -> Result<Self> {
        if range.0 > range.1 {
            return Err(anyhow!("invalid random range {}..={}", range.0, range.1));
        }
        Ok(rng.gen_range(range.0..=range.1))
    }
}
