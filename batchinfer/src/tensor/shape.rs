use anyhow::{anyhow, Result};

pub fn numel(shape: &[usize]) -> usize {
    shape.iter().copied().product::<usize>()
}

/// Convert a declared batch-first shape into known dimensions.
///
/// Returns `None` when any dimension is unknown (negative).
pub fn known_dims(declared: &[i64]) -> Option<Vec<usize>> {
    declared
        .iter()
        .map(|dim| usize::try_from(*dim).ok())
        .collect()
}

/// Split a fully known batch-first shape into the batch size and the
/// per-sample `(channels, rows, cols)` layout plus its raw shape.
///
/// `[N, C, H, W] -> (C, H, W)`, `[N, H, W] -> (1, H, W)` with raw `[H, W]`,
/// `[N, F] -> (1, 1, F)` with raw `[F]`.
pub fn per_sample(shape: &[usize]) -> Result<(usize, [usize; 3], Vec<usize>)> {
    match *shape {
        [batch, channels, rows, cols] => Ok((
            batch,
            [channels, rows, cols],
            vec![channels, rows, cols],
        )),
        [batch, rows, cols] => Ok((batch, [1, rows, cols], vec![rows, cols])),
        [batch, features] => Ok((batch, [1, 1, features], vec![features])),
        _ => Err(anyhow!(
            "operand shape {:?} must have 2, 3 or 4 dimensions",
            shape
        )),
    }
}
