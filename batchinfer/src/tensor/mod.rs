mod random;
mod shape;
mod tensor;

pub use random::{Random, RandomValue};
pub use shape::{known_dims, numel, per_sample};
pub use tensor::Tensor;
