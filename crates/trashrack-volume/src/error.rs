use trashrack_core::ScaleRatio;

use crate::DepthError;

#[derive(thiserror::Error, Debug)]
pub enum EstimateError {
    #[error("class {0:?} is not in the registry")]
    UnknownClass(String),
    #[error("scale must be finite and positive (got {0:?})")]
    InvalidScale(ScaleRatio),
    #[error("{what} is {got_w}x{got_h}, expected {expected_w}x{expected_h}")]
    ShapeMismatch {
        what: &'static str,
        expected_w: usize,
        expected_h: usize,
        got_w: usize,
        got_h: usize,
    },
    #[error("depth estimation failed: {0}")]
    Depth(#[source] DepthError),
}
