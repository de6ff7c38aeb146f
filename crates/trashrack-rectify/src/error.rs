use trashrack_core::PixelBox;

use crate::BoxKind;

/// Errors returned by the rectification stage.
///
/// Every variant is a configuration or input-contract problem; none of them
/// is retried.
#[derive(thiserror::Error, Debug)]
pub enum RectifyError {
    #[error("barrier dimensions must be finite and positive")]
    InvalidDimensions,
    #[error("horizontal resolution must be finite and positive (got {0})")]
    InvalidResolution(f64),
    #[error("{kind:?} width of {meters} m at {x_res} m/px rounds to zero pixels")]
    SectionTooNarrow { kind: BoxKind, meters: f64, x_res: f64 },
    #[error("no column boxes were supplied")]
    NoColumns,
    #[error("column boxes must be set before rectifying")]
    ColumnsNotSet,
    #[error("no structure box was supplied")]
    NoStructure,
    #[error("structure box {0:?} has zero height")]
    FlatStructure(PixelBox),
    #[error("sections span no rows (top={top}, bottom={bottom})")]
    EmptyExtent { top: i32, bottom: i32 },
    #[error("section {0:?} lies outside the image")]
    SectionOutsideImage(PixelBox),
    #[error("image is {got_w}x{got_h}, plan was built for {expected_w}x{expected_h}")]
    SourceShape {
        expected_w: u32,
        expected_h: u32,
        got_w: u32,
        got_h: u32,
    },
}
