//! Piecewise horizontal rectification of trash-rack frames.
//!
//! A frame is cut into alternating column and grid-cell sections, each
//! section is resampled to the pixel width its physical width implies, and
//! the sections are concatenated again. After rectification one pixel
//! column corresponds to `x_res` meters everywhere in the frame.
//!
//! ```no_run
//! use image::RgbImage;
//! use trashrack_core::{BarrierDimensions, PixelBox};
//! use trashrack_rectify::rectify;
//!
//! let frame = RgbImage::new(200, 100);
//! let columns = [PixelBox::new(50, 20, 70, 100), PixelBox::new(150, 20, 170, 100)];
//! let structure = [PixelBox::new(0, 0, 200, 100)];
//! let dims = BarrierDimensions::new(10.0, 10.0, 3.0);
//!
//! let out = rectify(&frame, None, &columns, &structure, dims, 0.1).unwrap();
//! assert_eq!(out.image.dimensions(), (360, 80));
//! ```

mod error;
mod rectifier;
mod sections;

pub use error::RectifyError;
pub use rectifier::{rectify, BarrierRectifier, RectifiedBarrier, Resampling, SectionPlan};
pub use sections::{synthesize_sections, BoxKind, Section};
