use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Pixel, RgbImage};
use serde::{Deserialize, Serialize};
use trashrack_core::{filter_colliding, largest, BarrierDimensions, ClassMask, PixelBox, ScaleRatio};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::{synthesize_sections, BoxKind, RectifyError, Section};

/// How section content is resampled to its target width.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resampling {
    /// Lanczos interpolation, for photographic or rendered content.
    Interpolated,
    /// Nearest neighbour, for label images where values must not blend.
    Nearest,
}

impl Resampling {
    fn filter(self) -> FilterType {
        match self {
            Resampling::Interpolated => FilterType::Lanczos3,
            Resampling::Nearest => FilterType::Nearest,
        }
    }
}

/// Ordered sections of one source frame plus their target widths.
///
/// The same plan is applied to the RGB frame, its class mask and any
/// rendered overlay so that all of them stay pixel-aligned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SectionPlan {
    /// Sections sorted left to right, already clamped to the common extent.
    pub sections: Vec<Section>,
    /// Topmost row shared by every section.
    pub top: u32,
    /// One past the bottom row (the source image height).
    pub bottom: u32,
    pub grid_width_px: u32,
    pub column_width_px: u32,
    pub source_width: u32,
    pub source_height: u32,
}

impl SectionPlan {
    pub fn target_width(&self, kind: BoxKind) -> u32 {
        match kind {
            BoxKind::GridCell => self.grid_width_px,
            BoxKind::Column => self.column_width_px,
        }
    }

    pub fn output_width(&self) -> u32 {
        self.sections.iter().map(|s| self.target_width(s.kind)).sum()
    }

    pub fn output_height(&self) -> u32 {
        self.bottom - self.top
    }

    /// Output x range `[start, end)` of every section, in plan order.
    pub fn output_spans(&self) -> Vec<(u32, u32)> {
        let mut x = 0u32;
        self.sections
            .iter()
            .map(|s| {
                let start = x;
                x += self.target_width(s.kind);
                (start, x)
            })
            .collect()
    }

    /// Resample every section to its target width and concatenate them.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(sections = self.sections.len()))
    )]
    pub fn apply<P>(
        &self,
        image: &ImageBuffer<P, Vec<P::Subpixel>>,
        resampling: Resampling,
    ) -> Result<ImageBuffer<P, Vec<P::Subpixel>>, RectifyError>
    where
        P: Pixel + 'static,
        P::Subpixel: 'static,
    {
        if image.dimensions() != (self.source_width, self.source_height) {
            return Err(RectifyError::SourceShape {
                expected_w: self.source_width,
                expected_h: self.source_height,
                got_w: image.width(),
                got_h: image.height(),
            });
        }

        let filter = resampling.filter();
        let height = self.output_height();
        let mut out = ImageBuffer::<P, Vec<P::Subpixel>>::new(self.output_width(), height);

        for (section, (x0, x1)) in self.sections.iter().zip(self.output_spans()) {
            let b = section.bbox;
            let crop = imageops::crop_imm(
                image,
                b.x1 as u32,
                b.y1 as u32,
                b.width() as u32,
                b.height() as u32,
            )
            .to_image();
            let resized = imageops::resize(&crop, x1 - x0, height, filter);
            imageops::replace(&mut out, &resized, x0 as i64, 0);
        }

        Ok(out)
    }

    /// Rectify a class mask with nearest-neighbour resampling.
    pub fn apply_mask(&self, mask: &ClassMask) -> Result<ClassMask, RectifyError> {
        let shape_err = || RectifyError::SourceShape {
            expected_w: self.source_width,
            expected_h: self.source_height,
            got_w: mask.width as u32,
            got_h: mask.height as u32,
        };
        let gray = GrayImage::from_raw(mask.width as u32, mask.height as u32, mask.data.clone())
            .ok_or_else(shape_err)?;
        let rect = self.apply(&gray, Resampling::Nearest)?;
        let (w, h) = rect.dimensions();
        ClassMask::from_raw(w as usize, h as usize, rect.into_raw()).ok_or_else(shape_err)
    }
}

/// Rectifies trash-rack frames so that every grid cell and every column has
/// the pixel width its physical width implies at `x_res` meters per pixel.
#[derive(Clone, Debug)]
pub struct BarrierRectifier {
    dimensions: BarrierDimensions,
    x_res: f64,
    grid_width_px: u32,
    column_width_px: u32,
    columns: Vec<PixelBox>,
    structure: Option<PixelBox>,
}

fn width_px(kind: BoxKind, meters: f64, x_res: f64) -> Result<u32, RectifyError> {
    let px = (meters / x_res).round();
    if !px.is_finite() || px < 1.0 || px > u32::MAX as f64 {
        return Err(RectifyError::SectionTooNarrow {
            kind,
            meters,
            x_res,
        });
    }
    Ok(px as u32)
}

impl BarrierRectifier {
    pub fn new(dimensions: BarrierDimensions, x_res: f64) -> Result<Self, RectifyError> {
        if !dimensions.is_valid() {
            return Err(RectifyError::InvalidDimensions);
        }
        if !x_res.is_finite() || x_res <= 0.0 {
            return Err(RectifyError::InvalidResolution(x_res));
        }
        Ok(Self {
            dimensions,
            x_res,
            grid_width_px: width_px(BoxKind::GridCell, dimensions.grid_width_m, x_res)?,
            column_width_px: width_px(BoxKind::Column, dimensions.column_width_m, x_res)?,
            columns: Vec::new(),
            structure: None,
        })
    }

    pub fn dimensions(&self) -> &BarrierDimensions {
        &self.dimensions
    }

    pub fn grid_width_px(&self) -> u32 {
        self.grid_width_px
    }

    pub fn column_width_px(&self) -> u32 {
        self.column_width_px
    }

    /// Deduplicated column boxes, in detection order.
    pub fn columns(&self) -> &[PixelBox] {
        &self.columns
    }

    pub fn structure_box(&self) -> Option<PixelBox> {
        self.structure
    }

    /// Store the detected columns (overlapping detections collapsed to the
    /// largest one) and the structure extent (largest of `structures`).
    pub fn set_detected_boxes(
        &mut self,
        columns: &[PixelBox],
        structures: &[PixelBox],
    ) -> Result<(), RectifyError> {
        if columns.is_empty() {
            return Err(RectifyError::NoColumns);
        }
        let structure = largest(structures).ok_or(RectifyError::NoStructure)?;
        self.columns = filter_colliding(columns);
        self.structure = Some(structure);
        log::debug!(
            "{} column boxes kept of {}, structure {:?}",
            self.columns.len(),
            columns.len(),
            structure
        );
        Ok(())
    }

    fn detected(&self) -> Result<(&[PixelBox], PixelBox), RectifyError> {
        match self.structure {
            Some(structure) if !self.columns.is_empty() => Ok((&self.columns, structure)),
            _ => Err(RectifyError::ColumnsNotSet),
        }
    }

    /// Build the section plan for a `width` x `height` source frame.
    ///
    /// All sections are stretched vertically to the topmost section row and
    /// the bottom of the frame.
    pub fn plan(&self, width: u32, height: u32) -> Result<SectionPlan, RectifyError> {
        let (columns, structure) = self.detected()?;
        let mut sections = synthesize_sections(columns, structure)?;

        let top = sections
            .iter()
            .map(|s| s.bbox.y1)
            .min()
            .unwrap_or(0)
            .max(0);
        let bottom = height as i32;
        if top >= bottom {
            return Err(RectifyError::EmptyExtent { top, bottom });
        }

        for section in &mut sections {
            let b = section.bbox;
            let x1 = b.x1.clamp(0, width as i32);
            let x2 = b.x2.clamp(0, width as i32);
            if x1 >= x2 {
                return Err(RectifyError::SectionOutsideImage(b));
            }
            section.bbox = PixelBox::new(x1, top, x2, bottom);
        }

        Ok(SectionPlan {
            sections,
            top: top as u32,
            bottom: bottom as u32,
            grid_width_px: self.grid_width_px,
            column_width_px: self.column_width_px,
            source_width: width,
            source_height: height,
        })
    }

    /// Rectify any image buffer (RGB frame, rendered overlay, ...).
    pub fn rectify_image<P>(
        &self,
        image: &ImageBuffer<P, Vec<P::Subpixel>>,
        resampling: Resampling,
    ) -> Result<ImageBuffer<P, Vec<P::Subpixel>>, RectifyError>
    where
        P: Pixel + 'static,
        P::Subpixel: 'static,
    {
        self.plan(image.width(), image.height())?
            .apply(image, resampling)
    }

    pub fn rectify_mask(&self, mask: &ClassMask) -> Result<ClassMask, RectifyError> {
        self.plan(mask.width as u32, mask.height as u32)?
            .apply_mask(mask)
    }

    /// Meters per pixel of the rectified frame.
    ///
    /// `y_res` comes from the height of the *original* structure box.
    pub fn scale_ratio(&self) -> Result<ScaleRatio, RectifyError> {
        let (_, structure) = self.detected()?;
        let px = structure.height().abs();
        if px == 0 {
            return Err(RectifyError::FlatStructure(structure));
        }
        Ok(ScaleRatio::new(
            self.x_res,
            self.dimensions.grid_height_m / px as f64,
        ))
    }

    /// Unrectified crop spanning the leftmost to the rightmost column.
    pub fn original_section<P>(
        &self,
        image: &ImageBuffer<P, Vec<P::Subpixel>>,
    ) -> Result<ImageBuffer<P, Vec<P::Subpixel>>, RectifyError>
    where
        P: Pixel + 'static,
        P::Subpixel: 'static,
    {
        let (columns, _) = self.detected()?;
        let mut sorted = columns.to_vec();
        sorted.sort_by_key(|b| b.x1);
        let (first, last) = (sorted[0], sorted[sorted.len() - 1]);
        let span = PixelBox::new(first.x1, first.y1, last.x2, last.y2)
            .clamp_to(image.width(), image.height());
        if !span.is_valid() {
            return Err(RectifyError::SectionOutsideImage(span));
        }
        Ok(imageops::crop_imm(
            image,
            span.x1 as u32,
            span.y1 as u32,
            span.width() as u32,
            span.height() as u32,
        )
        .to_image())
    }
}

/// Stage-one output: the rectified frame, its rectified class mask and the
/// scale of the rectified frame.
#[derive(Clone, Debug)]
pub struct RectifiedBarrier {
    pub image: RgbImage,
    pub mask: Option<ClassMask>,
    pub scale: ScaleRatio,
    pub plan: SectionPlan,
}

/// One-shot rectification of an RGB frame and (optionally) its class mask.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip_all,
        fields(width = image.width(), height = image.height(), columns = columns.len())
    )
)]
pub fn rectify(
    image: &RgbImage,
    mask: Option<&ClassMask>,
    columns: &[PixelBox],
    structures: &[PixelBox],
    dimensions: BarrierDimensions,
    x_res: f64,
) -> Result<RectifiedBarrier, RectifyError> {
    let mut rectifier = BarrierRectifier::new(dimensions, x_res)?;
    rectifier.set_detected_boxes(columns, structures)?;

    let plan = rectifier.plan(image.width(), image.height())?;
    let rectified = plan.apply(image, Resampling::Interpolated)?;
    let mask = mask.map(|m| plan.apply_mask(m)).transpose()?;
    let scale = rectifier.scale_ratio()?;

    log::info!(
        "rectified {}x{} -> {}x{} over {} sections (x_res={:.4}, y_res={:.4})",
        image.width(),
        image.height(),
        rectified.width(),
        rectified.height(),
        plan.sections.len(),
        scale.x_res,
        scale.y_res
    );

    Ok(RectifiedBarrier {
        image: rectified,
        mask,
        scale,
        plan,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use trashrack_core::BinaryMask;

    fn scenario_columns() -> [PixelBox; 2] {
        [PixelBox::new(50, 20, 70, 100), PixelBox::new(150, 20, 170, 100)]
    }

    fn scenario_dims() -> BarrierDimensions {
        BarrierDimensions::new(10.0, 10.0, 3.0)
    }

    fn gradient(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 128]))
    }

    #[test]
    fn reference_scenario_rectifies_to_360_by_80() {
        let image = gradient(200, 100);
        let out = rectify(
            &image,
            None,
            &scenario_columns(),
            &[PixelBox::new(0, 0, 200, 100)],
            scenario_dims(),
            0.1,
        )
        .unwrap();

        assert_eq!(out.image.dimensions(), (360, 80));
        assert_eq!(out.plan.sections.len(), 5);
        assert!((out.scale.x_res - 0.1).abs() < 1e-12);
        assert!((out.scale.y_res - 0.1).abs() < 1e-12);
    }

    #[test]
    fn output_width_is_sum_of_section_widths() {
        let mut r = BarrierRectifier::new(BarrierDimensions::new(2.5, 8.0, 0.7), 0.05).unwrap();
        r.set_detected_boxes(
            &[
                PixelBox::new(40, 12, 55, 90),
                PixelBox::new(120, 9, 131, 95),
                PixelBox::new(200, 15, 214, 88),
            ],
            &[PixelBox::new(10, 5, 240, 95), PixelBox::new(30, 30, 60, 60)],
        )
        .unwrap();
        let plan = r.plan(250, 100).unwrap();
        let grids = plan
            .sections
            .iter()
            .filter(|s| s.kind == BoxKind::GridCell)
            .count() as u32;
        let cols = plan.sections.len() as u32 - grids;
        assert_eq!(grids, 4);
        assert_eq!(plan.output_width(), grids * 50 + cols * 14);
        assert_eq!(plan.output_height(), 100 - 9);
        for s in &plan.sections {
            assert_eq!((s.bbox.y1, s.bbox.y2), (9, 100));
        }

        let out = r.rectify_image(&gradient(250, 100), Resampling::Interpolated).unwrap();
        assert_eq!(out.dimensions(), (plan.output_width(), plan.output_height()));
    }

    #[test]
    fn mask_and_rgb_stay_aligned() {
        let image = gradient(200, 100);
        let column = scenario_columns()[0];
        let mut mask = ClassMask::new(200, 100);
        mask.paint(&BinaryMask::from_box(200, 100, column), 2, &[])
            .unwrap();

        let out = rectify(
            &image,
            Some(&mask),
            &scenario_columns(),
            &[PixelBox::new(0, 0, 200, 100)],
            scenario_dims(),
            0.1,
        )
        .unwrap();
        let rect_mask = out.mask.unwrap();
        assert_eq!(
            (rect_mask.width as u32, rect_mask.height as u32),
            out.image.dimensions()
        );

        // First column lands on output columns 100..130 and keeps its code.
        for y in 0..rect_mask.height {
            for x in 0..rect_mask.width {
                let expected = if (100..130).contains(&x) { 2 } else { 0 };
                assert_eq!(rect_mask.get(x, y), expected, "at ({x}, {y})");
            }
        }
    }

    #[test]
    fn overlays_share_the_plan() {
        let mut r = BarrierRectifier::new(scenario_dims(), 0.1).unwrap();
        r.set_detected_boxes(&scenario_columns(), &[PixelBox::new(0, 0, 200, 100)])
            .unwrap();
        let overlay = image::RgbaImage::from_pixel(200, 100, image::Rgba([255, 0, 0, 128]));
        let out = r.rectify_image(&overlay, Resampling::Nearest).unwrap();
        assert_eq!(out.dimensions(), (360, 80));
        assert_eq!(out.get_pixel(200, 40), &image::Rgba([255, 0, 0, 128]));
    }

    #[test]
    fn rectifying_before_boxes_are_set_fails() {
        let r = BarrierRectifier::new(scenario_dims(), 0.1).unwrap();
        assert!(matches!(
            r.rectify_image(&gradient(10, 10), Resampling::Interpolated),
            Err(RectifyError::ColumnsNotSet)
        ));
        assert!(matches!(r.scale_ratio(), Err(RectifyError::ColumnsNotSet)));
    }

    #[test]
    fn missing_inputs_are_configuration_errors() {
        let mut r = BarrierRectifier::new(scenario_dims(), 0.1).unwrap();
        assert!(matches!(
            r.set_detected_boxes(&[], &[PixelBox::new(0, 0, 10, 10)]),
            Err(RectifyError::NoColumns)
        ));
        assert!(matches!(
            r.set_detected_boxes(&scenario_columns(), &[]),
            Err(RectifyError::NoStructure)
        ));
        assert!(matches!(
            BarrierRectifier::new(BarrierDimensions::new(10.0, 10.0, 0.0), 0.1),
            Err(RectifyError::InvalidDimensions)
        ));
        assert!(matches!(
            BarrierRectifier::new(BarrierDimensions::new(10.0, 10.0, 0.01), 0.1),
            Err(RectifyError::SectionTooNarrow { kind: BoxKind::Column, .. })
        ));
    }

    #[test]
    fn plan_rejects_images_of_another_size() {
        let mut r = BarrierRectifier::new(scenario_dims(), 0.1).unwrap();
        r.set_detected_boxes(&scenario_columns(), &[PixelBox::new(0, 0, 200, 100)])
            .unwrap();
        let plan = r.plan(200, 100).unwrap();
        assert!(matches!(
            plan.apply(&gradient(100, 100), Resampling::Nearest),
            Err(RectifyError::SourceShape { .. })
        ));
    }

    #[test]
    fn original_section_spans_first_to_last_column() {
        let mut r = BarrierRectifier::new(scenario_dims(), 0.1).unwrap();
        r.set_detected_boxes(&scenario_columns(), &[PixelBox::new(0, 0, 200, 100)])
            .unwrap();
        let section = r.original_section(&gradient(200, 100)).unwrap();
        assert_eq!(section.dimensions(), (120, 80));
        assert_eq!(section.get_pixel(0, 0), &Rgb([50, 20, 128]));
    }

    #[test]
    fn plan_serializes_section_kinds() {
        let mut r = BarrierRectifier::new(scenario_dims(), 0.1).unwrap();
        r.set_detected_boxes(&scenario_columns(), &[PixelBox::new(0, 0, 200, 100)])
            .unwrap();
        let json = serde_json::to_string(&r.plan(200, 100).unwrap()).unwrap();
        assert!(json.contains("\"kind\":\"grid_cell\""));
        assert!(json.contains("\"box\":[50,20,70,100]"));
    }
}
