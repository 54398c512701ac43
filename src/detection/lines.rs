use image::{GrayImage, Luma};
use imageproc::drawing::draw_line_segment_mut;
use tracing::{debug, info};

use crate::config::LineConfig;
use crate::detection::hough;
use crate::models::{LineSegment, SheetEstimate};

/// Counts near-horizontal segments in an edge map
#[derive(Default)]
pub struct LineCounter {
    config: LineConfig,
}

impl LineCounter {
    pub fn new(config: LineConfig) -> crate::error::Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &LineConfig {
        &self.config
    }

    /// Never mutates `edges`; annotation happens on a private copy.
    pub fn count(&self, edges: &GrayImage) -> SheetEstimate {
        let mut annotated = edges.clone();

        let detected = hough::detect_segments(&annotated, &self.config.hough_params());
        if detected.is_empty() {
            info!("no line segments detected");
            return SheetEstimate::new(Vec::new(), annotated);
        }

        let accepted = filter_near_horizontal(&detected, self.config.max_angle_degrees);
        debug!(
            detected = detected.len(),
            accepted = accepted.len(),
            max_angle = self.config.max_angle_degrees,
            "filtered segments by angle"
        );

        for segment in &accepted {
            draw_segment(&mut annotated, segment, self.config.marker);
        }

        info!(count = accepted.len(), "sheet estimate");
        SheetEstimate::new(accepted, annotated)
    }
}

/// Keep segments whose signed angle is within `max_angle_degrees` of zero
pub fn filter_near_horizontal(segments: &[LineSegment], max_angle_degrees: f64) -> Vec<LineSegment> {
    segments
        .iter()
        .filter(|s| s.is_near_horizontal(max_angle_degrees))
        .copied()
        .collect()
}

/// One pixel wide stroke in `marker`
pub fn draw_segment(canvas: &mut GrayImage, segment: &LineSegment, marker: u8) {
    draw_line_segment_mut(
        canvas,
        (segment.x1 as f32, segment.y1 as f32),
        (segment.x2 as f32, segment.y2 as f32),
        Luma([marker]),
    );
}

/// Count sheets with the default parameters
pub fn count_sheets(edges: &GrayImage) -> SheetEstimate {
    LineCounter::default().count(edges)
}
