//! Display-parameter computation: given an image, a screen, and the scaling
//! policy, decide what portion of the image to show and how to animate it.
//! Only the image dimensions are read here; pixel work belongs to the
//! renderer and the external detectors.

use std::path::Path;
use std::sync::Arc;

use rand::Rng;

use photoloop_shared::{KenBurnsSettings, ScalingSettings};
use photoloop_state::{
    faces_bounding_box, CropBias, CropRegion, DisplayParams, FaceRegion, FallbackCrop,
    KenBurnsAnimation, ScalingMode, SmartCropMethod,
};

use crate::collaborators::{AestheticCropper, SaliencyDetector, SaliencyMap};

/// Faces smaller than this fraction of the image are background noise and do
/// not steer the crop.
const MIN_FACE_SIZE: f32 = 0.02;
/// Preferred minimum; relaxed to [`MIN_FACE_SIZE`] when nothing qualifies.
const PREFERRED_FACE_SIZE: f32 = 0.03;
/// Margin kept between a face bounding box and the crop edge.
const FACE_SAFETY_MARGIN: f32 = 0.02;
/// Faces land with their upper-head line a quarter down the frame.
const FACE_TARGET_Y: f32 = 0.25;
/// Margin kept between the animated view and the image edge.
const PAN_SAFETY_MARGIN: f32 = 0.05;

pub struct ImageProcessor {
    screen_width: u32,
    screen_height: u32,
    scaling: ScalingSettings,
    ken_burns: KenBurnsSettings,
    photo_duration_secs: f32,
    saliency: Option<Arc<dyn SaliencyDetector>>,
    aesthetic: Option<Arc<dyn AestheticCropper>>,
}

impl ImageProcessor {
    pub fn new(
        screen_resolution: (u32, u32),
        scaling: ScalingSettings,
        ken_burns: KenBurnsSettings,
        photo_duration_secs: f32,
        saliency: Option<Arc<dyn SaliencyDetector>>,
        aesthetic: Option<Arc<dyn AestheticCropper>>,
    ) -> Self {
        ImageProcessor {
            screen_width: screen_resolution.0,
            screen_height: screen_resolution.1,
            scaling,
            ken_burns,
            photo_duration_secs,
            saliency,
            aesthetic,
        }
    }

    fn screen_aspect(&self) -> f32 {
        self.screen_width as f32 / self.screen_height as f32
    }

    /// Compute display parameters for an image file. A completely unreadable
    /// image yields an uncropped, unanimated default rather than an error.
    pub fn compute_display_params(
        &self,
        image_path: &Path,
        faces: &[FaceRegion],
        rng: &mut impl Rng,
    ) -> DisplayParams {
        let (width, height) = match image::image_dimensions(image_path) {
            Ok(dimensions) => dimensions,
            Err(e) => {
                tracing::warn!("failed to read {}: {e}", image_path.display());
                return DisplayParams::full_frame((self.screen_width, self.screen_height));
            }
        };
        self.compute(width, height, image_path, faces, rng)
    }

    /// The path is only consulted when an external detector needs it.
    fn compute(
        &self,
        img_width: u32,
        img_height: u32,
        image_path: &Path,
        faces: &[FaceRegion],
        rng: &mut impl Rng,
    ) -> DisplayParams {
        let img_aspect = img_width as f32 / img_height as f32;

        let saliency_map = if matches!(
            self.scaling.smart_crop_method,
            SmartCropMethod::Saliency | SmartCropMethod::Aesthetic
        ) {
            self.detect_saliency(image_path)
        } else {
            None
        };

        let (crop_width, crop_height) = match self.scaling.mode {
            // The fit/stretch distinction is the rasterizer's job; neither
            // crops.
            ScalingMode::Fit | ScalingMode::Stretch => (1.0, 1.0),
            ScalingMode::Fill => self.fill_crop_size(img_aspect),
            ScalingMode::Balanced => self.balanced_crop_size(img_aspect),
        };

        let (crop_x, crop_y) = if crop_width >= 1.0 && crop_height >= 1.0 {
            (0.0, 0.0)
        } else {
            self.position_crop(
                image_path,
                crop_width,
                crop_height,
                faces,
                saliency_map.as_ref(),
                img_aspect,
            )
        };

        let crop_region = CropRegion {
            x: crop_x,
            y: crop_y,
            width: crop_width,
            height: crop_height,
        };

        let ken_burns = self
            .ken_burns
            .enabled
            .then(|| self.generate_ken_burns(crop_region, rng));

        DisplayParams {
            screen_resolution: (self.screen_width, self.screen_height),
            crop_region,
            ken_burns,
        }
    }

    fn detect_saliency(&self, image_path: &Path) -> Option<SaliencyMap> {
        let detector = self.saliency.as_ref()?;
        match detector.saliency_map(image_path) {
            Ok(map) => Some(map),
            Err(e) => {
                tracing::warn!("saliency detection failed, using fallback: {e}");
                None
            }
        }
    }

    /// Crop size that fills the screen: the short direction stays at 1.0 and
    /// the long one shrinks to match the screen aspect.
    fn fill_crop_size(&self, img_aspect: f32) -> (f32, f32) {
        let screen_aspect = self.screen_aspect();
        if img_aspect > screen_aspect {
            (screen_aspect / img_aspect, 1.0)
        } else {
            (1.0, img_aspect / screen_aspect)
        }
    }

    /// Like fill, but the removed fraction is clamped to `max_crop_percent`;
    /// the rasterizer boxes whatever aspect mismatch remains.
    fn balanced_crop_size(&self, img_aspect: f32) -> (f32, f32) {
        let screen_aspect = self.screen_aspect();
        let max_crop = self.scaling.max_crop_percent as f32 / 100.0;
        let (fill_width, fill_height) = self.fill_crop_size(img_aspect);

        let crop_fraction = if img_aspect > screen_aspect {
            1.0 - fill_width
        } else {
            1.0 - fill_height
        };
        if crop_fraction <= max_crop {
            return (fill_width, fill_height);
        }

        if img_aspect > screen_aspect {
            let width = 1.0 - max_crop;
            let height = (width * img_aspect / screen_aspect).min(1.0);
            (width, height)
        } else {
            let height = 1.0 - max_crop;
            let width = (height * screen_aspect / img_aspect).min(1.0);
            (width, height)
        }
    }

    fn position_crop(
        &self,
        image_path: &Path,
        crop_width: f32,
        crop_height: f32,
        faces: &[FaceRegion],
        saliency_map: Option<&SaliencyMap>,
        img_aspect: f32,
    ) -> (f32, f32) {
        let (crop_x, crop_y) = match self.scaling.smart_crop_method {
            SmartCropMethod::Saliency => {
                self.position_for_saliency(crop_width, crop_height, saliency_map)
            }
            SmartCropMethod::Aesthetic => self.position_for_aesthetics(
                image_path,
                crop_width,
                crop_height,
                saliency_map,
                img_aspect,
            ),
            SmartCropMethod::Face => {
                let significant = significant_faces(faces);
                if significant.is_empty() {
                    self.fallback_position(crop_width, crop_height)
                } else {
                    self.position_for_faces(crop_width, crop_height, &significant)
                }
            }
        };

        self.apply_crop_bias(crop_x, crop_y, crop_width, crop_height, faces)
    }

    /// Place the crop so faces sit at the target line, then run a bounded
    /// correction pass. Priorities: keep every significant face inside the
    /// crop first, hit the target line second.
    fn position_for_faces(
        &self,
        crop_width: f32,
        crop_height: f32,
        faces: &[FaceRegion],
    ) -> (f32, f32) {
        let Some((fb_x, fb_y, fb_w, fb_h)) = faces_bounding_box(faces, 0.02) else {
            return self.fallback_position(crop_width, crop_height);
        };

        // Aim the upper part of the face region (eyes and forehead) at the
        // target line rather than the geometric center.
        let face_line = fb_y + fb_h * 0.4;
        let mut crop_y = face_line - FACE_TARGET_Y * crop_height;
        let mut crop_x = (fb_x + fb_w / 2.0) - 0.5 * crop_width;

        // Correction pass: pull the crop until no face edge is clipped.
        if fb_y < crop_y + FACE_SAFETY_MARGIN {
            crop_y = fb_y - FACE_SAFETY_MARGIN;
        }
        if fb_y + fb_h > crop_y + crop_height - FACE_SAFETY_MARGIN {
            crop_y = fb_y + fb_h - crop_height + FACE_SAFETY_MARGIN;
        }
        if fb_x < crop_x + FACE_SAFETY_MARGIN {
            crop_x = fb_x - FACE_SAFETY_MARGIN;
        }
        if fb_x + fb_w > crop_x + crop_width - FACE_SAFETY_MARGIN {
            crop_x = fb_x + fb_w - crop_width + FACE_SAFETY_MARGIN;
        }

        clamp_position(crop_x, crop_y, crop_width, crop_height)
    }

    /// Coarse-then-refined integral-image search for the position covering
    /// the most saliency.
    fn position_for_saliency(
        &self,
        crop_width: f32,
        crop_height: f32,
        saliency_map: Option<&SaliencyMap>,
    ) -> (f32, f32) {
        let Some(map) = saliency_map else {
            return self.fallback_position(crop_width, crop_height);
        };

        let width = map.width;
        let height = map.height;
        let crop_w_px = (crop_width * width as f32) as usize;
        let crop_h_px = (crop_height * height as f32) as usize;
        if crop_w_px == 0 || crop_h_px == 0 || crop_w_px >= width || crop_h_px >= height {
            return self.fallback_position(crop_width, crop_height);
        }

        let integral = IntegralImage::new(map);
        let step = (crop_w_px.min(crop_h_px) / 20).max(1);

        let mut best = (0usize, 0usize);
        let mut best_score = f64::MIN;
        let mut y = 0;
        while y + crop_h_px <= height {
            let mut x = 0;
            while x + crop_w_px <= width {
                let score = integral.sum(x, y, crop_w_px, crop_h_px);
                if score > best_score {
                    best_score = score;
                    best = (x, y);
                }
                x += step;
            }
            y += step;
        }

        // Refine exhaustively within one coarse step of the best hit.
        let (bx, by) = best;
        for dy in -(step as i64)..=(step as i64) {
            for dx in -(step as i64)..=(step as i64) {
                let x = (bx as i64 + dx).clamp(0, (width - crop_w_px) as i64) as usize;
                let y = (by as i64 + dy).clamp(0, (height - crop_h_px) as i64) as usize;
                let score = integral.sum(x, y, crop_w_px, crop_h_px);
                if score > best_score {
                    best_score = score;
                    best = (x, y);
                }
            }
        }

        (
            best.0 as f32 / width as f32,
            best.1 as f32 / height as f32,
        )
    }

    /// Ask the aesthetic collaborator for a candidate crop; fall back to the
    /// saliency centroid at a rule-of-thirds target, then to the static
    /// fallback.
    fn position_for_aesthetics(
        &self,
        image_path: &Path,
        crop_width: f32,
        crop_height: f32,
        saliency_map: Option<&SaliencyMap>,
        img_aspect: f32,
    ) -> (f32, f32) {
        if let Some(cropper) = self.aesthetic.as_ref() {
            let target_aspect = crop_width / crop_height * img_aspect;
            match cropper.best_crop(image_path, target_aspect) {
                Ok(Some(crop)) => {
                    return clamp_position(crop.x, crop.y, crop_width, crop_height);
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("aesthetic cropping failed: {e}"),
            }
        }

        if let Some(map) = saliency_map
            && let Some((center_x, center_y)) = saliency_centroid(map)
        {
            // Put the saliency center at the upper-third intersection.
            let crop_x = center_x - 0.5 * crop_width;
            let crop_y = center_y - 0.33 * crop_height;
            return clamp_position(crop_x, crop_y, crop_width, crop_height);
        }

        self.fallback_position(crop_width, crop_height)
    }

    /// Horizontally centered; vertical placement from the fallback setting.
    fn fallback_position(&self, crop_width: f32, crop_height: f32) -> (f32, f32) {
        let crop_x = (1.0 - crop_width) / 2.0;
        let crop_y = match self.scaling.fallback_crop {
            FallbackCrop::Top => 0.0,
            FallbackCrop::Bottom => 1.0 - crop_height,
            FallbackCrop::Center => (1.0 - crop_height) / 2.0,
        };
        (crop_x, crop_y)
    }

    /// Nudge the crop to preserve the biased edge, without pushing any
    /// significant face out of frame.
    fn apply_crop_bias(
        &self,
        crop_x: f32,
        mut crop_y: f32,
        crop_width: f32,
        crop_height: f32,
        faces: &[FaceRegion],
    ) -> (f32, f32) {
        let significant = significant_faces(faces);
        match self.scaling.crop_bias {
            CropBias::None => {}
            CropBias::Top => {
                if significant.is_empty() {
                    crop_y = 0.0;
                } else {
                    let lowest_face_bottom = significant
                        .iter()
                        .map(|f| f.y + f.height)
                        .fold(f32::MIN, f32::max);
                    let min_crop_y = (lowest_face_bottom - crop_height + 0.05).max(0.0);
                    crop_y = crop_y.min(min_crop_y).max(0.0);
                }
            }
            CropBias::Bottom => {
                if significant.is_empty() {
                    crop_y = 1.0 - crop_height;
                } else {
                    let highest_face_top =
                        significant.iter().map(|f| f.y).fold(f32::MAX, f32::min);
                    let max_crop_y = (highest_face_top - 0.05).min(1.0 - crop_height);
                    crop_y = crop_y.max(max_crop_y).min(1.0 - crop_height);
                }
            }
        }
        clamp_position(crop_x, crop_y, crop_width, crop_height)
    }

    /// Derive zoom endpoints and a pan whose visible view stays inside the
    /// image at both ends.
    fn generate_ken_burns(&self, crop: CropRegion, rng: &mut impl Rng) -> KenBurnsAnimation {
        let (min_zoom, max_zoom) = self.ken_burns.zoom_range;
        let mid_zoom = (min_zoom + max_zoom) / 2.0;

        let (start_zoom, end_zoom) = if self.ken_burns.randomize {
            if rng.random_bool(0.5) {
                (
                    rng.random_range(min_zoom..=mid_zoom),
                    rng.random_range(mid_zoom..=max_zoom),
                )
            } else {
                (
                    rng.random_range(mid_zoom..=max_zoom),
                    rng.random_range(min_zoom..=mid_zoom),
                )
            }
        } else {
            (min_zoom, max_zoom)
        };

        let max_pan = self.ken_burns.pan_speed * self.photo_duration_secs;
        let (pan_dx, pan_dy) = if self.ken_burns.randomize {
            let angle = rng.random_range(0.0..std::f32::consts::TAU);
            (angle.cos() * max_pan / 2.0, angle.sin() * max_pan / 2.0)
        } else {
            (max_pan / 3.0, max_pan / 4.0)
        };

        let (base_cx, base_cy) = crop.center();
        let start_center = constrain_center(
            base_cx - pan_dx,
            base_cy - pan_dy,
            crop,
            start_zoom,
        );
        let end_center = constrain_center(base_cx + pan_dx, base_cy + pan_dy, crop, end_zoom);

        KenBurnsAnimation {
            start_zoom,
            end_zoom,
            start_center,
            end_center,
        }
    }
}

/// Keep a view center such that the region visible at `zoom` stays inside the
/// unit square with a safety margin.
fn constrain_center(cx: f32, cy: f32, crop: CropRegion, zoom: f32) -> (f32, f32) {
    let half_w = crop.width / (2.0 * zoom);
    let half_h = crop.height / (2.0 * zoom);
    (
        clamp_or_center(cx, half_w + PAN_SAFETY_MARGIN, 1.0 - half_w - PAN_SAFETY_MARGIN),
        clamp_or_center(cy, half_h + PAN_SAFETY_MARGIN, 1.0 - half_h - PAN_SAFETY_MARGIN),
    )
}

fn clamp_or_center(value: f32, lo: f32, hi: f32) -> f32 {
    if lo > hi {
        // The view is too large to respect the margin in this axis.
        0.5
    } else {
        value.clamp(lo, hi)
    }
}

fn clamp_position(crop_x: f32, crop_y: f32, crop_width: f32, crop_height: f32) -> (f32, f32) {
    (
        crop_x.clamp(0.0, (1.0 - crop_width).max(0.0)),
        crop_y.clamp(0.0, (1.0 - crop_height).max(0.0)),
    )
}

/// Filter to faces large enough to steer the crop, relaxing the threshold
/// once before giving up.
fn significant_faces(faces: &[FaceRegion]) -> Vec<FaceRegion> {
    let at_least = |min: f32| -> Vec<FaceRegion> {
        faces
            .iter()
            .filter(|f| f.width >= min || f.height >= min)
            .copied()
            .collect()
    };
    let preferred = at_least(PREFERRED_FACE_SIZE);
    if preferred.is_empty() {
        at_least(MIN_FACE_SIZE)
    } else {
        preferred
    }
}

/// Weighted center of mass of the saliency map, or `None` when the map is
/// effectively empty.
fn saliency_centroid(map: &SaliencyMap) -> Option<(f32, f32)> {
    let mut total = 0.0f64;
    let mut sum_x = 0.0f64;
    let mut sum_y = 0.0f64;
    for y in 0..map.height {
        for x in 0..map.width {
            let v = map.get(x, y) as f64;
            total += v;
            sum_x += v * (x as f64 / map.width as f64);
            sum_y += v * (y as f64 / map.height as f64);
        }
    }
    if total < 1e-3 {
        return None;
    }
    Some(((sum_x / total) as f32, (sum_y / total) as f32))
}

/// 2-D prefix sums over a saliency map for O(1) rectangle queries.
struct IntegralImage {
    width: usize,
    values: Vec<f64>,
}

impl IntegralImage {
    fn new(map: &SaliencyMap) -> Self {
        let w = map.width + 1;
        let h = map.height + 1;
        let mut values = vec![0.0f64; w * h];
        for y in 1..h {
            let mut row_sum = 0.0f64;
            for x in 1..w {
                row_sum += map.get(x - 1, y - 1) as f64;
                values[y * w + x] = values[(y - 1) * w + x] + row_sum;
            }
        }
        IntegralImage { width: w, values }
    }

    fn sum(&self, x: usize, y: usize, w: usize, h: usize) -> f64 {
        let (x2, y2) = (x + w, y + h);
        self.values[y2 * self.width + x2] - self.values[y * self.width + x2]
            - self.values[y2 * self.width + x]
            + self.values[y * self.width + x]
    }
}
