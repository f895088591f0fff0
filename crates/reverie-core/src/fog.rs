//! Fog overlay: wiping, clearance sampling, and pointer bookkeeping.
//!
//! The fog is an alpha mask over the viewport. Wipes erase it with a soft
//! radial brush. Clearance is measured on a coarse nearest-neighbour
//! downsample so the check stays cheap at any viewport size.

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// Opacity of untouched fog (0.85).
pub const FOG_ALPHA: u8 = 217;

/// A sampled pixel counts as cleared below this alpha.
pub const CLEAR_ALPHA: u8 = 128;

/// Pointer travel (px) between moves that may ring a chime.
pub const CHIME_DISTANCE: f32 = 20.0;

/// Chance that a long enough move rings a chime.
pub const CHIME_PROBABILITY: f64 = 0.4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FogGeometry {
    pub width: u32,
    pub height: u32,
    pub brush_radius: f32,
    pub brush_core: f32,
}

#[derive(Debug, Clone)]
pub struct FogMask {
    geometry: FogGeometry,
    alpha: Vec<u8>,
}

impl FogMask {
    pub fn new(geometry: FogGeometry) -> Self {
        let len = geometry.width as usize * geometry.height as usize;
        Self {
            geometry,
            alpha: vec![FOG_ALPHA; len],
        }
    }

    pub fn alpha(&self) -> &[u8] {
        &self.alpha
    }

    /// Erase fog around `(x, y)`: fully inside the core radius, fading linearly to
    /// nothing at the brush radius.
    pub fn wipe(&mut self, x: f32, y: f32) {
        let FogGeometry {
            width,
            height,
            brush_radius,
            brush_core,
        } = self.geometry;
        if width == 0 || height == 0 || brush_radius <= 0.0 {
            return;
        }
        let clamp = |v: f32, max: u32| (v.max(0.0) as u32).min(max.saturating_sub(1));
        let (x0, x1) = (clamp(x - brush_radius, width), clamp(x + brush_radius, width));
        let (y0, y1) = (clamp(y - brush_radius, height), clamp(y + brush_radius, height));
        let feather = (brush_radius - brush_core).max(f32::EPSILON);

        for py in y0..=y1 {
            for px in x0..=x1 {
                let dx = px as f32 + 0.5 - x;
                let dy = py as f32 + 0.5 - y;
                let dist = (dx * dx + dy * dy).sqrt();
                if dist >= brush_radius {
                    continue;
                }
                let strength = if dist <= brush_core {
                    1.0
                } else {
                    1.0 - (dist - brush_core) / feather
                };
                let idx = py as usize * width as usize + px as usize;
                let remaining = f32::from(self.alpha[idx]) * (1.0 - strength);
                self.alpha[idx] = remaining.round() as u8;
            }
        }
    }

    pub fn cleared_fraction(&self, sample_width: u32) -> f32 {
        cleared_fraction(self.geometry.width, self.geometry.height, &self.alpha, sample_width)
    }
}

/// Fraction of the fog that is see-through, sampled on a grid `sample_width`
/// columns wide with the same aspect ratio. Buffers no wider than the grid are
/// counted pixel by pixel. A buffer shorter than `width * height` counts as fully fogged.
pub fn cleared_fraction(width: u32, height: u32, alpha: &[u8], sample_width: u32) -> f32 {
    let (w, h) = (width as usize, height as usize);
    if w == 0 || h == 0 || alpha.len() < w * h {
        return 0.0;
    }
    let sw = (sample_width.max(1) as usize).min(w);
    let sh = if sw == w { h } else { (sw * h / w).max(1) };

    let mut cleared = 0usize;
    for sy in 0..sh {
        let y = ((2 * sy + 1) * h / (2 * sh)).min(h - 1);
        for sx in 0..sw {
            let x = ((2 * sx + 1) * w / (2 * sw)).min(w - 1);
            if alpha[y * w + x] < CLEAR_ALPHA {
                cleared += 1;
            }
        }
    }
    cleared as f32 / (sw * sh) as f32
}

/// Per-session pointer state for the fog phases.
#[derive(Debug)]
pub struct FogTracker {
    throttle: Duration,
    last_check: Option<Instant>,
    last_pos: Option<(f32, f32)>,
}

impl FogTracker {
    pub fn new(throttle: Duration) -> Self {
        Self {
            throttle,
            last_check: None,
            last_pos: None,
        }
    }

    /// Record a pointer position. Returns `true` when a chime should ring.
    pub fn on_move<R: Rng>(&mut self, x: f32, y: f32, rng: &mut R) -> bool {
        let chime = self.last_pos.is_some_and(|(lx, ly)| {
            let travelled = ((x - lx).powi(2) + (y - ly).powi(2)).sqrt();
            travelled > CHIME_DISTANCE && rng.gen::<f64>() > 1.0 - CHIME_PROBABILITY
        });
        self.last_pos = Some((x, y));
        chime
    }

    /// Whether a clearance check may run now. The first check always may.
    pub fn should_check(&mut self, now: Instant) -> bool {
        match self.last_check {
            Some(last) if now.duration_since(last) <= self.throttle => false,
            _ => {
                self.last_check = Some(now);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn geometry(width: u32, height: u32) -> FogGeometry {
        FogGeometry {
            width,
            height,
            brush_radius: 80.0,
            brush_core: 10.0,
        }
    }

    fn buffer_with_cleared(total: usize, cleared: usize) -> Vec<u8> {
        (0..total)
            .map(|i| if i < cleared { 0 } else { FOG_ALPHA })
            .collect()
    }

    #[test]
    fn exact_fractions_on_small_buffers() {
        let alpha = buffer_with_cleared(100 * 100, 4100);
        assert!((cleared_fraction(100, 100, &alpha, 100) - 0.41).abs() < 1e-6);
        let alpha = buffer_with_cleared(100 * 100, 3900);
        assert!((cleared_fraction(100, 100, &alpha, 100) - 0.39).abs() < 1e-6);
    }

    #[test]
    fn downsampling_preserves_half_split() {
        // Left half cleared on a 400x200 buffer.
        let alpha: Vec<u8> = (0..400 * 200)
            .map(|i| if i % 400 < 200 { 0 } else { FOG_ALPHA })
            .collect();
        let fraction = cleared_fraction(400, 200, &alpha, 100);
        assert!((fraction - 0.5).abs() < 1e-6);
    }

    #[test]
    fn short_buffer_counts_as_fogged() {
        assert_eq!(cleared_fraction(10, 10, &[0; 50], 100), 0.0);
    }

    #[test]
    fn wipe_clears_core_and_leaves_far_fog() {
        let mut mask = FogMask::new(geometry(400, 400));
        assert_eq!(mask.cleared_fraction(100), 0.0);
        mask.wipe(200.0, 200.0);
        let at = |x: usize, y: usize| mask.alpha()[y * 400 + x];
        assert_eq!(at(200, 200), 0);
        assert_eq!(at(0, 0), FOG_ALPHA);
        assert!(at(260, 200) > 0 && at(260, 200) < FOG_ALPHA);
        assert!(mask.cleared_fraction(100) > 0.0);
    }

    #[test]
    fn chimes_need_distance_and_luck() {
        let mut tracker = FogTracker::new(Duration::from_millis(300));
        let mut lucky = StepRng::new(u64::MAX, 0);
        let mut unlucky = StepRng::new(0, 0);
        assert!(!tracker.on_move(0.0, 0.0, &mut lucky), "first move has no distance");
        assert!(!tracker.on_move(5.0, 5.0, &mut lucky));
        assert!(!tracker.on_move(100.0, 100.0, &mut unlucky));
        assert!(tracker.on_move(200.0, 200.0, &mut lucky));
    }

    #[tokio::test(start_paused = true)]
    async fn checks_are_throttled() {
        let mut tracker = FogTracker::new(Duration::from_millis(300));
        assert!(tracker.should_check(Instant::now()));
        tokio::time::advance(Duration::from_millis(300)).await;
        assert!(!tracker.should_check(Instant::now()));
        tokio::time::advance(Duration::from_millis(1)).await;
        assert!(tracker.should_check(Instant::now()));
    }
}
