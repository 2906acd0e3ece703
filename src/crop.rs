//! Aspect-locked crop selection.
//!
//! Regions are kept in percent of the source so they survive display
//! rescaling. The aspect lock is a pixel-space ratio, so with a source of
//! `W x H` and lock `a` every region satisfies `w% * W / (h% * H) == a`,
//! i.e. `w% == k * h%` with `k = a * H / W`.

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

use crate::asset::{Dimensions, ImageAsset};
use crate::constants::{
    DEFAULT_ASPECT_HEIGHT, DEFAULT_ASPECT_WIDTH, DEFAULT_CROP_COVERAGE_PERCENT,
    DEFAULT_PIXEL_RATIO, MAX_PIXEL_RATIO, MIN_CROP_PERCENT,
};
use crate::error::{IngestError, Result};
use crate::raster::{check_output_size, scaled_output_size, PixelRect, RasterError, RasterSurface};

const FULL: f64 = 100.0;

/// Width / height ratio enforced on every crop region of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AspectRatio(f64);

impl AspectRatio {
    pub fn new(ratio: f64) -> Result<Self> {
        if ratio.is_finite() && ratio > 0.0 {
            Ok(Self(ratio))
        } else {
            Err(IngestError::InvalidAspectRatio(ratio.to_string()))
        }
    }

    pub fn from_parts(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(IngestError::InvalidAspectRatio(format!("{}:{}", width, height)));
        }
        Self::new(width as f64 / height as f64)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    /// Percent-space factor `k` such that `width% == k * height%`.
    fn percent_factor(&self, source: Dimensions) -> f64 {
        self.0 * source.height.max(1) as f64 / source.width.max(1) as f64
    }
}

impl Default for AspectRatio {
    fn default() -> Self {
        Self(DEFAULT_ASPECT_WIDTH as f64 / DEFAULT_ASPECT_HEIGHT as f64)
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}", self.0)
    }
}

impl FromStr for AspectRatio {
    type Err = IngestError;

    /// Accepts `4:3`, `16/9` or a plain ratio such as `1.5`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || IngestError::InvalidAspectRatio(s.to_string());
        let s = s.trim();
        if let Some((w, h)) = s.split_once(':').or_else(|| s.split_once('/')) {
            let w: u32 = w.trim().parse().map_err(|_| invalid())?;
            let h: u32 = h.trim().parse().map_err(|_| invalid())?;
            return Self::from_parts(w, h).map_err(|_| invalid());
        }
        let ratio: f64 = s.parse().map_err(|_| invalid())?;
        Self::new(ratio).map_err(|_| invalid())
    }
}

/// A crop rectangle in percent of the source, with the lock it was built for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub aspect: AspectRatio,
}

impl CropRegion {
    /// Builds the largest locked region that fits inside the requested
    /// rectangle, clamped into bounds.
    pub fn constrained(
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        aspect: AspectRatio,
        source: Dimensions,
    ) -> Self {
        let k = aspect.percent_factor(source);
        let driving = if height * k < width {
            Driving::Height
        } else {
            Driving::Width
        };
        let (width, height) = fit_locked(width, height, driving, k);
        position(x, y, width, height, aspect)
    }

    /// Width / height of the region measured in source pixels.
    pub fn pixel_aspect(&self, source: Dimensions) -> f64 {
        (self.width * source.width as f64) / (self.height * source.height as f64)
    }

    pub fn is_within_bounds(&self) -> bool {
        const EPS: f64 = 1e-9;
        self.x >= -EPS
            && self.y >= -EPS
            && self.width > 0.0
            && self.height > 0.0
            && self.x + self.width <= FULL + EPS
            && self.y + self.height <= FULL + EPS
    }

    /// Native pixel rectangle for this region. Never empty, never outside
    /// the source.
    pub fn to_pixels(&self, source: Dimensions) -> PixelRect {
        let axis = |offset: f64, extent: f64, native: u32| {
            let native_f = native as f64;
            let start = ((offset * native_f / FULL).round() as u32).min(native.saturating_sub(1));
            let len = ((extent * native_f / FULL).round() as u32)
                .max(1)
                .min(native - start);
            (start, len)
        };
        let (x, width) = axis(self.x, self.width, source.width.max(1));
        let (y, height) = axis(self.y, self.height, source.height.max(1));
        PixelRect::new(x, y, width, height)
    }
}

/// A user drag in percent units: move by `dx, dy`, resize by `dw, dh`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CropDelta {
    pub dx: f64,
    pub dy: f64,
    pub dw: f64,
    pub dh: f64,
}

impl CropDelta {
    pub fn moved(dx: f64, dy: f64) -> Self {
        Self {
            dx,
            dy,
            ..Self::default()
        }
    }

    pub fn resized(dw: f64, dh: f64) -> Self {
        Self {
            dw,
            dh,
            ..Self::default()
        }
    }

    pub fn is_zero(&self) -> bool {
        self.dx == 0.0 && self.dy == 0.0 && self.dw == 0.0 && self.dh == 0.0
    }

    fn resizes(&self) -> bool {
        self.dw != 0.0 || self.dh != 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Driving {
    Width,
    Height,
}

/// Applies the lock from the driving side, then clamps whichever side
/// overflows the source and recomputes its partner. `k` is the percent
/// factor of the lock.
fn fit_locked(width: f64, height: f64, driving: Driving, k: f64) -> (f64, f64) {
    let (mut w, mut h) = match driving {
        Driving::Width => (width, width / k),
        Driving::Height => (height * k, height),
    };

    if w < MIN_CROP_PERCENT || h < MIN_CROP_PERCENT {
        // width is the smaller side exactly when k <= 1
        if k <= 1.0 {
            w = MIN_CROP_PERCENT;
            h = w / k;
        } else {
            h = MIN_CROP_PERCENT;
            w = h * k;
        }
    }
    if w > FULL {
        w = FULL;
        h = w / k;
    }
    if h > FULL {
        h = FULL;
        w = h * k;
    }
    (w, h)
}

fn position(x: f64, y: f64, width: f64, height: f64, aspect: AspectRatio) -> CropRegion {
    CropRegion {
        x: x.clamp(0.0, (FULL - width).max(0.0)),
        y: y.clamp(0.0, (FULL - height).max(0.0)),
        width,
        height,
        aspect,
    }
}

/// Initial region: 90% of the source width at the locked aspect, centered.
///
/// When the derived height would not fit, the height is clamped to 100% of
/// the source and the width recomputed from the lock.
pub fn select_default_region(source: Dimensions, aspect: AspectRatio) -> CropRegion {
    let k = aspect.percent_factor(source);
    let (width, height) = fit_locked(DEFAULT_CROP_COVERAGE_PERCENT, 0.0, Driving::Width, k);
    position(
        (FULL - width) / 2.0,
        (FULL - height) / 2.0,
        width,
        height,
        aspect,
    )
}

/// Applies a user drag, keeping the region inside the source and the lock
/// intact. The side with the larger pixel-space change drives the resize.
pub fn update_region(current: &CropRegion, delta: CropDelta, source: Dimensions) -> CropRegion {
    if delta.is_zero() {
        return *current;
    }

    let (width, height) = if delta.resizes() {
        let k = current.aspect.percent_factor(source);
        let driving = if delta.dw.abs() * source.width as f64 >= delta.dh.abs() * source.height as f64
        {
            Driving::Width
        } else {
            Driving::Height
        };
        fit_locked(
            current.width + delta.dw,
            current.height + delta.dh,
            driving,
            k,
        )
    } else {
        (current.width, current.height)
    };

    position(
        current.x + delta.dx,
        current.y + delta.dy,
        width,
        height,
        current.aspect,
    )
}

/// One interactive selection over a source image.
///
/// Dropping a session before commit leaves nothing behind.
#[derive(Debug, Clone)]
pub struct CropSession {
    source: Dimensions,
    region: CropRegion,
}

impl CropSession {
    pub fn new(source: Dimensions, aspect: AspectRatio) -> Self {
        Self {
            source,
            region: select_default_region(source, aspect),
        }
    }

    pub fn source(&self) -> Dimensions {
        self.source
    }

    pub fn aspect(&self) -> AspectRatio {
        self.region.aspect
    }

    pub fn region(&self) -> &CropRegion {
        &self.region
    }

    pub fn update(&mut self, delta: CropDelta) -> &CropRegion {
        self.region = update_region(&self.region, delta, self.source);
        &self.region
    }

    /// Replaces the region with a requested rectangle, re-applying the lock.
    pub fn set_region(&mut self, x: f64, y: f64, width: f64, height: f64) -> &CropRegion {
        self.region = CropRegion::constrained(x, y, width, height, self.aspect(), self.source);
        &self.region
    }

    pub fn reset(&mut self) {
        self.region = select_default_region(self.source, self.aspect());
    }
}

/// Result of waiting on the user.
#[derive(Debug, Clone, PartialEq)]
pub enum CropOutcome {
    Commit(CropRegion),
    Cancel,
}

/// Whoever decides the crop: an interactive UI, a script, a CLI flag.
#[async_trait]
pub trait CropDriver: Send + Sync {
    async fn select(&mut self, session: CropSession) -> CropOutcome;
}

/// Commits the initial region untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptDefault;

#[async_trait]
impl CropDriver for AcceptDefault {
    async fn select(&mut self, session: CropSession) -> CropOutcome {
        CropOutcome::Commit(*session.region())
    }
}

/// Commits a fixed rectangle (in percent), constrained to the lock.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedRegion {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl FromStr for FixedRegion {
    type Err = IngestError;

    /// Parses `x,y,width,height` in percent.
    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<std::result::Result<_, _>>()
            .map_err(|_| IngestError::InvalidCropRegion(s.to_string()))?;
        match parts.as_slice() {
            [x, y, width, height]
                if parts.iter().all(|v| (0.0..=FULL).contains(v)) && *width > 0.0 && *height > 0.0 =>
            {
                Ok(Self {
                    x: *x,
                    y: *y,
                    width: *width,
                    height: *height,
                })
            }
            _ => Err(IngestError::InvalidCropRegion(s.to_string())),
        }
    }
}

#[async_trait]
impl CropDriver for FixedRegion {
    async fn select(&mut self, mut session: CropSession) -> CropOutcome {
        CropOutcome::Commit(*session.set_region(self.x, self.y, self.width, self.height))
    }
}

/// Replays a sequence of drags, then commits.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDrag(pub Vec<CropDelta>);

#[async_trait]
impl CropDriver for ScriptedDrag {
    async fn select(&mut self, mut session: CropSession) -> CropOutcome {
        for delta in &self.0 {
            session.update(*delta);
        }
        CropOutcome::Commit(*session.region())
    }
}

/// Abandons every session.
#[derive(Debug, Clone, Copy, Default)]
pub struct CancelCrop;

#[async_trait]
impl CropDriver for CancelCrop {
    async fn select(&mut self, _session: CropSession) -> CropOutcome {
        CropOutcome::Cancel
    }
}

/// Turns committed regions into pixels.
#[derive(Debug, Clone, Copy)]
pub struct CropEngine {
    pixel_ratio: f64,
}

impl Default for CropEngine {
    fn default() -> Self {
        Self {
            pixel_ratio: DEFAULT_PIXEL_RATIO,
        }
    }
}

impl CropEngine {
    pub fn new(pixel_ratio: f64) -> Result<Self> {
        if !(pixel_ratio.is_finite() && pixel_ratio > 0.0 && pixel_ratio <= MAX_PIXEL_RATIO) {
            return Err(IngestError::InvalidPixelRatio(pixel_ratio));
        }
        Ok(Self { pixel_ratio })
    }

    pub fn pixel_ratio(&self) -> f64 {
        self.pixel_ratio
    }

    pub fn select_default_region(&self, source: Dimensions, aspect: AspectRatio) -> CropRegion {
        select_default_region(source, aspect)
    }

    pub fn update_region(
        &self,
        current: &CropRegion,
        delta: CropDelta,
        source: Dimensions,
    ) -> CropRegion {
        update_region(current, delta, source)
    }

    /// Renders the committed region at native resolution times the pixel
    /// ratio.
    pub async fn commit<R: RasterSurface>(
        &self,
        raster: &R,
        source: &R::Source,
        region: &CropRegion,
    ) -> std::result::Result<ImageAsset, RasterError> {
        let native = raster.source_dimensions(source);
        let rect = region.to_pixels(native);
        let output = scaled_output_size(rect, self.pixel_ratio);
        tracing::debug!(
            ?rect,
            output = %output,
            "committing crop region"
        );
        check_output_size(output)?;
        raster.extract(source, rect, output).await
    }
}
