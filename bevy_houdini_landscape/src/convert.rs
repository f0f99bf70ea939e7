//! Heightfield to landscape data conversion
//!
//! Pure functions turning float heightfield samples into landscape digit grids:
//! - axis transpose between the heightfield and landscape row-major conventions
//! - uint16 height and uint8 layer quantization
//! - resampling and edge-replicating padding to the solved landscape size
//! - the corrective transform placing the landscape on the source footprint
//!
//! Nothing here touches the geometry source or the destination host, so conversions
//! of independent tiles can run on any thread.

use crate::config::{FULL_DIGIT_Z_RANGE, MarshallingConfig, ResizePolicy};
use crate::error::{LandscapeError, Result};
use crate::size::LandscapeSize;
use crate::source::VolumeInfo;
use bevy::log::warn;
use bevy::math::DVec3;
use bevy::prelude::*;

/// Landscape digit value of zero elevation
pub const LANDSCAPE_ZERO_DIGIT: f64 = 32768.0;

/// Digits per landscape unit before Z scale
pub const LANDSCAPE_DIGITS_PER_UNIT: f64 = 128.0;

/// Landscape Z span in meters at 100% Z scale
pub const LANDSCAPE_REFERENCE_Z_RANGE: f64 = 512.0;

/// Meters to centimeters
pub const UNITS_PER_METER: f64 = 100.0;

/// Dense row-major grid, `width` samples per row
#[derive(Clone, Debug, PartialEq)]
pub struct Grid<T> {
    pub width: usize,
    pub height: usize,
    pub data: Vec<T>,
}

impl<T: Copy> Grid<T> {
    pub fn new(width: usize, height: usize, data: Vec<T>) -> Result<Self> {
        if data.len() != width * height {
            return Err(LandscapeError::InvalidInput(format!(
                "grid of {width}x{height} given {} samples",
                data.len()
            )));
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[y * self.width + x]
    }
}

/// Sample types that can be bilinearly interpolated
pub trait GridSample: Copy {
    fn to_f32(self) -> f32;
    fn from_f32(value: f32) -> Self;
}

impl GridSample for u16 {
    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(value: f32) -> Self {
        value.round() as u16
    }
}

impl GridSample for u8 {
    fn to_f32(self) -> f32 {
        self as f32
    }

    fn from_f32(value: f32) -> Self {
        value.round() as u8
    }
}

impl GridSample for f32 {
    fn to_f32(self) -> f32 {
        self
    }

    fn from_f32(value: f32) -> Self {
        value
    }
}

/// Swap the axes of a row-major grid.
///
/// `src` holds `height` rows of `width` samples. The result holds `width` rows of
/// `height` samples, with `dst[c * height + r] == src[r * width + c]`.
pub fn transpose_row_major<T: Copy>(src: &[T], width: usize, height: usize) -> Vec<T> {
    debug_assert_eq!(src.len(), width * height);
    let mut dst = Vec::with_capacity(src.len());
    for c in 0..width {
        for r in 0..height {
            dst.push(src[r * width + c]);
        }
    }
    dst
}

/// Float to uint16 height mapping, invertible for later re-export
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct HeightQuantization {
    pub float_min: f64,
    pub float_max: f64,
    pub digit_z_range: f64,
    pub digit_center_offset: f64,
    /// Digits per meter, zero for a flat range
    pub z_spacing: f64,
    /// Whether the range was forced to the default landscape Z range
    pub default_scaling: bool,
}

impl HeightQuantization {
    /// Mapping for samples in `[float_min, float_max]`.
    ///
    /// `volume_scale_z` is only used under default Unreal scaling, which replaces the
    /// range with the default landscape Z range at the volume's scale.
    pub fn new(float_min: f32, float_max: f32, volume_scale_z: f32, config: &MarshallingConfig) -> Self {
        let mut float_min = float_min as f64;
        let mut float_max = float_max as f64;

        if config.use_default_unreal_scaling {
            let limit = config.default_scaling_z_limit;
            if float_min < -limit || float_min > limit || float_max < -limit || float_max > limit {
                warn!(
                    "Heightfield range [{float_min}, {float_max}] exceeds [-{limit}, {limit}] and will clip under default Unreal scaling"
                );
            }
            let half_range = limit * volume_scale_z as f64 * 2.0;
            float_min = -half_range;
            float_max = half_range;
            let z_range = float_max - float_min;
            return Self {
                float_min,
                float_max,
                digit_z_range: FULL_DIGIT_Z_RANGE,
                digit_center_offset: 0.0,
                z_spacing: if z_range != 0.0 { FULL_DIGIT_Z_RANGE / z_range } else { 0.0 },
                default_scaling: true,
            };
        }

        let digit_z_range = config.digit_z_range();
        let meter_z_range = float_max - float_min;
        Self {
            float_min,
            float_max,
            digit_z_range,
            digit_center_offset: ((u16::MAX as f64 - digit_z_range) / 2.0).floor(),
            z_spacing: if meter_z_range != 0.0 {
                digit_z_range / meter_z_range
            } else {
                0.0
            },
            default_scaling: false,
        }
    }

    pub fn meter_z_range(&self) -> f64 {
        self.float_max - self.float_min
    }

    /// Unclamped digit value of a sample.
    pub fn to_digit(&self, value: f64) -> f64 {
        ((value - self.float_min) * self.z_spacing + self.digit_center_offset).round()
    }

    /// Digit value of a sample, saturated to the uint16 range.
    #[inline]
    pub fn quantize(&self, value: f32) -> u16 {
        self.to_digit(value as f64) as u16
    }

    /// Recover the source height of a digit value.
    pub fn to_value(&self, digit: u16) -> f64 {
        if self.z_spacing == 0.0 {
            return self.float_min;
        }
        (digit as f64 - self.digit_center_offset) / self.z_spacing + self.float_min
    }
}

/// Transpose and quantize `width * height` row-major height samples.
pub fn quantize_heights(
    samples: &[f32],
    width: usize,
    height: usize,
    quantization: &HeightQuantization,
) -> Vec<u16> {
    transpose_row_major(samples, width, height)
        .into_iter()
        .map(|v| quantization.quantize(v))
        .collect()
}

/// Digit value of a layer sample, clamped into `[min, max]` first.
#[inline]
pub fn layer_digit(value: f32, min: f32, max: f32) -> u8 {
    let range = max as f64 - min as f64;
    let spacing = if range != 0.0 { 255.0 / range } else { 0.0 };
    let clamped = if min <= max { value.clamp(min, max) } else { value };
    ((clamped as f64 - min as f64) * spacing).round() as u8
}

/// How a grid was fitted to its landscape size
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResizeOutcome {
    /// Source samples per landscape vertex, per axis
    pub resize_factor: DVec3,
    /// Position of the landscape origin relative to the first source sample, in vertices
    pub offset_pixels: DVec3,
}

impl Default for ResizeOutcome {
    fn default() -> Self {
        Self {
            resize_factor: DVec3::ONE,
            offset_pixels: DVec3::ZERO,
        }
    }
}

impl ResizeOutcome {
    pub fn is_identity(&self) -> bool {
        self.resize_factor == DVec3::ONE && self.offset_pixels == DVec3::ZERO
    }
}

/// Bilinearly resample a grid to `new_width * new_height`.
pub fn resample_grid<T: GridSample>(grid: &Grid<T>, new_width: usize, new_height: usize) -> Result<Grid<T>> {
    if grid.width < 2 || grid.height < 2 || new_width < 2 || new_height < 2 {
        return Err(LandscapeError::InvalidInput(format!(
            "cannot resample {}x{} to {new_width}x{new_height}",
            grid.width, grid.height
        )));
    }

    let x_scale = (grid.width - 1) as f32 / (new_width - 1) as f32;
    let y_scale = (grid.height - 1) as f32 / (new_height - 1) as f32;
    let mut data = Vec::with_capacity(new_width * new_height);

    for y in 0..new_height {
        let old_y = y as f32 * y_scale;
        let y0 = (old_y.floor() as usize).min(grid.height - 1);
        let y1 = (y0 + 1).min(grid.height - 1);
        let fy = old_y.fract();

        for x in 0..new_width {
            let old_x = x as f32 * x_scale;
            let x0 = (old_x.floor() as usize).min(grid.width - 1);
            let x1 = (x0 + 1).min(grid.width - 1);
            let fx = old_x.fract();

            let h00 = grid.get(x0, y0).to_f32();
            let h10 = grid.get(x1, y0).to_f32();
            let h01 = grid.get(x0, y1).to_f32();
            let h11 = grid.get(x1, y1).to_f32();

            let h0 = h00 * (1.0 - fx) + h10 * fx;
            let h1 = h01 * (1.0 - fx) + h11 * fx;
            data.push(T::from_f32(h0 * (1.0 - fy) + h1 * fy));
        }
    }

    Grid::new(new_width, new_height, data)
}

/// Center a grid in a `new_width * new_height` frame, replicating edge samples outward.
///
/// Axes that shrink are cropped around the center instead. Returns the grid and the
/// landscape vertex holding the first source sample.
pub fn pad_grid<T: Copy>(grid: &Grid<T>, new_width: usize, new_height: usize) -> Result<(Grid<T>, IVec2)> {
    if grid.width == 0 || grid.height == 0 || new_width == 0 || new_height == 0 {
        return Err(LandscapeError::InvalidInput(format!(
            "cannot pad {}x{} to {new_width}x{new_height}",
            grid.width, grid.height
        )));
    }

    let offset_x = (new_width as i64 - grid.width as i64) / 2;
    let offset_y = (new_height as i64 - grid.height as i64) / 2;
    let max_x = grid.width as i64 - 1;
    let max_y = grid.height as i64 - 1;

    let mut data = Vec::with_capacity(new_width * new_height);
    for y in 0..new_height as i64 {
        let old_y = (y - offset_y).clamp(0, max_y) as usize;
        for x in 0..new_width as i64 {
            let old_x = (x - offset_x).clamp(0, max_x) as usize;
            data.push(grid.get(old_x, old_y));
        }
    }

    Ok((
        Grid::new(new_width, new_height, data)?,
        IVec2::new(offset_x as i32, offset_y as i32),
    ))
}

/// Fit a grid to the landscape size.
pub fn resize_grid<T: GridSample>(
    grid: Grid<T>,
    new_width: usize,
    new_height: usize,
    policy: ResizePolicy,
) -> Result<(Grid<T>, ResizeOutcome)> {
    if grid.width == new_width && grid.height == new_height {
        return Ok((grid, ResizeOutcome::default()));
    }

    let (old_width, old_height) = (grid.width, grid.height);
    let (resample_width, resample_height) = match policy {
        ResizePolicy::Legacy if new_width <= old_width && new_height <= old_height => {
            (new_width, new_height)
        }
        ResizePolicy::Legacy => (old_width, old_height),
        ResizePolicy::PerAxis => (new_width.min(old_width), new_height.min(old_height)),
    };

    let mut outcome = ResizeOutcome::default();
    let mut grid = grid;
    if (resample_width, resample_height) != (old_width, old_height) {
        grid = resample_grid(&grid, resample_width, resample_height)?;
        outcome.resize_factor = DVec3::new(
            old_width as f64 / resample_width as f64,
            old_height as f64 / resample_height as f64,
            1.0,
        );
        warn!(
            "Landscape data was resampled from ({old_width} x {old_height}) to ({resample_width} x {resample_height})"
        );
    }

    if (grid.width, grid.height) != (new_width, new_height) {
        let from = (grid.width, grid.height);
        let (padded, offset) = pad_grid(&grid, new_width, new_height)?;
        grid = padded;
        outcome.offset_pixels = DVec3::new(-offset.x as f64, -offset.y as f64, 0.0);
        warn!(
            "Landscape data was padded from ({} x {}) to ({new_width} x {new_height})",
            from.0, from.1
        );
    }

    Ok((grid, outcome))
}

/// Landscape transform together with its degraded-state flag
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LandscapeTransform {
    pub transform: Transform,
    /// Set when a near-zero Z scale had to be replaced by 1
    pub z_scale_corrected: bool,
}

/// Compose the landscape transform reproducing the volume's footprint and zero plane.
///
/// Rotation is left at identity: the axis transpose already maps the volume frame onto
/// the landscape frame.
pub fn compose_landscape_transform(
    volume_transform: &Transform,
    quantization: &HeightQuantization,
    resize: &ResizeOutcome,
) -> LandscapeTransform {
    let volume_scale = volume_transform.scale.as_dvec3();

    let mut scale = DVec3::new(volume_scale.x * 2.0, volume_scale.y * 2.0, 0.0);
    scale.z = if quantization.default_scaling {
        volume_scale.z * 2.0
    } else {
        (u16::MAX as f64 / quantization.digit_z_range) * quantization.meter_z_range()
            / LANDSCAPE_REFERENCE_Z_RANGE
    };
    scale *= UNITS_PER_METER;
    scale *= resize.resize_factor;

    let z_scale_corrected = scale.z.abs() <= 1e-8;
    if z_scale_corrected {
        warn!("Landscape Z scale collapsed to zero, using 1.0");
        scale.z = 1.0;
    }

    let mut location = volume_transform.translation.as_dvec3();
    let zero_digit = quantization.to_digit(0.0);
    location.z += -(zero_digit - LANDSCAPE_ZERO_DIGIT) / LANDSCAPE_DIGITS_PER_UNIT * scale.z;

    if resize.offset_pixels != DVec3::ZERO {
        let mut offset = resize.offset_pixels * scale;
        offset.z = 0.0;
        location += offset;
    }

    LandscapeTransform {
        transform: Transform {
            translation: location.as_vec3(),
            rotation: Quat::IDENTITY,
            scale: scale.as_vec3(),
        },
        z_scale_corrected,
    }
}

/// Output of a height conversion, ready for the landscape import call
#[derive(Clone, Debug, PartialEq)]
pub struct ConvertedHeightData {
    /// `size_x * size_y` digits, X fastest
    pub heights: Vec<u16>,
    pub size_x: u32,
    pub size_y: u32,
    pub transform: LandscapeTransform,
    pub quantization: HeightQuantization,
    pub resize: ResizeOutcome,
}

/// Convert height samples of `volume` into landscape data of the solved `size`.
///
/// `float_min`/`float_max` is either the observed range of the samples or a range shared
/// by several tiles.
pub fn convert_height_data(
    samples: &[f32],
    volume: &VolumeInfo,
    size: &LandscapeSize,
    float_min: f32,
    float_max: f32,
    config: &MarshallingConfig,
) -> Result<ConvertedHeightData> {
    if volume.x_length < 2 || volume.y_length < 2 {
        return Err(LandscapeError::InvalidInput(format!(
            "heightfield of {}x{} samples is below 2x2",
            volume.x_length, volume.y_length
        )));
    }
    let (width, height) = (volume.x_length as usize, volume.y_length as usize);
    if samples.len() != width * height {
        return Err(LandscapeError::InvalidInput(format!(
            "heightfield of {width}x{height} given {} samples",
            samples.len()
        )));
    }

    if volume.min_x != 0 {
        warn!("Converting landscape: heightfield's min X is not zero");
    }
    if volume.min_y != 0 {
        warn!("Converting landscape: heightfield's min Y is not zero");
    }

    let quantization =
        HeightQuantization::new(float_min, float_max, volume.transform.scale.z, config);

    // transposed: landscape rows run along the volume's X axis
    let digits = quantize_heights(samples, width, height, &quantization);
    let grid = Grid::new(height, width, digits)?;
    let (grid, resize) = resize_grid(
        grid,
        size.size_x as usize,
        size.size_y as usize,
        config.resize_policy,
    )?;

    let transform = compose_landscape_transform(&volume.transform, &quantization, &resize);

    Ok(ConvertedHeightData {
        heights: grid.data,
        size_x: size.size_x,
        size_y: size.size_y,
        transform,
        quantization,
        resize,
    })
}

/// A layer whose range collapses to one value carries no weights.
pub fn check_layer_range(name: &str, min: f32, max: f32) -> Result<()> {
    if min == max {
        return Err(LandscapeError::DegenerateRange {
            name: name.to_string(),
            value: min,
        });
    }
    Ok(())
}

/// Convert layer samples of `volume` into uint8 weights of the solved `size`.
pub fn convert_layer_data(
    samples: &[f32],
    volume: &VolumeInfo,
    layer_min: f32,
    layer_max: f32,
    size: &LandscapeSize,
    policy: ResizePolicy,
) -> Result<Vec<u8>> {
    check_layer_range(&volume.name, layer_min, layer_max)?;
    let (width, height) = (volume.x_length.max(0) as usize, volume.y_length.max(0) as usize);
    if samples.len() != width * height || width < 2 || height < 2 {
        return Err(LandscapeError::InvalidInput(format!(
            "layer {} of {width}x{height} given {} samples",
            volume.name,
            samples.len()
        )));
    }

    let digits = transpose_row_major(samples, width, height)
        .into_iter()
        .map(|v| layer_digit(v, layer_min, layer_max))
        .collect();
    let grid = Grid::new(height, width, digits)?;
    let (grid, _) = resize_grid(grid, size.size_x as usize, size.size_y as usize, policy)?;
    Ok(grid.data)
}
