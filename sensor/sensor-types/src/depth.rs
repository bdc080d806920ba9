//! Depth sensor types.
//!
//! Provides the raw depth frame as delivered by a transport ([`DepthImage`])
//! and its decoded, metric form ([`DepthMap`]).

use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{FrameId, Result, SensorError, Timestamp};

/// Pixel layout of a raw depth buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum DepthEncoding {
    /// 32-bit float depth in meters (`32FC1`). `NaN` marks no return.
    #[default]
    Float32,
    /// 16-bit unsigned depth in millimeters (`16UC1`). `0` marks no return.
    Mono16,
}

impl DepthEncoding {
    /// Returns the number of bytes per pixel.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Float32 => 4,
            Self::Mono16 => 2,
        }
    }

    /// Returns the conventional encoding name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Float32 => "32FC1",
            Self::Mono16 => "16UC1",
        }
    }
}

impl FromStr for DepthEncoding {
    type Err = SensorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "32FC1" => Ok(Self::Float32),
            "16UC1" | "mono16" => Ok(Self::Mono16),
            other => Err(SensorError::UnsupportedEncoding(other.to_string())),
        }
    }
}

/// A raw depth frame as received from the transport.
///
/// # Example
///
/// ```
/// use sensor_types::{DepthImage, FrameId, Timestamp};
///
/// let image = DepthImage::from_f32(FrameId::new("cam"), Timestamp::zero(), 2, 2, &[1.0; 4]);
/// assert_eq!(image.step, 8);
/// assert_eq!(image.data.len(), 16);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DepthImage {
    /// Optical frame the depth is measured in.
    pub frame: FrameId,
    /// Acquisition time.
    pub timestamp: Timestamp,
    /// Image width in pixels.
    pub width: u32,
    /// Image height in pixels.
    pub height: u32,
    /// Pixel layout of `data`.
    pub encoding: DepthEncoding,
    /// True if multi-byte values are big-endian.
    pub is_bigendian: bool,
    /// Row length in bytes (may include padding).
    pub step: usize,
    /// Raw pixel bytes, `height * step` long.
    pub data: Vec<u8>,
}

impl DepthImage {
    /// Packs metric float depths (row-major) into a host-endian `32FC1` image.
    #[must_use]
    pub fn from_f32(
        frame: FrameId,
        timestamp: Timestamp,
        width: u32,
        height: u32,
        depths: &[f32],
    ) -> Self {
        Self {
            frame,
            timestamp,
            width,
            height,
            encoding: DepthEncoding::Float32,
            is_bigendian: cfg!(target_endian = "big"),
            step: width as usize * DepthEncoding::Float32.bytes_per_pixel(),
            data: bytemuck::cast_slice(depths).to_vec(),
        }
    }
}

/// A decoded depth frame.
///
/// # Depth Values
///
/// - Depth is stored in meters as `f32` values
/// - Missing returns are `NaN`
/// - The buffer is row-major: `depths[row * width + col]`
///
/// # Example
///
/// ```
/// use sensor_types::{DepthMap, FrameId, Timestamp};
///
/// let mut depth = DepthMap::new(FrameId::new("cam"), Timestamp::zero(), 3, 2, vec![f32::NAN; 6]);
/// assert_eq!(depth.fill_nans(25.0), 6);
/// assert_eq!(depth.get(1, 2), Some(25.0));
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DepthMap {
    /// Optical frame the depth is measured in.
    pub frame: FrameId,
    /// Acquisition time.
    pub timestamp: Timestamp,
    /// Image width in pixels (columns).
    pub width: u32,
    /// Image height in pixels (rows).
    pub height: u32,
    /// Per-pixel depth in meters, row-major.
    pub depths: Vec<f32>,
}

impl DepthMap {
    /// Creates a depth map from metric values.
    #[must_use]
    pub const fn new(
        frame: FrameId,
        timestamp: Timestamp,
        width: u32,
        height: u32,
        depths: Vec<f32>,
    ) -> Self {
        Self {
            frame,
            timestamp,
            width,
            height,
            depths,
        }
    }

    /// Decodes a raw depth image into meters.
    ///
    /// `Mono16` millimeters are scaled to meters and zero readings become
    /// `NaN`; `Float32` values are taken as-is.
    ///
    /// # Errors
    ///
    /// Returns an error if the image has a zero dimension, its row step is
    /// shorter than a row or overflows `height * step`, or the buffer does
    /// not hold `height * step` bytes.
    pub fn decode(image: &DepthImage) -> Result<Self> {
        let invalid_dimensions = SensorError::InvalidDimensions {
            width: image.width,
            height: image.height,
        };
        if image.width == 0 || image.height == 0 {
            return Err(invalid_dimensions);
        }

        let bpp = image.encoding.bytes_per_pixel();
        let width = image.width as usize;
        let height = image.height as usize;
        let row_bytes = width.checked_mul(bpp).ok_or(invalid_dimensions)?;
        let invalid_step = SensorError::InvalidStep {
            step: image.step,
            row_bytes,
        };
        if image.step < row_bytes {
            return Err(invalid_step);
        }

        let expected = image.step.checked_mul(height).ok_or(invalid_step)?;
        if image.data.len() != expected {
            return Err(SensorError::buffer_mismatch(expected, image.data.len()));
        }

        let mut depths = Vec::with_capacity(width * height);
        for row in image.data.chunks_exact(image.step) {
            for px in row[..row_bytes].chunks_exact(bpp) {
                depths.push(decode_pixel(image.encoding, image.is_bigendian, px));
            }
        }

        Ok(Self::new(
            image.frame.clone(),
            image.timestamp,
            image.width,
            image.height,
            depths,
        ))
    }

    /// Returns the total number of pixels.
    #[must_use]
    pub const fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Checks that the depth buffer holds exactly one value per pixel.
    #[must_use]
    pub const fn has_valid_buffer_size(&self) -> bool {
        self.depths.len() == self.pixel_count()
    }

    /// Gets the depth at `(row, col)`, or `None` if out of bounds.
    #[must_use]
    pub fn get(&self, row: u32, col: u32) -> Option<f32> {
        if row >= self.height || col >= self.width {
            return None;
        }
        self.depths
            .get(row as usize * self.width as usize + col as usize)
            .copied()
    }

    /// Replaces every `NaN` depth with `value`, returning how many were replaced.
    pub fn fill_nans(&mut self, value: f32) -> usize {
        let mut replaced = 0;
        for depth in self.depths.iter_mut().filter(|d| d.is_nan()) {
            *depth = value;
            replaced += 1;
        }
        replaced
    }
}

/// `px` holds exactly one pixel. Foreign-endian values are byte-swapped.
fn decode_pixel(encoding: DepthEncoding, big_endian: bool, px: &[u8]) -> f32 {
    let swap = big_endian != cfg!(target_endian = "big");
    match encoding {
        DepthEncoding::Float32 if swap => {
            f32::from_bits(bytemuck::pod_read_unaligned::<u32>(px).swap_bytes())
        }
        DepthEncoding::Float32 => bytemuck::pod_read_unaligned(px),
        DepthEncoding::Mono16 => {
            let raw: u16 = bytemuck::pod_read_unaligned(px);
            let millimeters = if swap { raw.swap_bytes() } else { raw };
            if millimeters == 0 {
                f32::NAN
            } else {
                f32::from(millimeters) / 1000.0
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn frame() -> FrameId {
        FrameId::new("head_camera_depth_optical_frame")
    }

    #[test]
    fn encoding_parse() {
        assert_eq!("32FC1".parse::<DepthEncoding>(), Ok(DepthEncoding::Float32));
        assert_eq!("16UC1".parse::<DepthEncoding>(), Ok(DepthEncoding::Mono16));
        assert!(matches!(
            "rgb8".parse::<DepthEncoding>(),
            Err(SensorError::UnsupportedEncoding(name)) if name == "rgb8"
        ));
    }

    #[test]
    fn decode_float32() {
        let image = DepthImage::from_f32(frame(), Timestamp::zero(), 3, 2, &[
            1.0,
            2.0,
            f32::NAN,
            4.0,
            5.0,
            6.0,
        ]);
        let depth = DepthMap::decode(&image).unwrap();
        assert_eq!(depth.pixel_count(), 6);
        assert_eq!(depth.get(0, 1), Some(2.0));
        assert!(depth.get(0, 2).unwrap().is_nan());
        assert_eq!(depth.get(1, 2), Some(6.0));
        assert_eq!(depth.get(2, 0), None);
    }

    #[test]
    fn decode_mono16_millimeters() {
        let mut data = Vec::new();
        for mm in [1500u16, 0, 250, 1000] {
            data.extend_from_slice(&mm.to_le_bytes());
        }
        let image = DepthImage {
            frame: frame(),
            timestamp: Timestamp::zero(),
            width: 2,
            height: 2,
            encoding: DepthEncoding::Mono16,
            is_bigendian: false,
            step: 4,
            data,
        };
        let depth = DepthMap::decode(&image).unwrap();
        assert_relative_eq!(depth.depths[0], 1.5);
        assert!(depth.depths[1].is_nan());
        assert_relative_eq!(depth.depths[2], 0.25);
        assert_relative_eq!(depth.depths[3], 1.0);
    }

    #[test]
    fn decode_big_endian_with_padding() {
        let mut data = Vec::new();
        data.extend_from_slice(&2.5f32.to_be_bytes());
        data.extend_from_slice(&[0xAA, 0xBB]); // row padding
        data.extend_from_slice(&3.5f32.to_be_bytes());
        data.extend_from_slice(&[0xAA, 0xBB]);
        let image = DepthImage {
            frame: frame(),
            timestamp: Timestamp::zero(),
            width: 1,
            height: 2,
            encoding: DepthEncoding::Float32,
            is_bigendian: true,
            step: 6,
            data,
        };
        let depth = DepthMap::decode(&image).unwrap();
        assert_eq!(depth.depths, vec![2.5, 3.5]);
    }

    #[test]
    fn decode_rejects_short_buffer() {
        let mut image = DepthImage::from_f32(frame(), Timestamp::zero(), 2, 2, &[1.0; 4]);
        image.data.truncate(10);
        assert_eq!(
            DepthMap::decode(&image),
            Err(SensorError::buffer_mismatch(16, 10))
        );
    }

    #[test]
    fn decode_rejects_short_step() {
        let mut image = DepthImage::from_f32(frame(), Timestamp::zero(), 2, 2, &[1.0; 4]);
        image.step = 4;
        assert!(matches!(
            DepthMap::decode(&image),
            Err(SensorError::InvalidStep { step: 4, row_bytes: 8 })
        ));
    }

    #[test]
    fn decode_rejects_empty_image() {
        let image = DepthImage::from_f32(frame(), Timestamp::zero(), 0, 4, &[]);
        assert!(matches!(
            DepthMap::decode(&image),
            Err(SensorError::InvalidDimensions { .. })
        ));
    }

    #[test]
    fn decode_rejects_overflowing_step() {
        let image = DepthImage {
            frame: frame(),
            timestamp: Timestamp::zero(),
            width: 1,
            height: 3,
            encoding: DepthEncoding::Float32,
            is_bigendian: false,
            step: usize::MAX / 2,
            data: vec![0; 4],
        };
        assert_eq!(
            DepthMap::decode(&image),
            Err(SensorError::InvalidStep {
                step: usize::MAX / 2,
                row_bytes: 4,
            })
        );
    }

    #[test]
    fn decode_mono16_big_endian() {
        let mut data = Vec::new();
        for mm in [800u16, 0] {
            data.extend_from_slice(&mm.to_be_bytes());
        }
        let image = DepthImage {
            frame: frame(),
            timestamp: Timestamp::zero(),
            width: 2,
            height: 1,
            encoding: DepthEncoding::Mono16,
            is_bigendian: true,
            step: 4,
            data,
        };
        let depth = DepthMap::decode(&image).unwrap();
        assert_relative_eq!(depth.depths[0], 0.8);
        assert!(depth.depths[1].is_nan());
    }

    #[test]
    fn fill_nans_counts_replacements() {
        let mut depth = DepthMap::new(frame(), Timestamp::zero(), 2, 2, vec![
            1.0,
            f32::NAN,
            f32::NAN,
            2.0,
        ]);
        assert_eq!(depth.fill_nans(25.0), 2);
        assert_eq!(depth.depths, vec![1.0, 25.0, 25.0, 2.0]);
        assert!(depth.has_valid_buffer_size());
    }

    #[test]
    fn buffer_size_counts_pixels() {
        let depth = DepthMap::new(frame(), Timestamp::zero(), 2, 2, vec![1.0; 9]);
        assert_eq!(depth.pixel_count(), 4);
        assert!(!depth.has_valid_buffer_size());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn depth_image_serialization() {
        let image = DepthImage::from_f32(frame(), Timestamp::from_nanos(5), 2, 1, &[0.5, 2.0]);
        let json = serde_json::to_string(&image).unwrap();
        let parsed: DepthImage = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, image);
    }
}
