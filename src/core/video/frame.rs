use crate::core::detect::BoundingBox;
use crate::core::error::{ExtractError, Result};
use image::RgbImage;

pub const CHANNELS: usize = 3;

/// 帧数据结构
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>, // RGB 格式, row-major
    pub frame_number: u64,
    /// Best effort, derived from the stream frame rate.
    pub timestamp_ms: u64,
}

impl Frame {
    pub fn new(width: u32, height: u32, data: Vec<u8>, frame_number: u64, timestamp_ms: u64) -> Self {
        Self {
            width,
            height,
            data,
            frame_number,
            timestamp_ms,
        }
    }

    /// Uniform frame filled with one color.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], frame_number: u64) -> Self {
        let data = rgb.repeat(width as usize * height as usize);
        Self::new(width, height, data, frame_number, 0)
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn expected_len(&self) -> usize {
        self.pixel_count() * CHANNELS
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(ExtractError::Model(format!(
                "frame {} has empty dimensions {}x{}",
                self.frame_number, self.width, self.height
            )));
        }
        if self.data.len() != self.expected_len() {
            return Err(ExtractError::Model(format!(
                "frame {} buffer is {} bytes, expected {} for {}x{}x3",
                self.frame_number,
                self.data.len(),
                self.expected_len(),
                self.width,
                self.height
            )));
        }
        Ok(())
    }

    /// Pixel at (row, column).
    pub fn pixel(&self, row: u32, col: u32) -> Option<[u8; 3]> {
        if row >= self.height || col >= self.width {
            return None;
        }
        let idx = (row as usize * self.width as usize + col as usize) * CHANNELS;
        self.data
            .get(idx..idx + CHANNELS)
            .map(|p| [p[0], p[1], p[2]])
    }

    /// Copy the region under `bbox` after clamping it to the frame.
    /// Returns `None` when nothing of the box lies inside the frame.
    pub fn crop(&self, bbox: &BoundingBox) -> Option<RgbImage> {
        let clamped = bbox.clamp_to(self.width, self.height)?;
        let crop_w = clamped.width() as usize;
        let crop_h = clamped.height() as usize;

        // 只拷贝裁剪区域的行
        let src_stride = self.width as usize * CHANNELS;
        let dst_stride = crop_w * CHANNELS;
        let mut buf = Vec::with_capacity(dst_stride * crop_h);
        for row in 0..crop_h {
            let src_start = (clamped.y1 as usize + row) * src_stride + clamped.x1 as usize * CHANNELS;
            buf.extend_from_slice(self.data.get(src_start..src_start + dst_stride)?);
        }

        RgbImage::from_raw(clamped.width(), clamped.height(), buf)
    }

    pub fn to_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone()).ok_or_else(|| {
            ExtractError::Model(format!(
                "frame {} buffer does not match {}x{}",
                self.frame_number, self.width, self.height
            ))
        })
    }

    pub fn resize_to(&self, target_width: u32, target_height: u32) -> Result<Frame> {
        let img = self.to_image()?;
        let resized = image::imageops::resize(
            &img,
            target_width,
            target_height,
            image::imageops::FilterType::Triangle,
        );

        Ok(Frame {
            width: target_width,
            height: target_height,
            data: resized.into_raw(),
            frame_number: self.frame_number,
            timestamp_ms: self.timestamp_ms,
        })
    }
}
