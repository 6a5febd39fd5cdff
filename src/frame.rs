// 该文件是 Shoujian （兽鉴） 项目的一部分。
// src/frame.rs - 帧定义
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Shoujian Contributors

use image::RgbImage;

const RGB_CHANNELS: usize = 3;

/// 帧数据
#[derive(Debug, Clone)]
pub struct Frame {
  /// RGB 图像数据
  pub image: RgbImage,
  /// 帧索引
  pub index: u64,
  /// 时间戳（毫秒）
  pub timestamp_ms: u64,
}

impl Frame {
  pub fn still(image: RgbImage) -> Self {
    Self {
      image,
      index: 0,
      timestamp_ms: 0,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// HWC 排列的原始像素
  pub fn as_nhwc(&self) -> &[u8] {
    self.image.as_raw()
  }
}

/// 将 HWC 像素重排为 CHW，并归一化到 [0, 1]
pub fn nhwc_to_nchw_f32(data: &[u8], width: usize, height: usize) -> Vec<f32> {
  let plane = width * height;
  let mut out = vec![0f32; plane * RGB_CHANNELS];
  for h in 0..height {
    for w in 0..width {
      for c in 0..RGB_CHANNELS {
        let src_idx = (h * width + w) * RGB_CHANNELS + c;
        let dst_idx = c * plane + h * width + w;
        out[dst_idx] = data[src_idx] as f32 / 255.0;
      }
    }
  }
  out
}

/// BGR 排列的行数据转换为 RGB（就地交换）
pub fn bgr_to_rgb_in_place(data: &mut [u8]) {
  for pixel in data.chunks_exact_mut(RGB_CHANNELS) {
    pixel.swap(0, 2);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::Rgb;

  #[test]
  fn nchw_layout_groups_channels_into_planes() {
    let mut image = RgbImage::new(2, 1);
    image.put_pixel(0, 0, Rgb([255, 0, 0]));
    image.put_pixel(1, 0, Rgb([0, 255, 51]));
    let frame = Frame::still(image);

    let nchw = nhwc_to_nchw_f32(frame.as_nhwc(), 2, 1);
    assert_eq!(nchw, vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.2]);
  }

  #[test]
  fn bgr_swap_reverses_channels() {
    let mut data = vec![1, 2, 3, 4, 5, 6];
    bgr_to_rgb_in_place(&mut data);
    assert_eq!(data, vec![3, 2, 1, 6, 5, 4]);
  }
}
