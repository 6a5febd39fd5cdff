// 该文件是 Shoujian （兽鉴） 项目的一部分。
// src/model/letterbox.rs - 等比缩放与填充
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

use image::{Rgb, RgbImage, imageops};

/// YOLO 训练时使用的填充灰度
const PAD_VALUE: u8 = 114;

/// 记录缩放与填充参数，用于把模型坐标映射回原图
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  pub scale: f32,
  pub pad_x: u32,
  pub pad_y: u32,
  pub src_width: u32,
  pub src_height: u32,
}

impl Letterbox {
  /// 等比缩放到 `width x height` 画布中央，其余部分以灰色填充
  pub fn fit(image: &RgbImage, width: u32, height: u32) -> (RgbImage, Self) {
    let (src_width, src_height) = image.dimensions();
    let scale = (width as f32 / src_width.max(1) as f32).min(height as f32 / src_height.max(1) as f32);

    let new_width = ((src_width as f32 * scale).round() as u32).clamp(1, width);
    let new_height = ((src_height as f32 * scale).round() as u32).clamp(1, height);

    let pad_x = (width - new_width) / 2;
    let pad_y = (height - new_height) / 2;

    let mut canvas = RgbImage::from_pixel(width, height, Rgb([PAD_VALUE; 3]));
    if (new_width, new_height) == (src_width, src_height) {
      imageops::replace(&mut canvas, image, pad_x as i64, pad_y as i64);
    } else {
      let resized = imageops::resize(image, new_width, new_height, imageops::FilterType::Triangle);
      imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);
    }

    (
      canvas,
      Self {
        scale,
        pad_x,
        pad_y,
        src_width,
        src_height,
      },
    )
  }

  /// 模型输入坐标下的框转换为原图归一化坐标，并裁剪到 [0, 1]
  pub fn to_normalized(&self, x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> [f32; 4] {
    let w = self.src_width.max(1) as f32;
    let h = self.src_height.max(1) as f32;
    let unpad_x = |x: f32| ((x - self.pad_x as f32) / self.scale / w).clamp(0.0, 1.0);
    let unpad_y = |y: f32| ((y - self.pad_y as f32) / self.scale / h).clamp(0.0, 1.0);
    [unpad_x(x_min), unpad_y(y_min), unpad_x(x_max), unpad_y(y_max)]
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn wide_image_is_padded_vertically() {
    let image = RgbImage::from_pixel(200, 100, Rgb([255, 0, 0]));
    let (canvas, letterbox) = Letterbox::fit(&image, 64, 64);

    assert_eq!(canvas.dimensions(), (64, 64));
    assert_eq!(letterbox.scale, 0.32);
    assert_eq!((letterbox.pad_x, letterbox.pad_y), (0, 16));
    assert_eq!(canvas.get_pixel(32, 0), &Rgb([PAD_VALUE; 3]));
    assert_eq!(canvas.get_pixel(32, 32), &Rgb([255, 0, 0]));
  }

  #[test]
  fn boxes_map_back_to_source() {
    let image = RgbImage::new(200, 100);
    let (_, letterbox) = Letterbox::fit(&image, 64, 64);

    // 画布中的 (0, 16)-(64, 48) 恰好覆盖整张原图
    let bbox = letterbox.to_normalized(0.0, 16.0, 64.0, 48.0);
    for (got, want) in bbox.iter().zip([0.0, 0.0, 1.0, 1.0]) {
      assert!((got - want).abs() < 1e-5, "{:?}", bbox);
    }
    assert_eq!(letterbox.to_normalized(-10.0, 0.0, 100.0, 64.0), [0.0, 0.0, 1.0, 1.0]);
  }
}
