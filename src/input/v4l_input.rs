// 该文件是 Shoujian （兽鉴） 项目的一部分。
// src/input/v4l_input.rs - V4L2 摄像头输入
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

use std::time::Instant;

use image::RgbImage;
use thiserror::Error;
use tracing::{error, info};
use url::Url;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, path_from_url};

const DEFAULT_DEVICE: &str = "/dev/video0";
const DEFAULT_WIDTH: u32 = 640;
const DEFAULT_HEIGHT: u32 = 480;
const BUFFER_COUNT: u32 = 4;

#[derive(Error, Debug)]
pub enum V4lInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Unsupported pixel format: {0}")]
  UnsupportedPixelFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PixelFormat {
  Yuyv,
  Rgb,
}

/// `v4l2:///dev/video0?width=640&height=480`
///
/// 直接读取 V4L2 设备，优先协商 YUYV。
pub struct V4lInput {
  stream: Stream<'static>,
  // stream 持有设备句柄，device 留着以保证设备在流之后关闭
  _device: Device,
  width: u32,
  height: u32,
  pixel_format: PixelFormat,
  frame_index: u64,
  start_time: Instant,
}

impl FromUrlWithScheme for V4lInput {
  const SCHEME: &'static str = "v4l2";
}

impl FromUrl for V4lInput {
  type Error = V4lInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(V4lInputError::SchemaMismatch);
    }

    let path = path_from_url(url);
    let device_path = if path.as_os_str().is_empty() || path.as_os_str() == "/" {
      DEFAULT_DEVICE.to_string()
    } else {
      path.to_string_lossy().into_owned()
    };
    let query = |key: &str, default: u32| {
      url
        .query_pairs()
        .find(|(k, _)| k == key)
        .and_then(|(_, v)| v.parse::<u32>().ok())
        .unwrap_or(default)
    };

    Self::open(
      &device_path,
      query("width", DEFAULT_WIDTH),
      query("height", DEFAULT_HEIGHT),
    )
  }
}

impl V4lInput {
  pub fn open(device_path: &str, width: u32, height: u32) -> Result<Self, V4lInputError> {
    let device = Device::with_path(device_path)?;

    let mut format = device.format()?;
    format.width = width;
    format.height = height;
    format.fourcc = FourCC::new(b"YUYV");
    let format = device.set_format(&format)?;

    let pixel_format = match &format.fourcc.repr {
      b"YUYV" => PixelFormat::Yuyv,
      b"RGB3" => PixelFormat::Rgb,
      other => {
        return Err(V4lInputError::UnsupportedPixelFormat(
          String::from_utf8_lossy(other).into_owned(),
        ));
      }
    };
    info!(
      "打开摄像头 {}: {}x{} {:?}",
      device_path, format.width, format.height, pixel_format
    );

    let stream = Stream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)?;

    Ok(Self {
      stream,
      _device: device,
      width: format.width,
      height: format.height,
      pixel_format,
      frame_index: 0,
      start_time: Instant::now(),
    })
  }
}

/// YUYV 4:2:2 转 RGB，每 4 字节对应 2 个像素
fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Vec<u8> {
  let pixels = (width * height) as usize;
  let mut rgb = Vec::with_capacity(pixels * 3);

  let convert = |y: f32, u: f32, v: f32| {
    [
      (y + 1.402 * v).clamp(0.0, 255.0) as u8,
      (y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8,
      (y + 1.772 * u).clamp(0.0, 255.0) as u8,
    ]
  };

  for chunk in yuyv.chunks_exact(4).take(pixels / 2) {
    let u = chunk[1] as f32 - 128.0;
    let v = chunk[3] as f32 - 128.0;
    rgb.extend_from_slice(&convert(chunk[0] as f32, u, v));
    rgb.extend_from_slice(&convert(chunk[2] as f32, u, v));
  }

  rgb
}

impl Iterator for V4lInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    let (buffer, _meta) = match self.stream.next() {
      Ok(captured) => captured,
      Err(e) => {
        error!("无法捕获帧: {}", e);
        return None;
      }
    };

    let data = match self.pixel_format {
      PixelFormat::Yuyv => yuyv_to_rgb(buffer, self.width, self.height),
      PixelFormat::Rgb => buffer.to_vec(),
    };
    let Some(image) = RgbImage::from_raw(self.width, self.height, data) else {
      error!("捕获的缓冲区大小与 {}x{} 不符", self.width, self.height);
      return None;
    };

    let frame = Frame {
      image,
      index: self.frame_index,
      timestamp_ms: self.start_time.elapsed().as_millis() as u64,
    };
    self.frame_index += 1;
    Some(frame)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn neutral_chroma_gives_gray() {
    let rgb = yuyv_to_rgb(&[100, 128, 200, 128], 2, 1);
    assert_eq!(rgb, vec![100, 100, 100, 200, 200, 200]);
  }

  #[test]
  fn short_buffers_are_not_padded() {
    let rgb = yuyv_to_rgb(&[16, 128, 16, 128], 4, 1);
    assert_eq!(rgb.len(), 6);
  }
}
