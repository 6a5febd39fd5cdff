// 该文件是 Shoujian （兽鉴） 项目的一部分。
// src/input/gstreamer_input.rs - GStreamer 输入
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

//! # GStreamer 视频输入模块
//!
//! 视频文件、摄像头、RTSP 网络流以及任意 GStreamer 能打开的 URI 都通过本模块读取，
//! 管道末端统一转换为 RGB 并交给 appsink。
//!
//! ## 系统依赖
//!
//! **Ubuntu/Debian:**
//! ```bash
//! sudo apt-get install libgstreamer1.0-dev libgstreamer-plugins-base1.0-dev
//! ```
//!
//! ## URL 格式
//!
//! - `gst://file/path/to/video.mp4?rotate=90`
//! - `gst://camera/dev/video0?width=640&height=480&fps=15`
//!
//! RTSP 与 YouTube 流由 [`crate::input::InputWrapper`] 转成 [`GStreamerInputPipelineBuilder::uri`]。
//!
//! ## Pipeline Builder
//!
//! ```no_run
//! use shoujian::input::GStreamerInputPipelineBuilder;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let input = GStreamerInputPipelineBuilder::new()
//!     .camera("/dev/video0", 640, 480, 30)
//!     .target_format("RGB")
//!     .build()?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;

use gstreamer::{self as gst, prelude::*};
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use image::RgbImage;
use thiserror::Error;
use tracing::{error, info, warn};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, path_from_url};

const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_CAMERA_FPS: u32 = 15;

/// GStreamer 输入错误类型
#[derive(Error, Debug)]
pub enum GStreamerInputError {
  /// URI scheme 不匹配（期望 "gst://"）
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  /// `gst://` 之后的源类型既不是 file 也不是 camera
  #[error("Unknown GStreamer source: {0}")]
  UnknownSource(String),
  #[error("Empty pipeline")]
  EmptyPipeline,
  /// GStreamer 库错误
  #[error("GStreamer error: {0}")]
  GStreamerError(#[from] gst::glib::Error),
  /// GStreamer 布尔操作错误
  #[error("GStreamer boolean error: {0}")]
  GStreamerBoolError(#[from] gst::glib::BoolError),
  /// 无法获取 appsink 元素
  #[error("Failed to get appsink element")]
  AppSinkNotFound,
  /// 无法转换元素为 appsink
  #[error("Failed to convert element to appsink")]
  AppSinkConversionFailed,
  /// 无法从 caps 获取视频信息
  #[error("Failed to get video info from caps")]
  VideoInfoError,
  /// 不支持的视频格式
  #[error("Unsupported video format")]
  UnsupportedFormat,
  /// 管道错误
  #[error("Pipeline error: {0}")]
  PipelineError(String),
  /// 缓冲区大小不匹配
  #[error("Buffer size mismatch: expected {expected} bytes, got {actual} bytes")]
  BufferSizeMismatch { expected: usize, actual: usize },
  /// 状态改变错误
  #[error("State change error: {0}")]
  StateChangeError(#[from] gst::StateChangeError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum GStreamerInputBuilderItem {
  FileSource(String),
  CameraSource {
    camera: String,
    io_mode: Option<u32>,
    format: Option<String>,
    width: u32,
    height: u32,
    fps: u32,
  },
  UriSource(String),
  TargetFormat {
    format: String,
  },
  VideoFlip {
    method: u32,
    direction: u32,
  },
}

impl GStreamerInputBuilderItem {
  fn to_pipeline(&self) -> String {
    match self {
      GStreamerInputBuilderItem::FileSource(path) => {
        format!("filesrc location=\"{}\" ! decodebin", path)
      }
      GStreamerInputBuilderItem::CameraSource {
        camera,
        io_mode,
        format,
        width,
        height,
        fps,
      } => {
        let io_mode_str = io_mode
          .map(|mode| format!(" io-mode={}", mode))
          .unwrap_or_default();
        let format_str = format
          .as_ref()
          .map(|f| format!("format={},", f))
          .unwrap_or_default();
        format!(
          "v4l2src device={}{} ! video/x-raw,{}width={},height={},framerate={}/1",
          camera, io_mode_str, format_str, width, height, fps
        )
      }
      GStreamerInputBuilderItem::UriSource(uri) => {
        format!("uridecodebin uri=\"{}\"", uri)
      }
      GStreamerInputBuilderItem::TargetFormat { format } => {
        format!("videoconvert ! video/x-raw,format={}", format)
      }
      GStreamerInputBuilderItem::VideoFlip { method, direction } => {
        format!("videoflip method={} video-direction={}", method, direction)
      }
    }
  }
}

/// GStreamer 输入管道构建器
#[derive(Debug, Clone, Default)]
pub struct GStreamerInputPipelineBuilder {
  items: Vec<GStreamerInputBuilderItem>,
  /// 实时源来不及处理时丢帧，文件源则逐帧读取
  live: bool,
}

impl GStreamerInputPipelineBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn file(mut self, path: impl Into<String>) -> Self {
    self.items.push(GStreamerInputBuilderItem::FileSource(path.into()));
    self
  }

  pub fn camera(mut self, camera: impl Into<String>, width: u32, height: u32, fps: u32) -> Self {
    self.live = true;
    self.items.push(GStreamerInputBuilderItem::CameraSource {
      camera: camera.into(),
      io_mode: None,
      format: None,
      width,
      height,
      fps,
    });
    self
  }

  pub fn uri(mut self, uri: impl Into<String>) -> Self {
    self.live = true;
    self.items.push(GStreamerInputBuilderItem::UriSource(uri.into()));
    self
  }

  pub fn target_format(mut self, format: impl Into<String>) -> Self {
    self.items.push(GStreamerInputBuilderItem::TargetFormat {
      format: format.into(),
    });
    self
  }

  /// 按角度旋转，未知角度忽略
  pub fn rotate(mut self, degrees: &str) -> Self {
    if let Some(flip) = Self::video_flip(degrees) {
      self.items.push(flip);
    }
    self
  }

  fn video_flip(rotate: &str) -> Option<GStreamerInputBuilderItem> {
    let (method, direction) = match rotate {
      "90" => (1, 1),
      "180" => (2, 2),
      "270" => (3, 3),
      "0" => return None,
      other => {
        warn!("忽略未知的旋转角度: {}", other);
        return None;
      }
    };
    Some(GStreamerInputBuilderItem::VideoFlip { method, direction })
  }

  fn build_camera_pipeline(path: &str, query: &HashMap<String, String>) -> Self {
    let parse = |key: &str, default: u32| {
      query
        .get(key)
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
    };

    let mut builder = Self::new();
    builder.live = true;
    builder.items.push(GStreamerInputBuilderItem::CameraSource {
      camera: path.to_string(),
      io_mode: query.get("io-mode").and_then(|v| v.parse::<u32>().ok()),
      format: query.get("format").cloned(),
      width: parse("width", DEFAULT_CAMERA_WIDTH),
      height: parse("height", DEFAULT_CAMERA_HEIGHT),
      fps: parse("fps", DEFAULT_CAMERA_FPS),
    });
    builder
  }

  /// 完整的管道描述，以 appsink 结尾
  pub fn description(&self) -> Result<String, GStreamerInputError> {
    if self.items.is_empty() {
      return Err(GStreamerInputError::EmptyPipeline);
    }

    let basic_pipeline = self
      .items
      .iter()
      .map(GStreamerInputBuilderItem::to_pipeline)
      .collect::<Vec<String>>()
      .join(" ! ");
    Ok(format!(
      "{} ! appsink max-buffers=2 drop={} sync=false name=sink",
      basic_pipeline, self.live
    ))
  }

  pub fn build(self) -> Result<GStreamerInput, GStreamerInputError> {
    gst::init()?;

    let full_pipeline = self.description()?;
    info!("GStreamer pipeline description: {}", full_pipeline);

    let pipeline = gst::parse::launch(&full_pipeline)?
      .downcast::<gst::Pipeline>()
      .map_err(|_| GStreamerInputError::PipelineError("Failed to create pipeline".to_string()))?;

    let appsink = pipeline
      .by_name("sink")
      .ok_or(GStreamerInputError::AppSinkNotFound)?
      .downcast::<gst_app::AppSink>()
      .map_err(|_| GStreamerInputError::AppSinkConversionFailed)?;

    pipeline.set_state(gst::State::Playing)?;

    Ok(GStreamerInput {
      pipeline,
      appsink,
      frame_index: 0,
    })
  }
}

impl FromUrlWithScheme for GStreamerInputPipelineBuilder {
  const SCHEME: &'static str = "gst";
}

impl FromUrl for GStreamerInputPipelineBuilder {
  type Error = GStreamerInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(GStreamerInputError::SchemeMismatch);
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();
    let path = path_from_url(url).to_string_lossy().into_owned();

    let builder = match url.host_str() {
      Some("camera") => Self::build_camera_pipeline(&path, &query),
      Some("file") => Self::new().file(path),
      other => {
        return Err(GStreamerInputError::UnknownSource(
          other.unwrap_or_default().to_string(),
        ));
      }
    };

    let builder = match query.get("rotate") {
      Some(rotate) => builder.rotate(rotate),
      None => builder,
    };

    Ok(builder.target_format("RGB"))
  }
}

/// GStreamer 视频输入
///
/// 迭代到流结束或出错为止，出错时记录日志并结束迭代。
pub struct GStreamerInput {
  pipeline: gst::Pipeline,
  appsink: gst_app::AppSink,
  frame_index: u64,
}

impl Drop for GStreamerInput {
  fn drop(&mut self) {
    if let Err(e) = self.pipeline.set_state(gst::State::Null) {
      warn!("Failed to stop GStreamer pipeline: {}", e);
    }
  }
}

impl GStreamerInput {
  fn pull_sample(&self) -> Option<gst::Sample> {
    match self.appsink.pull_sample() {
      Ok(sample) => Some(sample),
      Err(_) if self.appsink.is_eos() => {
        info!("视频流结束，共 {} 帧", self.frame_index);
        None
      }
      Err(e) => {
        error!("Failed to pull sample: {}", e);
        self.log_bus_error();
        None
      }
    }
  }

  fn log_bus_error(&self) {
    let Some(bus) = self.pipeline.bus() else {
      return;
    };
    while let Some(message) = bus.pop_filtered(&[gst::MessageType::Error]) {
      if let gst::MessageView::Error(err) = message.view() {
        error!("GStreamer 管道错误: {} ({:?})", err.error(), err.debug());
      }
    }
  }
}

impl Iterator for GStreamerInput {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    let sample = self.pull_sample()?;
    match convert_sample(&sample) {
      Ok((image, timestamp_ms)) => {
        let frame = Frame {
          image,
          index: self.frame_index,
          timestamp_ms,
        };
        self.frame_index += 1;
        Some(frame)
      }
      Err(e) => {
        error!("Failed to fetch sample: {}", e);
        None
      }
    }
  }
}

fn convert_sample(sample: &gst::Sample) -> Result<(RgbImage, u64), GStreamerInputError> {
  let buffer = sample
    .buffer()
    .ok_or_else(|| GStreamerInputError::PipelineError("No buffer in sample".to_string()))?;
  let caps = sample
    .caps()
    .ok_or_else(|| GStreamerInputError::PipelineError("No caps in sample".to_string()))?;

  let video_info =
    gst_video::VideoInfo::from_caps(caps).map_err(|_| GStreamerInputError::VideoInfoError)?;

  let bgr = match video_info.format() {
    gst_video::VideoFormat::Rgb => false,
    gst_video::VideoFormat::Bgr => true,
    _ => return Err(GStreamerInputError::UnsupportedFormat),
  };

  let map = buffer.map_readable().map_err(|e| {
    GStreamerInputError::PipelineError(format!("Failed to map buffer for reading: {}", e))
  })?;

  let stride = video_info.stride().first().copied().unwrap_or(0).max(0) as usize;
  let image = pack_rows(
    map.as_slice(),
    video_info.width(),
    video_info.height(),
    stride,
    bgr,
  )?;
  let timestamp_ms = buffer.pts().map(|pts| pts.mseconds()).unwrap_or(0);

  Ok((image, timestamp_ms))
}

/// 去掉行尾填充并按需交换 B/R 通道
fn pack_rows(
  data: &[u8],
  width: u32,
  height: u32,
  stride: usize,
  bgr: bool,
) -> Result<RgbImage, GStreamerInputError> {
  let row_bytes = width as usize * 3;
  let stride = stride.max(row_bytes);
  let expected = match height as usize {
    0 => 0,
    h => stride * (h - 1) + row_bytes,
  };
  if data.len() < expected {
    return Err(GStreamerInputError::BufferSizeMismatch {
      expected,
      actual: data.len(),
    });
  }

  let mut packed = Vec::with_capacity(row_bytes * height as usize);
  for row in data.chunks(stride).take(height as usize) {
    packed.extend_from_slice(&row[..row_bytes]);
  }
  if bgr {
    crate::frame::bgr_to_rgb_in_place(&mut packed);
  }

  RgbImage::from_raw(width, height, packed).ok_or(GStreamerInputError::BufferSizeMismatch {
    expected: row_bytes * height as usize,
    actual: data.len(),
  })
}
