// 该文件是 Shoujian （兽鉴） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;
use url::Url;

use crate::{FromUrl, frame::Frame};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "gstreamer_input")]
mod gstreamer_input;
#[cfg(feature = "gstreamer_input")]
pub use self::gstreamer_input::{
  GStreamerInput, GStreamerInputBuilderItem, GStreamerInputError, GStreamerInputPipelineBuilder,
};

#[cfg(feature = "gstreamer_input")]
mod youtube_input;
#[cfg(feature = "gstreamer_input")]
pub use self::youtube_input::{YoutubeInput, YoutubeInputError};

#[cfg(feature = "v4l_input")]
mod v4l_input;
#[cfg(feature = "v4l_input")]
pub use self::v4l_input::{V4lInput, V4lInputError};

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("Image file input error: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("GStreamer input error: {0}")]
  GStreamerInputError(#[from] GStreamerInputError),
  #[cfg(feature = "gstreamer_input")]
  #[error("YouTube input error: {0}")]
  YoutubeInputError(#[from] YoutubeInputError),
  #[cfg(feature = "v4l_input")]
  #[error("V4L input error: {0}")]
  V4lInputError(#[from] V4lInputError),
  #[error("URI scheme mismatch: {0}")]
  SchemeMismatch(String),
  #[error("Invalid {kind} source: {source_arg}")]
  InvalidSource { kind: SourceKind, source_arg: String },
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按 URL 方案选择的输入源
pub enum InputWrapper {
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
  #[cfg(feature = "gstreamer_input")]
  GStreamerInput(GStreamerInput),
  #[cfg(feature = "v4l_input")]
  V4lInput(V4lInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    #[cfg(feature = "read_image_file")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == ImageFileInput::SCHEME {
        let input = ImageFileInput::from_url(url)?;
        return Ok(InputWrapper::ReadImageFile(input));
      }
    }
    #[cfg(feature = "gstreamer_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == GStreamerInputPipelineBuilder::SCHEME {
        let input = GStreamerInputPipelineBuilder::from_url(url)?.build()?;
        return Ok(InputWrapper::GStreamerInput(input));
      }
      if matches!(url.scheme(), "rtsp" | "rtsps") {
        let input = GStreamerInputPipelineBuilder::new()
          .uri(url.as_str())
          .target_format("RGB")
          .build()?;
        return Ok(InputWrapper::GStreamerInput(input));
      }
      if url.scheme() == YoutubeInput::SCHEME {
        let input = YoutubeInput::from_url(url)?.build()?;
        return Ok(InputWrapper::GStreamerInput(input));
      }
    }
    #[cfg(feature = "v4l_input")]
    {
      use crate::FromUrlWithScheme;

      if url.scheme() == V4lInput::SCHEME {
        let input = V4lInput::from_url(url)?;
        return Ok(InputWrapper::V4lInput(input));
      }
    }
    Err(InputError::SchemeMismatch(url.scheme().to_string()))
  }
}

impl Iterator for InputWrapper {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => input.next(),
      #[cfg(feature = "gstreamer_input")]
      InputWrapper::GStreamerInput(input) => input.next(),
      #[cfg(feature = "v4l_input")]
      InputWrapper::V4lInput(input) => input.next(),
    }
  }
}

/// 界面上可选的输入源类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
  Image,
  Video,
  Webcam,
  Rtsp,
  Youtube,
}

impl SourceKind {
  pub const ALL: [SourceKind; 5] = [
    SourceKind::Image,
    SourceKind::Video,
    SourceKind::Webcam,
    SourceKind::Rtsp,
    SourceKind::Youtube,
  ];

  pub fn display_name(self) -> &'static str {
    match self {
      SourceKind::Image => "Image",
      SourceKind::Video => "Video",
      SourceKind::Webcam => "Webcam",
      SourceKind::Rtsp => "RTSP",
      SourceKind::Youtube => "YouTube",
    }
  }

  /// 单张图像只推理一次，其余都是连续帧
  pub fn is_stream(self) -> bool {
    !matches!(self, SourceKind::Image)
  }

  /// 把命令行给出的路径、设备或地址转换为输入 URL
  ///
  /// 已经是本程序输入方案的 URL 原样返回。
  pub fn to_url(self, arg: &str) -> Result<Url, InputError> {
    if let Ok(url) = Url::parse(arg)
      && matches!(url.scheme(), "image" | "gst" | "v4l2" | "youtube")
    {
      return Ok(url);
    }

    let invalid = || InputError::InvalidSource {
      kind: self,
      source_arg: arg.to_string(),
    };

    match self {
      SourceKind::Image => file_url("image:///", arg).ok_or_else(invalid),
      SourceKind::Video => file_url("gst://file/", arg).ok_or_else(invalid),
      SourceKind::Webcam => {
        let device = if !arg.is_empty() && arg.bytes().all(|b| b.is_ascii_digit()) {
          format!("/dev/video{}", arg)
        } else {
          arg.to_string()
        };
        file_url("gst://camera/", &device).ok_or_else(invalid)
      }
      SourceKind::Rtsp => match Url::parse(arg) {
        Ok(url) if matches!(url.scheme(), "rtsp" | "rtsps") => Ok(url),
        _ => Err(invalid()),
      },
      #[cfg(feature = "gstreamer_input")]
      SourceKind::Youtube => youtube_input::input_url(arg).map_err(|_| invalid()),
      #[cfg(not(feature = "gstreamer_input"))]
      SourceKind::Youtube => Err(invalid()),
    }
  }
}

/// 把本地路径放进 `base` 的路径部分，相对路径按当前目录展开
fn file_url(base: &str, path: &str) -> Option<Url> {
  if path.trim().is_empty() {
    return None;
  }
  let absolute = std::path::absolute(Path::new(path)).ok()?;
  let mut url = Url::parse(base).ok()?;
  url.set_path(&crate::path_to_url_path(&absolute));
  Some(url)
}

impl fmt::Display for SourceKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.display_name())
  }
}

#[derive(Error, Debug)]
#[error("Unknown source: {0}")]
pub struct UnknownSource(pub String);

impl FromStr for SourceKind {
  type Err = UnknownSource;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    SourceKind::ALL
      .into_iter()
      .find(|kind| kind.display_name().eq_ignore_ascii_case(s.trim()))
      .ok_or_else(|| UnknownSource(s.to_string()))
  }
}
