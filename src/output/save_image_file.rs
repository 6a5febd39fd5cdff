// 该文件是 Shoujian （兽鉴） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use image::RgbImage;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, has_query_flag,
  frame::Frame,
  model::Inference,
  output::Render,
  path_from_url,
};

/// 把叠加图保存为单个图像文件，`?dump` 时在旁边写同名 `.json`
pub struct SaveImageFileOutput {
  path: PathBuf,
  dump: bool,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput {
      path: path_from_url(uri),
      dump: has_query_flag(uri, "dump"),
    })
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl AsRef<Path>) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
      dump: false,
    }
  }

  pub fn dump(mut self, dump: bool) -> Self {
    self.dump = dump;
    self
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  fn save_image(&self, image: &RgbImage) -> Result<(), SaveImageFileError> {
    if let Some(parent) = self.path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    image.save(&self.path)?;
    info!("保存图像到文件: {}", self.path.display());

    Ok(())
  }

  fn save_dump(&self, frame: &Frame, result: &Inference) -> Result<(), SaveImageFileError> {
    let path = self.path.with_extension("json");
    let writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(writer, &result.record(frame))?;
    info!("保存检测数据到文件: {}", path.display());
    Ok(())
  }
}

impl Render<Frame, Inference> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &Frame, result: &Inference) -> Result<(), Self::Error> {
    self.save_image(&result.overlay)?;
    if self.dump {
      self.save_dump(frame, result)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::report::{ClassCount, Report};

  #[test]
  fn saves_overlay_and_sidecar() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("image://{}/nested/out.png?dump", dir.path().display())).unwrap();
    let output = SaveImageFileOutput::from_url(&url).unwrap();
    assert_eq!(output.path(), dir.path().join("nested/out.png"));

    let frame = Frame::still(RgbImage::new(4, 3));
    let result = Inference {
      detections: Vec::new(),
      counts: ClassCount::default(),
      report: Report::default(),
      overlay: RgbImage::from_pixel(4, 3, image::Rgb([10, 20, 30])),
    };
    output.render_result(&frame, &result).unwrap();

    let saved = image::open(dir.path().join("nested/out.png")).unwrap().to_rgb8();
    assert_eq!(saved, result.overlay);

    let sidecar = std::fs::read_to_string(dir.path().join("nested/out.json")).unwrap();
    let record: serde_json::Value = serde_json::from_str(&sidecar).unwrap();
    assert_eq!(record["width"], 4);
    assert_eq!(record["report"].as_array().unwrap().len(), 0);
  }

  #[test]
  fn wrong_scheme_is_rejected() {
    let url = Url::parse("folder:///tmp/out").unwrap();
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
  }
}
