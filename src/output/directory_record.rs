// 该文件是 Shoujian （兽鉴） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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
use std::sync::atomic::{AtomicU16, Ordering};

use chrono::{DateTime, Datelike, Utc};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme, has_query_flag,
  frame::Frame,
  model::Inference,
  output::Render,
  path_from_url,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 保存的是叠加图还是原始帧
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
  Draw,
  Record,
}

/// 按日期分目录逐帧保存：`<dir>/YYYY/MM/DD/HH-MM-SS-XXXX.png` 加同名 `.json`
///
/// 默认只保存有检测结果的帧，`?always` 保存全部帧；`?record` 保存未绘制的原始帧，
/// 便于之后作为标注数据。
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  kind: RecordKind,
  frame_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let kind = if has_query_flag(uri, "record") {
      RecordKind::Record
    } else {
      RecordKind::Draw
    };

    Ok(DirectoryRecordOutput::new(path_from_url(uri), kind).always(has_query_flag(uri, "always")))
  }
}

impl DirectoryRecordOutput {
  pub fn new(directory: impl AsRef<Path>, kind: RecordKind) -> Self {
    Self {
      directory: directory.as_ref().to_path_buf(),
      kind,
      frame_counter: AtomicU16::new(0),
      always: false,
    }
  }

  pub fn always(mut self, always: bool) -> Self {
    self.always = always;
    self
  }

  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self, now: DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}.png",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }
}

impl Render<Frame, Inference> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &Frame, result: &Inference) -> Result<(), Self::Error> {
    if !self.always && result.is_empty() {
      return Ok(());
    }

    let path = self.frame_path(Utc::now())?;
    match self.kind {
      RecordKind::Draw => result.overlay.save(&path)?,
      RecordKind::Record => frame.image.save(&path)?,
    }

    let writer = BufWriter::new(File::create(path.with_extension("json"))?);
    serde_json::to_writer_pretty(writer, &result.record(frame))?;
    debug!("记录帧 {} 到 {}", frame.index, path.display());

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::Detection;
  use crate::report::{ClassCount, Report};
  use image::RgbImage;
  use url::Url;

  fn inference(detections: Vec<Detection>) -> Inference {
    Inference {
      detections,
      counts: ClassCount::default(),
      report: Report::default(),
      overlay: RgbImage::from_pixel(2, 2, image::Rgb([255, 0, 0])),
    }
  }

  fn saved_files(root: &Path) -> Vec<PathBuf> {
    let mut stack = vec![root.to_path_buf()];
    let mut files = Vec::new();
    while let Some(dir) = stack.pop() {
      for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else {
          files.push(path);
        }
      }
    }
    files.sort();
    files
  }

  #[test]
  fn empty_frames_are_skipped_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    let frame = Frame::still(RgbImage::new(2, 2));

    let output = DirectoryRecordOutput::new(dir.path(), RecordKind::Draw);
    output.render_result(&frame, &inference(Vec::new())).unwrap();
    assert!(saved_files(dir.path()).is_empty());

    let output = output.always(true);
    output.render_result(&frame, &inference(Vec::new())).unwrap();
    let files = saved_files(dir.path());
    assert_eq!(files.len(), 2);
    assert_eq!(files[0].extension().unwrap(), "json");
    assert_eq!(files[1].extension().unwrap(), "png");
  }

  #[test]
  fn record_mode_saves_original_frame() {
    let dir = tempfile::tempdir().unwrap();
    let url = Url::parse(&format!("folder://{}?record", dir.path().display())).unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();

    let frame = Frame::still(RgbImage::from_pixel(2, 2, image::Rgb([0, 0, 255])));
    let detection = Detection::new(0, "healthy", 0.9, [0.0, 0.0, 1.0, 1.0]);
    output.render_result(&frame, &inference(vec![detection])).unwrap();

    let png = saved_files(dir.path())
      .into_iter()
      .find(|p| p.extension().is_some_and(|e| e == "png"))
      .unwrap();
    assert!(png.file_name().unwrap().to_string_lossy().ends_with("-0001.png"));
    assert_eq!(image::open(&png).unwrap().to_rgb8(), frame.image);
  }

  #[test]
  fn paths_are_grouped_by_date() {
    let dir = tempfile::tempdir().unwrap();
    let output = DirectoryRecordOutput::new(dir.path(), RecordKind::Draw);
    let now = DateTime::parse_from_rfc3339("2026-03-04T05:06:07Z")
      .unwrap()
      .with_timezone(&Utc);
    let path = output.frame_path(now).unwrap();
    assert_eq!(path, dir.path().join("2026/03/04/05-06-07-0001.png"));
  }
}
