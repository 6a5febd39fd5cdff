// 该文件是 Shoujian （兽鉴） 项目的一部分。
// src/config.rs - 任务与模型路径配置
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

use std::{
  fmt,
  path::{Path, PathBuf},
  str::FromStr,
};

use thiserror::Error;

pub const DEFAULT_WEIGHTS_DIR: &str = "weights";
pub const DEFAULT_LABELS_DIR: &str = "labels";
pub const DEFAULT_IMAGE: &str = "images/default.jpg";
pub const DEFAULT_DETECT_IMAGE: &str = "images/default_detected.jpg";

/// 用户可选的检测任务
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DetectionTask {
  CatDogBreed,
  SkinDisease,
  BirdSpecies,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("未知的检测任务: {0}")]
pub struct UnknownTask(pub String);

impl DetectionTask {
  pub const ALL: [DetectionTask; 3] = [
    DetectionTask::CatDogBreed,
    DetectionTask::SkinDisease,
    DetectionTask::BirdSpecies,
  ];

  pub fn display_name(self) -> &'static str {
    match self {
      DetectionTask::CatDogBreed => "Cat/Dog Breed Detection",
      DetectionTask::SkinDisease => "Cat/Dog Skin Disease Detection",
      DetectionTask::BirdSpecies => "Birds Species Detection",
    }
  }

  pub fn slug(self) -> &'static str {
    match self {
      DetectionTask::CatDogBreed => "breed",
      DetectionTask::SkinDisease => "skin-disease",
      DetectionTask::BirdSpecies => "birds",
    }
  }

  /// 权重与标签文件共用的文件名主干
  fn file_stem(self) -> &'static str {
    match self {
      DetectionTask::CatDogBreed => "breed",
      DetectionTask::SkinDisease => "skin_disease",
      DetectionTask::BirdSpecies => "birds",
    }
  }
}

impl fmt::Display for DetectionTask {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.display_name())
  }
}

impl FromStr for DetectionTask {
  type Err = UnknownTask;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    DetectionTask::ALL
      .into_iter()
      .find(|task| task.slug().eq_ignore_ascii_case(s) || task.display_name().eq_ignore_ascii_case(s))
      .ok_or_else(|| UnknownTask(s.to_string()))
  }
}

/// 路径配置
///
/// 任务到模型文件是一张显式的表，每个任务对应 `<weights>/<stem>.<ext>`。
#[derive(Debug, Clone)]
pub struct Settings {
  pub weights_dir: PathBuf,
  pub labels_dir: PathBuf,
  pub model_extension: String,
  pub default_image: PathBuf,
  pub default_detect_image: PathBuf,
}

impl Default for Settings {
  fn default() -> Self {
    Self {
      weights_dir: PathBuf::from(DEFAULT_WEIGHTS_DIR),
      labels_dir: PathBuf::from(DEFAULT_LABELS_DIR),
      model_extension: "onnx".to_string(),
      default_image: PathBuf::from(DEFAULT_IMAGE),
      default_detect_image: PathBuf::from(DEFAULT_DETECT_IMAGE),
    }
  }
}

impl Settings {
  pub fn with_weights_dir(mut self, dir: impl AsRef<Path>) -> Self {
    self.weights_dir = dir.as_ref().to_path_buf();
    self
  }

  pub fn with_labels_dir(mut self, dir: impl AsRef<Path>) -> Self {
    self.labels_dir = dir.as_ref().to_path_buf();
    self
  }

  pub fn with_model_extension(mut self, extension: &str) -> Self {
    self.model_extension = extension.trim_start_matches('.').to_string();
    self
  }

  pub fn model_path(&self, task: DetectionTask) -> PathBuf {
    self
      .weights_dir
      .join(format!("{}.{}", task.file_stem(), self.model_extension))
  }

  pub fn labels_path(&self, task: DetectionTask) -> PathBuf {
    self.labels_dir.join(format!("{}.txt", task.file_stem()))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn every_task_resolves_to_its_own_model() {
    let settings = Settings::default();
    assert_eq!(
      settings.model_path(DetectionTask::CatDogBreed),
      PathBuf::from("weights/breed.onnx")
    );
    assert_eq!(
      settings.model_path(DetectionTask::SkinDisease),
      PathBuf::from("weights/skin_disease.onnx")
    );
    assert_eq!(
      settings.model_path(DetectionTask::BirdSpecies),
      PathBuf::from("weights/birds.onnx")
    );
  }

  #[test]
  fn weights_dir_and_extension_are_configurable() {
    let settings = Settings::default()
      .with_weights_dir("/opt/models")
      .with_model_extension(".rknn");
    assert_eq!(
      settings.model_path(DetectionTask::BirdSpecies),
      PathBuf::from("/opt/models/birds.rknn")
    );
    assert_eq!(
      settings.labels_path(DetectionTask::SkinDisease),
      PathBuf::from("labels/skin_disease.txt")
    );
  }

  #[test]
  fn parses_display_names_and_slugs() {
    assert_eq!(
      "Cat/Dog Breed Detection".parse::<DetectionTask>(),
      Ok(DetectionTask::CatDogBreed)
    );
    assert_eq!("birds".parse::<DetectionTask>(), Ok(DetectionTask::BirdSpecies));
    assert_eq!(
      "Skin-Disease".parse::<DetectionTask>(),
      Ok(DetectionTask::SkinDisease)
    );
    assert!("Segmentation".parse::<DetectionTask>().is_err());
  }
}
