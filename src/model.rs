// 该文件是 Shoujian （兽鉴） 项目的一部分。
// src/model.rs - 模型
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
  borrow::Cow,
  path::{Path, PathBuf},
};

use image::RgbImage;
use serde::Serialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  confidence::Confidence,
  frame::Frame,
  output::draw::Draw,
  report::{ClassCount, Report, classify},
};

#[cfg(not(any(feature = "model_tract", feature = "model_rknpu")))]
compile_error!("至少需要启用一个推理后端特性: model_tract 或 model_rknpu");

pub mod letterbox;

#[cfg(feature = "model_tract")]
mod yolo_onnx;
#[cfg(feature = "model_tract")]
pub use self::yolo_onnx::YoloOnnx;

#[cfg(feature = "model_rknpu")]
mod yolo_rknn;
#[cfg(feature = "model_rknpu")]
pub use self::yolo_rknn::{YoloRknn, YoloRknnBuilder};

/// NMS IoU 阈值
pub const NMS_IOU_THRESHOLD: f32 = 0.45;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

impl<M: Model> Model for &M {
  type Input = M::Input;
  type Output = M::Output;
  type Error = M::Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (**self).infer(input)
  }
}

#[derive(Error, Debug)]
pub enum ModelLoadError {
  #[error("模型文件不存在: {}", .0.display())]
  NotFound(PathBuf),
  #[error("不支持的模型格式: {}", .0.display())]
  UnsupportedFormat(PathBuf),
  #[error("模型读取错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("模型无效: {0}")]
  Invalid(String),
  #[error("标签文件读取错误 {}: {source}", path.display())]
  Labels {
    path: PathBuf,
    source: std::io::Error,
  },
  #[error("标签数量 {labels} 与模型类别数 {classes} 不一致")]
  LabelMismatch { labels: usize, classes: usize },
}

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("输入帧为空")]
  EmptyFrame,
  #[error("推理运行时错误: {0}")]
  Runtime(String),
  #[error("模型输出形状不符: {0}")]
  OutputShape(String),
  #[cfg(feature = "model_rknpu")]
  #[error("RKNN 错误: {0}")]
  Rknn(#[from] rknpu::Error),
}

/// 后端输出的单个检测，bbox 为相对原图的归一化坐标 [x_min, y_min, x_max, y_max]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4],
}

#[derive(Debug, Clone, Default)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}

/// 带类别名的检测结果，bbox 为原图像素坐标 (x1, y1, x2, y2)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
  pub class_id: u32,
  pub class_name: String,
  pub confidence: f32,
  pub bbox: [f32; 4],
}

impl Detection {
  pub fn new(class_id: u32, class_name: impl Into<String>, confidence: f32, bbox: [f32; 4]) -> Self {
    Self {
      class_id,
      class_name: class_name.into(),
      confidence,
      bbox,
    }
  }

  /// 原始框数据 [x1, y1, x2, y2, confidence, class_id]
  pub fn box_data(&self) -> [f32; 6] {
    [
      self.bbox[0],
      self.bbox[1],
      self.bbox[2],
      self.bbox[3],
      self.confidence,
      self.class_id as f32,
    ]
  }
}

/// 模型类别名表，下标即类别编号
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Labels {
  names: Vec<String>,
}

impl Labels {
  pub fn from_names<I, S>(names: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    Self {
      names: names.into_iter().map(Into::into).collect(),
    }
  }

  /// 每行一个类别名，忽略空行与 `#` 注释
  pub fn parse(text: &str) -> Self {
    Self::from_names(
      text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#')),
    )
  }

  pub fn from_file(path: &Path) -> Result<Self, ModelLoadError> {
    let text = std::fs::read_to_string(path).map_err(|source| ModelLoadError::Labels {
      path: path.to_path_buf(),
      source,
    })?;
    let labels = Self::parse(&text);
    debug!("从 {} 读取 {} 个类别", path.display(), labels.len());
    Ok(labels)
  }

  pub fn names(&self) -> &[String] {
    &self.names
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn name(&self, class_id: u32) -> Cow<'_, str> {
    match self.names.get(class_id as usize) {
      Some(name) => Cow::Borrowed(name),
      None => Cow::Owned(format!("class-{}", class_id)),
    }
  }

  /// 校验模型类别数与标签数一致
  pub fn check_classes(&self, classes: usize) -> Result<(), ModelLoadError> {
    if self.len() != classes {
      return Err(ModelLoadError::LabelMismatch {
        labels: self.len(),
        classes,
      });
    }
    Ok(())
  }
}

/// 按模型文件扩展名选择推理后端
pub enum DetectionModel {
  #[cfg(feature = "model_tract")]
  Onnx(YoloOnnx),
  #[cfg(feature = "model_rknpu")]
  Rknn(YoloRknn),
}

impl DetectionModel {
  pub fn load(path: &Path, labels: &Labels) -> Result<Self, ModelLoadError> {
    if !path.exists() {
      return Err(ModelLoadError::NotFound(path.to_path_buf()));
    }

    let extension = path
      .extension()
      .and_then(|ext| ext.to_str())
      .map(str::to_ascii_lowercase);

    match extension.as_deref() {
      #[cfg(feature = "model_tract")]
      Some("onnx") => Ok(DetectionModel::Onnx(YoloOnnx::load(path, labels)?)),
      #[cfg(feature = "model_rknpu")]
      Some("rknn") => Ok(DetectionModel::Rknn(
        YoloRknnBuilder::new(path, labels.len()).build()?,
      )),
      _ => Err(ModelLoadError::UnsupportedFormat(path.to_path_buf())),
    }
  }
}

impl Model for DetectionModel {
  type Input = Frame;
  type Output = DetectResult;
  type Error = InferenceError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    match self {
      #[cfg(feature = "model_tract")]
      DetectionModel::Onnx(model) => model.infer(input),
      #[cfg(feature = "model_rknpu")]
      DetectionModel::Rknn(model) => model.infer(input),
    }
  }
}

/// 单帧推理结果：检测、类别计数、报告与叠加图
#[derive(Debug, Clone)]
pub struct Inference {
  pub detections: Vec<Detection>,
  pub counts: ClassCount,
  pub report: Report,
  pub overlay: RgbImage,
}

impl Inference {
  pub fn is_empty(&self) -> bool {
    self.detections.is_empty()
  }

  /// 原始检测数据，供界面展开查看
  pub fn raw_dump(&self) -> serde_json::Value {
    json!({
      "boxes": self.detections.iter().map(Detection::box_data).collect::<Vec<_>>(),
      "detections": self.detections,
    })
  }

  /// 帧记录：帧信息、报告行与原始检测
  pub fn record(&self, frame: &Frame) -> serde_json::Value {
    json!({
      "frame": frame.index,
      "timestamp_ms": frame.timestamp_ms,
      "width": frame.width(),
      "height": frame.height(),
      "report": self.report.lines().map(|(_, line)| line).collect::<Vec<_>>(),
      "findings": self.report.findings,
      "raw": self.raw_dump(),
    })
  }
}

/// 推理调用器
///
/// 包装一个原始检测模型，按置信度过滤、映射类别名、生成报告并绘制叠加图。
pub struct Detector<M> {
  model: M,
  labels: Labels,
  confidence: Confidence,
  draw: Draw<'static>,
}

impl<M> Detector<M> {
  pub fn new(model: M, labels: Labels) -> Self {
    Self {
      model,
      labels,
      confidence: Confidence::default(),
      draw: Draw::default(),
    }
  }

  pub fn with_confidence(mut self, confidence: Confidence) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn set_confidence(&mut self, confidence: Confidence) {
    self.confidence = confidence;
  }

  pub fn confidence(&self) -> Confidence {
    self.confidence
  }

  pub fn labels(&self) -> &Labels {
    &self.labels
  }
}

impl Detector<DetectionModel> {
  /// 读取标签并加载模型
  pub fn load(model_path: &Path, labels_path: &Path) -> Result<Self, ModelLoadError> {
    info!("加载模型文件: {}", model_path.display());
    let labels = Labels::from_file(labels_path)?;
    let model = DetectionModel::load(model_path, &labels)?;
    info!("模型加载完成，共 {} 个类别", labels.len());
    Ok(Self::new(model, labels))
  }
}

impl<M> Model for Detector<M>
where
  M: Model<Input = Frame, Output = DetectResult, Error = InferenceError>,
{
  type Input = Frame;
  type Output = Inference;
  type Error = InferenceError;

  fn infer(&self, frame: &Self::Input) -> Result<Self::Output, Self::Error> {
    if frame.width() == 0 || frame.height() == 0 {
      return Err(InferenceError::EmptyFrame);
    }

    let raw = self.model.infer(frame)?;
    let (w, h) = (frame.width() as f32, frame.height() as f32);

    let detections: Vec<Detection> = raw
      .items
      .iter()
      .filter(|item| self.confidence.accepts(item.score))
      .map(|item| {
        Detection::new(
          item.class_id,
          self.labels.name(item.class_id),
          item.score,
          [
            item.bbox[0] * w,
            item.bbox[1] * h,
            item.bbox[2] * w,
            item.bbox[3] * h,
          ],
        )
      })
      .collect();
    debug!(
      "阈值 {} 下保留 {}/{} 个检测",
      self.confidence,
      detections.len(),
      raw.len()
    );

    let counts = ClassCount::from_detections(&self.labels, &detections);
    let report = classify(&counts);

    let mut overlay = frame.image.clone();
    self.draw.draw_detections_on_image(&mut overlay, &detections);

    Ok(Inference {
      detections,
      counts,
      report,
      overlay,
    })
  }
}

/// 非极大值抑制（按类别）
///
/// 在最低阈值下先做 NMS，再按用户阈值过滤，与先过滤后 NMS 的结果一致。
pub fn nms(mut items: Vec<DetectItem>, iou_threshold: f32) -> Vec<DetectItem> {
  items.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut result: Vec<DetectItem> = Vec::with_capacity(items.len());
  for item in items {
    let suppressed = result
      .iter()
      .any(|kept| kept.class_id == item.class_id && iou(kept, &item) >= iou_threshold);
    if !suppressed {
      result.push(item);
    }
  }
  result
}

/// 计算两个边界框的 IoU
pub fn iou(a: &DetectItem, b: &DetectItem) -> f32 {
  let x1 = a.bbox[0].max(b.bbox[0]);
  let y1 = a.bbox[1].max(b.bbox[1]);
  let x2 = a.bbox[2].min(b.bbox[2]);
  let y2 = a.bbox[3].min(b.bbox[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a.bbox[2] - a.bbox[0]).max(0.0) * (a.bbox[3] - a.bbox[1]).max(0.0);
  let area_b = (b.bbox[2] - b.bbox[0]).max(0.0) * (b.bbox[3] - b.bbox[1]).max(0.0);
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

#[cfg(feature = "model_rknpu")]
pub(crate) fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}
