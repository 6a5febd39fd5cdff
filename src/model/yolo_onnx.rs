// 该文件是 Shoujian （兽鉴） 项目的一部分。
// src/model/yolo_onnx.rs - 基于 tract 的 ONNX YOLO 检测模型
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

use std::path::Path;

use tracing::{debug, info, warn};
use tract_onnx::prelude::*;

use crate::{
  confidence::Confidence,
  frame::{Frame, nhwc_to_nchw_f32},
  model::{
    DetectItem, DetectResult, InferenceError, Labels, Model, ModelLoadError, NMS_IOU_THRESHOLD,
    letterbox::Letterbox, nms,
  },
};

const YOLO_INPUT_W: u32 = 640;
const YOLO_INPUT_H: u32 = 640;
/// 每个预测前 4 个通道为 cx, cy, w, h
const YOLO_BOX_CHANNELS: usize = 4;

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// Ultralytics 导出的 ONNX 检测模型，输出形状 `[1, 4 + nc, N]`
pub struct YoloOnnx {
  plan: Plan,
  input_w: u32,
  input_h: u32,
  num_classes: usize,
}

impl YoloOnnx {
  pub fn load(path: &Path, labels: &Labels) -> Result<Self, ModelLoadError> {
    let invalid = |stage: &str, e: TractError| {
      ModelLoadError::Invalid(format!("{}: {} ({})", stage, path.display(), e))
    };

    info!("创建 tract 推理计划: {}", path.display());
    let plan = tract_onnx::onnx()
      .model_for_path(path)
      .map_err(|e| invalid("无法解析 ONNX 模型", e))?
      .with_input_fact(
        0,
        InferenceFact::dt_shape(
          f32::datum_type(),
          tvec!(1, 3, YOLO_INPUT_H as usize, YOLO_INPUT_W as usize),
        ),
      )
      .map_err(|e| invalid("无法设置模型输入", e))?
      .into_optimized()
      .map_err(|e| invalid("无法优化模型", e))?
      .into_runnable()
      .map_err(|e| invalid("无法构建推理计划", e))?;

    match plan.model().output_fact(0) {
      Ok(fact) => match fact.shape.as_concrete() {
        Some(shape) => {
          debug!("模型输出形状: {:?}", shape);
          if let Some(classes) = classes_from_shape(shape) {
            labels.check_classes(classes)?;
          }
        }
        None => warn!("模型输出形状不确定，跳过类别数校验"),
      },
      Err(e) => return Err(invalid("无法获取模型输出", e)),
    }

    Ok(Self {
      plan,
      input_w: YOLO_INPUT_W,
      input_h: YOLO_INPUT_H,
      num_classes: labels.len(),
    })
  }
}

/// `[1, 4 + nc, N]` 或转置的 `[1, N, 4 + nc]`，预测数总是多于通道数
fn classes_from_shape(shape: &[usize]) -> Option<usize> {
  match shape {
    [1, a, b] => Some((*a).min(*b).checked_sub(YOLO_BOX_CHANNELS)?),
    _ => None,
  }
}

/// 解码 YOLO 输出张量，返回不低于 `score_floor` 的候选框（未做 NMS）
///
/// 通道数为 `4 + num_classes`，据此判断输出是 `[1, C, N]` 还是 `[1, N, C]`。
pub(crate) fn decode_predictions(
  data: &[f32],
  shape: &[usize],
  num_classes: usize,
  score_floor: f32,
  letterbox: &Letterbox,
) -> Result<Vec<DetectItem>, InferenceError> {
  let channels = YOLO_BOX_CHANNELS + num_classes;
  let (count, channel_major) = match shape {
    [1, c, n] if *c == channels => (*n, true),
    [1, n, c] if *c == channels => (*n, false),
    _ => {
      return Err(InferenceError::OutputShape(format!(
        "期望输出 [1, {}, N] 或 [1, N, {}]，实际为 {:?}",
        channels, channels, shape
      )));
    }
  };
  if num_classes == 0 || data.len() < channels * count {
    return Err(InferenceError::OutputShape(format!(
      "输出 {:?} 与数据长度 {} 不符",
      shape,
      data.len()
    )));
  }

  let at = |c: usize, i: usize| {
    if channel_major {
      data[c * count + i]
    } else {
      data[i * channels + c]
    }
  };

  let mut items = Vec::new();
  for i in 0..count {
    let (class_id, score) = (YOLO_BOX_CHANNELS..channels)
      .map(|c| (c - YOLO_BOX_CHANNELS, at(c, i)))
      .fold((0usize, f32::NEG_INFINITY), |best, (c, s)| if s > best.1 { (c, s) } else { best });

    if !score.is_finite() || score < score_floor {
      continue;
    }

    let (cx, cy, w, h) = (at(0, i), at(1, i), at(2, i), at(3, i));
    if w <= 0.0 || h <= 0.0 {
      continue;
    }

    let bbox = letterbox.to_normalized(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0);
    if bbox[2] <= bbox[0] || bbox[3] <= bbox[1] {
      continue;
    }

    items.push(DetectItem {
      class_id: class_id as u32,
      score,
      bbox,
    });
  }
  Ok(items)
}

impl Model for YoloOnnx {
  type Input = Frame;
  type Output = DetectResult;
  type Error = InferenceError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let (canvas, letterbox) = Letterbox::fit(&input.image, self.input_w, self.input_h);
    let (w, h) = (self.input_w as usize, self.input_h as usize);

    let tensor = tract_ndarray::Array4::from_shape_vec(
      (1, 3, h, w),
      nhwc_to_nchw_f32(canvas.as_raw(), w, h),
    )
    .map_err(|e| InferenceError::Runtime(e.to_string()))?
    .into_tensor();

    debug!("执行模型推理");
    let outputs = self
      .plan
      .run(tvec!(tensor.into_tvalue()))
      .map_err(|e| InferenceError::Runtime(e.to_string()))?;

    let output = outputs
      .first()
      .ok_or_else(|| InferenceError::OutputShape("模型没有输出".to_string()))?;
    let view = output
      .to_array_view::<f32>()
      .map_err(|e| InferenceError::OutputShape(e.to_string()))?;
    let shape = view.shape().to_vec();
    let data: Vec<f32> = view.iter().copied().collect();

    let candidates = decode_predictions(&data, &shape, self.num_classes, Confidence::MIN, &letterbox)?;
    let items = nms(candidates, NMS_IOU_THRESHOLD);
    debug!("检测到 {} 个物体", items.len());

    Ok(DetectResult {
      items: items.into_boxed_slice(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  fn identity_letterbox() -> Letterbox {
    Letterbox::fit(&RgbImage::new(100, 100), 100, 100).1
  }

  #[test]
  fn output_shape_yields_class_count() {
    assert_eq!(classes_from_shape(&[1, 84, 8400]), Some(80));
    assert_eq!(classes_from_shape(&[1, 8400, 7]), Some(3));
    assert_eq!(classes_from_shape(&[8400, 84]), None);
  }

  #[test]
  fn decodes_channel_major_output() {
    // 2 个类别，3 个预测：通道 [cx, cy, w, h, c0, c1]
    #[rustfmt::skip]
    let data = vec![
      50.0, 10.0, 80.0,  // cx
      50.0, 10.0, 80.0,  // cy
      20.0, 4.0,  10.0,  // w
      40.0, 4.0,  10.0,  // h
      0.9,  0.1,  0.2,   // c0
      0.1,  0.2,  0.6,   // c1
    ];
    let items = decode_predictions(&data, &[1, 6, 3], 2, 0.25, &identity_letterbox()).unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].class_id, 0);
    assert_eq!(items[0].score, 0.9);
    assert_eq!(items[0].bbox, [0.4, 0.3, 0.6, 0.7]);
    assert_eq!(items[1].class_id, 1);
    assert_eq!(items[1].score, 0.6);
  }

  #[test]
  fn decodes_prediction_major_output() {
    #[rustfmt::skip]
    let data = vec![
      50.0, 50.0, 20.0, 40.0, 0.1, 0.8,
      10.0, 10.0, 4.0,  4.0,  0.1, 0.1,
    ];
    let items = decode_predictions(&data, &[1, 2, 6], 2, 0.25, &identity_letterbox()).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_id, 1);
  }

  #[test]
  fn rejects_malformed_shape() {
    assert!(decode_predictions(&[0.0; 4], &[4], 2, 0.25, &identity_letterbox()).is_err());
    assert!(decode_predictions(&[0.0; 8], &[1, 4, 2], 2, 0.25, &identity_letterbox()).is_err());
  }
}
