// 该文件是 Shoujian （兽鉴） 项目的一部分。
// src/model/yolo_rknn.rs - RKNPU 上的 YOLO 检测模型
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

use std::path::{Path, PathBuf};

use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use tracing::{debug, error, info};

use crate::{
  confidence::Confidence,
  frame::Frame,
  model::{
    DetectItem, DetectResult, InferenceError, Model, ModelLoadError, NMS_IOU_THRESHOLD,
    letterbox::Letterbox, nms, sigmoid,
  },
};

const YOLO_NUM_INPUTS: u32 = 1;
const YOLO_NUM_OUTPUTS: u32 = 6;
const YOLO_INPUT_W: u32 = 640;
const YOLO_INPUT_H: u32 = 640;
const YOLO_HEAD_SIZES: [(usize, usize); 3] = [(80, 80), (40, 40), (20, 20)];
const YOLO_STRIDES: [f32; 3] = [8.0, 16.0, 32.0];

/// 三个检测头、每头一对（回归，分类）输出的 RKNN 模型
pub struct YoloRknn {
  context: Context,
  num_classes: usize,
}

pub struct YoloRknnBuilder {
  model_path: PathBuf,
  num_classes: usize,
  flags: InitFlags,
}

impl YoloRknnBuilder {
  pub fn new(model_path: &Path, num_classes: usize) -> Self {
    Self {
      model_path: model_path.to_path_buf(),
      num_classes,
      flags: InitFlags::default(),
    }
  }

  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn build(self) -> Result<YoloRknn, ModelLoadError> {
    let invalid = |msg: String| {
      error!("{}", msg);
      ModelLoadError::Invalid(msg)
    };

    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, self.flags)
      .map_err(|e| invalid(format!("无法创建 RKNN 上下文: {}", e)))?;

    let num_inputs = context
      .num_inputs()
      .map_err(|e| invalid(format!("无法获取输入数量: {}", e)))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| invalid(format!("无法获取输出数量: {}", e)))?;

    if num_inputs != YOLO_NUM_INPUTS {
      return Err(invalid(format!(
        "预期模型输入数量为 {}, 实际为 {}",
        YOLO_NUM_INPUTS, num_inputs
      )));
    }
    if num_outputs != YOLO_NUM_OUTPUTS {
      return Err(invalid(format!(
        "预期模型输出数量为 {}, 实际为 {}",
        YOLO_NUM_OUTPUTS, num_outputs
      )));
    }
    if self.num_classes == 0 {
      return Err(invalid("类别数为 0，请检查标签文件".to_string()));
    }

    Ok(YoloRknn {
      context,
      num_classes: self.num_classes,
    })
  }
}

/// 按张量长度区分回归与分类输出，RKNN 的输出顺序并不固定
fn match_reg_cls<'a>(
  tensor1: &'a [f32],
  tensor2: &'a [f32],
  reg_expected: usize,
  cls_expected: usize,
) -> Option<(&'a [f32], &'a [f32])> {
  if tensor1.len() == reg_expected && tensor2.len() == cls_expected {
    Some((tensor1, tensor2))
  } else if tensor1.len() == cls_expected && tensor2.len() == reg_expected {
    Some((tensor2, tensor1))
  } else {
    None
  }
}

/// 解码单个检测头，坐标为模型输入像素
fn decode_head(
  reg: &[f32],
  cls: &[f32],
  (map_h, map_w): (usize, usize),
  stride: f32,
  num_classes: usize,
  letterbox: &Letterbox,
  items: &mut Vec<DetectItem>,
) {
  let spatial = map_h * map_w;
  for h in 0..map_h {
    for w in 0..map_w {
      let idx = h * map_w + w;

      let (class_id, max_logit) = (0..num_classes)
        .map(|c| (c, cls[c * spatial + idx]))
        .fold((0usize, f32::MIN), |best, (c, l)| if l > best.1 { (c, l) } else { best });
      let score = sigmoid(max_logit);
      if score < Confidence::MIN {
        continue;
      }

      let grid_x = w as f32 + 0.5;
      let grid_y = h as f32 + 0.5;
      let x_min = ((grid_x - reg[idx]) * stride).clamp(0.0, YOLO_INPUT_W as f32);
      let y_min = ((grid_y - reg[spatial + idx]) * stride).clamp(0.0, YOLO_INPUT_H as f32);
      let x_max = ((grid_x + reg[2 * spatial + idx]) * stride).clamp(0.0, YOLO_INPUT_W as f32);
      let y_max = ((grid_y + reg[3 * spatial + idx]) * stride).clamp(0.0, YOLO_INPUT_H as f32);

      let bbox = letterbox.to_normalized(x_min, y_min, x_max, y_max);
      if bbox[2] > bbox[0] && bbox[3] > bbox[1] {
        items.push(DetectItem {
          class_id: class_id as u32,
          score,
          bbox,
        });
      }
    }
  }
}

impl Model for YoloRknn {
  type Input = Frame;
  type Output = DetectResult;
  type Error = InferenceError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let (canvas, letterbox) = Letterbox::fit(&input.image, YOLO_INPUT_W, YOLO_INPUT_H);

    debug!("设置模型输入");
    self
      .context
      .set_input(0, canvas.as_raw(), TensorFormat::NHWC, TensorType::UInt8)?;

    debug!("执行模型推理");
    self.context.run()?;

    let output = self.context.get_outputs()?;
    let mut items = Vec::new();

    for (head_idx, (&head_size, stride)) in YOLO_HEAD_SIZES.iter().zip(YOLO_STRIDES).enumerate() {
      let spatial = head_size.0 * head_size.1;
      let reg_expected = 4 * spatial;
      let cls_expected = self.num_classes * spatial;

      let tensor1 = output.get_f32(head_idx * 2)?;
      let tensor2 = output.get_f32(head_idx * 2 + 1)?;

      let Some((reg, cls)) = match_reg_cls(tensor1, tensor2, reg_expected, cls_expected) else {
        return Err(InferenceError::OutputShape(format!(
          "检测头 {}: 张量大小 {} / {}，期望回归 {}，分类 {}",
          head_idx,
          tensor1.len(),
          tensor2.len(),
          reg_expected,
          cls_expected
        )));
      };

      decode_head(
        reg,
        cls,
        head_size,
        stride,
        self.num_classes,
        &letterbox,
        &mut items,
      );
    }

    let items = nms(items, NMS_IOU_THRESHOLD);
    debug!("检测到 {} 个物体", items.len());

    Ok(DetectResult {
      items: items.into_boxed_slice(),
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reg_and_cls_are_told_apart_by_length() {
    let reg = [0.0f32; 8];
    let cls = [0.0f32; 6];
    assert!(match_reg_cls(&reg, &cls, 8, 6).is_some());
    let (r, c) = match_reg_cls(&cls, &reg, 8, 6).unwrap();
    assert_eq!((r.len(), c.len()), (8, 6));
    assert!(match_reg_cls(&reg, &reg, 8, 6).is_none());
  }
}
