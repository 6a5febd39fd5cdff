// 该文件是 Shoujian （兽鉴） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::Parser;
use url::Url;

use shoujian::{config::DetectionTask, confidence::Confidence, input::SourceKind};

/// 猫狗品种、皮肤病与鸟类检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 检测任务: breed, skin-disease, birds（也接受界面上的完整名称）
  #[arg(long, short, default_value = "breed", value_name = "TASK")]
  pub task: DetectionTask,

  /// 置信度：25-100 的整数百分比，或 0.25-1.0 的小数（1 视为 1.0）
  #[arg(long, short, default_value = "40", value_name = "CONFIDENCE")]
  pub confidence: Confidence,

  /// 输入源类型: image, video, webcam, rtsp, youtube
  #[arg(long, short, default_value = "image", value_name = "SOURCE")]
  pub source: SourceKind,

  /// 图像/视频路径、摄像头编号或设备、RTSP/YouTube 地址；
  /// 也可以直接给出 image://、gst://、v4l2://、youtube:// URL。
  /// 图像模式下为 `-` 时从标准输入读取，省略时显示默认图像。
  #[arg(value_name = "INPUT")]
  pub input: Option<String>,

  /// 输出，可重复: console://[?dump]、image:///out.png[?dump]、folder:///dir[?always][&record]
  #[arg(long, short, default_value = "console://", value_name = "OUTPUT")]
  pub output: Vec<Url>,

  /// 模型权重目录
  #[arg(long, env = "SHOUJIAN_WEIGHTS", default_value = "weights", value_name = "DIR")]
  pub weights_dir: PathBuf,

  /// 标签文件目录
  #[arg(long, env = "SHOUJIAN_LABELS", default_value = "labels", value_name = "DIR")]
  pub labels_dir: PathBuf,

  /// 模型文件扩展名，决定推理后端（onnx 或 rknn）
  #[arg(long, default_value = "onnx", value_name = "EXT")]
  pub model_extension: String,

  /// 默认图像
  #[arg(long, default_value = "images/default.jpg", value_name = "FILE")]
  pub default_image: PathBuf,

  /// 默认检测结果图像
  #[arg(long, default_value = "images/default_detected.jpg", value_name = "FILE")]
  pub default_detected_image: PathBuf,

  /// 最大处理帧数（仅对视频/摄像头有效）
  #[arg(long, value_name = "COUNT")]
  pub frame_number: Option<usize>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_match_dashboard() {
    let args = Args::try_parse_from(["shoujian"]).unwrap();
    assert_eq!(args.task, DetectionTask::CatDogBreed);
    assert_eq!(args.confidence, Confidence::default());
    assert_eq!(args.source, SourceKind::Image);
    assert!(args.input.is_none());
    assert_eq!(args.output.len(), 1);
  }

  #[test]
  fn slider_values_outside_range_are_rejected() {
    assert!(Args::try_parse_from(["shoujian", "--confidence", "24"]).is_err());
    assert!(Args::try_parse_from(["shoujian", "--confidence", "1.01"]).is_err());
    let args = Args::try_parse_from(["shoujian", "-c", "75", "-s", "video", "cat.mp4"]).unwrap();
    assert_eq!(args.confidence.value(), 0.75);
    assert_eq!(args.source, SourceKind::Video);
  }

  #[test]
  fn outputs_repeat() {
    let args = Args::try_parse_from([
      "shoujian",
      "-o",
      "console://?dump",
      "-o",
      "image:///tmp/out.png",
    ])
    .unwrap();
    assert_eq!(args.output.len(), 2);
  }
}
