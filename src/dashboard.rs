// 该文件是 Shoujian （兽鉴） 项目的一部分。
// src/dashboard.rs - 检测面板流程
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

//! 一次面板操作：选择任务、置信度与输入源，加载模型并把每帧结果交给输出。
//!
//! 用户可见的失败（模型加载、图像打开）转换为 [`Notice`] 返回，不作为错误向上传播。

use std::fmt;
use std::io::Read;

use image::ImageReader;
use tracing::{error, info};

use crate::{
  FromUrl,
  config::{DetectionTask, Settings},
  confidence::Confidence,
  frame::Frame,
  input::{InputError, InputWrapper, SourceKind},
  model::{DetectResult, DetectionModel, Detector, Inference, InferenceError, Model},
  output::Render,
  report::{ClassCount, Report, Tone},
  task::{ContinuousTask, OneShotTask, Task},
};

pub const TITLE: &str = "Animal and Breed Detection";
pub const IMAGE_OPEN_ERROR: &str = "Error occurred while opening the image.";

/// 从标准输入读取上传图像时使用的输入参数
pub const STDIN_ARG: &str = "-";

/// 摄像头模式未指定设备时使用的设备编号
pub const DEFAULT_WEBCAM: &str = "0";

/// 面板上显示的一条提示
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
  Info(String),
  Success(String),
  Error(String),
}

impl Notice {
  pub fn is_error(&self) -> bool {
    matches!(self, Notice::Error(_))
  }

  pub fn message(&self) -> &str {
    match self {
      Notice::Info(m) | Notice::Success(m) | Notice::Error(m) => m,
    }
  }
}

impl From<(Tone, String)> for Notice {
  fn from((tone, line): (Tone, String)) -> Self {
    match tone {
      Tone::Info => Notice::Info(line),
      Tone::Success => Notice::Success(line),
    }
  }
}

impl fmt::Display for Notice {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Notice::Info(m) => write!(f, "[info]  {}", m),
      Notice::Success(m) => write!(f, "[ok]    {}", m),
      Notice::Error(m) => write!(f, "[error] {}", m),
    }
  }
}

pub fn model_load_notice(path: &std::path::Path) -> Notice {
  Notice::Error(format!(
    "Unable to load model. Check the specified path: {}",
    path.display()
  ))
}

/// 一次运行的参数
#[derive(Debug, Clone)]
pub struct Request {
  pub task: DetectionTask,
  pub confidence: Confidence,
  pub source: SourceKind,
  /// 路径、设备或地址；图像模式下为空时显示默认图像
  pub input: Option<String>,
  pub frame_limit: Option<usize>,
  pub handle_interrupt: bool,
}

impl Request {
  pub fn new(task: DetectionTask, source: SourceKind) -> Self {
    Self {
      task,
      confidence: Confidence::default(),
      source,
      input: None,
      frame_limit: None,
      handle_interrupt: false,
    }
  }

  pub fn with_confidence(mut self, confidence: Confidence) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn with_input(mut self, input: impl Into<String>) -> Self {
    self.input = Some(input.into());
    self
  }

  pub fn with_frame_limit(mut self, frame_limit: Option<usize>) -> Self {
    self.frame_limit = frame_limit;
    self
  }

  pub fn with_interrupt(mut self, handle_interrupt: bool) -> Self {
    self.handle_interrupt = handle_interrupt;
    self
  }

  /// 实际使用的输入参数，摄像头模式缺省为 0 号设备
  pub fn input_arg(&self) -> Option<&str> {
    match (self.input.as_deref(), self.source) {
      (Some(arg), _) => Some(arg),
      (None, SourceKind::Webcam) => Some(DEFAULT_WEBCAM),
      (None, _) => None,
    }
  }
}

pub struct Dashboard {
  settings: Settings,
}

impl Dashboard {
  pub fn new(settings: Settings) -> Self {
    Self { settings }
  }

  pub fn settings(&self) -> &Settings {
    &self.settings
  }

  /// 按任务加载模型与标签，失败时返回提示
  pub fn load_detector(
    &self,
    task: DetectionTask,
    confidence: Confidence,
  ) -> Result<Detector<DetectionModel>, Notice> {
    let model_path = self.settings.model_path(task);
    let labels_path = self.settings.labels_path(task);
    info!("任务: {}，置信度: {}", task, confidence);

    Detector::load(&model_path, &labels_path)
      .map(|detector| detector.with_confidence(confidence))
      .map_err(|e| {
        error!("模型加载失败: {}", e);
        model_load_notice(&model_path)
      })
  }

  /// 按输入源打开帧迭代器，失败时返回提示
  pub fn open_input(&self, source: SourceKind, arg: &str) -> Result<InputWrapper, Notice> {
    let opened = if source == SourceKind::Image && arg == STDIN_ARG {
      read_stdin_image()
    } else {
      source
        .to_url(arg)
        .and_then(|url| InputWrapper::from_url(&url))
    };

    opened.map_err(|e| {
      error!("无法打开输入 {}: {}", arg, e);
      match source {
        SourceKind::Image => Notice::Error(IMAGE_OPEN_ERROR.to_string()),
        _ => Notice::Error(e.to_string()),
      }
    })
  }

  /// 默认图像模式：原图与预先绘制好的检测图直接交给输出
  pub fn show_defaults<O>(&self, output: O) -> Vec<Notice>
  where
    O: Render<Frame, Inference>,
    O::Error: fmt::Display,
  {
    let open = |path: &std::path::Path| {
      ImageReader::open(path)
        .map_err(image::ImageError::IoError)
        .and_then(|reader| reader.with_guessed_format().map_err(image::ImageError::IoError))
        .and_then(|reader| reader.decode())
        .map(|image| image.to_rgb8())
        .map_err(|e| {
          error!("无法打开默认图像 {}: {}", path.display(), e);
          Notice::Error(IMAGE_OPEN_ERROR.to_string())
        })
    };

    let default_image = match open(&self.settings.default_image) {
      Ok(image) => image,
      Err(notice) => return vec![notice],
    };
    let detected_image = match open(&self.settings.default_detect_image) {
      Ok(image) => image,
      Err(notice) => return vec![notice],
    };

    let frame = Frame::still(default_image);
    let inference = Inference {
      detections: Vec::new(),
      counts: ClassCount::default(),
      report: Report::default(),
      overlay: detected_image,
    };

    let mut notices = vec![
      Notice::Info(format!("Default Image: {}", self.settings.default_image.display())),
      Notice::Info(format!(
        "Detected Image: {}",
        self.settings.default_detect_image.display()
      )),
    ];
    if let Err(e) = output.render_result(&frame, &inference) {
      error!("输出默认图像失败: {}", e);
      notices.push(Notice::Error(e.to_string()));
    }
    notices
  }

  /// 完整的一次运行
  pub fn run<O>(&self, request: &Request, output: O) -> Vec<Notice>
  where
    O: Render<Frame, Inference>,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    info!("{}", TITLE);
    let detector = self.load_detector(request.task, request.confidence);
    self.run_with(request, detector, output)
  }

  /// 用已经加载（或加载失败）的检测器运行
  pub fn run_with<M, O>(
    &self,
    request: &Request,
    detector: Result<Detector<M>, Notice>,
    output: O,
  ) -> Vec<Notice>
  where
    M: Model<Input = Frame, Output = DetectResult, Error = InferenceError>,
    O: Render<Frame, Inference>,
    O::Error: std::error::Error + Send + Sync + 'static,
  {
    let mut notices = Vec::new();
    let detector = match detector {
      Ok(detector) => Some(detector),
      Err(notice) => {
        notices.push(notice);
        None
      }
    };

    let Some(arg) = request.input_arg() else {
      if request.source == SourceKind::Image {
        notices.extend(self.show_defaults(output));
      } else {
        notices.push(Notice::Error(format!(
          "No {} source given",
          request.source
        )));
      }
      return notices;
    };

    let Some(detector) = detector else {
      return notices;
    };

    let input = match self.open_input(request.source, arg) {
      Ok(input) => input,
      Err(notice) => {
        notices.push(notice);
        return notices;
      }
    };

    let finished = if request.source.is_stream() {
      let task = ContinuousTask::default().with_frame_number(request.frame_limit);
      let task = if request.handle_interrupt {
        task.with_interrupt()
      } else {
        task
      };
      task.run_task(input, &detector, output)
    } else {
      OneShotTask.run_task(input, &detector, output)
    };

    if let Err(e) = finished {
      error!("检测失败: {:#}", e);
      notices.push(Notice::Error(format!("{:#}", e)));
    }
    notices
  }
}

fn read_stdin_image() -> Result<InputWrapper, InputError> {
  let mut data = Vec::new();
  std::io::stdin().read_to_end(&mut data)?;
  #[cfg(feature = "read_image_file")]
  {
    let input = crate::input::ImageFileInput::from_bytes(&data)?;
    Ok(InputWrapper::ReadImageFile(input))
  }
  #[cfg(not(feature = "read_image_file"))]
  {
    Err(InputError::SchemeMismatch("image".to_string()))
  }
}
