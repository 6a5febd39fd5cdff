// 该文件是 Shoujian （兽鉴） 项目的一部分。
// src/output/console_report.rs - 控制台报告输出
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

use std::io::{self, Stdout, Write};
use std::sync::Mutex;

use thiserror::Error;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, has_query_flag,
  frame::Frame,
  model::Inference,
  output::Render,
  report::Tone,
};

#[derive(Error, Debug)]
pub enum ConsoleReportError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] io::Error),
  #[error("序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("输出被占用")]
  Poisoned,
}

/// 把报告行写到终端
///
/// `console://` 只写报告，`console://?dump` 额外写出原始检测数据，
/// `console://?frames` 在每帧前加帧号。
pub struct ConsoleReportOutput<W> {
  writer: Mutex<W>,
  dump: bool,
  frames: bool,
}

impl<W: Write> ConsoleReportOutput<W> {
  pub fn with_writer(writer: W) -> Self {
    Self {
      writer: Mutex::new(writer),
      dump: false,
      frames: false,
    }
  }

  pub fn dump(mut self, dump: bool) -> Self {
    self.dump = dump;
    self
  }

  pub fn frames(mut self, frames: bool) -> Self {
    self.frames = frames;
    self
  }

  pub fn into_inner(self) -> Result<W, ConsoleReportError> {
    self.writer.into_inner().map_err(|_| ConsoleReportError::Poisoned)
  }
}

impl FromUrlWithScheme for ConsoleReportOutput<Stdout> {
  const SCHEME: &'static str = "console";
}

impl FromUrl for ConsoleReportOutput<Stdout> {
  type Error = ConsoleReportError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ConsoleReportError::SchemeMismatch(format!(
        "期望输出方式 '{}', 实际输出方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    Ok(
      ConsoleReportOutput::with_writer(io::stdout())
        .dump(has_query_flag(url, "dump"))
        .frames(has_query_flag(url, "frames")),
    )
  }
}

fn tone_tag(tone: Tone) -> &'static str {
  match tone {
    Tone::Info => "[info]",
    Tone::Success => "[ok]  ",
  }
}

impl<W: Write> Render<Frame, Inference> for ConsoleReportOutput<W> {
  type Error = ConsoleReportError;

  fn render_result(&self, frame: &Frame, result: &Inference) -> Result<(), Self::Error> {
    let mut writer = self.writer.lock().map_err(|_| ConsoleReportError::Poisoned)?;

    if self.frames {
      writeln!(writer, "-- frame {} ({} ms)", frame.index, frame.timestamp_ms)?;
    }
    for (tone, line) in result.report.lines() {
      writeln!(writer, "{} {}", tone_tag(tone), line)?;
    }
    if self.dump {
      serde_json::to_writer_pretty(&mut *writer, &result.raw_dump())?;
      writeln!(writer)?;
    }
    writer.flush()?;
    Ok(())
  }
}
