// 该文件是 Shoujian （兽鉴） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use shoujian::{
  FromUrl,
  config::Settings,
  dashboard::{Dashboard, Request, TITLE},
  output::OutputWrapper,
};

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = args::Args::parse();

  println!("{}", TITLE);
  info!("检测任务: {}", args.task);
  info!("置信度: {}", args.confidence);
  info!("输入源: {} {}", args.source, args.input.as_deref().unwrap_or("(默认)"));

  let outputs = args
    .output
    .iter()
    .map(OutputWrapper::from_url)
    .collect::<Result<Vec<_>, _>>()?;

  let settings = Settings {
    default_image: args.default_image,
    default_detect_image: args.default_detected_image,
    ..Settings::default()
  }
  .with_weights_dir(&args.weights_dir)
  .with_labels_dir(&args.labels_dir)
  .with_model_extension(&args.model_extension);

  let mut request = Request::new(args.task, args.source)
    .with_confidence(args.confidence)
    .with_frame_limit(args.frame_number)
    .with_interrupt(true);
  request.input = args.input;

  let notices = Dashboard::new(settings).run(&request, outputs);
  for notice in &notices {
    println!("{}", notice);
  }

  if notices.iter().any(|n| n.is_error()) {
    std::process::exit(1);
  }
  Ok(())
}
