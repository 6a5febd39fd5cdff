// 该文件是 Shoujian （兽鉴） 项目的一部分。
// src/input/youtube_input.rs - YouTube 视频输入
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

use std::process::Command;

use thiserror::Error;
use tracing::{debug, info};
use url::{Position, Url};

use crate::{
  FromUrl, FromUrlWithScheme,
  input::gstreamer_input::{GStreamerInput, GStreamerInputError, GStreamerInputPipelineBuilder},
};

const YT_DLP: &str = "yt-dlp";

#[derive(Error, Debug)]
pub enum YoutubeInputError {
  #[error("URI scheme mismatch")]
  SchemeMismatch,
  #[error("Not a YouTube video URL: {0}")]
  NotYoutube(String),
  #[error("Failed to run yt-dlp: {0}")]
  Spawn(#[from] std::io::Error),
  #[error("yt-dlp exited with {status}: {stderr}")]
  Resolve { status: String, stderr: String },
  #[error("yt-dlp returned no stream URL")]
  NoStream,
  #[error("GStreamer input error: {0}")]
  GStreamer(#[from] GStreamerInputError),
}

/// `youtube://www.youtube.com/watch?v=ID` 形式的视频地址
///
/// 通过 `yt-dlp -g` 取得直链，再交给 GStreamer 播放。
pub struct YoutubeInput {
  page: Url,
}

impl FromUrlWithScheme for YoutubeInput {
  const SCHEME: &'static str = "youtube";
}

impl FromUrl for YoutubeInput {
  type Error = YoutubeInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(YoutubeInputError::SchemeMismatch);
    }
    Ok(Self {
      page: page_url(url)?,
    })
  }
}

fn is_youtube_host(host: &str) -> bool {
  let host = host.strip_prefix("www.").unwrap_or(host);
  let host = host.strip_prefix("m.").unwrap_or(host);
  matches!(host, "youtube.com" | "youtu.be" | "music.youtube.com")
}

/// `youtube://` 地址还原为 https 页面地址
pub fn page_url(url: &Url) -> Result<Url, YoutubeInputError> {
  let host = url.host_str().unwrap_or_default();
  if !is_youtube_host(host) {
    return Err(YoutubeInputError::NotYoutube(url.to_string()));
  }
  Url::parse(&format!("https://{}", &url[Position::BeforeHost..]))
    .map_err(|_| YoutubeInputError::NotYoutube(url.to_string()))
}

/// https 页面地址转换为 `youtube://` 输入地址
pub fn input_url(page: &str) -> Result<Url, YoutubeInputError> {
  let not_youtube = || YoutubeInputError::NotYoutube(page.to_string());
  let parsed = Url::parse(page).map_err(|_| not_youtube())?;
  if !matches!(parsed.scheme(), "http" | "https")
    || !parsed.host_str().is_some_and(is_youtube_host)
  {
    return Err(not_youtube());
  }
  Url::parse(&format!(
    "{}://{}",
    YoutubeInput::SCHEME,
    &parsed[Position::BeforeHost..]
  ))
  .map_err(|_| not_youtube())
}

impl YoutubeInput {
  pub fn page(&self) -> &Url {
    &self.page
  }

  /// 调用 yt-dlp 取得可直接播放的流地址
  pub fn resolve(&self) -> Result<String, YoutubeInputError> {
    info!("解析 YouTube 视频地址: {}", self.page);
    let output = Command::new(YT_DLP)
      .arg("--no-playlist")
      .arg("-f")
      .arg("best[vcodec!=none]")
      .arg("-g")
      .arg(self.page.as_str())
      .output()?;

    if !output.status.success() {
      return Err(YoutubeInputError::Resolve {
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
      });
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let stream = stdout
      .lines()
      .map(str::trim)
      .find(|line| !line.is_empty())
      .ok_or(YoutubeInputError::NoStream)?;
    debug!("YouTube 流地址: {}", stream);
    Ok(stream.to_string())
  }

  pub fn build(self) -> Result<GStreamerInput, YoutubeInputError> {
    let stream = self.resolve()?;
    let input = GStreamerInputPipelineBuilder::new()
      .uri(stream)
      .target_format("RGB")
      .build()?;
    Ok(input)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn watch_url_round_trips_through_scheme() {
    let url = input_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ").unwrap();
    assert_eq!(url.as_str(), "youtube://www.youtube.com/watch?v=dQw4w9WgXcQ");

    let input = YoutubeInput::from_url(&url).unwrap();
    assert_eq!(input.page().as_str(), "https://www.youtube.com/watch?v=dQw4w9WgXcQ");
  }

  #[test]
  fn short_links_are_accepted() {
    let url = input_url("https://youtu.be/dQw4w9WgXcQ").unwrap();
    assert_eq!(url.host_str(), Some("youtu.be"));
  }

  #[test]
  fn other_sites_are_rejected() {
    assert!(matches!(
      input_url("https://vimeo.com/12345"),
      Err(YoutubeInputError::NotYoutube(_))
    ));
    assert!(matches!(
      input_url("not a url"),
      Err(YoutubeInputError::NotYoutube(_))
    ));
    let url = Url::parse("youtube://example.com/watch?v=1").unwrap();
    assert!(YoutubeInput::from_url(&url).is_err());
  }
}
