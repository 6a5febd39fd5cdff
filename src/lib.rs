// 该文件是 Shoujian （兽鉴） 项目的一部分。
// src/lib.rs - 库主文件
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

pub mod confidence;
pub mod config;
pub mod dashboard;
pub mod frame;
pub mod input;
pub mod model;
pub mod output;
pub mod report;
pub mod task;

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// 取出 URL 路径部分并做百分号解码
pub fn path_from_url(url: &url::Url) -> std::path::PathBuf {
  let decoded = urlencoding::decode_binary(url.path().as_bytes()).into_owned();
  #[cfg(unix)]
  {
    use std::os::unix::ffi::OsStringExt;
    std::path::PathBuf::from(std::ffi::OsString::from_vec(decoded))
  }
  #[cfg(not(unix))]
  {
    std::path::PathBuf::from(String::from_utf8_lossy(&decoded).into_owned())
  }
}

/// 把本地路径逐段百分号编码，`path_from_url` 可原样还原
pub fn path_to_url_path(path: &std::path::Path) -> String {
  #[cfg(unix)]
  let bytes = {
    use std::os::unix::ffi::OsStrExt;
    std::borrow::Cow::Borrowed(path.as_os_str().as_bytes())
  };
  #[cfg(not(unix))]
  let bytes = std::borrow::Cow::<[u8]>::Owned(path.to_string_lossy().replace('\\', "/").into_bytes());

  bytes
    .split(|b| *b == b'/')
    .map(|segment| urlencoding::encode_binary(segment).into_owned())
    .collect::<Vec<_>>()
    .join("/")
}

/// 判断 URL 查询参数中是否出现某个键
pub fn has_query_flag(url: &url::Url, key: &str) -> bool {
  url.query_pairs().any(|(k, _)| k == key)
}

#[cfg(test)]
mod tests {
  use super::*;
  use url::Url;

  #[test]
  fn url_path_is_percent_decoded() {
    let url = Url::parse("image:///tmp/my%20photos/cat.jpg?dump").unwrap();
    assert_eq!(path_from_url(&url), std::path::PathBuf::from("/tmp/my photos/cat.jpg"));
    assert!(has_query_flag(&url, "dump"));
    assert!(!has_query_flag(&url, "always"));
  }

  #[test]
  fn encoded_paths_survive_percent_sequences() {
    let path = std::path::Path::new("/data/100%41.jpg");
    let encoded = path_to_url_path(path);
    assert_eq!(encoded, "/data/100%2541.jpg");

    let mut url = Url::parse("image:///").unwrap();
    url.set_path(&encoded);
    assert_eq!(path_from_url(&url), path);
  }

  #[cfg(unix)]
  #[test]
  fn non_utf8_paths_are_kept_byte_for_byte() {
    use std::os::unix::ffi::OsStrExt;
    let path = std::path::Path::new(std::ffi::OsStr::from_bytes(b"/data/\xffcat.png"));
    let mut url = Url::parse("image:///").unwrap();
    url.set_path(&path_to_url_path(path));
    assert_eq!(path_from_url(&url), path);
  }
}
