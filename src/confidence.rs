// 该文件是 Shoujian （兽鉴） 项目的一部分。
// src/confidence.rs - 置信度阈值
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

use std::{fmt, str::FromStr};

use thiserror::Error;

/// 滑块最小值（百分比）
pub const SLIDER_MIN: u8 = 25;
/// 滑块最大值（百分比）
pub const SLIDER_MAX: u8 = 100;
/// 滑块默认值（百分比）
pub const SLIDER_DEFAULT: u8 = 40;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfidenceError {
  #[error("置信度 {0} 超出范围 [{min}, {max}]", min = Confidence::MIN, max = Confidence::MAX)]
  OutOfRange(f32),
  #[error("滑块取值 {0} 超出范围 [{min}, {max}]", min = SLIDER_MIN, max = SLIDER_MAX)]
  SliderOutOfRange(u8),
  #[error("无法解析置信度: {0}")]
  Parse(String),
}

/// 推理置信度阈值，取值保证落在 `[0.25, 1.0]` 内
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Confidence(f32);

impl Confidence {
  pub const MIN: f32 = SLIDER_MIN as f32 / 100.0;
  pub const MAX: f32 = SLIDER_MAX as f32 / 100.0;

  /// 越界值直接拒绝
  pub fn new(value: f32) -> Result<Self, ConfidenceError> {
    if (Self::MIN..=Self::MAX).contains(&value) {
      Ok(Self(value))
    } else {
      Err(ConfidenceError::OutOfRange(value))
    }
  }

  /// 越界值钳制到边界，NaN 视为最小值
  pub fn clamped(value: f32) -> Self {
    if value.is_nan() {
      return Self(Self::MIN);
    }
    Self(value.clamp(Self::MIN, Self::MAX))
  }

  /// 滑块整数值（25 - 100）除以 100
  pub fn from_slider(percent: u8) -> Result<Self, ConfidenceError> {
    if !(SLIDER_MIN..=SLIDER_MAX).contains(&percent) {
      return Err(ConfidenceError::SliderOutOfRange(percent));
    }
    Ok(Self(percent as f32 / 100.0))
  }

  pub fn value(self) -> f32 {
    self.0
  }

  pub fn accepts(self, score: f32) -> bool {
    score >= self.0
  }
}

impl Default for Confidence {
  fn default() -> Self {
    Self(SLIDER_DEFAULT as f32 / 100.0)
  }
}

impl fmt::Display for Confidence {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{:.2}", self.0)
  }
}

/// 命令行取值：大于 1 的整数按滑块百分比解释，其余按阈值解释
impl FromStr for Confidence {
  type Err = ConfidenceError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let s = s.trim();
    if let Ok(percent) = s.parse::<u8>()
      && percent > 1
    {
      return Self::from_slider(percent);
    }
    let value = s
      .parse::<f32>()
      .map_err(|_| ConfidenceError::Parse(s.to_string()))?;
    Self::new(value)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_values_just_outside_range() {
    assert_eq!(Confidence::new(0.24), Err(ConfidenceError::OutOfRange(0.24)));
    assert_eq!(Confidence::new(1.01), Err(ConfidenceError::OutOfRange(1.01)));
    assert!(Confidence::new(f32::NAN).is_err());
  }

  #[test]
  fn integer_one_is_full_threshold() {
    assert_eq!("1".parse::<Confidence>().unwrap().value(), 1.0);
    assert_eq!("1.0".parse::<Confidence>().unwrap().value(), 1.0);
    assert_eq!("100".parse::<Confidence>().unwrap().value(), 1.0);
    assert_eq!("40".parse::<Confidence>().unwrap().value(), 0.4);
    assert!("0".parse::<Confidence>().is_err());
  }

  #[test]
  fn accepts_range_bounds() {
    assert_eq!(Confidence::new(0.25).unwrap().value(), 0.25);
    assert_eq!(Confidence::new(1.0).unwrap().value(), 1.0);
  }

  #[test]
  fn clamps_values_just_outside_range() {
    assert_eq!(Confidence::clamped(0.24).value(), 0.25);
    assert_eq!(Confidence::clamped(1.01).value(), 1.0);
    assert_eq!(Confidence::clamped(f32::NAN).value(), 0.25);
    assert_eq!(Confidence::clamped(0.6).value(), 0.6);
  }

  #[test]
  fn slider_divides_by_hundred() {
    assert_eq!(Confidence::from_slider(40).unwrap().value(), 0.4);
    assert_eq!(Confidence::default().value(), 0.4);
    assert!(Confidence::from_slider(24).is_err());
    assert!(Confidence::from_slider(101).is_err());
  }

  #[test]
  fn parses_percent_and_fraction() {
    assert_eq!("55".parse::<Confidence>().unwrap().value(), 0.55);
    assert_eq!("0.7".parse::<Confidence>().unwrap().value(), 0.7);
    assert!("0.1".parse::<Confidence>().is_err());
    assert!("high".parse::<Confidence>().is_err());
  }

  #[test]
  fn threshold_is_inclusive() {
    let confidence = Confidence::new(0.5).unwrap();
    assert!(confidence.accepts(0.5));
    assert!(!confidence.accepts(0.49));
  }
}
