// 该文件是 Shoujian （兽鉴） 项目的一部分。
// src/report.rs - 检测类别报告
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

//! # 类别报告
//!
//! 把模型输出的原始类别名（如 `cat-persian`、`rock-pigeon`、`healthy`）
//! 按固定词表做子串匹配，归入动物品种、鸟类物种或皮肤病三类，
//! 生成可直接展示的报告行。
//!
//! 词表只在 [`VOCABULARY`] 中声明一次。每个检测到的类别按词表声明顺序
//! 逐项匹配，所有命中的条目都会产生一条结论。

use std::fmt;

use serde::Serialize;

use crate::model::{Detection, Labels};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Animal {
  Cat,
  Dog,
  Bird,
}

impl fmt::Display for Animal {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Animal::Cat => "Cat",
      Animal::Dog => "Dog",
      Animal::Bird => "Bird",
    })
  }
}

/// 词表条目命中后的归类规则
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
  /// 品种取类别名第一个连字符之后的部分
  Breed(Animal),
  /// 物种名即词表条目本身
  Species(Animal),
  Disease,
}

#[derive(Debug, Clone, Copy)]
pub struct VocabularyEntry {
  pub token: &'static str,
  pub rule: Rule,
}

const fn entry(token: &'static str, rule: Rule) -> VocabularyEntry {
  VocabularyEntry { token, rule }
}

const fn bird(token: &'static str) -> VocabularyEntry {
  entry(token, Rule::Species(Animal::Bird))
}

const fn disease(token: &'static str) -> VocabularyEntry {
  entry(token, Rule::Disease)
}

pub static VOCABULARY: &[VocabularyEntry] = &[
  entry("cat-", Rule::Breed(Animal::Cat)),
  entry("dog-", Rule::Breed(Animal::Dog)),
  bird("acorn-woodpecker"),
  bird("annas-hummingbird"),
  bird("blue-jay"),
  bird("blue-winged-warbler"),
  bird("carolina-chickadee"),
  bird("carolina-wren"),
  bird("chipping-sparrow"),
  bird("common-eider"),
  bird("common-yellowthroat"),
  bird("dark-eyed-junco"),
  bird("eastern-bluebird"),
  bird("eastern-towhee"),
  bird("harris-hawk"),
  bird("hermit-thrush"),
  bird("indigo-bunting"),
  bird("juniper-titmouse"),
  bird("northern-cardinal"),
  bird("northern-mockingbird"),
  bird("northern-waterthrush"),
  bird("orchard-oriole"),
  bird("painted-bunting"),
  bird("prothonotary-warbler"),
  bird("red-winged-blackbird"),
  bird("rock-pigeon"),
  bird("rofous-crowned-sparrow"),
  bird("ruddy-duck"),
  bird("scarlet-tanager"),
  bird("snow-goose"),
  bird("song-sparrow"),
  bird("tufted-titmouse"),
  bird("varied-thrush"),
  bird("white-breasted-nuthatch"),
  bird("white-throated-sparrow"),
  bird("wood-duck"),
  disease("bacterial-dermatosis"),
  disease("fungal-infection"),
  disease("healthy"),
  disease("hypersensitivity-allergic-dermatosis"),
];

/// 单帧内每个类别的出现次数，保持模型类别顺序
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClassCount {
  entries: Vec<(String, usize)>,
}

impl ClassCount {
  /// 以标签表为全集统计，未检测到的类别计数为 0
  pub fn from_detections(labels: &Labels, detections: &[Detection]) -> Self {
    let mut entries: Vec<(String, usize)> = labels
      .names()
      .iter()
      .map(|name| (name.clone(), 0))
      .collect();

    for detection in detections {
      match entries.get_mut(detection.class_id as usize) {
        Some((name, count)) if *name == detection.class_name => *count += 1,
        _ => match entries
          .iter_mut()
          .find(|(name, _)| *name == detection.class_name)
        {
          Some((_, count)) => *count += 1,
          None => entries.push((detection.class_name.clone(), 1)),
        },
      }
    }

    Self { entries }
  }

  pub fn get(&self, class_name: &str) -> usize {
    self
      .entries
      .iter()
      .find(|(name, _)| name == class_name)
      .map(|(_, count)| *count)
      .unwrap_or(0)
  }

  pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
    self
      .entries
      .iter()
      .map(|(name, count)| (name.as_str(), *count))
  }

  pub fn total(&self) -> usize {
    self.entries.iter().map(|(_, count)| count).sum()
  }
}

impl<S: Into<String>> FromIterator<(S, usize)> for ClassCount {
  fn from_iter<I: IntoIterator<Item = (S, usize)>>(iter: I) -> Self {
    Self {
      entries: iter
        .into_iter()
        .map(|(name, count)| (name.into(), count))
        .collect(),
    }
  }
}

/// 一条归类结论
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
  Breed {
    animal: Animal,
    breed: String,
    count: usize,
  },
  Species {
    animal: Animal,
    species: String,
    count: usize,
  },
  Disease {
    disease: String,
    count: usize,
  },
}

/// 展示级别，对应界面上的提示框样式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Tone {
  Info,
  Success,
}

impl Finding {
  /// 展示用的报告行
  pub fn lines(&self) -> Vec<(Tone, String)> {
    match self {
      Finding::Breed {
        animal,
        breed,
        count,
      } => vec![
        (Tone::Info, format!("Animal: {} : {}", animal, count)),
        (Tone::Success, format!("Breed: {}", breed)),
      ],
      Finding::Species {
        animal,
        species,
        count,
      } => vec![
        (Tone::Info, format!("Animal: {} : {}", animal, count)),
        (Tone::Success, format!("Species: {}", species)),
      ],
      Finding::Disease { disease, .. } => vec![(Tone::Info, format!("Disease: {}", disease))],
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Report {
  pub findings: Vec<Finding>,
}

impl Report {
  pub fn is_empty(&self) -> bool {
    self.findings.is_empty()
  }

  pub fn lines(&self) -> impl Iterator<Item = (Tone, String)> + '_ {
    self.findings.iter().flat_map(Finding::lines)
  }
}

impl fmt::Display for Report {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    for (_, line) in self.lines() {
      writeln!(f, "{}", line)?;
    }
    Ok(())
  }
}

fn breed_of(class_name: &str) -> &str {
  class_name
    .split_once('-')
    .map(|(_, rest)| rest)
    .unwrap_or(class_name)
}

/// 按词表对类别计数归类
pub fn classify(counts: &ClassCount) -> Report {
  let mut findings = Vec::new();

  for (class_name, count) in counts.iter() {
    if count == 0 {
      continue;
    }
    for VocabularyEntry { token, rule } in VOCABULARY {
      if !class_name.contains(token) {
        continue;
      }
      findings.push(match *rule {
        Rule::Breed(animal) => Finding::Breed {
          animal,
          breed: breed_of(class_name).to_string(),
          count,
        },
        Rule::Species(animal) => Finding::Species {
          animal,
          species: token.to_string(),
          count,
        },
        Rule::Disease => Finding::Disease {
          disease: token.to_string(),
          count,
        },
      });
    }
  }

  Report { findings }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn counts(items: &[(&str, usize)]) -> ClassCount {
    items.iter().map(|(name, count)| (*name, *count)).collect()
  }

  #[test]
  fn persian_cat_yields_one_breed_finding() {
    let report = classify(&counts(&[("cat-persian", 2)]));
    assert_eq!(
      report.findings,
      vec![Finding::Breed {
        animal: Animal::Cat,
        breed: "persian".to_string(),
        count: 2,
      }]
    );
    let lines: Vec<String> = report.lines().map(|(_, line)| line).collect();
    assert_eq!(lines, vec!["Animal: Cat : 2", "Breed: persian"]);
  }

  #[test]
  fn breed_is_everything_after_first_hyphen() {
    for (class_name, breed, animal) in [
      ("cat-maine-coon", "maine-coon", Animal::Cat),
      ("dog-german-shepherd", "german-shepherd", Animal::Dog),
      ("dog-beagle", "beagle", Animal::Dog),
      ("cat-", "", Animal::Cat),
    ] {
      let report = classify(&counts(&[(class_name, 1)]));
      assert_eq!(
        report.findings,
        vec![Finding::Breed {
          animal,
          breed: breed.to_string(),
          count: 1,
        }],
        "class {}",
        class_name
      );
    }
  }

  #[test]
  fn animal_token_may_appear_mid_name() {
    for (class_name, breed) in [("wildcat-lynx", "lynx"), ("big-cat-lion", "cat-lion")] {
      let report = classify(&counts(&[(class_name, 3)]));
      assert_eq!(
        report.findings,
        vec![Finding::Breed {
          animal: Animal::Cat,
          breed: breed.to_string(),
          count: 3,
        }],
        "class {}",
        class_name
      );
    }
  }

  #[test]
  fn zero_counts_produce_empty_report() {
    let report = classify(&counts(&[
      ("cat-persian", 0),
      ("rock-pigeon", 0),
      ("healthy", 0),
    ]));
    assert!(report.is_empty());
    assert_eq!(report.to_string(), "");
  }

  #[test]
  fn rock_pigeon_is_reported_once() {
    let report = classify(&counts(&[("rock-pigeon", 1)]));
    assert_eq!(
      report.findings,
      vec![Finding::Species {
        animal: Animal::Bird,
        species: "rock-pigeon".to_string(),
        count: 1,
      }]
    );
  }

  #[test]
  fn vocabulary_tokens_are_unique() {
    for (i, a) in VOCABULARY.iter().enumerate() {
      for b in &VOCABULARY[i + 1..] {
        assert_ne!(a.token, b.token);
      }
    }
  }

  #[test]
  fn disease_line_has_no_count() {
    let report = classify(&counts(&[("fungal-infection", 3)]));
    let lines: Vec<(Tone, String)> = report.lines().collect();
    assert_eq!(
      lines,
      vec![(Tone::Info, "Disease: fungal-infection".to_string())]
    );
  }

  #[test]
  fn overlapping_tokens_all_emit_in_vocabulary_order() {
    // "cat-" 与 "healthy" 同时命中
    let report = classify(&counts(&[("cat-healthy", 1)]));
    assert_eq!(report.findings.len(), 2);
    assert!(matches!(report.findings[0], Finding::Breed { animal: Animal::Cat, .. }));
    assert!(matches!(report.findings[1], Finding::Disease { .. }));
  }

  #[test]
  fn unmatched_classes_are_silent() {
    let report = classify(&counts(&[("person", 4), ("car", 1)]));
    assert!(report.is_empty());
  }

  #[test]
  fn findings_follow_class_order() {
    let report = classify(&counts(&[("wood-duck", 1), ("cat-sphynx", 1), ("blue-jay", 2)]));
    let lines: Vec<String> = report.lines().map(|(_, line)| line).collect();
    assert_eq!(
      lines,
      vec![
        "Animal: Bird : 1",
        "Species: wood-duck",
        "Animal: Cat : 1",
        "Breed: sphynx",
        "Animal: Bird : 2",
        "Species: blue-jay",
      ]
    );
  }

  #[test]
  fn class_count_tracks_labels_and_detections() {
    let labels = Labels::from_names(["cat-persian", "dog-pug", "healthy"]);
    let detections = vec![
      Detection::new(0, "cat-persian", 0.9, [0.0, 0.0, 10.0, 10.0]),
      Detection::new(0, "cat-persian", 0.8, [5.0, 5.0, 20.0, 20.0]),
      Detection::new(2, "healthy", 0.7, [0.0, 0.0, 1.0, 1.0]),
    ];
    let counts = ClassCount::from_detections(&labels, &detections);
    assert_eq!(counts.get("cat-persian"), 2);
    assert_eq!(counts.get("dog-pug"), 0);
    assert_eq!(counts.get("healthy"), 1);
    assert_eq!(counts.total(), 3);
    assert_eq!(
      counts.iter().map(|(name, _)| name).collect::<Vec<_>>(),
      vec!["cat-persian", "dog-pug", "healthy"]
    );
  }
}
