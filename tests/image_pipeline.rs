use image::{Rgb, RgbImage};
use tempfile::TempDir;
use url::Url;

use shoujian::{
  FromUrl,
  config::{DetectionTask, Settings},
  confidence::Confidence,
  dashboard::{Dashboard, IMAGE_OPEN_ERROR, Notice, Request},
  frame::Frame,
  input::{InputWrapper, SourceKind},
  model::{DetectItem, DetectResult, Detector, InferenceError, Labels, Model},
  output::{ConsoleReportOutput, Render, SaveImageFileOutput},
  task::{OneShotTask, Task},
};

/// 固定返回同一组检测的模型
struct ScriptedModel(Vec<DetectItem>);

impl Model for ScriptedModel {
  type Input = Frame;
  type Output = DetectResult;
  type Error = InferenceError;

  fn infer(&self, _input: &Frame) -> Result<DetectResult, InferenceError> {
    Ok(DetectResult {
      items: self.0.clone().into_boxed_slice(),
    })
  }
}

fn item(class_id: u32, score: f32, bbox: [f32; 4]) -> DetectItem {
  DetectItem {
    class_id,
    score,
    bbox,
  }
}

fn breed_detector() -> Detector<ScriptedModel> {
  let labels = Labels::from_names(["cat-persian", "dog-pug", "dog-beagle"]);
  let model = ScriptedModel(vec![
    item(0, 0.91, [0.1, 0.1, 0.4, 0.5]),
    item(0, 0.62, [0.5, 0.1, 0.9, 0.5]),
    item(1, 0.45, [0.1, 0.6, 0.3, 0.9]),
    item(2, 0.30, [0.6, 0.6, 0.9, 0.9]),
  ]);
  Detector::new(model, labels).with_confidence(Confidence::from_slider(50).unwrap())
}

fn write_image(dir: &TempDir, name: &str, color: [u8; 3]) -> std::path::PathBuf {
  let path = dir.path().join(name);
  RgbImage::from_pixel(64, 48, Rgb(color)).save(&path).unwrap();
  path
}

#[test]
fn image_is_annotated_and_reported() {
  let dir = tempfile::tempdir().unwrap();
  let source = write_image(&dir, "pets.png", [40, 40, 40]);

  let url = SourceKind::Image.to_url(source.to_str().unwrap()).unwrap();
  let input = InputWrapper::from_url(&url).unwrap();
  let out_url = Url::parse(&format!("image://{}/out.png?dump", dir.path().display())).unwrap();
  let output = SaveImageFileOutput::from_url(&out_url).unwrap();

  OneShotTask.run_task(input, breed_detector(), output).unwrap();

  let overlay = image::open(dir.path().join("out.png")).unwrap().to_rgb8();
  assert_eq!(overlay.dimensions(), (64, 48));
  assert_ne!(overlay, RgbImage::from_pixel(64, 48, Rgb([40, 40, 40])));

  let record: serde_json::Value =
    serde_json::from_str(&std::fs::read_to_string(dir.path().join("out.json")).unwrap()).unwrap();
  // 0.45 与 0.30 低于 0.50 的阈值
  assert_eq!(record["raw"]["boxes"].as_array().unwrap().len(), 2);
  assert_eq!(
    record["report"],
    serde_json::json!(["Animal: Cat : 2", "Breed: persian"])
  );
}

#[test]
fn lower_threshold_reports_more_breeds() {
  let detector = breed_detector().with_confidence(Confidence::from_slider(25).unwrap());
  let frame = Frame::still(RgbImage::new(64, 48));
  let console = ConsoleReportOutput::with_writer(Vec::new());

  let inference = detector.infer(&frame).unwrap();
  console.render_result(&frame, &inference).unwrap();

  let text = String::from_utf8(console.into_inner().unwrap()).unwrap();
  let lines: Vec<&str> = text.lines().collect();
  assert_eq!(
    lines,
    vec![
      "[info] Animal: Cat : 2",
      "[ok]   Breed: persian",
      "[info] Animal: Dog : 1",
      "[ok]   Breed: pug",
      "[info] Animal: Dog : 1",
      "[ok]   Breed: beagle",
    ]
  );
}

#[test]
fn dashboard_runs_image_with_loaded_detector() {
  let dir = tempfile::tempdir().unwrap();
  let source = write_image(&dir, "cat.png", [200, 180, 160]);
  let dashboard = Dashboard::new(Settings::default());
  let request = Request::new(DetectionTask::CatDogBreed, SourceKind::Image)
    .with_input(source.to_str().unwrap());

  let console = ConsoleReportOutput::with_writer(Vec::new());
  let notices = dashboard.run_with(&request, Ok(breed_detector()), &console);
  assert!(notices.is_empty(), "{:?}", notices);

  let text = String::from_utf8(console.into_inner().unwrap()).unwrap();
  assert!(text.contains("Breed: persian"));
}

#[test]
fn dashboard_reports_unreadable_image() {
  let dir = tempfile::tempdir().unwrap();
  let broken = dir.path().join("broken.jpg");
  std::fs::write(&broken, b"not really a jpeg").unwrap();

  let dashboard = Dashboard::new(Settings::default());
  let request = Request::new(DetectionTask::CatDogBreed, SourceKind::Image)
    .with_input(broken.to_str().unwrap());
  let console = ConsoleReportOutput::with_writer(Vec::new());

  let notices = dashboard.run_with(&request, Ok(breed_detector()), &console);
  assert_eq!(notices, vec![Notice::Error(IMAGE_OPEN_ERROR.to_string())]);
}

#[test]
fn dashboard_shows_defaults_even_when_model_is_missing() {
  let dir = tempfile::tempdir().unwrap();
  let default_image = write_image(&dir, "default.png", [1, 2, 3]);
  let detected_image = write_image(&dir, "default_detected.png", [9, 8, 7]);
  let settings = Settings {
    default_image,
    default_detect_image: detected_image,
    ..Settings::default()
  }
  .with_weights_dir(dir.path().join("weights"))
  .with_labels_dir(dir.path().join("labels"));

  let out = dir.path().join("shown.png");
  let output = SaveImageFileOutput::new(&out);
  let request = Request::new(DetectionTask::SkinDisease, SourceKind::Image);
  let notices = Dashboard::new(settings).run(&request, output);

  assert!(notices[0].is_error());
  assert!(
    notices[0]
      .message()
      .starts_with("Unable to load model. Check the specified path: ")
  );
  assert!(notices[0].message().ends_with("skin_disease.onnx"));
  assert!(notices[1..].iter().all(|n| !n.is_error()), "{:?}", notices);

  let shown = image::open(&out).unwrap().to_rgb8();
  assert_eq!(shown.get_pixel(0, 0), &Rgb([9, 8, 7]));
}

#[test]
fn model_failure_stops_non_default_runs() {
  let dir = tempfile::tempdir().unwrap();
  let source = write_image(&dir, "cat.png", [0, 0, 0]);
  let settings = Settings::default()
    .with_weights_dir(dir.path())
    .with_labels_dir(dir.path());
  let request =
    Request::new(DetectionTask::CatDogBreed, SourceKind::Image).with_input(source.to_str().unwrap());
  let console = ConsoleReportOutput::with_writer(Vec::new());

  let notices = Dashboard::new(settings).run(&request, &console);
  assert_eq!(notices.len(), 1);
  assert!(notices[0].is_error());
  assert!(console.into_inner().unwrap().is_empty());
}
