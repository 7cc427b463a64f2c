//! ONNX-backed face detection and embedding.
//!
//! UltraFace (320x240) locates faces; ArcFace ResNet100 produces 512-dim
//! L2-normalized embeddings from the cropped regions. Models are downloaded
//! on first use into the local data directory.

use anyhow::{anyhow, Result};
use image::{DynamicImage, GenericImageView};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};

use super::FaceEmbedder;

/// Bounding box of a detected face, in source image pixels.
#[derive(Debug, Clone)]
struct FaceBox {
    x: i32,
    y: i32,
    width: i32,
    height: i32,
}

static DETECTION_MODEL: OnceLock<Mutex<Session>> = OnceLock::new();
static EMBEDDING_MODEL: OnceLock<Mutex<Session>> = OnceLock::new();

/// Embedder backed by the ONNX detection + embedding models.
///
/// Cheap to construct; sessions are initialized lazily on first use and
/// shared process-wide.
pub struct OnnxEmbedder;

impl OnnxEmbedder {
    pub fn new() -> Self {
        Self
    }
}

impl Default for OnnxEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

impl FaceEmbedder for OnnxEmbedder {
    fn detect_and_embed(&self, img: &DynamicImage) -> Result<Vec<Vec<f32>>> {
        ensure_models()?;

        let face_boxes = {
            let mut detection_model = DETECTION_MODEL
                .get()
                .ok_or_else(|| anyhow!("Detection model not initialized"))?
                .lock()
                .map_err(|e| anyhow!("Failed to lock detection model: {}", e))?;
            run_ultraface_detection(&mut *detection_model, img)?
        };

        if face_boxes.is_empty() {
            return Ok(Vec::new());
        }

        let (orig_width, orig_height) = img.dimensions();
        let mut embedding_model = EMBEDDING_MODEL
            .get()
            .ok_or_else(|| anyhow!("Embedding model not initialized"))?
            .lock()
            .map_err(|e| anyhow!("Failed to lock embedding model: {}", e))?;

        let mut embeddings = Vec::new();
        for (bbox, _confidence) in face_boxes {
            if bbox.width <= 0 || bbox.height <= 0 {
                continue;
            }
            let face_crop = crop_face(img, &bbox, orig_width, orig_height);
            match run_arcface_embedding(&mut *embedding_model, &face_crop) {
                Ok(embedding) => embeddings.push(embedding),
                Err(e) => {
                    tracing::warn!("Embedding extraction failed for a detected face: {}", e);
                }
            }
        }

        Ok(embeddings)
    }
}

fn models_dir() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir()
        .ok_or_else(|| anyhow!("Could not find local data directory"))?;
    let models_dir = data_dir.join("reunite").join("models");
    std::fs::create_dir_all(&models_dir)?;
    Ok(models_dir)
}

fn ensure_model(filename: &str, url: &str) -> Result<PathBuf> {
    let model_path = models_dir()?.join(filename);

    if !model_path.exists() {
        tracing::info!(model = %filename, "Downloading model...");
        let response = ureq::get(url)
            .call()
            .map_err(|e| anyhow!("Failed to download model: {}", e))?;

        let mut file = std::fs::File::create(&model_path)?;
        std::io::copy(&mut response.into_reader(), &mut file)?;
        tracing::info!(model = %filename, path = ?model_path, "Model downloaded");
    }

    Ok(model_path)
}

fn ensure_models() -> Result<()> {
    if DETECTION_MODEL.get().is_none() {
        let path = ensure_model(
            "ultraface-320.onnx",
            "https://github.com/onnx/models/raw/main/validated/vision/body_analysis/ultraface/models/version-RFB-320.onnx",
        )?;
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&path)?;
        let _ = DETECTION_MODEL.set(Mutex::new(session));
    }

    if EMBEDDING_MODEL.get().is_none() {
        let path = ensure_model(
            "arcface-resnet100.onnx",
            "https://github.com/onnx/models/raw/main/validated/vision/body_analysis/arcface/model/arcfaceresnet100-11-int8.onnx",
        )?;
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(4)?
            .commit_from_file(&path)?;
        let _ = EMBEDDING_MODEL.set(Mutex::new(session));
    }

    Ok(())
}

fn run_ultraface_detection(session: &mut Session, img: &DynamicImage) -> Result<Vec<(FaceBox, f32)>> {
    const INPUT_WIDTH: u32 = 320;
    const INPUT_HEIGHT: u32 = 240;
    const CONFIDENCE_THRESHOLD: f32 = 0.7;
    const NMS_THRESHOLD: f32 = 0.3;

    let (orig_width, orig_height) = img.dimensions();

    let resized = img.resize_exact(INPUT_WIDTH, INPUT_HEIGHT, image::imageops::FilterType::Triangle);
    let rgb = resized.to_rgb8();

    // NCHW, normalized to (-1, 1)
    let mut input_data = vec![0.0f32; (3 * INPUT_HEIGHT * INPUT_WIDTH) as usize];
    for y in 0..INPUT_HEIGHT as usize {
        for x in 0..INPUT_WIDTH as usize {
            let pixel = rgb.get_pixel(x as u32, y as u32);
            let idx = y * INPUT_WIDTH as usize + x;
            input_data[idx] = (pixel[0] as f32 - 127.0) / 128.0;
            input_data[INPUT_HEIGHT as usize * INPUT_WIDTH as usize + idx] =
                (pixel[1] as f32 - 127.0) / 128.0;
            input_data[2 * INPUT_HEIGHT as usize * INPUT_WIDTH as usize + idx] =
                (pixel[2] as f32 - 127.0) / 128.0;
        }
    }

    let input_tensor = Tensor::from_array((
        [1usize, 3, INPUT_HEIGHT as usize, INPUT_WIDTH as usize],
        input_data.into_boxed_slice(),
    ))?;

    let outputs = session.run(ort::inputs!["input" => input_tensor])?;

    let scores_value = outputs
        .get("scores")
        .ok_or_else(|| anyhow!("No scores output"))?;
    let boxes_value = outputs
        .get("boxes")
        .ok_or_else(|| anyhow!("No boxes output"))?;

    let (scores_shape, scores_data) = scores_value.try_extract_tensor::<f32>()?;
    let (_boxes_shape, boxes_data) = boxes_value.try_extract_tensor::<f32>()?;

    // scores: [1, num_anchors, 2] (background, face); boxes: [1, num_anchors, 4]
    let num_anchors = scores_shape[1] as usize;
    let mut face_boxes = Vec::new();

    for i in 0..num_anchors {
        let confidence = scores_data[i * 2 + 1];
        if confidence > CONFIDENCE_THRESHOLD {
            let x1 = (boxes_data[i * 4] * orig_width as f32) as i32;
            let y1 = (boxes_data[i * 4 + 1] * orig_height as f32) as i32;
            let x2 = (boxes_data[i * 4 + 2] * orig_width as f32) as i32;
            let y2 = (boxes_data[i * 4 + 3] * orig_height as f32) as i32;

            let bbox = FaceBox {
                x: x1.max(0),
                y: y1.max(0),
                width: (x2 - x1).max(1),
                height: (y2 - y1).max(1),
            };

            face_boxes.push((bbox, confidence));
        }
    }

    Ok(nms(face_boxes, NMS_THRESHOLD))
}

/// Non-maximum suppression to remove overlapping detections
fn nms(mut boxes: Vec<(FaceBox, f32)>, threshold: f32) -> Vec<(FaceBox, f32)> {
    boxes.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    let mut keep = Vec::new();
    let mut suppressed = vec![false; boxes.len()];

    for i in 0..boxes.len() {
        if suppressed[i] {
            continue;
        }

        keep.push(boxes[i].clone());

        for j in (i + 1)..boxes.len() {
            if suppressed[j] {
                continue;
            }
            if compute_iou(&boxes[i].0, &boxes[j].0) > threshold {
                suppressed[j] = true;
            }
        }
    }

    keep
}

fn compute_iou(a: &FaceBox, b: &FaceBox) -> f32 {
    let x1 = a.x.max(b.x);
    let y1 = a.y.max(b.y);
    let x2 = (a.x + a.width).min(b.x + b.width);
    let y2 = (a.y + a.height).min(b.y + b.height);

    let intersection = ((x2 - x1).max(0) * (y2 - y1).max(0)) as f32;
    let area_a = (a.width * a.height) as f32;
    let area_b = (b.width * b.height) as f32;
    let union = area_a + area_b - intersection;

    if union > 0.0 {
        intersection / union
    } else {
        0.0
    }
}

/// Crop face region with 20% padding on each side. Box coordinates from the
/// detector can land outside the image; the origin is clamped to the bounds
/// before the width subtraction.
fn crop_face(img: &DynamicImage, bbox: &FaceBox, img_width: u32, img_height: u32) -> DynamicImage {
    let padding_x = (bbox.width as f32 * 0.2) as i32;
    let padding_y = (bbox.height as f32 * 0.2) as i32;

    let x = ((bbox.x - padding_x).max(0) as u32).min(img_width.saturating_sub(1));
    let y = ((bbox.y - padding_y).max(0) as u32).min(img_height.saturating_sub(1));
    let w = ((bbox.width + padding_x * 2) as u32).min(img_width - x);
    let h = ((bbox.height + padding_y * 2) as u32).min(img_height - y);

    img.crop_imm(x, y, w.max(1), h.max(1))
}

fn run_arcface_embedding(session: &mut Session, face_img: &DynamicImage) -> Result<Vec<f32>> {
    const INPUT_SIZE: u32 = 112;

    let resized = face_img.resize_exact(INPUT_SIZE, INPUT_SIZE, image::imageops::FilterType::Triangle);
    let rgb = resized.to_rgb8();

    // NCHW; ArcFace normalization is (pixel - 127.5) / 127.5
    let mut input_data = vec![0.0f32; (3 * INPUT_SIZE * INPUT_SIZE) as usize];
    for y in 0..INPUT_SIZE as usize {
        for x in 0..INPUT_SIZE as usize {
            let pixel = rgb.get_pixel(x as u32, y as u32);
            let idx = y * INPUT_SIZE as usize + x;
            input_data[idx] = (pixel[0] as f32 - 127.5) / 127.5;
            input_data[INPUT_SIZE as usize * INPUT_SIZE as usize + idx] =
                (pixel[1] as f32 - 127.5) / 127.5;
            input_data[2 * INPUT_SIZE as usize * INPUT_SIZE as usize + idx] =
                (pixel[2] as f32 - 127.5) / 127.5;
        }
    }

    let input_tensor = Tensor::from_array((
        [1usize, 3, INPUT_SIZE as usize, INPUT_SIZE as usize],
        input_data.into_boxed_slice(),
    ))?;

    // The ArcFace ONNX model uses "data" as its input name
    let outputs = session.run(ort::inputs!["data" => input_tensor])?;

    let embedding_output = outputs
        .iter()
        .next()
        .ok_or_else(|| anyhow!("No embedding output"))?;

    let (_embedding_shape, embedding_data) = embedding_output.1.try_extract_tensor::<f32>()?;

    // L2-normalize so euclidean distances land in a stable range
    let embedding_vec: Vec<f32> = embedding_data.to_vec();
    let norm: f32 = embedding_vec.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm > 0.0 {
        Ok(embedding_vec.iter().map(|x| x / norm).collect())
    } else {
        Ok(embedding_vec)
    }
}
