/// Seven-class facial expression classifier backed by an ONNX Runtime session.
///
/// Expects an image-classification model with a `[1, 3, S, S]` RGB input
/// normalized to `[-1, 1]` and a `[1, 7]` logit output in [`Emotion::ALL`]
/// order.
use std::path::Path;

use image::imageops::FilterType;

use crate::classification::domain::emotion_classifier::EmotionClassifier;
use crate::shared::emotion::{Classification, Emotion};
use crate::shared::frame::Frame;
use crate::shared::onnx_session::load_session;

/// Fallback input side when the model declares a dynamic shape.
const DEFAULT_INPUT_SIZE: u32 = 224;

pub struct OnnxEmotionClassifier {
    session: ort::session::Session,
    input_size: u32,
}

impl OnnxEmotionClassifier {
    pub fn new(model_path: &Path) -> Result<Self, Box<dyn std::error::Error>> {
        let session = load_session(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { ref shape, .. }
                    if shape.len() >= 4 && shape[2] > 0 =>
                {
                    Some(shape[2] as u32)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::info!(
            "Loaded emotion model {} (input {input_size}px)",
            model_path.display()
        );

        Ok(Self {
            session,
            input_size,
        })
    }
}

impl EmotionClassifier for OnnxEmotionClassifier {
    fn classify(&mut self, face: &Frame) -> Result<Classification, Box<dyn std::error::Error>> {
        let input = preprocess(face, self.input_size)?;
        let input_value = ort::value::Tensor::from_array(input)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("emotion model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let logits: Vec<f32> = tensor.iter().copied().collect();
        if logits.len() != Emotion::ALL.len() {
            return Err(format!(
                "emotion model produced {} logits, expected {}",
                logits.len(),
                Emotion::ALL.len()
            )
            .into());
        }

        let probabilities = softmax(&logits);
        let (index, confidence) = argmax(&probabilities).ok_or("empty probability vector")?;
        let emotion = Emotion::from_index(index).ok_or("class index out of range")?;
        Ok(Classification {
            emotion,
            confidence,
        })
    }
}

/// Resizes a face crop to `size` × `size` and lays it out as NCHW float32,
/// each channel mapped from `[0, 255]` to `[-1, 1]`.
fn preprocess(
    face: &Frame,
    size: u32,
) -> Result<ndarray::Array4<f32>, Box<dyn std::error::Error>> {
    let rgb = face.to_rgb_image().ok_or("face crop is not RGB")?;
    let resized = image::imageops::resize(&rgb, size, size, FilterType::Triangle);

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, size as usize, size as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            tensor[[0, c, y as usize, x as usize]] = (pixel.0[c] as f32 / 255.0 - 0.5) / 0.5;
        }
    }
    Ok(tensor)
}

fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exps: Vec<f32> = logits.iter().map(|&x| (x - max_logit).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|&x| x / sum).collect()
}

/// First index holding the maximum value, ties resolved toward the lower index.
fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
}
