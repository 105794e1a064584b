//! ArcFace face encoder via ONNX Runtime.
//!
//! Used for roster enrollment: every roster photo is treated as an already
//! cropped face and mapped to a 512-dimensional descriptor with the
//! w600k_r50 ArcFace model.

use crate::types::Embedding;
use image::imageops::FilterType;
use image::{DynamicImage, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

const ARCFACE_INPUT_SIZE: usize = 112;
const ARCFACE_MEAN: f32 = 127.5;
const ARCFACE_STD: f32 = 127.5;
/// Length of the descriptors produced by [`ArcFaceEncoder`].
pub const ARCFACE_EMBEDDING_DIM: usize = 512;
const ARCFACE_MODEL_VERSION: &str = "w600k_r50";

/// File name of the ArcFace model inside the model directory.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EncoderError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Maps a face image to a descriptor.
///
/// `Ok(None)` means the image holds no usable face.
pub trait FaceEncoder {
    fn encode(&mut self, image: &DynamicImage) -> Result<Option<Embedding>, EncoderError>;
}

/// ArcFace-based encoder.
pub struct ArcFaceEncoder {
    session: Session,
}

impl ArcFaceEncoder {
    /// Load the ArcFace ONNX model from the given path.
    pub fn load(model_path: &Path) -> Result<Self, EncoderError> {
        if !model_path.exists() {
            return Err(EncoderError::ModelNotFound(model_path.display().to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = %model_path.display(),
            inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
            "loaded ArcFace model"
        );

        Ok(Self { session })
    }

    /// Resize to the model input and convert to a NCHW float tensor.
    fn preprocess(image: &DynamicImage) -> Array4<f32> {
        let size = ARCFACE_INPUT_SIZE as u32;
        let rgb: RgbImage = image.resize_exact(size, size, FilterType::Triangle).to_rgb8();

        let mut tensor = Array4::<f32>::zeros((1, 3, ARCFACE_INPUT_SIZE, ARCFACE_INPUT_SIZE));
        for (x, y, pixel) in rgb.enumerate_pixels() {
            for c in 0..3 {
                let v = (pixel[c] as f32 - ARCFACE_MEAN) / ARCFACE_STD;
                tensor[[0, c, y as usize, x as usize]] = v;
            }
        }
        tensor
    }
}

impl FaceEncoder for ArcFaceEncoder {
    fn encode(&mut self, image: &DynamicImage) -> Result<Option<Embedding>, EncoderError> {
        if image.width() == 0 || image.height() == 0 {
            return Ok(None);
        }

        let input = Self::preprocess(image);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| EncoderError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let raw: Vec<f32> = raw_data.to_vec();
        if raw.len() != ARCFACE_EMBEDDING_DIM {
            return Err(EncoderError::InferenceFailed(format!(
                "expected {ARCFACE_EMBEDDING_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(Some(Embedding {
            values: l2_normalize(raw),
            model_version: Some(ARCFACE_MODEL_VERSION.to_string()),
        }))
    }
}

fn l2_normalize(raw: Vec<f32>) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_preprocess_output_shape() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(300, 200, Rgb([128, 128, 128])));
        let tensor = ArcFaceEncoder::preprocess(&img);
        assert_eq!(tensor.shape(), &[1, 3, ARCFACE_INPUT_SIZE, ARCFACE_INPUT_SIZE]);
    }

    #[test]
    fn test_preprocess_channel_order_and_normalization() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(112, 112, Rgb([255, 0, 128])));
        let tensor = ArcFaceEncoder::preprocess(&img);
        assert!((tensor[[0, 0, 5, 5]] - 1.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 5, 5]] + 1.0).abs() < 1e-6);
        let expected = (128.0 - ARCFACE_MEAN) / ARCFACE_STD;
        assert!((tensor[[0, 2, 5, 5]] - expected).abs() < 1e-6);
    }

    #[test]
    fn test_l2_normalize() {
        let v = l2_normalize(vec![3.0, 4.0]);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert_eq!(l2_normalize(vec![0.0, 0.0]), vec![0.0, 0.0]);
    }

    #[test]
    fn test_load_missing_model() {
        let err = ArcFaceEncoder::load(Path::new("/nonexistent/w600k_r50.onnx")).err();
        assert!(matches!(err, Some(EncoderError::ModelNotFound(_))));
    }
}
