// src/model_config.rs
use image::imageops::FilterType;
use serde::Deserialize;
use std::path::Path;

pub const PREPROCESSOR_CONFIG_FILE: &str = "preprocessor_config.json";

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PreprocessorConfig {
    pub do_normalize: bool,
    /// Multiply by `rescale_factor`; when unset samples are divided by 255.
    pub do_rescale: bool,
    pub image_mean: [f32; 3],
    pub image_std: [f32; 3],
    /// PIL resample code: 0 nearest, 1 lanczos, 2 bilinear, 3 bicubic, 4 box, 5 hamming.
    pub resample: u32,
    pub rescale_factor: f32,
    pub size: ImageSize,
    /// Set when the exported graph ends in raw logits instead of a softmax layer.
    pub apply_softmax: bool,
    pub model_version: Option<String>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ImageSize {
    pub height: usize,
    pub width: usize,
}

impl Default for ImageSize {
    fn default() -> Self {
        Self {
            height: 224,
            width: 224,
        }
    }
}

impl Default for PreprocessorConfig {
    fn default() -> Self {
        Self {
            do_normalize: false,
            do_rescale: false,
            image_mean: [0.0; 3],
            image_std: [1.0; 3],
            resample: 3,
            rescale_factor: 1.0 / 255.0,
            size: ImageSize::default(),
            apply_softmax: false,
            model_version: None,
        }
    }
}

impl PreprocessorConfig {
    /// Reads `preprocessor_config.json` from `model_dir`, falling back to the
    /// defaults the classifier was trained with when the file is absent.
    pub fn load(model_dir: &Path) -> Result<Self, crate::oct_model::ModelError> {
        let path = model_dir.join(PREPROCESSOR_CONFIG_FILE);
        if !path.exists() {
            tracing::info!(path = %path.display(), "no preprocessor config, using defaults");
            return Ok(Self::default());
        }

        let file = std::fs::File::open(&path)?;
        let config: Self = serde_json::from_reader(file)?;
        config.filter_type()?;
        tracing::info!(?config, "preprocessor config loaded");
        Ok(config)
    }

    pub fn filter_type(&self) -> Result<FilterType, crate::oct_model::ModelError> {
        match self.resample {
            0 => Ok(FilterType::Nearest),
            1 => Ok(FilterType::Lanczos3),
            2 | 4 | 5 => Ok(FilterType::Triangle),
            3 => Ok(FilterType::CatmullRom),
            other => Err(crate::oct_model::ModelError::InvalidResample(other)),
        }
    }

    /// Per-channel value transform applied to an 8-bit sample.
    pub fn scale(&self, channel: usize, raw: u8) -> f32 {
        let mut value = raw as f32;
        if self.do_rescale {
            value *= self.rescale_factor;
        } else {
            value /= 255.0;
        }
        if self.do_normalize {
            value = (value - self.image_mean[channel]) / self.image_std[channel];
        }
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oct_model::ModelError;

    #[test]
    fn defaults_match_training_input() {
        let config = PreprocessorConfig::default();
        assert_eq!(config.size, ImageSize { height: 224, width: 224 });
        assert_eq!(config.filter_type().unwrap(), FilterType::CatmullRom);
        assert_eq!(config.scale(0, 0), 0.0);
        assert_eq!(config.scale(1, 255), 1.0);
        assert!(!config.apply_softmax);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: PreprocessorConfig =
            serde_json::from_str(r#"{"apply_softmax": true, "resample": 2}"#).unwrap();
        assert!(config.apply_softmax);
        assert_eq!(config.filter_type().unwrap(), FilterType::Triangle);
        assert_eq!(config.size.width, 224);
        assert!(!config.do_rescale);
    }

    #[test]
    fn default_scaling_divides_by_255() {
        let config = PreprocessorConfig::default();
        for raw in 0..=255u8 {
            assert_eq!(config.scale(0, raw), raw as f32 / 255.0, "sample {raw}");
        }
    }

    #[test]
    fn explicit_rescale_factor_is_multiplied() {
        let config = PreprocessorConfig {
            do_rescale: true,
            rescale_factor: 0.5,
            ..Default::default()
        };
        assert_eq!(config.scale(0, 200), 100.0);
    }

    #[test]
    fn normalization_uses_mean_and_std() {
        let config = PreprocessorConfig {
            do_normalize: true,
            image_mean: [0.5; 3],
            image_std: [0.5; 3],
            ..Default::default()
        };
        assert_eq!(config.scale(2, 255), 1.0);
        assert_eq!(config.scale(2, 0), -1.0);
    }

    #[test]
    fn unknown_resample_code_is_rejected() {
        let config = PreprocessorConfig {
            resample: 9,
            ..Default::default()
        };
        assert!(config.filter_type().is_err());
    }

    fn model_dir_with_config(name: &str, contents: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("retina_oct_{name}_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(PREPROCESSOR_CONFIG_FILE), contents).unwrap();
        dir
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = model_dir_with_config(
            "config_ok",
            r#"{"size": {"height": 256, "width": 256}, "model_version": "oct-v2"}"#,
        );
        let config = PreprocessorConfig::load(&dir).unwrap();
        assert_eq!(config.size, ImageSize { height: 256, width: 256 });
        assert_eq!(config.model_version.as_deref(), Some("oct-v2"));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn malformed_config_file_is_fatal() {
        let dir = model_dir_with_config("config_malformed", "{ \"resample\": ");
        let err = PreprocessorConfig::load(&dir).unwrap_err();
        assert!(matches!(err, ModelError::Config(_)), "{err:?}");
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn unknown_resample_in_config_file_is_fatal() {
        let dir = model_dir_with_config("config_resample", r#"{"resample": 9}"#);
        let err = PreprocessorConfig::load(&dir).unwrap_err();
        assert!(matches!(err, ModelError::InvalidResample(9)), "{err:?}");
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join("retina_oct_no_config_here");
        let config = PreprocessorConfig::load(&dir).unwrap();
        assert_eq!(config, PreprocessorConfig::default());
    }
}
