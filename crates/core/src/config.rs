use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_VISION_ENDPOINT: &str = "https://vision.googleapis.com/v1/images:annotate";
pub const DEFAULT_REGISTRY_ENDPOINT: &str = "https://teht.hometax.go.kr/wqAction.do?actionId=ATTABZAA001R08&screenId=UTEABAAA13&popupYn=false&realScreenId=";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Process-wide settings, loaded once at start-up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub paths: PathsConfig,
    pub ocr: OcrConfig,
    pub registry: RegistryConfig,
    pub pdf: PdfConfig,
    pub report: ReportConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Where normalized pages land; defaults to `<output_dir>/normalized`.
    pub normalized_dir: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("data/input"),
            output_dir: PathBuf::from("data/output"),
            normalized_dir: None,
        }
    }
}

impl PathsConfig {
    pub fn normalized_dir(&self) -> PathBuf {
        self.normalized_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join("normalized"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OcrBackendKind {
    #[default]
    Vision,
    Tesseract,
    Mock,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub backend: OcrBackendKind,
    pub api_key: Option<String>,
    pub endpoint: String,
    pub timeout_secs: u64,
    pub tesseract_lang: String,
    pub tesseract_data_path: Option<String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            backend: OcrBackendKind::Vision,
            api_key: None,
            endpoint: DEFAULT_VISION_ENDPOINT.to_string(),
            timeout_secs: 60,
            tesseract_lang: "kor+eng".to_string(),
            tesseract_data_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub endpoint: String,
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_REGISTRY_ENDPOINT.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// Render resolution for PDF pages.
    pub dpi: u32,
    /// Directory (or file) holding the pdfium shared library.
    pub library_path: Option<PathBuf>,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self { dpi: 200, library_path: None }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Also write each page's recognized text next to the aggregate report.
    pub write_page_text: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Append log lines to this file instead of stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), file: None }
    }
}

impl AppConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pdf.dpi == 0 {
            return Err(ConfigError::Invalid("pdf.dpi must be positive".into()));
        }
        if self.registry.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("registry.endpoint is empty".into()));
        }
        if self.ocr.backend == OcrBackendKind::Vision && self.ocr.endpoint.trim().is_empty() {
            return Err(ConfigError::Invalid("ocr.endpoint is empty".into()));
        }
        Ok(())
    }
}
