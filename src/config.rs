use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::error::StartupError;

/// Input size used when neither the command line nor the model says otherwise.
pub const DEFAULT_INPUT_SIZE: u32 = 224;

/// Image classification HTTP service.
///
/// Every option can also be set through the environment variable shown in
/// `--help`. All values are fixed for the lifetime of the process.
#[derive(Parser, Debug, Clone)]
#[command(name = "ferrite-classify", version, about)]
pub struct ServiceConfig {
    /// Address to bind to
    #[arg(long, env = "FERRITE_CLASSIFY_HOST", default_value = "127.0.0.1")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "FERRITE_CLASSIFY_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Log filter (error, warn, info, debug, trace or a RUST_LOG directive)
    #[arg(long, env = "FERRITE_CLASSIFY_LOG", default_value = "info")]
    pub log_level: String,

    /// Model artifact (network JSON)
    #[arg(short, long, env = "FERRITE_CLASSIFY_MODEL", default_value = "models/classifier.json")]
    pub model: PathBuf,

    /// Class label file, one `index: 'name',` per line
    #[arg(short, long, env = "FERRITE_CLASSIFY_LABELS", default_value = "models/imagenet_clsnlabel.txt")]
    pub labels: PathBuf,

    /// Directory holding index.html and other static assets
    #[arg(long, env = "FERRITE_CLASSIFY_STATIC_DIR", default_value = "static")]
    pub static_dir: PathBuf,

    /// Model input width; defaults to the model metadata, then 224
    #[arg(long, env = "FERRITE_CLASSIFY_INPUT_WIDTH")]
    pub input_width: Option<u32>,

    /// Model input height; defaults to the model metadata, then 224
    #[arg(long, env = "FERRITE_CLASSIFY_INPUT_HEIGHT")]
    pub input_height: Option<u32>,

    /// Number of ranked classes returned next to the top-1 (0 disables)
    #[arg(long, env = "FERRITE_CLASSIFY_TOP_K", default_value_t = 5)]
    pub top_k: usize,

    /// Threads running the model; 1 serializes all inference
    #[arg(long, env = "FERRITE_CLASSIFY_INFERENCE_WORKERS", default_value_t = 1)]
    pub inference_workers: usize,

    /// Inference jobs that may wait for a worker before submitters block
    #[arg(long, env = "FERRITE_CLASSIFY_INFERENCE_QUEUE", default_value_t = 16)]
    pub inference_queue: usize,

    /// Give up waiting for an inference result after this many milliseconds
    #[arg(long, env = "FERRITE_CLASSIFY_INFERENCE_TIMEOUT_MS")]
    pub inference_timeout_ms: Option<u64>,

    /// Largest accepted request body in bytes
    #[arg(long, env = "FERRITE_CLASSIFY_MAX_UPLOAD_BYTES", default_value_t = 20 * 1024 * 1024)]
    pub max_upload_bytes: usize,
}

impl ServiceConfig {
    /// Rejects values the service cannot run with.
    pub fn validate(&self) -> Result<(), StartupError> {
        if self.inference_workers == 0 {
            return Err(StartupError::Config("--inference-workers must be at least 1".into()));
        }
        if self.inference_queue == 0 {
            return Err(StartupError::Config("--inference-queue must be at least 1".into()));
        }
        if self.input_width == Some(0) || self.input_height == Some(0) {
            return Err(StartupError::Config("input dimensions must be non-zero".into()));
        }
        if self.inference_timeout_ms == Some(0) {
            return Err(StartupError::Config("--inference-timeout-ms must be positive".into()));
        }
        if self.max_upload_bytes == 0 {
            return Err(StartupError::Config("--max-upload-bytes must be positive".into()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn inference_timeout(&self) -> Option<Duration> {
        self.inference_timeout_ms.map(Duration::from_millis)
    }

    /// Picks the input size: explicit flags first, then what the model
    /// declares, then [`DEFAULT_INPUT_SIZE`].
    pub fn resolve_input_size(&self, declared: Option<(u32, u32)>) -> Result<(u32, u32), StartupError> {
        let (dw, dh) = declared.unwrap_or((DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE));
        let size = (self.input_width.unwrap_or(dw), self.input_height.unwrap_or(dh));
        if let Some(declared) = declared {
            if declared != size {
                return Err(StartupError::Config(format!(
                    "configured input size {}x{} does not match the model's {}x{}",
                    size.0, size.1, declared.0, declared.1
                )));
            }
        }
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> ServiceConfig {
        let mut argv = vec!["ferrite-classify"];
        argv.extend_from_slice(args);
        ServiceConfig::try_parse_from(argv).unwrap()
    }

    #[test]
    fn defaults() {
        let cfg = parse(&[]);
        assert_eq!(cfg.bind_addr(), "127.0.0.1:8000");
        assert_eq!(cfg.top_k, 5);
        assert_eq!(cfg.inference_workers, 1);
        assert!(cfg.inference_timeout().is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn flags_override_defaults() {
        let cfg = parse(&["--port", "9000", "--top-k", "0", "--inference-timeout-ms", "250"]);
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.top_k, 0);
        assert_eq!(cfg.inference_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let cfg = parse(&["--inference-workers", "0"]);
        assert!(matches!(cfg.validate(), Err(StartupError::Config(_))));
    }

    #[test]
    fn input_size_resolution() {
        let cfg = parse(&[]);
        assert_eq!(cfg.resolve_input_size(None).unwrap(), (224, 224));
        assert_eq!(cfg.resolve_input_size(Some((32, 32))).unwrap(), (32, 32));

        let cfg = parse(&["--input-width", "64", "--input-height", "48"]);
        assert_eq!(cfg.resolve_input_size(None).unwrap(), (64, 48));
        assert!(cfg.resolve_input_size(Some((32, 32))).is_err());
    }
}
