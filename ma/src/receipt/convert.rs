//! Document to text conversion

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::error::ReceiptError;
use crate::config::ReceiptsConfig;

/// Argument replaced by the document path
pub const INPUT_PLACEHOLDER: &str = "{input}";

/// Turns a source document into plain text
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    async fn to_text(&self, path: &Path) -> Result<String, ReceiptError>;
}

/// Reads text documents directly and shells out for PDFs
#[derive(Debug, Clone)]
pub struct CommandConverter {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandConverter {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }

    pub fn from_config(config: &ReceiptsConfig) -> Self {
        debug!(command = %config.pdf_command, "CommandConverter::from_config: called");
        Self::new(
            config.pdf_command.clone(),
            config.pdf_args.clone(),
            Duration::from_millis(config.convert_timeout_ms),
        )
    }

    /// Arguments with the document path substituted in
    fn command_args(&self, path: &Path) -> Vec<String> {
        let input = path.display().to_string();
        let mut substituted = false;
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| {
                if arg.contains(INPUT_PLACEHOLDER) {
                    substituted = true;
                    arg.replace(INPUT_PLACEHOLDER, &input)
                } else {
                    arg.clone()
                }
            })
            .collect();
        if !substituted {
            args.push(input);
        }
        args
    }

    async fn run_pdf_command(&self, path: &Path) -> Result<String, ReceiptError> {
        let args = self.command_args(path);
        debug!(command = %self.command, ?args, "CommandConverter::run_pdf_command: spawning");

        let output = match tokio::time::timeout(
            self.timeout,
            tokio::process::Command::new(&self.command)
                .args(&args)
                .kill_on_drop(true)
                .output(),
        )
        .await
        {
            Ok(Ok(output)) => {
                debug!(status = ?output.status, "CommandConverter::run_pdf_command: command completed");
                output
            }
            Ok(Err(e)) => {
                warn!(command = %self.command, error = %e, "CommandConverter::run_pdf_command: failed to spawn");
                return Err(ReceiptError::ConversionFailed {
                    command: self.command.clone(),
                    message: e.to_string(),
                });
            }
            Err(_) => {
                warn!(command = %self.command, "CommandConverter::run_pdf_command: timed out");
                return Err(ReceiptError::Timeout(self.timeout));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(ReceiptError::ConversionFailed {
                command: self.command.clone(),
                message: if stderr.is_empty() {
                    format!("exited with {}", output.status)
                } else {
                    stderr
                },
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for CommandConverter {
    fn default() -> Self {
        Self::from_config(&ReceiptsConfig::default())
    }
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default()
}

#[async_trait]
impl DocumentConverter for CommandConverter {
    async fn to_text(&self, path: &Path) -> Result<String, ReceiptError> {
        debug!(path = %path.display(), "CommandConverter::to_text: called");
        let text = match extension(path).as_str() {
            "txt" | "md" => tokio::fs::read_to_string(path).await?,
            "pdf" => {
                if !tokio::fs::try_exists(path).await? {
                    return Err(ReceiptError::Io(std::io::Error::new(
                        std::io::ErrorKind::NotFound,
                        format!("{} not found", path.display()),
                    )));
                }
                self.run_pdf_command(path).await?
            }
            "" => return Err(ReceiptError::UnsupportedFormat(path.display().to_string())),
            other => return Err(ReceiptError::UnsupportedFormat(other.to_string())),
        };

        if text.trim().is_empty() {
            return Err(ReceiptError::EmptyDocument);
        }
        debug!(len = text.len(), "CommandConverter::to_text: converted");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_command_args_substitutes_input() {
        let converter = CommandConverter::default();
        let args = converter.command_args(Path::new("/tmp/r.pdf"));
        assert_eq!(args, vec!["-layout", "/tmp/r.pdf", "-"]);
    }

    #[test]
    fn test_command_args_appends_input() {
        let converter = CommandConverter::new("mutool", vec!["draw".to_string()], Duration::from_secs(1));
        let args = converter.command_args(Path::new("r.pdf"));
        assert_eq!(args, vec!["draw", "r.pdf"]);
    }

    #[tokio::test]
    async fn test_reads_text_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("receipt.txt");
        std::fs::write(&path, "LEITE 5,00").unwrap();

        let text = CommandConverter::default().to_text(&path).await.unwrap();
        assert_eq!(text, "LEITE 5,00");
    }

    #[tokio::test]
    async fn test_empty_document() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("receipt.md");
        std::fs::write(&path, "  \n").unwrap();

        let err = CommandConverter::default().to_text(&path).await.unwrap_err();
        assert!(matches!(err, ReceiptError::EmptyDocument));
    }

    #[tokio::test]
    async fn test_unsupported_format() {
        let err = CommandConverter::default()
            .to_text(Path::new("receipt.docx"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReceiptError::UnsupportedFormat(ext) if ext == "docx"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pdf_through_command() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("receipt.pdf");
        std::fs::write(&path, "CAFE 38,99").unwrap();

        let converter = CommandConverter::new("cat", vec![], Duration::from_secs(5));
        let text = converter.to_text(&path).await.unwrap();
        assert_eq!(text, "CAFE 38,99");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pdf_command_failure() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("receipt.pdf");
        std::fs::write(&path, "x").unwrap();

        let converter = CommandConverter::new("false", vec![], Duration::from_secs(5));
        let err = converter.to_text(&path).await.unwrap_err();
        assert!(matches!(err, ReceiptError::ConversionFailed { command, .. } if command == "false"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pdf_command_timeout() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("receipt.pdf");
        std::fs::write(&path, "x").unwrap();

        let converter = CommandConverter::new(
            "sh",
            vec!["-c".to_string(), "sleep 5".to_string()],
            Duration::from_millis(100),
        );
        let err = converter.to_text(&path).await.unwrap_err();
        assert!(matches!(err, ReceiptError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_missing_pdf() {
        let err = CommandConverter::default()
            .to_text(Path::new("/nonexistent/receipt.pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ReceiptError::Io(_)));
    }
}
