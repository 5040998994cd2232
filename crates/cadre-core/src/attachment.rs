//! Files attached to a one-shot prompt.

use base64::Engine;
use cadre_provider::{ContentPart, ImageSource};
use std::path::{Path, PathBuf};
use tracing::debug;

/// A file to send along with a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attachment {
    /// Read from disk when the message is built.
    Path(PathBuf),
    /// In-memory content.
    Bytes {
        name: String,
        data: Vec<u8>,
        /// Guessed from the name when absent.
        media_type: Option<String>,
    },
}

impl Attachment {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn bytes(name: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self::Bytes {
            name: name.into(),
            data: data.into(),
            media_type: None,
        }
    }

    fn name(&self) -> String {
        match self {
            Self::Path(path) => path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Self::Bytes { name, .. } => name.clone(),
        }
    }

    /// Convert into message parts.
    ///
    /// Text is inlined in a `<file>` block. Images become image parts and
    /// other binaries become base64 file parts. A read failure produces a
    /// visible note instead of an error.
    pub async fn to_parts(&self) -> Vec<ContentPart> {
        let name = self.name();
        let (data, declared) = match self {
            Self::Path(path) => match tokio::fs::read(path).await {
                Ok(data) => (data, None),
                Err(e) => {
                    debug!(path = %path.display(), error = %e, "Failed to read attachment");
                    return vec![ContentPart::text(format!(
                        "[error reading attachment {}: {e}]",
                        path.display()
                    ))];
                }
            },
            Self::Bytes {
                data, media_type, ..
            } => (data.clone(), media_type.clone()),
        };

        let media_type = declared.unwrap_or_else(|| guess_media_type(Path::new(&name)).to_string());

        if is_text(&media_type) {
            if let Ok(text) = String::from_utf8(data.clone()) {
                return vec![ContentPart::text(format!(
                    "<file name=\"{name}\">\n{text}\n</file>"
                ))];
            }
        }

        let encoded = base64::engine::general_purpose::STANDARD.encode(&data);
        if media_type.starts_with("image/") {
            vec![ContentPart::Image {
                source: ImageSource::Base64 {
                    media_type,
                    data: encoded,
                },
            }]
        } else {
            vec![ContentPart::File {
                name,
                media_type,
                data: encoded,
            }]
        }
    }
}

fn is_text(media_type: &str) -> bool {
    media_type.starts_with("text/")
        || matches!(
            media_type,
            "application/json" | "application/yaml" | "application/toml" | "application/xml"
        )
}

/// Guess a media type from the file extension.
///
/// Unknown extensions are treated as text and fall back to binary if the
/// content is not UTF-8.
pub fn guess_media_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "pdf" => "application/pdf",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "json" => "application/json",
        "yaml" | "yml" => "application/yaml",
        "toml" => "application/toml",
        "xml" => "application/xml",
        "html" | "htm" => "text/html",
        "md" => "text/markdown",
        "csv" => "text/csv",
        _ => "text/plain",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_text_file_is_inlined() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.md");
        std::fs::write(&path, "# Notes").unwrap();

        let parts = Attachment::path(&path).to_parts().await;
        assert_eq!(
            parts,
            vec![ContentPart::text("<file name=\"notes.md\">\n# Notes\n</file>")]
        );
    }

    #[tokio::test]
    async fn test_binary_becomes_file_part() {
        let parts = Attachment::bytes("report.pdf", vec![0x25, 0x50, 0xff])
            .to_parts()
            .await;
        match &parts[0] {
            ContentPart::File {
                name,
                media_type,
                data,
            } => {
                assert_eq!(name, "report.pdf");
                assert_eq!(media_type, "application/pdf");
                assert_eq!(data, "JVD/");
            }
            other => panic!("unexpected part: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_image_becomes_image_part() {
        let parts = Attachment::bytes("shot.PNG", vec![1, 2, 3]).to_parts().await;
        assert!(matches!(
            &parts[0],
            ContentPart::Image {
                source: ImageSource::Base64 { media_type, .. }
            } if media_type == "image/png"
        ));
    }

    #[tokio::test]
    async fn test_non_utf8_unknown_extension_is_binary() {
        let parts = Attachment::bytes("blob.bin", vec![0xff, 0xfe]).to_parts().await;
        assert!(matches!(&parts[0], ContentPart::File { .. }));
    }

    #[tokio::test]
    async fn test_missing_file_is_a_visible_note() {
        let parts = Attachment::path("/definitely/not/here.txt").to_parts().await;
        match &parts[0] {
            ContentPart::Text { text } => {
                assert!(text.starts_with("[error reading attachment /definitely/not/here.txt"))
            }
            other => panic!("unexpected part: {other:?}"),
        }
    }
}
