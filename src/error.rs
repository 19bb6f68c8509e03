use std::path::PathBuf;

pub type VideoMakerResult<T> = Result<T, VideoMakerError>;

#[derive(thiserror::Error, Debug)]
pub enum VideoMakerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("no image files found in {}", .0.display())]
    NoImages(PathBuf),

    #[error("failed to process image {}: {message}", .path.display())]
    Image { path: PathBuf, message: String },

    #[error("encoding error: {0}")]
    Encode(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl VideoMakerError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn encode(msg: impl Into<String>) -> Self {
        Self::Encode(msg.into())
    }

    pub fn image(path: impl Into<PathBuf>, err: &anyhow::Error) -> Self {
        Self::Image {
            path: path.into(),
            message: format!("{err:#}"),
        }
    }

    /// Configuration problems and an empty input folder are reported to the
    /// user as-is; everything else is a failure of the run itself.
    pub fn is_user_input_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::NoImages(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(VideoMakerError::config("x")
            .to_string()
            .contains("configuration error:"));
        assert!(VideoMakerError::encode("x")
            .to_string()
            .contains("encoding error:"));
        assert_eq!(VideoMakerError::Cancelled.to_string(), "operation cancelled");
    }

    #[test]
    fn no_images_names_the_folder() {
        let err = VideoMakerError::NoImages(PathBuf::from("/photos/empty"));
        assert_eq!(err.to_string(), "no image files found in /photos/empty");
        assert!(err.is_user_input_error());
    }

    #[test]
    fn image_error_keeps_context_chain() {
        let inner = anyhow::anyhow!("unexpected EOF").context("decoding a.png");
        let err = VideoMakerError::image("a.png", &inner);
        let text = err.to_string();
        assert!(text.contains("a.png"));
        assert!(text.contains("unexpected EOF"));
        assert!(!err.is_user_input_error());
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = VideoMakerError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
