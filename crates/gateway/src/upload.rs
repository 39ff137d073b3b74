use crate::errors::ValidationError;
use image::ImageFormat;

pub const ALLOWED_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// One uploaded file as received, before any validation.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedImage {
    pub fn new(filename: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            bytes,
        }
    }

    pub fn extension(&self) -> Option<String> {
        extension_of(&self.filename)
    }
}

/// Text after the last `.`, lowercased.
pub fn extension_of(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
}

pub fn allowed_file(filename: &str) -> bool {
    extension_of(filename).is_some_and(|ext| ALLOWED_EXTENSIONS.contains(&ext.as_str()))
}

/// Encoding used when writing the annotated copy back out.
pub fn output_format(filename: &str) -> (ImageFormat, &'static str) {
    match extension_of(filename).as_deref() {
        Some("png") => (ImageFormat::Png, "image/png"),
        _ => (ImageFormat::Jpeg, "image/jpeg"),
    }
}

/// Reduce a client-supplied name to a single safe path component.
pub fn sanitize(filename: &str) -> Result<String, ValidationError> {
    let basename = filename.rsplit(['/', '\\']).next().unwrap_or_default();

    let cleaned: String = sanitize_filename::sanitize(basename)
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');

    if cleaned.is_empty() || cleaned == ".." || !allowed_file(cleaned) {
        return Err(ValidationError::InvalidFilename);
    }

    Ok(cleaned.to_string())
}

/// An upload that passed every check, with the key-safe name it is stored
/// under.
#[derive(Debug, Clone)]
pub struct ValidatedUpload {
    pub image: UploadedImage,
    pub name: String,
}

impl ValidatedUpload {
    pub fn output_format(&self) -> (ImageFormat, &'static str) {
        output_format(&self.name)
    }
}

pub fn validate(upload: Option<UploadedImage>) -> Result<ValidatedUpload, ValidationError> {
    let image = upload.ok_or(ValidationError::MissingFile)?;

    if image.filename.is_empty() {
        return Err(ValidationError::EmptyFilename);
    }
    if !allowed_file(&image.filename) {
        return Err(ValidationError::DisallowedExtension);
    }

    let name = sanitize(&image.filename)?;
    Ok(ValidatedUpload { image, name })
}
