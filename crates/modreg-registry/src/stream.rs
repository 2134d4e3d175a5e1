//! Re-readable blob sources for push operations.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::RegistryError;
use crate::oci::{Descriptor, DigestAlgorithm, MediaType, ANNOTATION_TITLE};

/// Readable and rewindable content.
pub trait BlobSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> BlobSource for T {}

/// A named, re-readable blob to upload.
///
/// Pushing reads each blob twice: once to compute its descriptor and once to
/// upload it. Both reads start with [`StreamDescriptor::reset`].
pub struct StreamDescriptor {
    stream: Box<dyn BlobSource>,
    media_type: MediaType,
    annotations: BTreeMap<String, String>,
}

impl StreamDescriptor {
    /// Wraps a stream with the media type of its content.
    #[must_use]
    pub fn new(stream: impl BlobSource + 'static, media_type: MediaType) -> Self {
        Self {
            stream: Box::new(stream),
            media_type,
            annotations: BTreeMap::new(),
        }
    }

    /// Wraps in-memory content.
    #[must_use]
    pub fn from_bytes(data: impl Into<Vec<u8>>, media_type: MediaType) -> Self {
        Self::new(Cursor::new(data.into()), media_type)
    }

    /// Opens a file as a blob source.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn from_file(path: &Path, media_type: MediaType) -> Result<Self, RegistryError> {
        let file = std::fs::File::open(path).map_err(|e| RegistryError::IoError {
            path: path.to_path_buf(),
            source: e,
        })?;
        Ok(Self::new(file, media_type))
    }

    /// Adds an annotation that is copied into the blob's descriptor.
    #[must_use]
    pub fn with_annotation(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }

    /// Sets the title annotation (the file name the blob restores to).
    #[must_use]
    pub fn with_title(self, title: impl Into<String>) -> Self {
        self.with_annotation(ANNOTATION_TITLE, title)
    }

    /// Returns the media type.
    #[must_use]
    pub const fn media_type(&self) -> &MediaType {
        &self.media_type
    }

    /// Rewinds the stream to the beginning.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot seek.
    pub fn reset(&mut self) -> Result<(), RegistryError> {
        self.stream
            .seek(SeekFrom::Start(0))
            .map(|_| ())
            .map_err(|e| RegistryError::IoError {
                path: PathBuf::new(),
                source: e,
            })
    }

    /// Rewinds the stream and computes the descriptor of its full content.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be rewound or read.
    pub fn descriptor(&mut self, algorithm: DigestAlgorithm) -> Result<Descriptor, RegistryError> {
        self.reset()?;
        let (digest, size) =
            algorithm
                .digest_reader(&mut self.stream)
                .map_err(|e| RegistryError::IoError {
                    path: PathBuf::new(),
                    source: e,
                })?;

        let mut descriptor = Descriptor::new(self.media_type.clone(), digest, size);
        if !self.annotations.is_empty() {
            descriptor.annotations = Some(self.annotations.clone());
        }
        Ok(descriptor)
    }

    /// Rewinds the stream and reads its full content.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be rewound or read.
    pub fn read_all(&mut self) -> Result<Vec<u8>, RegistryError> {
        self.reset()?;
        let mut data = Vec::new();
        self.stream
            .read_to_end(&mut data)
            .map_err(|e| RegistryError::IoError {
                path: PathBuf::new(),
                source: e,
            })?;
        Ok(data)
    }
}

impl fmt::Debug for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamDescriptor")
            .field("media_type", &self.media_type)
            .field("annotations", &self.annotations)
            .finish_non_exhaustive()
    }
}
