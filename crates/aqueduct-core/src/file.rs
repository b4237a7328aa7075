//! Audio files.
//!
//! A file is opened by its native constructor and closed by its native
//! dispose, so it starts `Open` and only ever moves to `Closed`.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::{CreateArgs, Engine};
use crate::error::Result;
use crate::format::StreamFormat;
use crate::handle::ResourceHandle;
use crate::property::{ids, PropertyAddress};

#[derive(Debug)]
pub struct AudioFile {
    handle: ResourceHandle,
    path: PathBuf,
}

impl AudioFile {
    pub fn open(engine: Arc<dyn Engine>, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let handle = ResourceHandle::create(engine, &CreateArgs::File { path })?;
        Ok(Self {
            handle,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn data_format(&self) -> Result<StreamFormat> {
        self.handle
            .get_property(PropertyAddress::global(ids::FILE_DATA_FORMAT))
    }

    pub fn packet_count(&self) -> Result<u64> {
        self.handle
            .get_property(PropertyAddress::global(ids::FILE_AUDIO_DATA_PACKET_COUNT))
    }

    /// Estimated duration in seconds.
    pub fn duration(&self) -> Result<f64> {
        self.handle
            .get_property(PropertyAddress::global(ids::FILE_ESTIMATED_DURATION))
    }

    /// Close the file. Same as [`ResourceHandle::teardown`].
    pub fn close(&mut self) {
        self.handle.teardown();
    }
}

impl Deref for AudioFile {
    type Target = ResourceHandle;

    fn deref(&self) -> &ResourceHandle {
        &self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Reason};
    use crate::lifecycle::LifecycleState;
    use crate::soft::{SoftEngine, VirtualFile};

    #[test]
    fn test_file_metadata() {
        let engine = Arc::new(SoftEngine::new());
        let format = StreamFormat::int16_interleaved(48_000.0, 2);
        engine.add_virtual_file(
            "/audio/take1.wav",
            VirtualFile {
                format,
                packet_count: 96_000,
            },
        );

        let mut file = AudioFile::open(engine.clone(), "/audio/take1.wav").unwrap();
        assert_eq!(file.state(), LifecycleState::Open);
        assert_eq!(file.path(), Path::new("/audio/take1.wav"));
        assert_eq!(file.data_format().unwrap(), format);
        assert_eq!(file.packet_count().unwrap(), 96_000);
        assert_eq!(file.duration().unwrap(), 2.0);

        file.close();
        assert_eq!(file.state(), LifecycleState::Closed);
        assert_eq!(engine.object_count(), 0);
        assert_eq!(
            file.packet_count(),
            Err(Error::Fatal(Reason::InvalidHandle))
        );
    }

    #[test]
    fn test_missing_file() {
        let engine = Arc::new(SoftEngine::new());
        let err = AudioFile::open(engine, "/audio/missing.wav").unwrap_err();
        assert_eq!(err, Error::Fatal(Reason::FileNotFound));
    }
}
