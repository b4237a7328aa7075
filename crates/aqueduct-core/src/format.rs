//! Stream formats.

use aqueduct_utils::fourcc;

/// `'lpcm'`
pub const FORMAT_LINEAR_PCM: u32 = fourcc(b"lpcm");

pub const FORMAT_FLAG_IS_FLOAT: u32 = 1 << 0;
pub const FORMAT_FLAG_IS_BIG_ENDIAN: u32 = 1 << 1;
pub const FORMAT_FLAG_IS_SIGNED_INTEGER: u32 = 1 << 2;
pub const FORMAT_FLAG_IS_PACKED: u32 = 1 << 3;
pub const FORMAT_FLAG_IS_NON_INTERLEAVED: u32 = 1 << 5;

/// Audio Stream Basic Description structure.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StreamFormat {
    pub sample_rate: f64,
    pub format_id: u32,
    pub format_flags: u32,
    pub bytes_per_packet: u32,
    pub frames_per_packet: u32,
    pub bytes_per_frame: u32,
    pub channels_per_frame: u32,
    pub bits_per_channel: u32,
    pub reserved: u32,
}

impl StreamFormat {
    /// Packed 32-bit float, one buffer per channel.
    ///
    /// This is the canonical render format: each buffer of a buffer list
    /// carries one channel and `byte_size / 4` frames.
    pub const fn float32_non_interleaved(sample_rate: f64, channels: u32) -> Self {
        Self {
            sample_rate,
            format_id: FORMAT_LINEAR_PCM,
            format_flags: FORMAT_FLAG_IS_FLOAT
                | FORMAT_FLAG_IS_PACKED
                | FORMAT_FLAG_IS_NON_INTERLEAVED,
            bytes_per_packet: 4,
            frames_per_packet: 1,
            bytes_per_frame: 4,
            channels_per_frame: channels,
            bits_per_channel: 32,
            reserved: 0,
        }
    }

    /// Packed interleaved signed 16-bit integer PCM.
    pub const fn int16_interleaved(sample_rate: f64, channels: u32) -> Self {
        Self {
            sample_rate,
            format_id: FORMAT_LINEAR_PCM,
            format_flags: FORMAT_FLAG_IS_SIGNED_INTEGER | FORMAT_FLAG_IS_PACKED,
            bytes_per_packet: 2 * channels,
            frames_per_packet: 1,
            bytes_per_frame: 2 * channels,
            channels_per_frame: channels,
            bits_per_channel: 16,
            reserved: 0,
        }
    }

    pub const fn is_linear_pcm(&self) -> bool {
        self.format_id == FORMAT_LINEAR_PCM
    }

    pub const fn is_float(&self) -> bool {
        self.format_flags & FORMAT_FLAG_IS_FLOAT != 0
    }

    pub const fn is_non_interleaved(&self) -> bool {
        self.format_flags & FORMAT_FLAG_IS_NON_INTERLEAVED != 0
    }

    /// Number of buffers a buffer list in this format carries.
    pub const fn buffer_count(&self) -> u32 {
        if self.is_non_interleaved() {
            self.channels_per_frame
        } else {
            1
        }
    }

    /// Bytes one buffer needs to hold `frames` frames.
    pub const fn bytes_for_frames(&self, frames: u32) -> u32 {
        frames.saturating_mul(self.bytes_per_frame)
    }
}
