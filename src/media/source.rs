use super::MediaOptions;
use crate::Result;
use std::path::Path;

/// Audio source backed by a raw μ-law file.
///
/// The file is handed out one packet-sized frame at a time; the final
/// frame may be shorter than [`MediaOptions::buffer_size`]. A leading
/// RIFF/WAVE header is skipped so that both headerless captures and
/// `.wav` containers of already-encoded μ-law play correctly.
pub struct UlawSource {
    data: Vec<u8>,
    pos: usize,
    frame_size: usize,
}

impl UlawSource {
    pub async fn open(path: impl AsRef<Path>, opts: &MediaOptions) -> Result<Self> {
        let data = tokio::fs::read(path).await?;
        Ok(Self::from_bytes(data, opts))
    }

    pub fn from_bytes(data: Vec<u8>, opts: &MediaOptions) -> Self {
        let pos = wav_data_offset(&data);
        UlawSource {
            data,
            pos,
            frame_size: opts.buffer_size(),
        }
    }

    /// Next frame of payload bytes, or `None` once the file is drained.
    pub fn next_frame(&mut self) -> Option<&[u8]> {
        if self.pos >= self.data.len() {
            return None;
        }
        let end = usize::min(self.pos + self.frame_size, self.data.len());
        let frame = &self.data[self.pos..end];
        self.pos = end;
        Some(frame)
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

/// Offset of the audio payload: past the `data` chunk header for RIFF/WAVE
/// files, 0 for headerless raw captures.
fn wav_data_offset(data: &[u8]) -> usize {
    if data.len() < 12 || &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return 0;
    }
    let mut pos = 12;
    while pos + 8 <= data.len() {
        let id = &data[pos..pos + 4];
        let size = u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]])
            as usize;
        if id == b"data" {
            return pos + 8;
        }
        pos += 8 + size + (size & 1);
    }
    0
}
