//! Minimal RIFF/WAVE header reader for inspecting recordings.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::WavError;

/// Size of the canonical header `arecord` writes before the sample data.
pub const CANONICAL_HEADER_LEN: u64 = 44;

/// Headers and chunk tables larger than this are not recordings we made.
const MAX_HEADER_SCAN: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavInfo {
    pub audio_format: u16,
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub byte_rate: u32,
    /// Length of the `data` chunk as declared, clamped to the bytes present.
    pub data_len: u64,
    pub file_len: u64,
}

impl WavInfo {
    pub fn duration_secs(&self) -> f64 {
        if self.byte_rate == 0 {
            return 0.0;
        }
        self.data_len as f64 / f64::from(self.byte_rate)
    }

    pub fn encoding(&self) -> &'static str {
        match (self.audio_format, self.bits_per_sample) {
            (1, 8) => "U8",
            (1, 16) => "S16_LE",
            (1, 24) => "S24_LE",
            (1, 32) => "S32_LE",
            (3, _) => "FLOAT_LE",
            _ => "unknown",
        }
    }
}

impl fmt::Display for WavInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Format:      {} ({}-bit)", self.encoding(), self.bits_per_sample)?;
        writeln!(f, "Sample rate: {} Hz", self.sample_rate)?;
        writeln!(f, "Channels:    {}", self.channels)?;
        writeln!(f, "Duration:    {:.1}s", self.duration_secs())?;
        write!(f, "Size:        {} bytes", self.file_len)
    }
}

pub fn read_info(path: &Path) -> Result<WavInfo, WavError> {
    let io_err = |source| WavError::Io {
        path: path.to_path_buf(),
        source,
    };

    let file = File::open(path).map_err(io_err)?;
    let file_len = file.metadata().map_err(io_err)?.len();

    let mut header = Vec::with_capacity(1024);
    file.take(MAX_HEADER_SCAN as u64)
        .read_to_end(&mut header)
        .map_err(io_err)?;

    parse_header(&header, file_len)
}

/// Parse the chunk table at the start of a WAV file.
pub fn parse_header(bytes: &[u8], file_len: u64) -> Result<WavInfo, WavError> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(WavError::Format("missing RIFF/WAVE signature".to_string()));
    }

    let mut fmt_chunk: Option<(u16, u16, u32, u32, u16)> = None;
    let mut pos = 12usize;

    while pos + 8 <= bytes.len() {
        let id = &bytes[pos..pos + 4];
        let size = u32_at(bytes, pos + 4) as usize;
        let body = pos + 8;

        match id {
            b"fmt " => {
                if size < 16 || body + 16 > bytes.len() {
                    return Err(WavError::Format("truncated fmt chunk".to_string()));
                }
                fmt_chunk = Some((
                    u16_at(bytes, body),
                    u16_at(bytes, body + 2),
                    u32_at(bytes, body + 4),
                    u32_at(bytes, body + 8),
                    u16_at(bytes, body + 14),
                ));
            }
            b"data" => {
                let (audio_format, channels, sample_rate, byte_rate, bits_per_sample) = fmt_chunk
                    .ok_or_else(|| WavError::Format("data chunk before fmt chunk".to_string()))?;

                let present = file_len.saturating_sub(body as u64);
                // arecord declares 0x7fffffff while recording; trust the file size then.
                let data_len = (size as u64).min(present);

                return Ok(WavInfo {
                    audio_format,
                    channels,
                    sample_rate,
                    bits_per_sample,
                    byte_rate,
                    data_len,
                    file_len,
                });
            }
            _ => {}
        }

        // chunks are padded to an even length
        pos = body.saturating_add(size).saturating_add(size & 1);
    }

    Err(WavError::Format("no data chunk".to_string()))
}

fn u16_at(bytes: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([bytes[at], bytes[at + 1]])
}

fn u32_at(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Canonical 44-byte PCM header for `data_len` bytes of samples.
pub fn pcm_header(sample_rate: u32, channels: u16, bits_per_sample: u16, data_len: u32) -> Vec<u8> {
    let block_align = channels * (bits_per_sample / 8);
    let byte_rate = sample_rate * u32::from(block_align);

    let mut h = Vec::with_capacity(CANONICAL_HEADER_LEN as usize);
    h.extend_from_slice(b"RIFF");
    h.extend_from_slice(&(36 + data_len).to_le_bytes());
    h.extend_from_slice(b"WAVE");
    h.extend_from_slice(b"fmt ");
    h.extend_from_slice(&16u32.to_le_bytes());
    h.extend_from_slice(&1u16.to_le_bytes());
    h.extend_from_slice(&channels.to_le_bytes());
    h.extend_from_slice(&sample_rate.to_le_bytes());
    h.extend_from_slice(&byte_rate.to_le_bytes());
    h.extend_from_slice(&block_align.to_le_bytes());
    h.extend_from_slice(&bits_per_sample.to_le_bytes());
    h.extend_from_slice(b"data");
    h.extend_from_slice(&data_len.to_le_bytes());
    h
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn reads_canonical_header() {
        let mut bytes = pcm_header(44100, 2, 16, 176_400);
        bytes.resize(bytes.len() + 176_400, 0);

        let info = parse_header(&bytes, bytes.len() as u64).unwrap();
        assert_eq!(info.sample_rate, 44100);
        assert_eq!(info.channels, 2);
        assert_eq!(info.encoding(), "S16_LE");
        assert_eq!(info.data_len, 176_400);
        assert!((info.duration_secs() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn skips_unknown_chunks() {
        let header = pcm_header(8000, 1, 8, 8000);
        let mut bytes = header[..36].to_vec();
        bytes.extend_from_slice(b"LIST");
        bytes.extend_from_slice(&3u32.to_le_bytes());
        bytes.extend_from_slice(b"abc\0"); // odd size plus pad byte
        bytes.extend_from_slice(&header[36..]);
        bytes.resize(bytes.len() + 8000, 0x80);

        let info = parse_header(&bytes, bytes.len() as u64).unwrap();
        assert_eq!(info.encoding(), "U8");
        assert_eq!(info.data_len, 8000);
    }

    #[test]
    fn clamps_unfinished_data_length() {
        let mut bytes = pcm_header(22050, 1, 16, 0x7fff_ffff);
        bytes.resize(bytes.len() + 22050 * 2, 0);

        let info = parse_header(&bytes, bytes.len() as u64).unwrap();
        assert_eq!(info.data_len, 44100);
        assert!((info.duration_secs() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_non_wav() {
        assert!(parse_header(b"ID3\x03 not a wav file", 20).is_err());
        assert!(parse_header(b"RIFF", 4).is_err());
    }

    #[test]
    fn read_info_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("take.wav");
        let mut bytes = pcm_header(48000, 2, 16, 192_000 * 2);
        bytes.resize(bytes.len() + 192_000 * 2, 0);
        std::fs::write(&path, &bytes).unwrap();

        let info = read_info(&path).unwrap();
        assert_eq!(info.file_len, bytes.len() as u64);
        assert!((info.duration_secs() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn read_info_missing_file() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            read_info(&dir.path().join("nope.wav")),
            Err(WavError::Io { .. })
        ));
    }
}
