//! Audio decoder using symphonia
//!
//! Decodes audio files (MP3, FLAC, AAC, Vorbis, WAV, ...) fully into
//! interleaved 16-bit PCM held in memory. Decoding everything up front
//! trades memory for an exact byte length, which gives the playback
//! engine trivially correct position reporting and frame-aligned seeks.

use std::io::Cursor;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::audio::source::AudioSource;
use crate::audio::types::AudioFormat;
use crate::error::{Error, Result};

/// A fully decoded track, readable as a seekable PCM byte stream.
pub struct SymphoniaSource {
    format: AudioFormat,
    data: Vec<u8>,
    cursor: u64,
}

impl SymphoniaSource {
    /// Decode an audio file from disk.
    ///
    /// # Errors
    /// - Failed to open file
    /// - Unsupported audio format
    /// - Decode error
    pub fn open(path: &Path) -> Result<Self> {
        debug!("Decoding file: {}", path.display());

        let file = std::fs::File::open(path)
            .map_err(|e| Error::Decode(format!("Failed to open {}: {}", path.display(), e)))?;

        let mut hint = Hint::new();
        if let Some(extension) = path.extension() {
            if let Some(ext_str) = extension.to_str() {
                hint.with_extension(ext_str);
            }
        }

        Self::decode(Box::new(file), hint)
    }

    /// Decode a track already downloaded into memory.
    ///
    /// `extension` helps the format probe when known (taken from the
    /// track URL for catalogue downloads).
    pub fn from_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<Self> {
        debug!("Decoding {} bytes from memory", bytes.len());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        Self::decode(Box::new(Cursor::new(bytes)), hint)
    }

    /// Probe the container, decode every packet of the first audio track
    /// and collect interleaved little-endian i16 bytes.
    fn decode(source: Box<dyn MediaSource>, hint: Hint) -> Result<Self> {
        let mss = MediaSourceStream::new(source, Default::default());

        let format_opts = FormatOptions::default();
        let metadata_opts = MetadataOptions::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &metadata_opts)
            .map_err(|e| Error::Decode(format!("Failed to probe format: {}", e)))?;

        let mut reader = probed.format;

        // Get the default audio track
        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| Error::Decode("No audio track found".to_string()))?;

        let track_id = track.id;

        let sample_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| Error::Decode("Sample rate not found".to_string()))?;

        let channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| Error::Decode("Channel count not found".to_string()))?;

        debug!(
            "Audio format: sample_rate={}, channels={}",
            sample_rate, channels
        );

        let decoder_opts = DecoderOptions::default();
        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &decoder_opts)
            .map_err(|e| Error::Decode(format!("Failed to create decoder: {}", e)))?;

        let mut data: Vec<u8> = Vec::new();
        let mut sample_buf: Option<SampleBuffer<i16>> = None;

        loop {
            let packet = match reader.next_packet() {
                Ok(packet) => packet,
                Err(symphonia::core::errors::Error::IoError(ref e))
                    if e.kind() == std::io::ErrorKind::UnexpectedEof =>
                {
                    // End of stream
                    break;
                }
                Err(e) => {
                    warn!("Error reading packet: {}", e);
                    break;
                }
            };

            // Skip packets for other tracks
            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    if sample_buf.is_none() {
                        let spec = *decoded.spec();
                        let duration = decoded.capacity() as u64;
                        sample_buf = Some(SampleBuffer::<i16>::new(duration, spec));
                    }
                    if let Some(buf) = &mut sample_buf {
                        buf.copy_interleaved_ref(decoded);
                        for &sample in buf.samples() {
                            data.extend_from_slice(&sample.to_le_bytes());
                        }
                    }
                }
                Err(e) => {
                    warn!("Decode error: {}", e);
                    continue;
                }
            }
        }

        if data.is_empty() {
            return Err(Error::Decode("Stream contained no audio".to_string()));
        }

        let format = AudioFormat::pcm16(sample_rate, channels);
        debug!(
            "Decoded {} bytes ({} frames)",
            data.len(),
            data.len() / format.block_align()
        );

        Ok(Self {
            format,
            data,
            cursor: 0,
        })
    }
}

impl AudioSource for SymphoniaSource {
    fn format(&self) -> AudioFormat {
        self.format
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let remaining = self.data.len() as u64 - self.cursor;
        let count = (buf.len() as u64).min(remaining) as usize;
        let start = self.cursor as usize;
        buf[..count].copy_from_slice(&self.data[start..start + count]);
        self.cursor += count as u64;
        Ok(count)
    }

    fn seek(&mut self, position: u64) -> Result<()> {
        let clamped = position.min(self.data.len() as u64);
        self.cursor = self.format.align_down(clamped);
        Ok(())
    }

    fn position(&self) -> u64 {
        self.cursor
    }

    fn length(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 16-bit mono WAV with a recognizable ramp, returned as bytes.
    fn ramp_wav(frames: usize) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..frames {
                writer.write_sample((i % 1000) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_decode_wav_from_bytes() {
        let source = SymphoniaSource::from_bytes(ramp_wav(800), Some("wav")).unwrap();
        assert_eq!(source.format(), AudioFormat::pcm16(8000, 1));
        assert_eq!(source.length(), 800 * 2);
        assert_eq!(source.position(), 0);
    }

    #[test]
    fn test_decode_wav_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ramp.wav");
        std::fs::write(&path, ramp_wav(400)).unwrap();

        let source = SymphoniaSource::open(&path).unwrap();
        assert_eq!(source.format().sample_rate, 8000);
        assert_eq!(source.length(), 400 * 2);
    }

    #[test]
    fn test_read_advances_and_ends() {
        let mut source = SymphoniaSource::from_bytes(ramp_wav(10), Some("wav")).unwrap();
        let mut buf = [0u8; 12];

        let n = source.read(&mut buf).unwrap();
        assert_eq!(n, 12);
        assert_eq!(source.position(), 12);

        // First decoded samples are the ramp 0, 1, 2, ... as i16 LE
        assert_eq!(&buf[..6], &[0, 0, 1, 0, 2, 0]);

        let n = source.read(&mut buf).unwrap();
        assert_eq!(n, 8);
        assert_eq!(source.position(), 20);

        let n = source.read(&mut buf).unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_seek_clamps_and_aligns() {
        let mut source = SymphoniaSource::from_bytes(ramp_wav(10), Some("wav")).unwrap();

        source.seek(7).unwrap();
        assert_eq!(source.position(), 6);

        source.seek(10_000).unwrap();
        assert_eq!(source.position(), source.length());

        source.seek(0).unwrap();
        assert_eq!(source.position(), 0);
    }

    #[test]
    fn test_open_missing_file_is_decode_error() {
        let result = SymphoniaSource::open(Path::new("/nonexistent/audio.mp3"));
        assert!(matches!(result, Err(Error::Decode(_))));
    }

    #[test]
    fn test_garbage_bytes_are_rejected() {
        let result = SymphoniaSource::from_bytes(vec![0xDE; 64], None);
        assert!(result.is_err());
    }
}
