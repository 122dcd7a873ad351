//! Fixed-rate PCM conversion and base64 framing.
//!
//! The control channel carries PCM16LE mono at 24 kHz; sources and sinks
//! speak 48 kHz. The two conversions are deliberately trivial — decimation
//! one way, linear interpolation the other — so the byte-level behaviour is
//! deterministic, reproducible in tests, and auditable for drift. Rate
//! conversion crosses the component boundary exactly twice per session:
//! once in the input pipeline, once in the output pipeline.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

use crate::error::SessionError;

/// Sample rate of audio frames on the control channel.
pub const WIRE_SAMPLE_RATE: u32 = 24_000;
/// Sample rate at the source/sink boundary.
pub const EDGE_SAMPLE_RATE: u32 = 48_000;

/// Codec-level failures. All of them surface as `malformed_frame`.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The buffer does not hold a whole number of 16-bit samples.
    #[error("PCM buffer length {0} is not a multiple of 2")]
    OddLength(usize),

    /// The base64 payload could not be decoded.
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl From<CodecError> for SessionError {
    fn from(err: CodecError) -> Self {
        Self::MalformedFrame(err.to_string())
    }
}

/// Halve the sample rate by keeping every second sample.
///
/// Output length is `len / 2` rounded down to an even number of bytes, so a
/// trailing unpaired sample is dropped rather than emitted.
pub fn downsample_48k_to_24k(pcm: &[u8]) -> Result<Vec<u8>, CodecError> {
    if pcm.len() % 2 != 0 {
        return Err(CodecError::OddLength(pcm.len()));
    }
    let mut out = Vec::with_capacity(pcm.len() / 2);
    for pair in pcm.chunks_exact(4) {
        out.extend_from_slice(&pair[..2]);
    }
    Ok(out)
}

/// Double the sample rate by linear interpolation.
///
/// Each sample is followed by the midpoint between it and its successor;
/// the final sample, having no successor, is repeated. Output length is
/// exactly twice the input length.
pub fn upsample_24k_to_48k(pcm: &[u8]) -> Result<Vec<u8>, CodecError> {
    if pcm.len() % 2 != 0 {
        return Err(CodecError::OddLength(pcm.len()));
    }
    let samples: Vec<i16> = pcm
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect();

    let mut out = Vec::with_capacity(pcm.len() * 2);
    for (i, &sample) in samples.iter().enumerate() {
        out.extend_from_slice(&sample.to_le_bytes());
        let next = samples.get(i + 1).copied().unwrap_or(sample);
        #[allow(clippy::cast_possible_truncation)]
        let mid = ((i32::from(sample) + i32::from(next)) / 2) as i16;
        out.extend_from_slice(&mid.to_le_bytes());
    }
    Ok(out)
}

/// RFC 4648 standard base64, no line wrapping.
#[must_use]
pub fn encode_base64(pcm: &[u8]) -> String {
    BASE64.encode(pcm)
}

/// Decode an RFC 4648 standard base64 payload.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, CodecError> {
    Ok(BASE64.decode(payload)?)
}
