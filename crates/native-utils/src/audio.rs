use anyhow::Context;
use base64::Engine;
use rubato::{FastFixedIn, PolynomialDegree};

/// Creates a resampler to convert between audio sample rates.
pub fn create_resampler(
    in_sampling_rate: f64,
    out_sampling_rate: f64,
    chunk_size: usize,
) -> anyhow::Result<FastFixedIn<f32>> {
    let resampler = FastFixedIn::<f32>::new(
        out_sampling_rate / in_sampling_rate,
        1.0,
        PolynomialDegree::Cubic,
        chunk_size,
        1,
    )?;
    Ok(resampler)
}

/// Averages interleaved frames down to a single channel.
pub fn downmix_to_mono(data: &[f32], channels: usize) -> Vec<f32> {
    if channels > 1 {
        data.chunks(channels)
            .map(|c| c.iter().sum::<f32>() / channels as f32)
            .collect()
    } else {
        data.to_vec()
    }
}

/// Decodes a base64 string representing PCM16 audio into a vector of f32 samples
/// normalized to [-1.0, 1.0].
pub fn decode_f32(base64_fragment: &str) -> anyhow::Result<Vec<f32>> {
    Ok(convert_i16_to_f32(&decode_i16(base64_fragment)?))
}

/// Decodes a base64 string into a vector of little-endian i16 PCM values.
/// A trailing odd byte is ignored.
pub fn decode_i16(base64_fragment: &str) -> anyhow::Result<Vec<i16>> {
    let pcm16 = base64::engine::general_purpose::STANDARD
        .decode(base64_fragment)
        .context("Failed to decode base64 audio fragment")?;
    Ok(pcm16
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect())
}

/// Encodes a slice of i16 samples into a base64 string.
pub fn encode_i16(pcm16: &[i16]) -> String {
    let pcm16: Vec<u8> = pcm16.to_binary();
    base64::engine::general_purpose::STANDARD.encode(&pcm16)
}

/// Converts a normalized sample to i16, clamping out-of-range input.
pub fn f32_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Converts a slice of i16 samples to a vector of f32 samples.
pub fn convert_i16_to_f32(pcm16: &[i16]) -> Vec<f32> {
    pcm16
        .iter()
        .map(|&sample| sample as f32 / 32768.0)
        .collect()
}

/// A trait for converting audio sample types to a binary representation (Vec<u8>).
pub trait ToBinary {
    fn to_binary(&self) -> Vec<u8>;
}

impl ToBinary for [i16] {
    fn to_binary(&self) -> Vec<u8> {
        self.iter().flat_map(|&sample| sample.to_le_bytes()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn i16_survives_base64() {
        let pcm = [0i16, 1, -1, i16::MAX, i16::MIN, 1234];
        assert_eq!(decode_i16(&encode_i16(&pcm)).unwrap(), pcm);
    }

    #[test]
    fn f32_conversion_clamps_and_is_asymmetric() {
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(-1.0), i16::MIN);
        assert_eq!(f32_to_i16(3.0), i16::MAX);
        assert_eq!(f32_to_i16(-7.5), i16::MIN);
        assert_eq!(f32_to_i16(0.0), 0);
    }

    #[test]
    fn decoded_samples_are_normalized() {
        let samples = decode_f32(&encode_i16(&[i16::MIN, 0, 16384])).unwrap();
        assert_eq!(samples, vec![-1.0, 0.0, 0.5]);
    }

    #[test]
    fn invalid_base64_is_an_error() {
        assert!(decode_f32("not base64!").is_err());
    }

    #[test]
    fn downmix_averages_channels() {
        assert_eq!(downmix_to_mono(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        assert_eq!(downmix_to_mono(&[0.25, 0.75], 1), vec![0.25, 0.75]);
    }
}
