//! PCM and WAV helpers.

use std::io::Cursor;

use super::base::{AudioFormat, TTSError, TTSResult};

/// Wrap 16-bit PCM in a RIFF/WAV container.
pub fn encode_wav(samples: &[i16], format: AudioFormat) -> TTSResult<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| TTSError::AudioEncoding(format!("Failed to create WAV writer: {e}")))?;
        let mut sample_writer = writer.get_i16_writer(samples.len() as u32);
        for &sample in samples {
            sample_writer.write_sample(sample);
        }
        sample_writer
            .flush()
            .map_err(|e| TTSError::AudioEncoding(format!("Failed to write samples: {e}")))?;
        writer
            .finalize()
            .map_err(|e| TTSError::AudioEncoding(format!("Failed to finalize WAV: {e}")))?;
    }

    Ok(cursor.into_inner())
}

/// Read 16-bit PCM out of a WAV container.
pub fn decode_wav(bytes: &[u8]) -> TTSResult<(Vec<i16>, AudioFormat)> {
    let mut reader = hound::WavReader::new(Cursor::new(bytes))
        .map_err(|e| TTSError::AudioEncoding(format!("Invalid WAV data: {e}")))?;
    let spec = reader.spec();
    if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
        return Err(TTSError::AudioEncoding(format!(
            "Unsupported WAV sample format: {} bit {:?}",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    let samples = reader
        .samples::<i16>()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TTSError::AudioEncoding(format!("Failed to read samples: {e}")))?;

    Ok((
        samples,
        AudioFormat {
            sample_rate: spec.sample_rate,
            channels: spec.channels,
        },
    ))
}

/// Little-endian byte view of PCM samples, as sent in stream chunks.
pub fn pcm_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Parse little-endian PCM. A trailing odd byte is dropped.
pub fn pcm_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wav_header_and_samples() {
        let samples: Vec<i16> = vec![0, 1000, -1000, i16::MAX, i16::MIN];
        let wav = encode_wav(&samples, AudioFormat::default()).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + samples.len() * 2);

        let (decoded, format) = decode_wav(&wav).unwrap();
        assert_eq!(decoded, samples);
        assert_eq!(format, AudioFormat::default());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_wav(b"definitely not a wav"),
            Err(TTSError::AudioEncoding(_))
        ));
    }

    #[test]
    fn test_pcm_bytes() {
        let bytes = pcm_to_le_bytes(&[1, -2]);
        assert_eq!(bytes, vec![0x01, 0x00, 0xFE, 0xFF]);
        assert_eq!(pcm_from_le_bytes(&bytes), vec![1, -2]);
        assert_eq!(pcm_from_le_bytes(&[0x01, 0x00, 0x07]), vec![1]);
    }
}
