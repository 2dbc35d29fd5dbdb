//! Conversion entre échantillons flottants et PCM 16 bits base64
//!
//! Le serveur vocal échange de l'audio brut : PCM 16 bits signé,
//! little-endian, mono. Sur le fil, les octets sont encodés en base64
//! pour voyager dans des messages JSON.
//!
//! La conversion est asymétrique comme le complément à deux :
//! - valeurs positives multipliées par 32767
//! - valeurs négatives multipliées par 32768
//!
//! Au décodage on divise toujours par 32768, ce qui donne [-1.0, 1.0).
//!
//! Borne d'un aller-retour encodage puis décodage :
//! - valeurs négatives : 1/32768 (un pas de quantification)
//! - valeurs positives : 2/32768, et non 1/32768. La troncature à ×32767
//!   suivie de ÷32768 cumule un pas de quantification et l'écart d'échelle
//!   32767/32768 ; `0.99999` revient par exemple à environ 1.67/32768.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::{AudioCodec, AudioError, AudioFrame, AudioResult, EncodedFrame, Sample};

/// Codec PCM 16 bits little-endian + base64
///
/// Sans état : une seule instance peut être partagée entre le callback de
/// capture et la tâche de réception.
#[derive(Clone, Copy, Debug, Default)]
pub struct PcmCodec;

impl PcmCodec {
    pub fn new() -> Self {
        Self
    }

    /// Convertit des échantillons flottants en octets PCM little-endian
    pub fn samples_to_pcm(samples: &[Sample]) -> Vec<u8> {
        let mut pcm = Vec::with_capacity(samples.len() * 2);
        for &sample in samples {
            let clamped = sample.clamp(-1.0, 1.0);
            let value = if clamped < 0.0 {
                (clamped * 32768.0) as i16
            } else {
                (clamped * 32767.0) as i16
            };
            pcm.extend_from_slice(&value.to_le_bytes());
        }
        pcm
    }

    /// Convertit des octets PCM little-endian en échantillons flottants
    ///
    /// # Erreurs
    /// - `AudioError::InvalidPayload` si le nombre d'octets est impair
    pub fn pcm_to_samples(pcm: &[u8]) -> AudioResult<Vec<Sample>> {
        if pcm.len() % 2 != 0 {
            return Err(AudioError::InvalidPayload(format!(
                "{} octets ne forment pas des échantillons 16 bits",
                pcm.len()
            )));
        }

        Ok(pcm
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
            .collect())
    }
}

impl AudioCodec for PcmCodec {
    fn encode(&self, frame: &AudioFrame) -> AudioResult<EncodedFrame> {
        let pcm = Self::samples_to_pcm(&frame.samples);
        let data = STANDARD.encode(&pcm);

        Ok(EncodedFrame {
            pcm,
            data,
            sample_rate: frame.sample_rate,
            sequence_number: frame.sequence_number,
            timestamp: frame.timestamp,
        })
    }

    fn decode(&self, data: &str) -> AudioResult<Vec<Sample>> {
        let pcm = STANDARD.decode(data.trim())?;
        Self::pcm_to_samples(&pcm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_factors() {
        let pcm = PcmCodec::samples_to_pcm(&[1.0, -1.0, 0.0, 0.5]);
        let values: Vec<i16> = pcm
            .chunks_exact(2)
            .map(|p| i16::from_le_bytes([p[0], p[1]]))
            .collect();

        assert_eq!(values, vec![32767, -32768, 0, 16383]);
    }

    #[test]
    fn test_clamping() {
        let pcm = PcmCodec::samples_to_pcm(&[3.5, -7.0]);
        assert_eq!(pcm, vec![0xFF, 0x7F, 0x00, 0x80]);
    }

    #[test]
    fn test_little_endian_layout() {
        // -0.5 * 32768 = -16384 = 0xC000, octet de poids faible en premier
        let pcm = PcmCodec::samples_to_pcm(&[-0.5]);
        assert_eq!(pcm, vec![0x00, 0xC0]);
    }

    #[test]
    fn test_round_trip_precision() {
        let codec = PcmCodec::new();
        let samples: Vec<f32> = (0..=200).map(|i| -1.0 + i as f32 * 0.01).collect();
        let frame = AudioFrame::new(samples.clone(), 16000, 7);

        let encoded = codec.encode(&frame).unwrap();
        assert_eq!(encoded.sample_count(), samples.len());
        assert_eq!(encoded.mime_type(), "audio/pcm;rate=16000");
        assert_eq!(encoded.sequence_number, 7);

        let decoded = codec.decode(&encoded.data).unwrap();
        for (original, recovered) in samples.iter().zip(decoded.iter()) {
            // Côté positif, l'écart d'échelle 32767/32768 s'ajoute au pas de quantification
            let bound = (if *original < 0.0 { 1.0 } else { 2.0 }) / 32768.0;
            assert!(
                (original - recovered).abs() <= bound + f32::EPSILON,
                "{} → {}",
                original,
                recovered
            );
        }
    }

    #[test]
    fn test_positive_round_trip_exceeds_one_step() {
        let codec = PcmCodec::new();
        let step = 1.0 / 32768.0;

        let frame = AudioFrame::new(vec![0.99999, -0.99999], 16000, 0);
        let decoded = codec.decode(&codec.encode(&frame).unwrap().data).unwrap();

        let positive_error = (0.99999 - decoded[0]).abs();
        assert!(positive_error > step && positive_error <= 2.0 * step, "{}", positive_error);

        let negative_error = (-0.99999 - decoded[1]).abs();
        assert!(negative_error <= step, "{}", negative_error);
    }

    #[test]
    fn test_decode_range() {
        let codec = PcmCodec::new();
        let data = STANDARD.encode([0xFF, 0x7F, 0x00, 0x80]);
        let decoded = codec.decode(&data).unwrap();

        assert_eq!(decoded[1], -1.0);
        assert!(decoded[0] < 1.0);
    }

    #[test]
    fn test_malformed_payloads() {
        let codec = PcmCodec::new();

        let bad_base64 = codec.decode("pas du base64 !");
        assert!(matches!(bad_base64, Err(AudioError::InvalidPayload(_))));

        let odd = STANDARD.encode([1u8, 2, 3]);
        assert!(matches!(codec.decode(&odd), Err(AudioError::InvalidPayload(_))));
    }
}
