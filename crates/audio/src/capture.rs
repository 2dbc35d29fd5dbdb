//! Module de capture audio utilisant cpal
//!
//! Ce module implémente le trait CaptureDevice en utilisant la librairie cpal
//! (Cross-Platform Audio Library) pour capturer l'audio depuis le microphone.
//!
//! Le micro capture à sa fréquence native ; chaque buffer livré par le
//! callback est ramené en mono puis confié au `CapturePipeline`, qui se
//! charge du volume, du rééchantillonnage et de l'envoi.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, SupportedStreamConfig};
use tracing::{debug, error, info};

use crate::{AudioError, AudioResult, CaptureBackend, CaptureDevice, CapturePipeline, Sample};

/// Implémentation de capture audio avec cpal
///
/// # Architecture thread
///
/// cpal fonctionne avec des callbacks. Le pipeline est déplacé dans le
/// callback et y traite chaque buffer immédiatement : aucune frame n'est
/// accumulée entre deux appels.
pub struct CpalCapture {
    /// Périphérique audio d'entrée (None une fois libéré)
    device: Option<Device>,

    /// Configuration native du périphérique
    stream_config: SupportedStreamConfig,

    /// Stream audio actif (None si arrêté)
    stream: Option<Stream>,

    /// Nom du périphérique pour debug
    device_name: String,
}

impl CpalCapture {
    /// Acquiert le microphone par défaut
    ///
    /// Ne démarre pas encore la capture.
    ///
    /// # Erreurs
    /// - `AudioError::NoDeviceFound` si aucun microphone n'est disponible
    /// - `AudioError::ConfigError` si le périphérique refuse de donner sa config
    pub fn new() -> AudioResult<Self> {
        let host = cpal::default_host();

        let device = host.default_input_device().ok_or(AudioError::NoDeviceFound)?;

        let device_name = device
            .description()
            .ok()
            .map(|desc| desc.name().to_string())
            .unwrap_or_else(|| "Périphérique inconnu".to_string());

        let stream_config = device
            .default_input_config()
            .map_err(|e| AudioError::ConfigError(format!("Impossible d'obtenir config par défaut: {}", e)))?;

        info!(
            device = %device_name,
            sample_rate = stream_config.sample_rate(),
            channels = stream_config.channels(),
            format = ?stream_config.sample_format(),
            "microphone acquis"
        );

        Ok(Self {
            device: Some(device),
            stream_config,
            stream: None,
            device_name,
        })
    }

    /// Construit le stream d'entrée selon le format d'échantillons
    fn build_stream(&self, mut pipeline: CapturePipeline) -> AudioResult<Stream> {
        let device = self
            .device
            .as_ref()
            .ok_or_else(|| AudioError::InitializationError("Microphone déjà libéré".to_string()))?;

        let sample_rate = self.stream_config.sample_rate();
        let channels = self.stream_config.channels().max(1) as usize;
        let sample_format = self.stream_config.sample_format();
        let config = self.stream_config.config();

        // Buffer mono réutilisé d'un callback à l'autre
        let mut mono: Vec<Sample> = Vec::with_capacity(8192);
        let on_error = |err: cpal::StreamError| error!(error = %err, "erreur du stream de capture");

        let stream = match sample_format {
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    Self::to_mono(data, channels, &mut mono, |s| s);
                    pipeline.process(&mono, sample_rate);
                },
                on_error,
                None,
            )?,
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    Self::to_mono(data, channels, &mut mono, |s| s as f32 / i16::MAX as f32);
                    pipeline.process(&mono, sample_rate);
                },
                on_error,
                None,
            )?,
            SampleFormat::U16 => device.build_input_stream(
                &config,
                move |data: &[u16], _: &cpal::InputCallbackInfo| {
                    Self::to_mono(data, channels, &mut mono, |s| (s as f32 / u16::MAX as f32) * 2.0 - 1.0);
                    pipeline.process(&mono, sample_rate);
                },
                on_error,
                None,
            )?,
            _ => {
                return Err(AudioError::ConfigError(format!(
                    "Format d'échantillon non supporté : {:?}",
                    sample_format
                )))
            }
        };

        Ok(stream)
    }

    /// Garde le premier canal d'un buffer entrelacé, converti en f32
    fn to_mono<T: Copy>(data: &[T], channels: usize, mono: &mut Vec<Sample>, convert: fn(T) -> Sample) {
        mono.clear();
        mono.extend(data.iter().step_by(channels).map(|&s| convert(s)));
    }
}

impl CaptureDevice for CpalCapture {
    fn native_sample_rate(&self) -> u32 {
        self.stream_config.sample_rate()
    }

    fn start(&mut self, pipeline: CapturePipeline) -> AudioResult<()> {
        if self.stream.is_some() {
            return Ok(()); // Déjà démarré
        }

        let stream = self.build_stream(pipeline)?;
        stream.play()?;
        self.stream = Some(stream);

        info!(device = %self.device_name, "capture audio démarrée");
        Ok(())
    }

    fn stop(&mut self) -> AudioResult<()> {
        // Le drop du stream détruit le callback et le pipeline qu'il possède
        if let Some(stream) = self.stream.take() {
            stream.pause()?;
            info!(device = %self.device_name, "capture audio arrêtée");
        }
        Ok(())
    }

    fn release(&mut self) {
        self.stream = None;
        if self.device.take().is_some() {
            debug!(device = %self.device_name, "microphone libéré");
        }
    }

    fn is_recording(&self) -> bool {
        self.stream.is_some()
    }

    fn device_info(&self) -> String {
        self.device_name.clone()
    }
}

/// Fabrique de `CpalCapture` sur le micro par défaut
#[derive(Clone, Copy, Debug, Default)]
pub struct CpalCaptureBackend;

impl CaptureBackend for CpalCaptureBackend {
    fn acquire(&self) -> AudioResult<Box<dyn CaptureDevice>> {
        Ok(Box::new(CpalCapture::new()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_mono_keeps_first_channel() {
        let mut mono = Vec::new();
        CpalCapture::to_mono(&[0.1f32, 0.9, 0.2, 0.8, 0.3, 0.7], 2, &mut mono, |s| s);
        assert_eq!(mono, vec![0.1, 0.2, 0.3]);

        CpalCapture::to_mono(&[i16::MAX, 0], 1, &mut mono, |s| s as f32 / i16::MAX as f32);
        assert_eq!(mono, vec![1.0, 0.0]);
    }

    #[test]
    fn test_capture_creation() {
        // Note: peut échouer si aucun microphone n'est disponible
        match CpalCapture::new() {
            Ok(mut capture) => {
                assert!(!capture.is_recording());
                assert!(!capture.device_info().is_empty());
                assert!(capture.native_sample_rate() > 0);

                capture.release();
                capture.release();
                assert!(capture.stop().is_ok());
            }
            Err(AudioError::NoDeviceFound) => {
                println!("⚠️  Pas de microphone disponible pour le test");
            }
            Err(e) => println!("⚠️  Micro indisponible: {}", e),
        }
    }
}
