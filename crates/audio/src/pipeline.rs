//! Pipeline de capture : micro → volume, rééchantillonnage, encodage, transport
//!
//! Le pipeline est déplacé dans le callback du périphérique de capture et
//! traite chaque frame livrée par le matériel, dans l'ordre d'arrivée :
//!
//! ```text
//!             ┌─→ [Volume] ─────────────────────→ observateur UI
//! Micro → frame
//!             └─→ [Resample 16k] → [PCM + base64] → transport (fire-and-forget)
//! ```
//!
//! Aucune frame n'est gardée d'un appel à l'autre : si le transport n'est pas
//! prêt, la frame est jetée et loggée, jamais réessayée.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::{
    resample, meter, AudioCodec, AudioConfig, AudioFrame, AudioResult, FrameDropReason,
    FrameSink, PcmCodec, Sample, StatsCounters, VolumeObserver,
};

/// Pipeline de capture d'une session
pub struct CapturePipeline {
    /// Configuration audio (fréquence cible, gain du volume)
    config: AudioConfig,

    /// Codec PCM pour l'encodage des frames
    codec: PcmCodec,

    /// Transport vers lequel partent les frames encodées
    sink: Arc<dyn FrameSink>,

    /// Observateur du volume
    volume: Arc<dyn VolumeObserver>,

    /// Compteurs partagés avec la session
    stats: Arc<StatsCounters>,

    /// Numéro de séquence de la prochaine frame
    next_sequence: u64,
}

impl CapturePipeline {
    /// Crée un pipeline de capture
    pub fn new(
        config: AudioConfig,
        sink: Arc<dyn FrameSink>,
        volume: Arc<dyn VolumeObserver>,
        stats: Arc<StatsCounters>,
    ) -> Self {
        Self {
            config,
            codec: PcmCodec::new(),
            sink,
            volume,
            stats,
            next_sequence: 0,
        }
    }

    /// Traite une frame livrée par le matériel
    ///
    /// Appelée depuis le callback temps réel : ne bloque jamais.
    pub fn process(&mut self, samples: &[Sample], native_rate: u32) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        StatsCounters::bump(&self.stats.frames_captured);

        self.volume.on_volume(meter::volume_level(samples, self.config.volume_gain));

        let frame = match self.prepare_frame(samples, native_rate, sequence) {
            Ok(frame) => frame,
            Err(e) => {
                StatsCounters::bump(&self.stats.frames_dropped);
                warn!(sequence, error = %e, "frame de capture jetée");
                return;
            }
        };

        let encoded = match self.codec.encode(&frame) {
            Ok(encoded) => encoded,
            Err(e) => {
                StatsCounters::bump(&self.stats.frames_dropped);
                warn!(sequence, error = %e, "échec d'encodage de la frame");
                return;
            }
        };

        match self.sink.send_frame(encoded) {
            Ok(()) => StatsCounters::bump(&self.stats.frames_sent),
            Err(reason) => {
                StatsCounters::bump(&self.stats.frames_dropped);
                match reason {
                    FrameDropReason::QueueFull => {
                        warn!(sequence, "file d'envoi pleine, frame jetée")
                    }
                    FrameDropReason::Closed => {
                        debug!(sequence, "transport fermé, frame jetée")
                    }
                }
            }
        }
    }

    /// Rééchantillonne si besoin vers la fréquence du transport
    fn prepare_frame(&self, samples: &[Sample], native_rate: u32, sequence: u64) -> AudioResult<AudioFrame> {
        let target = self.config.capture_sample_rate;
        let samples = if native_rate == target {
            samples.to_vec()
        } else {
            resample::downsample(samples, native_rate, target)?
        };

        Ok(AudioFrame::new(samples, target, sequence))
    }

    /// Numéro de séquence de la prochaine frame
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }
}
