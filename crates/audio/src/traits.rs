//! Traits abstraits pour le système audio
//!
//! Ce module définit les interfaces que doivent implémenter les composants
//! audio de la session. Les périphériques réels (cpal) et les implémentations
//! factices des tests passent par les mêmes traits, ce qui permet de tester
//! le contrôleur de session sans matériel.

use std::sync::Arc;

use crate::{AudioFrame, AudioResult, CapturePipeline, EncodedFrame, PlaybackScheduler, Sample};

/// Trait pour encoder/décoder l'audio échangé avec le serveur
pub trait AudioCodec: Send + Sync {
    /// Encode une frame brute pour le transport
    fn encode(&self, frame: &AudioFrame) -> AudioResult<EncodedFrame>;

    /// Décode un payload reçu (texte base64) en échantillons flottants
    ///
    /// # Erreurs
    /// - `AudioError::InvalidPayload` : payload corrompu, à jeter
    fn decode(&self, data: &str) -> AudioResult<Vec<Sample>>;
}

/// Raison pour laquelle une frame n'a pas pu être remise au transport
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameDropReason {
    /// La file d'envoi est pleine (réseau momentanément en retard)
    QueueFull,
    /// Le transport est fermé
    Closed,
}

/// Destination des frames encodées (le transport)
///
/// L'envoi est "fire-and-forget" : l'appel ne bloque jamais et ne renvoie
/// qu'une indication pour les logs. Appelé depuis le callback temps réel.
pub trait FrameSink: Send + Sync {
    fn send_frame(&self, frame: EncodedFrame) -> Result<(), FrameDropReason>;
}

/// Observateur du volume du micro (0 à 100)
///
/// Appelé depuis le callback temps réel : l'implémentation ne doit pas bloquer.
pub trait VolumeObserver: Send + Sync {
    fn on_volume(&self, level: f32);
}

/// Microphone acquis, prêt à être démarré
///
/// Posséder un `CaptureDevice` revient à détenir le micro : `release()`
/// (ou le drop) le rend au système.
pub trait CaptureDevice: Send {
    /// Fréquence native à laquelle le périphérique livre les frames
    fn native_sample_rate(&self) -> u32;

    /// Démarre le callback de capture, qui pilote `pipeline` pour chaque frame
    fn start(&mut self, pipeline: CapturePipeline) -> AudioResult<()>;

    /// Arrête le callback de capture
    ///
    /// Après cet appel, plus aucune frame n'est envoyée. Idempotent.
    fn stop(&mut self) -> AudioResult<()>;

    /// Libère le micro (équivalent d'arrêter les pistes média)
    ///
    /// Idempotent, ne peut pas échouer.
    fn release(&mut self);

    /// Vérifie si la capture est active
    fn is_recording(&self) -> bool;

    /// Retourne des informations sur le périphérique utilisé
    fn device_info(&self) -> String {
        "Périphérique inconnu".to_string()
    }
}

/// Fabrique de microphones
///
/// L'acquisition échoue si aucun micro n'est disponible ou si l'accès est refusé.
pub trait CaptureBackend: Send + Sync {
    fn acquire(&self) -> AudioResult<Box<dyn CaptureDevice>>;
}

/// Périphérique de sortie ouvert, qui rend l'audio planifié
pub trait OutputDevice: Send {
    /// Ferme le périphérique de sortie. Idempotent.
    fn close(&mut self) -> AudioResult<()>;

    /// Vérifie si la lecture est active
    fn is_playing(&self) -> bool;

    /// Retourne des informations sur le périphérique de sortie
    fn device_info(&self) -> String {
        "Périphérique de sortie inconnu".to_string()
    }
}

/// Fabrique de périphériques de sortie
///
/// Le périphérique ouvert lit en continu les unités de `scheduler`.
pub trait OutputBackend: Send + Sync {
    fn open(&self, scheduler: Arc<PlaybackScheduler>) -> AudioResult<Box<dyn OutputDevice>>;
}
