//! Types de données pour le système audio
//!
//! Ce module définit les structures principales qui traversent la session :
//! - AudioFrame : frame brute livrée par le callback du micro
//! - EncodedFrame : frame PCM 16 bits prête pour le transport
//! - PlaybackUnit : buffer décodé planifié sur l'horloge de sortie
//! - AudioStats : compteurs de monitoring

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Type pour un échantillon audio
///
/// Valeurs entre -1.0 et +1.0, 0.0 = silence.
pub type Sample = f32;

/// Frame d'audio brute (non encodée)
///
/// Produite une fois par callback de capture, à la fréquence native du
/// périphérique. Immuable après création, jetée après encodage.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioFrame {
    /// Les échantillons audio bruts (mono)
    pub samples: Vec<Sample>,

    /// Fréquence d'échantillonnage de ces échantillons (Hz)
    pub sample_rate: u32,

    /// Timestamp de création de cette frame
    pub timestamp: Instant,

    /// Numéro de séquence, strictement croissant dans l'ordre de capture
    pub sequence_number: u64,
}

impl AudioFrame {
    /// Crée une nouvelle frame audio
    ///
    /// # Example
    /// ```rust
    /// use audio::AudioFrame;
    ///
    /// let frame = AudioFrame::new(vec![0.1, 0.2, -0.1, 0.0], 48000, 42);
    /// assert_eq!(frame.samples.len(), 4);
    /// ```
    pub fn new(samples: Vec<Sample>, sample_rate: u32, sequence_number: u64) -> Self {
        Self {
            samples,
            sample_rate,
            timestamp: Instant::now(),
            sequence_number,
        }
    }
}

/// Frame encodée pour le transport
///
/// PCM 16 bits signé little-endian, mono, à la fréquence cible du transport,
/// accompagné de sa représentation base64. Jamais modifiée après création.
#[derive(Clone, Debug, PartialEq)]
pub struct EncodedFrame {
    /// Octets PCM little-endian (2 octets par échantillon)
    pub pcm: Vec<u8>,

    /// Représentation base64 de `pcm`, envoyée telle quelle sur le réseau
    pub data: String,

    /// Fréquence d'échantillonnage du PCM (Hz)
    pub sample_rate: u32,

    /// Numéro de séquence de la frame d'origine
    pub sequence_number: u64,

    /// Timestamp de capture de la frame d'origine
    pub timestamp: Instant,
}

impl EncodedFrame {
    /// Nombre d'échantillons contenus dans la frame
    pub fn sample_count(&self) -> usize {
        self.pcm.len() / 2
    }

    /// Type MIME avec annotation explicite de la fréquence
    pub fn mime_type(&self) -> String {
        format!("audio/pcm;rate={}", self.sample_rate)
    }
}

/// Buffer décodé planifié sur l'horloge de sortie
///
/// Les positions sont exprimées en échantillons de l'horloge de sortie,
/// ce qui rend l'enchaînement exact : `end()` d'une unité est le `start`
/// de la suivante tant que le réseau suit.
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackUnit {
    /// Identifiant unique dans la session
    pub id: u64,

    /// Échantillons décodés à la fréquence de sortie
    pub samples: Vec<Sample>,

    /// Instant de début planifié (échantillons de l'horloge de sortie)
    pub start: u64,
}

impl PlaybackUnit {
    /// Durée de l'unité en échantillons
    pub fn duration(&self) -> u64 {
        self.samples.len() as u64
    }

    /// Instant de fin (exclu) sur l'horloge de sortie
    pub fn end(&self) -> u64 {
        self.start + self.duration()
    }
}

/// Statistiques audio pour le monitoring
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioStats {
    /// Nombre de frames livrées par le micro
    pub frames_captured: u64,

    /// Nombre de frames remises au transport
    pub frames_sent: u64,

    /// Nombre de frames jetées (file d'envoi pleine ou fermée)
    pub frames_dropped: u64,

    /// Nombre de chunks reçus planifiés pour lecture
    pub chunks_scheduled: u64,

    /// Nombre de payloads reçus jetés car malformés
    pub payloads_dropped: u64,

    /// Nombre de fois où le curseur de lecture a été ramené à "maintenant"
    pub starvation_resets: u64,
}

impl AudioStats {
    /// Pourcentage de frames capturées qui n'ont pas été envoyées
    pub fn drop_percentage(&self) -> f32 {
        if self.frames_captured == 0 {
            return 0.0;
        }
        (self.frames_dropped as f32 / self.frames_captured as f32) * 100.0
    }
}

/// Compteurs partagés entre les activités temps réel
///
/// Uniquement des atomiques : le callback audio ne prend jamais de verrou.
#[derive(Debug, Default)]
pub struct StatsCounters {
    pub frames_captured: AtomicU64,
    pub frames_sent: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub chunks_scheduled: AtomicU64,
    pub payloads_dropped: AtomicU64,
    pub starvation_resets: AtomicU64,
}

impl StatsCounters {
    /// Incrémente un compteur
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Photographie des compteurs
    pub fn snapshot(&self) -> AudioStats {
        AudioStats {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            chunks_scheduled: self.chunks_scheduled.load(Ordering::Relaxed),
            payloads_dropped: self.payloads_dropped.load(Ordering::Relaxed),
            starvation_resets: self.starvation_resets.load(Ordering::Relaxed),
        }
    }
}
