//! Crate audio de la session vocale temps réel
//!
//! Ce crate gère toute la chaîne audio :
//! - Capture microphone avec cpal, rééchantillonnage vers 16 kHz
//! - Conversion PCM 16 bits little-endian + base64
//! - Indicateur de volume
//! - Planification sans trou et lecture de la voix reçue avec cpal

pub mod config;      // Configuration audio
pub mod types;       // Types de données (AudioFrame, etc.)
pub mod traits;      // Traits abstraits
pub mod resample;    // Réduction de fréquence par interpolation linéaire
pub mod codec;       // PCM 16 bits + base64
pub mod meter;       // Indicateur de volume
pub mod pipeline;    // Pipeline de capture
pub mod capture;     // Implémentation capture avec cpal
pub mod playback;    // Planificateur et lecture avec cpal
pub mod error;       // Gestion d'erreurs

// Réexports pour faciliter l'utilisation
pub use config::*;
pub use types::*;
pub use traits::*;
pub use error::*;

// Réexports des implémentations principales
pub use capture::{CpalCapture, CpalCaptureBackend};
pub use playback::{CpalOutputBackend, CpalPlayback, OutputClock, PlaybackScheduler, ScheduledChunk};
pub use codec::PcmCodec;
pub use pipeline::CapturePipeline;
pub use meter::volume_level;
pub use resample::downsample;
