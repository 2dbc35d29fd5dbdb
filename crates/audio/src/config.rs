//! Configuration audio pour la session vocale
//!
//! Ce module définit les paramètres audio fixés par le protocole du serveur
//! vocal : fréquence d'envoi du micro, fréquence de la voix synthétisée,
//! gain de l'indicateur de volume et taille de la file d'envoi.

use serde::{Deserialize, Serialize};

/// Fréquence cible attendue par le serveur pour l'audio du micro
pub const CAPTURE_SAMPLE_RATE: u32 = 16000;

/// Fréquence de l'audio synthétisé renvoyé par le serveur
pub const OUTPUT_SAMPLE_RATE: u32 = 24000;

/// Configuration principale pour tout le système audio
///
/// `#[derive(Serialize, Deserialize)]` : Permet de charger depuis un fichier
/// `#[serde(default)]` : les champs absents prennent la valeur par défaut
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Fréquence d'échantillonnage de l'audio envoyé au serveur (Hz)
    ///
    /// Le micro capture à sa fréquence native, puis on rééchantillonne
    /// vers cette valeur. Doit correspondre au `rate=` annoncé dans le MIME.
    pub capture_sample_rate: u32,

    /// Fréquence d'échantillonnage de l'audio reçu (Hz)
    pub output_sample_rate: u32,

    /// Nombre de canaux transmis (mono uniquement pour la voix)
    pub channels: u16,

    /// Gain appliqué au RMS pour l'indicateur de volume
    ///
    /// Un RMS de 0.2 avec un gain de 5 donne un volume de 100.
    pub volume_gain: f32,

    /// Nombre maximum de frames encodées en attente d'envoi
    ///
    /// Au-delà, les nouvelles frames sont jetées (pas de backpressure).
    pub outbound_queue_frames: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            capture_sample_rate: CAPTURE_SAMPLE_RATE,
            output_sample_rate: OUTPUT_SAMPLE_RATE,
            channels: 1,
            volume_gain: 5.0,
            outbound_queue_frames: 8,
        }
    }
}

impl AudioConfig {
    /// Valide que la configuration est cohérente
    pub fn validate(&self) -> Result<(), String> {
        if self.capture_sample_rate < 8000 || self.capture_sample_rate > 48000 {
            return Err(format!(
                "Sample rate de capture invalide: {} (doit être entre 8000 et 48000)",
                self.capture_sample_rate
            ));
        }

        if self.output_sample_rate < 8000 || self.output_sample_rate > 48000 {
            return Err(format!(
                "Sample rate de sortie invalide: {} (doit être entre 8000 et 48000)",
                self.output_sample_rate
            ));
        }

        if self.channels != 1 {
            return Err(format!("Nombre de canaux invalide: {} (mono uniquement)", self.channels));
        }

        if !(self.volume_gain > 0.0) {
            return Err(format!("Gain de volume invalide: {}", self.volume_gain));
        }

        if self.outbound_queue_frames == 0 {
            return Err("La file d'envoi doit contenir au moins une frame".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AudioConfig::default();

        assert_eq!(config.capture_sample_rate, 16000);
        assert_eq!(config.output_sample_rate, 24000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_config() {
        let mut config = AudioConfig::default();

        config.capture_sample_rate = 1000;
        assert!(config.validate().is_err());

        config.capture_sample_rate = 16000;
        config.channels = 2;
        assert!(config.validate().is_err());

        config.channels = 1;
        config.outbound_queue_frames = 0;
        assert!(config.validate().is_err());
    }
}
