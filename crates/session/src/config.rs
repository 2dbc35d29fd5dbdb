//! Configuration de la session vocale
//!
//! Regroupe la configuration audio, celle du transport et le préambule
//! de comportement de l'assistant. Chargeable depuis un fichier TOML :
//!
//! ```toml
//! assistant_persona = "You are the AI Agricultural Scientist."
//!
//! [audio]
//! volume_gain = 4.0
//!
//! [network]
//! voice_name = "Zephyr"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use audio::AudioConfig;
use network::NetworkConfig;

use crate::{SessionError, SessionResult};

/// Persona par défaut de l'assistant
pub const DEFAULT_PERSONA: &str =
    "You are the AI Agricultural Scientist. Speak clearly and concisely about crop health and farm status.";

/// Règles de comportement par défaut
pub const DEFAULT_RULES: [&str; 5] = [
    "If asked for a specific value, reply ONLY with the value and a 2-word status.",
    "Do not read out lists unless asked.",
    "RAIN RULE: If Rain Sensor > 500, advise the farmer to angle the solar panels.",
    "IRRIGATION RULE: If Soil Moisture < 30% and Water Tank > 20%, suggest watering the crops.",
    "WATER WARNING: If Water Tank < 10%, alert the farmer about the low water supply.",
];

/// Configuration complète d'une session
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub audio: AudioConfig,
    pub network: NetworkConfig,

    /// Présentation de l'assistant, en tête de l'instruction système
    pub assistant_persona: String,

    /// Règles de comportement, numérotées dans l'instruction système
    pub rules: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            network: NetworkConfig::default(),
            assistant_persona: DEFAULT_PERSONA.to_string(),
            rules: DEFAULT_RULES.iter().map(|rule| rule.to_string()).collect(),
        }
    }
}

impl SessionConfig {
    /// Charge la configuration depuis un fichier TOML
    ///
    /// Les champs absents prennent leur valeur par défaut.
    pub fn from_toml_file(path: impl AsRef<Path>) -> SessionResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_toml_str(&text)?;
        debug!(path = %path.as_ref().display(), "configuration chargée");
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> SessionResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Configuration pour un serveur local (tests, démo)
    pub fn local(endpoint: impl Into<String>) -> Self {
        Self {
            network: NetworkConfig::local(endpoint),
            ..Default::default()
        }
    }

    /// Valide l'ensemble de la configuration
    pub fn validate(&self) -> SessionResult<()> {
        self.audio.validate().map_err(SessionError::Config)?;
        self.network.validate().map_err(SessionError::Config)?;

        if self.audio.capture_sample_rate != self.network.input_sample_rate {
            return Err(SessionError::Config(format!(
                "Fréquence de capture ({}) différente de la fréquence annoncée au serveur ({})",
                self.audio.capture_sample_rate, self.network.input_sample_rate
            )));
        }

        if self.assistant_persona.trim().is_empty() {
            return Err(SessionError::Config("Persona de l'assistant vide".to_string()));
        }

        Ok(())
    }

    /// Instruction système : persona, contexte capteurs, puis règles
    pub fn system_instruction(&self, context: &str) -> String {
        let rules = self
            .rules
            .iter()
            .enumerate()
            .map(|(i, rule)| format!("{}. {}", i + 1, rule))
            .collect::<Vec<_>>()
            .join("\n");

        format!("{}\n\n{}\n\nRules:\n{}", self.assistant_persona, context, rules)
    }
}
