//! Types de données pour le transport vers le serveur vocal
//!
//! Ce module définit les structures principales échangées avec la session :
//! - Role : locuteur d'un fragment de transcription
//! - InboundChunk : message reçu, classé par nature
//! - TransportEvent : ouverture, chunk ou fermeture du transport
//! - NetworkConfig : point d'accès, modèle, voix
//! - SessionSetup : paramètres propres à une session

use std::fmt;

use serde::{Deserialize, Serialize};

/// Point d'accès WebSocket bidirectionnel du serveur vocal
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Modèle audio natif utilisé par défaut
pub const DEFAULT_MODEL: &str = "models/gemini-2.5-flash-native-audio-preview-12-2025";

/// Voix synthétisée par défaut
pub const DEFAULT_VOICE: &str = "Zephyr";

/// Fréquence par défaut de l'audio reçu si le MIME ne l'annonce pas
pub const DEFAULT_INBOUND_RATE: u32 = 24000;

/// Variables d'environnement consultées pour la clé API, dans l'ordre
pub const API_KEY_ENV_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

/// Locuteur d'un tour de conversation
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// L'utilisateur au micro
    User,
    /// La voix synthétisée
    Model,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
        }
    }
}

/// Message reçu du serveur, classé par nature
///
/// Chaque chunk est consommé une seule fois : l'audio par le planificateur
/// de lecture, le reste par le réducteur de transcription.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundChunk {
    /// Audio synthétisé (PCM 16 bits LE en base64)
    Audio { data: String, sample_rate: u32 },

    /// Fragment de transcription en cours
    Transcript { role: Role, text: String },

    /// Fin du tour d'un locuteur
    TurnComplete(Role),

    /// Le serveur signale une erreur ou une fin de session
    SessionError(String),
}

/// Événement produit par un transport ouvert
#[derive(Clone, Debug, PartialEq)]
pub enum TransportEvent {
    /// Le serveur a accepté la configuration : la session est ouverte
    Opened,

    /// Message reçu
    Chunk(InboundChunk),

    /// La connexion est terminée (fermeture distante ou erreur)
    Closed { reason: String },
}

/// Configuration du transport
///
/// `#[serde(default)]` : les champs absents du fichier prennent la valeur par défaut
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// URL WebSocket du serveur (ws:// ou wss://)
    pub endpoint: String,

    /// Clé API ; si absente, lue dans l'environnement
    pub api_key: Option<String>,

    /// Modèle demandé au serveur
    pub model: String,

    /// Nom de la voix synthétisée
    pub voice_name: String,

    /// Fréquence annoncée pour l'audio envoyé (Hz)
    pub input_sample_rate: u32,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            api_key: None,
            model: DEFAULT_MODEL.to_string(),
            voice_name: DEFAULT_VOICE.to_string(),
            input_sample_rate: audio::CAPTURE_SAMPLE_RATE,
        }
    }
}

impl NetworkConfig {
    /// Configuration pour un serveur local sans TLS (tests, proxy)
    pub fn local(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: Some("local".to_string()),
            ..Default::default()
        }
    }

    /// Clé API effective : configuration, puis variables d'environnement
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| {
                API_KEY_ENV_VARS
                    .iter()
                    .filter_map(|name| std::env::var(name).ok())
                    .find(|key| !key.trim().is_empty())
            })
    }

    /// URL finale de connexion, clé API incluse
    pub fn endpoint_url(&self) -> crate::NetworkResult<String> {
        self.validate().map_err(crate::NetworkError::InvalidUrl)?;

        let key = self
            .resolve_api_key()
            .ok_or_else(|| crate::NetworkError::ConfigError("clé API manquante".to_string()))?;

        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        Ok(format!("{}{}key={}", self.endpoint, separator, key.trim()))
    }

    /// Valide que la configuration est cohérente
    pub fn validate(&self) -> Result<(), String> {
        if !(self.endpoint.starts_with("ws://") || self.endpoint.starts_with("wss://")) {
            return Err(format!("Le point d'accès doit être en ws:// ou wss:// : {}", self.endpoint));
        }

        if self.model.trim().is_empty() {
            return Err("Nom de modèle vide".to_string());
        }

        if self.voice_name.trim().is_empty() {
            return Err("Nom de voix vide".to_string());
        }

        if self.input_sample_rate < 8000 || self.input_sample_rate > 48000 {
            return Err(format!(
                "Sample rate d'envoi invalide: {} (doit être entre 8000 et 48000)",
                self.input_sample_rate
            ));
        }

        Ok(())
    }
}

/// Paramètres propres à une session
#[derive(Clone, Debug, PartialEq)]
pub struct SessionSetup {
    /// Instruction système complète (persona, contexte, règles)
    pub system_instruction: String,

    /// Nombre maximum de frames en attente d'envoi
    pub queue_capacity: usize,
}

impl SessionSetup {
    pub fn new(system_instruction: impl Into<String>) -> Self {
        Self {
            system_instruction: system_instruction.into(),
            queue_capacity: audio::AudioConfig::default().outbound_queue_frames,
        }
    }

    /// Change la taille de la file d'envoi (au moins une frame)
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NetworkConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.voice_name, "Zephyr");
        assert_eq!(config.input_sample_rate, 16000);
    }

    #[test]
    fn test_endpoint_url_with_key() {
        let config = NetworkConfig {
            api_key: Some("abc".to_string()),
            ..Default::default()
        };
        let url = config.endpoint_url().unwrap();
        assert!(url.starts_with("wss://generativelanguage.googleapis.com/"));
        assert!(url.ends_with("BidiGenerateContent?key=abc"));

        let local = NetworkConfig::local("ws://127.0.0.1:9000/live?v=1");
        assert_eq!(local.endpoint_url().unwrap(), "ws://127.0.0.1:9000/live?v=1&key=local");
    }

    #[test]
    fn test_invalid_endpoint() {
        let config = NetworkConfig::local("http://example.com");
        assert!(config.validate().is_err());
        assert!(matches!(config.endpoint_url(), Err(crate::NetworkError::InvalidUrl(_))));
    }

    #[test]
    fn test_role_serialization() {
        assert_eq!(serde_json::to_string(&Role::User).unwrap(), "\"user\"");
        assert_eq!(Role::Model.to_string(), "model");
    }

    #[test]
    fn test_setup_queue_capacity() {
        let setup = SessionSetup::new("contexte").with_queue_capacity(0);
        assert_eq!(setup.queue_capacity, 1);
        assert_eq!(SessionSetup::new("x").queue_capacity, 8);
    }
}
