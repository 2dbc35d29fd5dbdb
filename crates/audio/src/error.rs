//! Gestion d'erreurs pour le système audio
//!
//! Ce module définit tous les types d'erreurs possibles dans la chaîne audio
//! de la session vocale : périphériques, conversion de format et décodage
//! des payloads reçus du serveur.

use thiserror::Error;

/// Énumération de toutes les erreurs possibles dans le système audio
///
/// `thiserror::Error` génère automatiquement l'implémentation du trait Error
/// et nous permet de définir des messages d'erreur avec `#[error("...")]`
#[derive(Error, Debug)]
pub enum AudioError {
    /// Aucun périphérique audio (microphone ou haut-parleurs) n'a été trouvé
    #[error("Aucun périphérique audio trouvé")]
    NoDeviceFound,

    /// Erreur lors de la configuration des paramètres audio (sample rate, etc.)
    #[error("Erreur de configuration audio: {0}")]
    ConfigError(String),

    /// Erreur provenant d'un stream cpal (construction, lecture, pause)
    #[error("Erreur de stream audio: {0}")]
    StreamError(String),

    /// Demande de suréchantillonnage : seule la réduction de fréquence est supportée
    #[error("Suréchantillonnage non supporté: {from} Hz → {to} Hz")]
    UpsamplingNotSupported { from: u32, to: u32 },

    /// Payload audio reçu invalide (base64 corrompu, nombre d'octets impair...)
    #[error("Payload audio invalide: {0}")]
    InvalidPayload(String),

    /// Erreur lors de l'initialisation d'un composant
    #[error("Erreur d'initialisation: {0}")]
    InitializationError(String),
}

/// Conversion des erreurs cpal::PlayStreamError
impl From<cpal::PlayStreamError> for AudioError {
    fn from(err: cpal::PlayStreamError) -> Self {
        AudioError::StreamError(format!("Erreur démarrage stream: {:?}", err))
    }
}

/// Conversion des erreurs cpal::BuildStreamError
impl From<cpal::BuildStreamError> for AudioError {
    fn from(err: cpal::BuildStreamError) -> Self {
        AudioError::StreamError(format!("Erreur construction stream: {:?}", err))
    }
}

/// Conversion des erreurs cpal::DefaultStreamConfigError
impl From<cpal::DefaultStreamConfigError> for AudioError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        AudioError::ConfigError(format!("Erreur config par défaut: {:?}", err))
    }
}

/// Conversion des erreurs cpal::PauseStreamError
impl From<cpal::PauseStreamError> for AudioError {
    fn from(err: cpal::PauseStreamError) -> Self {
        AudioError::StreamError(format!("Erreur pause stream: {:?}", err))
    }
}

/// Un base64 illisible est un payload invalide, jamais une erreur fatale
impl From<base64::DecodeError> for AudioError {
    fn from(err: base64::DecodeError) -> Self {
        AudioError::InvalidPayload(format!("base64 invalide: {}", err))
    }
}

/// Type Result personnalisé pour notre crate
///
/// Au lieu d'écrire Result<T, AudioError> partout, on peut écrire AudioResult<T>
pub type AudioResult<T> = Result<T, AudioError>;

impl AudioError {
    /// Indique si l'erreur concerne un seul payload et peut être ignorée
    ///
    /// Les payloads malformés sont jetés et loggés, la session continue.
    pub fn is_payload_error(&self) -> bool {
        matches!(self, AudioError::InvalidPayload(_))
    }
}
