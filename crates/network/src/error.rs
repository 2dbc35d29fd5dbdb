//! Gestion d'erreurs pour le transport vers le serveur vocal
//!
//! Ce module définit tous les types d'erreurs possibles entre la session et
//! le serveur vocal distant. Il suit les mêmes patterns que le module audio
//! pour la cohérence du code.

use thiserror::Error;

/// Énumération de toutes les erreurs possibles dans le transport
///
/// `thiserror::Error` génère automatiquement l'implémentation du trait Error
/// avec des messages d'erreur descriptifs en français.
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Impossible d'établir la connexion WebSocket
    #[error("Connexion au serveur vocal impossible: {0}")]
    ConnectionFailed(String),

    /// URL du serveur invalide (schéma, format)
    #[error("URL invalide: {0}")]
    InvalidUrl(String),

    /// Erreur du protocole WebSocket
    #[error("Erreur WebSocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Erreur lors de la sérialisation/désérialisation des messages JSON
    #[error("Erreur de sérialisation: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Message reçu illisible ou inattendu
    #[error("Message invalide reçu: {0}")]
    InvalidMessage(String),

    /// Le canal interne vers les tâches réseau est fermé
    #[error("Canal de transport fermé")]
    ChannelClosed,

    /// Erreur de configuration réseau
    #[error("Configuration réseau invalide: {0}")]
    ConfigError(String),
}

/// Type Result personnalisé pour notre crate network
///
/// Au lieu d'écrire Result<T, NetworkError> partout, on peut écrire NetworkResult<T>
pub type NetworkResult<T> = Result<T, NetworkError>;
