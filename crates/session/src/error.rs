//! Gestion d'erreurs pour la session vocale
//!
//! Les erreurs des crates audio et network remontent telles quelles ;
//! la session ajoute les erreurs d'état et de configuration.

use thiserror::Error;

use audio::AudioError;
use network::NetworkError;

/// Énumération de toutes les erreurs possibles au niveau de la session
#[derive(Error, Debug)]
pub enum SessionError {
    /// Erreur de la chaîne audio (micro, sortie, payload)
    #[error("Erreur audio: {0}")]
    Audio(#[from] AudioError),

    /// Erreur du transport vers le serveur vocal
    #[error("Erreur réseau: {0}")]
    Network(#[from] NetworkError),

    /// Opération refusée dans l'état courant
    #[error("Opération {operation} invalide dans l'état {state}")]
    InvalidState { operation: String, state: String },

    /// Configuration de session incohérente
    #[error("Configuration invalide: {0}")]
    Config(String),

    /// Erreur de lecture d'un fichier (configuration, capteurs)
    #[error("Erreur IO: {0}")]
    Io(#[from] std::io::Error),

    /// Fichier de configuration TOML illisible
    #[error("Erreur TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Type Result personnalisé pour notre crate session
pub type SessionResult<T> = Result<T, SessionError>;

impl SessionError {
    /// Crée une erreur d'état
    pub fn invalid_state(operation: &str, state: impl std::fmt::Display) -> Self {
        Self::InvalidState {
            operation: operation.to_string(),
            state: state.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = SessionError::invalid_state("connect", "Active");
        assert_eq!(error.to_string(), "Opération connect invalide dans l'état Active");

        let error: SessionError = AudioError::NoDeviceFound.into();
        assert_eq!(error.to_string(), "Erreur audio: Aucun périphérique audio trouvé");
    }

    #[test]
    fn test_network_error_display() {
        let error: SessionError = NetworkError::ChannelClosed.into();
        assert_eq!(error.to_string(), "Erreur réseau: Canal de transport fermé");
    }
}
