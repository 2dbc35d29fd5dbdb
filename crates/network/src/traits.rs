//! Traits abstraits pour le transport
//!
//! Le contrôleur de session ne connaît que `VoiceConnector` : le vrai
//! WebSocket et le connecteur simulé des tests s'utilisent de la même façon.

use async_trait::async_trait;

use crate::{NetworkResult, SessionSetup, TransportLink};

/// Ouvre une session duplex vers le serveur vocal
///
/// `#[async_trait]` permet d'avoir des fonctions async dans les traits.
/// `Send + Sync` : le connecteur est partagé entre tâches.
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    /// Établit la connexion et envoie la configuration de session
    ///
    /// Le retour ne signifie pas que la session est ouverte : le lien
    /// produira `TransportEvent::Opened` quand le serveur l'acceptera.
    ///
    /// # Erreurs
    /// - `NetworkError::ConfigError` / `InvalidUrl` : configuration inutilisable
    /// - `NetworkError::ConnectionFailed` / `WebSocket` : serveur injoignable
    async fn connect(&self, setup: SessionSetup) -> NetworkResult<TransportLink>;

    /// Description du point d'accès pour les logs
    fn describe(&self) -> String {
        "connecteur vocal".to_string()
    }
}
