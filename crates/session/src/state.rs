//! États de la session vocale
//!
//! ```text
//! Idle ──connect()──→ Connecting ──transport ouvert──→ Active
//!                        │                               │ disconnect() / fermeture / erreur
//!                        │ échec                         ↓
//!                        ↓                            Closing ──ressources libérées──→ Closed
//!                  Failed(raison)
//! ```
//!
//! Les ressources (micro, sortie, transport) n'existent que dans
//! `Connecting`, `Active` et `Closing`.

use std::fmt;

/// État courant de la session
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Jamais connectée
    Idle,

    /// Acquisition des périphériques et ouverture du transport
    Connecting,

    /// Session ouverte : l'audio circule dans les deux sens
    Active,

    /// Libération des ressources en cours
    Closing,

    /// Session terminée, ressources libérées
    Closed,

    /// Échec pendant la connexion, ressources libérées
    Failed(String),
}

impl SessionState {
    /// Vrai si `connect()` est accepté dans cet état
    pub fn can_connect(&self) -> bool {
        matches!(self, SessionState::Idle | SessionState::Closed)
    }

    /// Raison de l'échec, si la session a échoué
    pub fn failure_reason(&self) -> Option<&str> {
        match self {
            SessionState::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "Idle"),
            SessionState::Connecting => write!(f, "Connecting"),
            SessionState::Active => write!(f, "Active"),
            SessionState::Closing => write!(f, "Closing"),
            SessionState::Closed => write!(f, "Closed"),
            SessionState::Failed(reason) => write!(f, "Failed({})", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_allowed_states() {
        assert!(SessionState::Idle.can_connect());
        assert!(SessionState::Closed.can_connect());
        assert!(!SessionState::Connecting.can_connect());
        assert!(!SessionState::Active.can_connect());
        assert!(!SessionState::Closing.can_connect());
        assert!(!SessionState::Failed("micro refusé".to_string()).can_connect());
    }

    #[test]
    fn test_display() {
        let failed = SessionState::Failed("réseau".to_string());
        assert_eq!(failed.to_string(), "Failed(réseau)");
        assert_eq!(failed.failure_reason(), Some("réseau"));
        assert_eq!(SessionState::Active.to_string(), "Active");
    }
}
