//! Crate network - Transport duplex vers le serveur vocal
//!
//! Ce crate ouvre une session de streaming bidirectionnel avec le serveur
//! vocal : l'audio du micro part en continu, la voix synthétisée et les
//! transcriptions reviennent sous forme d'événements classés.
//!
//! # Architecture
//!
//! - `error` : Gestion d'erreurs du transport
//! - `types` : Configuration, rôles, chunks et événements
//! - `protocol` : Messages JSON du protocole et classification
//! - `traits` : Trait `VoiceConnector`
//! - `link` : Poignées d'un transport ouvert (envoi, événements, fermeture)
//! - `transport` : Connecteur WebSocket et connecteur simulé
//!
//! # Example
//!
//! ```rust,no_run
//! use network::{NetworkConfig, SessionSetup, TransportEvent, VoiceConnector, WebSocketConnector};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let connector = WebSocketConnector::new(NetworkConfig::default())?;
//! let mut link = connector.connect(SessionSetup::new("Tu es l'agronome.")).await?;
//!
//! while let Some(event) = link.events.recv().await {
//!     match event {
//!         TransportEvent::Opened => println!("session ouverte"),
//!         TransportEvent::Chunk(chunk) => println!("reçu : {:?}", chunk),
//!         TransportEvent::Closed { reason } => {
//!             println!("fermée : {}", reason);
//!             break;
//!         }
//!     }
//! }
//! link.close.close();
//! # Ok(())
//! # }
//! ```

// Modules internes
mod error;
mod types;
mod traits;
mod link;
mod transport;
pub mod protocol;

// Re-exports publics
pub use error::{NetworkError, NetworkResult};

pub use types::{
    InboundChunk, NetworkConfig, Role, SessionSetup, TransportEvent, API_KEY_ENV_VARS,
    DEFAULT_ENDPOINT, DEFAULT_INBOUND_RATE, DEFAULT_MODEL, DEFAULT_VOICE,
};

pub use traits::VoiceConnector;

pub use link::{CloseHandle, OutboundSender, TransportLink};

pub use transport::{SimulatedConnector, SimulatedRemote, WebSocketConnector};

/// Version du crate network
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
