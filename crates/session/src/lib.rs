//! Crate session - Session vocale bidirectionnelle
//!
//! Ce crate assemble la chaîne audio et le transport en une session :
//! le micro part vers le serveur, la voix synthétisée revient sans trou,
//! les transcriptions sont réduites en tours de conversation.
//!
//! # Architecture
//!
//! - `error` : Gestion d'erreurs de la session
//! - `state` : Machine d'états (`Idle`, `Connecting`, `Active`, ...)
//! - `config` : Configuration TOML et instruction système
//! - `context` : Mesures des capteurs et texte de contexte
//! - `reducer` : Réduction des fragments de transcription
//! - `observer` : Observateurs (transcription, statut, volume)
//! - `controller` : Contrôleur de session
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use audio::{CpalCaptureBackend, CpalOutputBackend};
//! use network::WebSocketConnector;
//! use session::{context_text, ChannelObserver, SessionConfig, SessionController};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SessionConfig::default();
//! let connector = WebSocketConnector::new(config.network.clone())?;
//! let (observer, mut events) = ChannelObserver::new();
//!
//! let controller = SessionController::new(
//!     config,
//!     Arc::new(CpalCaptureBackend),
//!     Arc::new(CpalOutputBackend),
//!     Arc::new(connector),
//!     Arc::new(observer),
//! );
//!
//! controller.connect(&context_text(None)).await?;
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! controller.disconnect();
//! # Ok(())
//! # }
//! ```

mod error;
mod state;
mod config;
mod context;
mod reducer;
mod observer;
mod controller;

pub use error::{SessionError, SessionResult};

pub use state::SessionState;

pub use config::{SessionConfig, DEFAULT_PERSONA, DEFAULT_RULES};

pub use context::{
    context_text, parse_sensor_csv, SensorHistory, SensorReading, StaticSensorHistory,
};

pub use reducer::{SpeakerBuffer, Transcription, TranscriptionReducer};

pub use observer::{ChannelObserver, SessionEvent, SessionObserver};

pub use controller::SessionController;

/// Version du crate session
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
