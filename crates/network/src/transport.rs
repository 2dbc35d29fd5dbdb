//! Implémentations du transport vers le serveur vocal
//!
//! Ce module contient deux implémentations :
//! - `WebSocketConnector` : vraie connexion WebSocket (tokio-tungstenite)
//! - `SimulatedConnector` : serveur simulé en mémoire pour les tests
//!
//! Une connexion ouverte tourne sur deux tâches tokio indépendantes :
//!
//! ```text
//! callback micro → [file bornée] → tâche d'écriture → WebSocket
//! WebSocket → tâche de lecture → classify() → événements → session
//! ```

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use audio::EncodedFrame;

use crate::{
    protocol, CloseHandle, InboundChunk, NetworkConfig, NetworkError, NetworkResult,
    OutboundSender, SessionSetup, TransportEvent, TransportLink, VoiceConnector,
};

/// Connecteur WebSocket vers le serveur vocal
#[derive(Clone, Debug)]
pub struct WebSocketConnector {
    config: NetworkConfig,
}

impl WebSocketConnector {
    /// Crée un connecteur ; vérifie la configuration sans se connecter
    pub fn new(config: NetworkConfig) -> NetworkResult<Self> {
        config.validate().map_err(NetworkError::ConfigError)?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }
}

#[async_trait]
impl VoiceConnector for WebSocketConnector {
    async fn connect(&self, setup: SessionSetup) -> NetworkResult<TransportLink> {
        let url = self.config.endpoint_url()?;

        info!(endpoint = %self.config.endpoint, model = %self.config.model, "connexion au serveur vocal");

        let (socket, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;
        let (mut sink, stream) = socket.split();

        let setup_json = serde_json::to_string(&protocol::setup_message(&self.config, &setup))?;
        sink.send(Message::Text(setup_json)).await?;
        debug!("configuration de session envoyée");

        let (frame_tx, frame_rx) = mpsc::channel(setup.queue_capacity.max(1));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (close, shutdown) = CloseHandle::new();

        tokio::spawn(run_writer(sink, frame_rx, shutdown.clone()));
        tokio::spawn(run_reader(stream, event_tx, shutdown));

        Ok(TransportLink::new(OutboundSender::new(frame_tx), event_rx, close))
    }

    fn describe(&self) -> String {
        self.config.endpoint.clone()
    }
}

/// Tâche d'écriture : frames du micro → messages `realtimeInput`
///
/// Se termine sur demande de fermeture, fermeture de la file ou erreur
/// d'envoi. Les envois ne sont jamais réessayés.
async fn run_writer<S>(mut sink: S, mut frames: mpsc::Receiver<EncodedFrame>, mut shutdown: watch::Receiver<bool>)
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let mut sent: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            frame = frames.recv() => {
                let Some(frame) = frame else { break };

                let text = match serde_json::to_string(&protocol::media_message(&frame)) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(sequence = frame.sequence_number, error = %e, "frame non sérialisable, jetée");
                        continue;
                    }
                };

                if let Err(e) = sink.send(Message::Text(text)).await {
                    warn!(sequence = frame.sequence_number, error = %e, "envoi impossible, arrêt de l'écriture");
                    break;
                }
                sent += 1;
            }
        }
    }

    if let Err(e) = sink.close().await {
        debug!(error = %e, "fermeture du WebSocket");
    }
    debug!(sent, "tâche d'écriture terminée");
}

/// Tâche de lecture : messages du serveur → événements de transport
///
/// Émet `Closed` si la connexion se termine côté serveur ou sur erreur ;
/// une fermeture locale termine la tâche sans événement.
async fn run_reader<S>(
    mut stream: S,
    events: mpsc::UnboundedSender<TransportEvent>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let reason = loop {
        let message = tokio::select! {
            _ = shutdown.changed() => {
                debug!("lecture arrêtée par fermeture locale");
                return;
            }
            message = stream.next() => message,
        };

        let payload = match message {
            Some(Ok(Message::Text(text))) => text.into_bytes(),
            Some(Ok(Message::Binary(data))) => data,
            Some(Ok(Message::Close(frame))) => {
                break frame
                    .map(|f| format!("fermé par le serveur ({}): {}", f.code, f.reason))
                    .unwrap_or_else(|| "fermé par le serveur".to_string());
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => break format!("erreur de transport: {}", e),
            None => break "connexion terminée".to_string(),
        };

        match protocol::parse_server_message(&payload) {
            Ok(message) => {
                for event in protocol::classify(message) {
                    if events.send(event).is_err() {
                        return;
                    }
                }
            }
            Err(e) => warn!(error = %e, "message du serveur ignoré"),
        }
    };

    info!(%reason, "transport fermé");
    let _ = events.send(TransportEvent::Closed { reason });
}

/// Serveur vocal simulé, piloté par les tests
///
/// Chaque `connect()` crée un `SimulatedRemote` transmis au test par un
/// canal : le test voit les frames envoyées et pousse les événements.
pub struct SimulatedConnector {
    remotes: mpsc::UnboundedSender<SimulatedRemote>,
    failure: Mutex<Option<String>>,
    connections: AtomicUsize,
}

impl SimulatedConnector {
    /// Crée un connecteur et le récepteur des serveurs simulés
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SimulatedRemote>) {
        let (remotes, receiver) = mpsc::unbounded_channel();
        (
            Self {
                remotes,
                failure: Mutex::new(None),
                connections: AtomicUsize::new(0),
            },
            receiver,
        )
    }

    /// Fait échouer les prochaines connexions
    pub fn fail_with(&self, reason: impl Into<String>) {
        if let Ok(mut failure) = self.failure.lock() {
            *failure = Some(reason.into());
        }
    }

    /// Nombre de tentatives de connexion reçues
    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VoiceConnector for SimulatedConnector {
    async fn connect(&self, setup: SessionSetup) -> NetworkResult<TransportLink> {
        self.connections.fetch_add(1, Ordering::SeqCst);

        let failure = self.failure.lock().ok().and_then(|f| f.clone());
        if let Some(reason) = failure {
            return Err(NetworkError::ConnectionFailed(reason));
        }

        let (frame_tx, frame_rx) = mpsc::channel(setup.queue_capacity.max(1));
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (close, shutdown) = CloseHandle::new();

        let remote = SimulatedRemote {
            setup,
            frames: frame_rx,
            events: event_tx,
            shutdown,
        };
        self.remotes.send(remote).map_err(|_| NetworkError::ChannelClosed)?;

        Ok(TransportLink::new(OutboundSender::new(frame_tx), event_rx, close))
    }

    fn describe(&self) -> String {
        "serveur simulé".to_string()
    }
}

/// Côté serveur d'une connexion simulée
pub struct SimulatedRemote {
    /// Configuration reçue du client
    pub setup: SessionSetup,
    frames: mpsc::Receiver<EncodedFrame>,
    events: mpsc::UnboundedSender<TransportEvent>,
    shutdown: watch::Receiver<bool>,
}

impl SimulatedRemote {
    /// Accepte la configuration (équivalent de `setupComplete`)
    pub fn open(&self) -> NetworkResult<()> {
        self.push(TransportEvent::Opened)
    }

    /// Envoie un chunk au client
    pub fn send_chunk(&self, chunk: InboundChunk) -> NetworkResult<()> {
        self.push(TransportEvent::Chunk(chunk))
    }

    /// Envoie un message JSON brut, classé comme le ferait le WebSocket
    pub fn send_json(&self, json: &str) -> NetworkResult<()> {
        let message = protocol::parse_server_message(json.as_bytes())?;
        for event in protocol::classify(message) {
            self.push(event)?;
        }
        Ok(())
    }

    /// Ferme la connexion côté serveur
    pub fn close(&self, reason: impl Into<String>) -> NetworkResult<()> {
        self.push(TransportEvent::Closed { reason: reason.into() })
    }

    /// Prochaine frame envoyée par le client (None si la file est fermée)
    pub async fn next_frame(&mut self) -> Option<EncodedFrame> {
        self.frames.recv().await
    }

    /// Vrai si le client a fermé la connexion
    pub fn is_closed_by_client(&self) -> bool {
        *self.shutdown.borrow() || self.events.is_closed()
    }

    fn push(&self, event: TransportEvent) -> NetworkResult<()> {
        self.events.send(event).map_err(|_| NetworkError::ChannelClosed)
    }
}
