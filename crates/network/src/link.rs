//! Lien de transport ouvert : envoi, réception, fermeture
//!
//! Trois poignées indépendantes, que la session répartit entre ses activités :
//! - `OutboundSender` part dans le callback du micro (envoi sans attente)
//! - le récepteur d'événements alimente la boucle de la session
//! - `CloseHandle` reste au contrôleur pour la fermeture

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, watch};

use audio::{EncodedFrame, FrameDropReason, FrameSink};

use crate::TransportEvent;

/// Côté envoi du transport
///
/// `try_send` sur une file bornée : le callback temps réel ne bloque jamais.
#[derive(Clone, Debug)]
pub struct OutboundSender {
    frames: mpsc::Sender<EncodedFrame>,
    refused: Arc<AtomicU64>,
}

impl OutboundSender {
    pub fn new(frames: mpsc::Sender<EncodedFrame>) -> Self {
        Self {
            frames,
            refused: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Nombre de frames refusées depuis l'ouverture
    pub fn refused_count(&self) -> u64 {
        self.refused.load(Ordering::Relaxed)
    }
}

impl FrameSink for OutboundSender {
    fn send_frame(&self, frame: EncodedFrame) -> Result<(), FrameDropReason> {
        self.frames.try_send(frame).map_err(|e| {
            self.refused.fetch_add(1, Ordering::Relaxed);
            match e {
                mpsc::error::TrySendError::Full(_) => FrameDropReason::QueueFull,
                mpsc::error::TrySendError::Closed(_) => FrameDropReason::Closed,
            }
        })
    }
}

/// Demande de fermeture des tâches réseau
///
/// Synchrone et idempotent : utilisable depuis n'importe quel état.
#[derive(Clone, Debug)]
pub struct CloseHandle {
    shutdown: Arc<watch::Sender<bool>>,
}

impl CloseHandle {
    /// Crée la poignée et le récepteur surveillé par les tâches
    pub fn new() -> (Self, watch::Receiver<bool>) {
        let (shutdown, receiver) = watch::channel(false);
        (
            Self {
                shutdown: Arc::new(shutdown),
            },
            receiver,
        )
    }

    /// Demande la fermeture. Retourne faux si elle était déjà demandée.
    pub fn close(&self) -> bool {
        self.shutdown.send_if_modified(|closed| {
            let first = !*closed;
            *closed = true;
            first
        })
    }

    /// Vrai si la fermeture a été demandée
    pub fn is_closed(&self) -> bool {
        *self.shutdown.borrow()
    }
}

/// Session duplex ouverte vers le serveur
#[derive(Debug)]
pub struct TransportLink {
    /// Envoi des frames du micro
    pub outbound: OutboundSender,

    /// Événements reçus, dans l'ordre d'arrivée
    pub events: mpsc::UnboundedReceiver<TransportEvent>,

    /// Fermeture de la connexion
    pub close: CloseHandle,
}

impl TransportLink {
    pub fn new(
        outbound: OutboundSender,
        events: mpsc::UnboundedReceiver<TransportEvent>,
        close: CloseHandle,
    ) -> Self {
        Self { outbound, events, close }
    }
}
