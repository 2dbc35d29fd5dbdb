//! Observateurs de la session
//!
//! La session signale trois choses au reste du système : la transcription
//! (en cours ou figée), l'état de connexion et le volume du micro.
//! `ChannelObserver` transforme ces appels en flux d'événements tokio.

use std::sync::Arc;

use tokio::sync::mpsc;

use audio::VolumeObserver;
use network::Role;

/// Écouteur des événements d'une session
///
/// `on_volume` est appelé depuis le callback temps réel du micro :
/// l'implémentation ne doit jamais bloquer.
pub trait SessionObserver: Send + Sync {
    /// Texte transcrit ; `is_turn_complete` distingue le texte figé du texte en cours
    fn on_transcription(&self, role: Role, text: &str, is_turn_complete: bool);

    /// Session ouverte (`true`) ou terminée (`false`)
    fn on_status(&self, connected: bool);

    /// Volume du micro entre 0 et 100
    fn on_volume(&self, level: f32);
}

/// Événement d'une session, tel que transmis par `ChannelObserver`
#[derive(Clone, Debug, PartialEq)]
pub enum SessionEvent {
    Transcription {
        role: Role,
        text: String,
        is_turn_complete: bool,
    },
    Status(bool),
    Volume(f32),
}

/// Observateur qui pousse les événements dans un canal non borné
///
/// L'envoi ne bloque jamais ; les événements sont perdus si le récepteur
/// a été abandonné. Le volume n'est transmis qu'après `with_volume()`.
#[derive(Clone, Debug)]
pub struct ChannelObserver {
    sender: mpsc::UnboundedSender<SessionEvent>,
    forward_volume: bool,
}

impl ChannelObserver {
    /// Crée l'observateur et le récepteur des événements
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (
            Self {
                sender,
                forward_volume: false,
            },
            receiver,
        )
    }

    /// Transmet aussi le volume du micro (un événement par frame de capture)
    pub fn with_volume(mut self) -> Self {
        self.forward_volume = true;
        self
    }
}

impl SessionObserver for ChannelObserver {
    fn on_transcription(&self, role: Role, text: &str, is_turn_complete: bool) {
        let _ = self.sender.send(SessionEvent::Transcription {
            role,
            text: text.to_string(),
            is_turn_complete,
        });
    }

    fn on_status(&self, connected: bool) {
        let _ = self.sender.send(SessionEvent::Status(connected));
    }

    fn on_volume(&self, level: f32) {
        if self.forward_volume {
            let _ = self.sender.send(SessionEvent::Volume(level));
        }
    }
}

/// Branche l'observateur de session sur le pipeline de capture
pub(crate) struct VolumeForwarder(pub(crate) Arc<dyn SessionObserver>);

impl VolumeObserver for VolumeForwarder {
    fn on_volume(&self, level: f32) {
        self.0.on_volume(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_observer_forwards_events() {
        let (observer, mut events) = ChannelObserver::new();
        let observer = observer.with_volume();

        observer.on_status(true);
        observer.on_transcription(Role::Model, "Bonjour", false);
        observer.on_volume(42.0);

        assert_eq!(events.try_recv().unwrap(), SessionEvent::Status(true));
        assert_eq!(
            events.try_recv().unwrap(),
            SessionEvent::Transcription {
                role: Role::Model,
                text: "Bonjour".to_string(),
                is_turn_complete: false
            }
        );
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Volume(42.0));
    }

    #[test]
    fn test_volume_is_not_forwarded_by_default() {
        let (observer, mut events) = ChannelObserver::new();
        let observer: Arc<dyn SessionObserver> = Arc::new(observer);

        // Une seconde de capture : 100 frames de 10 ms
        let forwarder = VolumeForwarder(observer.clone());
        for _ in 0..100 {
            forwarder.on_volume(10.0);
        }
        observer.on_status(false);

        assert_eq!(events.try_recv().unwrap(), SessionEvent::Status(false));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_dropped_receiver_is_harmless() {
        let (observer, events) = ChannelObserver::new();
        drop(events);
        observer.on_status(true);
        observer.on_volume(1.0);
    }
}
