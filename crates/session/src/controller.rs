//! Contrôleur de session vocale
//!
//! Le contrôleur possède les trois ressources d'une session (micro, sortie
//! audio, transport) et les observateurs fournis à la construction.
//!
//! ```text
//!                 ┌────────────── CapturePipeline ──────────────┐
//! Micro (callback)│ volume → observateur   frames → OutboundSender ├─→ serveur
//!                 └──────────────────────────────────────────────┘
//! serveur → boucle d'événements ─┬─ audio → PlaybackScheduler → sortie (callback)
//!                                └─ transcriptions → TranscriptionReducer → observateur
//! ```
//!
//! `connect()` ne remonte pas les échecs de périphérique ou de réseau :
//! la session passe en `Failed` et l'observateur reçoit `on_status(false)`.
//! `disconnect()` est synchrone, idempotente et libère les ressources au
//! plus une fois.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use audio::{
    AudioStats, CaptureBackend, CaptureDevice, CapturePipeline, OutputBackend, OutputDevice,
    PlaybackScheduler, StatsCounters,
};
use network::{
    CloseHandle, InboundChunk, OutboundSender, SessionSetup, TransportEvent, TransportLink,
    VoiceConnector,
};

use crate::observer::VolumeForwarder;
use crate::{
    SessionConfig, SessionError, SessionObserver, SessionResult, SessionState, TranscriptionReducer,
};

/// Contrôleur d'une session vocale bidirectionnelle
///
/// Clonable : toutes les copies pilotent la même session.
#[derive(Clone)]
pub struct SessionController {
    inner: Arc<Inner>,
}

struct Inner {
    config: SessionConfig,
    capture: Arc<dyn CaptureBackend>,
    output: Arc<dyn OutputBackend>,
    connector: Arc<dyn VoiceConnector>,
    observer: Arc<dyn SessionObserver>,

    state: Mutex<SessionState>,

    /// Ressources de la session courante ; prises une seule fois à la fermeture
    resources: Mutex<Option<Resources>>,

    /// Numéro de la tentative courante ; les activités d'une tentative
    /// précédente n'agissent plus sur la session
    generation: AtomicU64,

    /// Compteurs de la dernière tentative
    stats: Mutex<Arc<StatsCounters>>,
}

/// Ressources détenues par une tentative de connexion
struct Resources {
    scheduler: Arc<PlaybackScheduler>,
    capture: Option<Box<dyn CaptureDevice>>,
    output: Option<Box<dyn OutputDevice>>,
    close: Option<CloseHandle>,
    event_loop: Option<JoinHandle<()>>,
    stats: Arc<StatsCounters>,
}

/// Cause de la fin d'une session
enum Ending {
    /// `disconnect()` appelé par l'utilisateur
    Local,
    /// Fermeture ou erreur signalée par le serveur
    Remote(String),
    /// Échec local : périphérique, transport ou démarrage du micro
    Failure(String),
}

impl SessionController {
    /// Crée un contrôleur inactif (`Idle`)
    pub fn new(
        config: SessionConfig,
        capture: Arc<dyn CaptureBackend>,
        output: Arc<dyn OutputBackend>,
        connector: Arc<dyn VoiceConnector>,
        observer: Arc<dyn SessionObserver>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                capture,
                output,
                connector,
                observer,
                state: Mutex::new(SessionState::Idle),
                resources: Mutex::new(None),
                generation: AtomicU64::new(0),
                stats: Mutex::new(Arc::new(StatsCounters::default())),
            }),
        }
    }

    /// Ouvre une session ancrée sur `context` (texte des capteurs)
    ///
    /// Acquiert le micro, ouvre la sortie audio puis le transport. La
    /// session devient `Active` quand le serveur accepte la configuration.
    ///
    /// # Erreurs
    /// - `SessionError::InvalidState` : état autre que `Idle` ou `Closed`
    ///
    /// Les échecs de périphérique ou de réseau ne sont pas des erreurs :
    /// la session passe en `Failed(raison)` et l'observateur est notifié.
    pub async fn connect(&self, context: &str) -> SessionResult<()> {
        let inner = &self.inner;

        let generation = {
            let mut state = lock(&inner.state);
            if !state.can_connect() {
                warn!(state = %state, "connexion refusée dans l'état courant");
                return Err(SessionError::invalid_state("connect", &*state));
            }
            *state = SessionState::Connecting;
            inner.generation.fetch_add(1, Ordering::AcqRel) + 1
        };

        info!(generation, server = %inner.connector.describe(), "ouverture de la session vocale");

        let stats = Arc::new(StatsCounters::default());
        *lock(&inner.stats) = stats.clone();
        let scheduler = Arc::new(PlaybackScheduler::new(&inner.config.audio, stats.clone()));
        let mut resources = Resources::new(scheduler.clone(), stats);

        // Les périphériques sont confiés à la session avant toute attente :
        // un `disconnect()` pendant la connexion les libère immédiatement.
        let acquired = inner.acquire_devices(&mut resources);
        if !inner.install(generation, resources) {
            return Ok(());
        }
        if let Err(e) = acquired {
            inner.shutdown(Some(generation), Ending::Failure(e.to_string()));
            return Ok(());
        }

        let setup = SessionSetup::new(inner.config.system_instruction(context))
            .with_queue_capacity(inner.config.audio.outbound_queue_frames);

        let TransportLink { outbound, events, close } = match inner.connector.connect(setup).await {
            Ok(link) => link,
            Err(e) => {
                let error = SessionError::from(e);
                inner.shutdown(Some(generation), Ending::Failure(error.to_string()));
                return Ok(());
            }
        };

        let state = lock(&inner.state);
        let current = inner.generation.load(Ordering::Acquire) == generation
            && *state == SessionState::Connecting;

        // Les ressources sont en place avant que la boucle ne traite `Opened`
        let mut slot = lock(&inner.resources);
        match slot.as_mut() {
            Some(resources) if current => {
                resources.close = Some(close);
                resources.event_loop = Some(tokio::spawn(run_events(
                    inner.clone(),
                    generation,
                    events,
                    outbound,
                    scheduler,
                )));
            }
            _ => {
                // Périphériques déjà libérés par la fermeture : seul le lien reste
                debug!(generation, "session fermée pendant la connexion");
                close.close();
                return Ok(());
            }
        }

        debug!(generation, "transport ouvert, attente de la configuration");
        Ok(())
    }

    /// Termine la session et libère toutes ses ressources
    ///
    /// Sûr depuis n'importe quel état, y compris pendant un callback audio
    /// ou un message en cours de traitement. Converge vers `Closed`.
    pub fn disconnect(&self) {
        self.inner.shutdown(None, Ending::Local);
    }

    /// État courant de la session
    pub fn state(&self) -> SessionState {
        lock(&self.inner.state).clone()
    }

    /// Vrai si l'audio circule dans les deux sens
    pub fn is_active(&self) -> bool {
        *lock(&self.inner.state) == SessionState::Active
    }

    /// Statistiques de la session courante (ou de la dernière)
    pub fn stats(&self) -> AudioStats {
        lock(&self.inner.stats).snapshot()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }
}

impl Inner {
    fn acquire_devices(&self, resources: &mut Resources) -> SessionResult<()> {
        let capture = self.capture.acquire()?;
        info!(device = %capture.device_info(), rate = capture.native_sample_rate(), "micro acquis");
        resources.capture = Some(capture);

        let output = self.output.open(resources.scheduler.clone())?;
        info!(device = %output.device_info(), "sortie audio ouverte");
        resources.output = Some(output);

        Ok(())
    }

    /// Confie les ressources acquises à la session
    ///
    /// Si la tentative n'est plus courante, les ressources sont libérées sur
    /// place et la fonction retourne faux.
    fn install(&self, generation: u64, mut resources: Resources) -> bool {
        let state = lock(&self.state);
        if self.generation.load(Ordering::Acquire) != generation || *state != SessionState::Connecting {
            drop(state);
            debug!(generation, "session fermée pendant l'acquisition des périphériques");
            resources.release();
            return false;
        }

        *lock(&self.resources) = Some(resources);
        true
    }

    /// Le serveur a accepté la configuration : démarre le micro
    ///
    /// Retourne faux si l'événement ne concerne plus la session courante.
    fn on_opened(&self, generation: u64, outbound: &OutboundSender) -> SessionResult<bool> {
        let mut state = lock(&self.state);
        if self.generation.load(Ordering::Acquire) != generation || *state != SessionState::Connecting {
            return Ok(false);
        }

        let mut slot = lock(&self.resources);
        let Some(resources) = slot.as_mut() else {
            return Ok(false);
        };
        let Some(capture) = resources.capture.as_mut() else {
            return Ok(false);
        };

        let pipeline = CapturePipeline::new(
            self.config.audio.clone(),
            Arc::new(outbound.clone()),
            Arc::new(VolumeForwarder(self.observer.clone())),
            resources.stats.clone(),
        );
        capture.start(pipeline)?;

        *state = SessionState::Active;
        Ok(true)
    }

    /// Fin de session, quelle qu'en soit la cause
    ///
    /// `generation` est fourni par la boucle d'événements : une boucle
    /// d'une tentative précédente ne ferme pas la session courante.
    fn shutdown(&self, generation: Option<u64>, ending: Ending) {
        let previous = {
            let mut state = lock(&self.state);
            if generation.is_some_and(|g| g != self.generation.load(Ordering::Acquire)) {
                return;
            }

            let previous = state.clone();
            match previous {
                SessionState::Connecting | SessionState::Active => *state = SessionState::Closing,
                SessionState::Idle | SessionState::Failed(_) => {
                    if matches!(ending, Ending::Local) {
                        *state = SessionState::Closed;
                    }
                    return;
                }
                SessionState::Closing | SessionState::Closed => return,
            }
            previous
        };

        match &ending {
            Ending::Local => info!("fermeture de la session demandée"),
            Ending::Remote(reason) => info!(%reason, "session terminée par le serveur"),
            Ending::Failure(reason) => error!(%reason, "session interrompue"),
        }

        let resources = lock(&self.resources).take();
        if let Some(mut resources) = resources {
            resources.release();
        }

        let final_state = match (previous, ending) {
            (SessionState::Connecting, Ending::Remote(reason) | Ending::Failure(reason)) => {
                SessionState::Failed(reason)
            }
            _ => SessionState::Closed,
        };
        info!(state = %final_state, "session terminée");
        *lock(&self.state) = final_state;

        self.observer.on_status(false);
    }
}

impl Resources {
    fn new(scheduler: Arc<PlaybackScheduler>, stats: Arc<StatsCounters>) -> Self {
        Self {
            scheduler,
            capture: None,
            output: None,
            close: None,
            event_loop: None,
            stats,
        }
    }

    /// Libère tout ce qui a été acquis, dans l'ordre de fermeture
    ///
    /// Chaque étape est tentée même si la précédente a échoué.
    fn release(&mut self) {
        self.scheduler.stop_all();

        if let Some(capture) = self.capture.as_mut() {
            if let Err(e) = capture.stop() {
                warn!(error = %e, "arrêt du micro");
            }
        }

        if let Some(mut output) = self.output.take() {
            if let Err(e) = output.close() {
                warn!(error = %e, "fermeture de la sortie audio");
            }
        }

        if let Some(mut capture) = self.capture.take() {
            capture.release();
        }

        if let Some(close) = self.close.take() {
            close.close();
        }

        if let Some(event_loop) = self.event_loop.take() {
            event_loop.abort();
        }

        let stats = self.stats.snapshot();
        info!(
            captured = stats.frames_captured,
            sent = stats.frames_sent,
            dropped = stats.frames_dropped,
            played = stats.chunks_scheduled,
            malformed = stats.payloads_dropped,
            starved = stats.starvation_resets,
            "ressources de session libérées"
        );
    }
}

/// Boucle d'événements d'une tentative : dispatch des messages du serveur
async fn run_events(
    inner: Arc<Inner>,
    generation: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    outbound: OutboundSender,
    scheduler: Arc<PlaybackScheduler>,
) {
    let mut reducer = TranscriptionReducer::new();

    let ending = loop {
        let Some(event) = events.recv().await else {
            break Ending::Remote("flux d'événements terminé".to_string());
        };

        match event {
            TransportEvent::Opened => match inner.on_opened(generation, &outbound) {
                Ok(true) => {
                    info!(generation, "session vocale active");
                    inner.observer.on_status(true);
                }
                Ok(false) => debug!(generation, "ouverture ignorée"),
                Err(e) => break Ending::Failure(format!("démarrage du micro impossible: {}", e)),
            },
            TransportEvent::Chunk(InboundChunk::Audio { data, sample_rate }) => {
                match scheduler.schedule_payload(&data, sample_rate) {
                    Ok(chunk) => debug!(id = chunk.id, start = chunk.start, duration = chunk.duration, "chunk planifié"),
                    Err(e) if e.is_payload_error() => warn!(error = %e, "chunk audio jeté"),
                    Err(e) => debug!(error = %e, "chunk reçu après l'arrêt de la lecture"),
                }
            }
            TransportEvent::Chunk(InboundChunk::SessionError(reason)) => break Ending::Remote(reason),
            TransportEvent::Chunk(chunk) => {
                if let Some(transcription) = reducer.apply(&chunk) {
                    inner.observer.on_transcription(
                        transcription.role,
                        &transcription.text,
                        transcription.is_turn_complete,
                    );
                }
            }
            TransportEvent::Closed { reason } => break Ending::Remote(reason),
        }
    };

    inner.shutdown(Some(generation), ending);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Notify;

    use audio::{AudioCodec, AudioError, AudioFrame, AudioResult, PcmCodec};
    use network::{NetworkResult, Role, SimulatedConnector, SimulatedRemote};

    use crate::{ChannelObserver, SessionEvent, DEFAULT_PERSONA};

    #[derive(Default)]
    struct MockDevices {
        deny_microphone: AtomicBool,
        acquired: AtomicUsize,
        stopped: AtomicUsize,
        released: AtomicUsize,
        opened: AtomicUsize,
        closed: AtomicUsize,
        pipeline: Mutex<Option<CapturePipeline>>,
        scheduler: Mutex<Option<Arc<PlaybackScheduler>>>,
    }

    impl MockDevices {
        fn count(counter: &AtomicUsize) -> usize {
            counter.load(Ordering::SeqCst)
        }
    }

    struct MockCaptureBackend(Arc<MockDevices>);

    impl CaptureBackend for MockCaptureBackend {
        fn acquire(&self) -> AudioResult<Box<dyn CaptureDevice>> {
            if self.0.deny_microphone.load(Ordering::SeqCst) {
                return Err(AudioError::NoDeviceFound);
            }
            self.0.acquired.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(MockCapture {
                devices: self.0.clone(),
                recording: false,
                released: false,
            }))
        }
    }

    struct MockCapture {
        devices: Arc<MockDevices>,
        recording: bool,
        released: bool,
    }

    impl CaptureDevice for MockCapture {
        fn native_sample_rate(&self) -> u32 {
            48000
        }

        fn start(&mut self, pipeline: CapturePipeline) -> AudioResult<()> {
            *self.devices.pipeline.lock().unwrap() = Some(pipeline);
            self.recording = true;
            Ok(())
        }

        fn stop(&mut self) -> AudioResult<()> {
            if self.recording {
                self.recording = false;
                self.devices.pipeline.lock().unwrap().take();
                self.devices.stopped.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }

        fn release(&mut self) {
            if !self.released {
                self.released = true;
                self.devices.released.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn is_recording(&self) -> bool {
            self.recording
        }
    }

    struct MockOutputBackend(Arc<MockDevices>);

    impl OutputBackend for MockOutputBackend {
        fn open(&self, scheduler: Arc<PlaybackScheduler>) -> AudioResult<Box<dyn OutputDevice>> {
            self.0.opened.fetch_add(1, Ordering::SeqCst);
            *self.0.scheduler.lock().unwrap() = Some(scheduler);
            Ok(Box::new(MockOutput {
                devices: self.0.clone(),
                playing: true,
            }))
        }
    }

    struct MockOutput {
        devices: Arc<MockDevices>,
        playing: bool,
    }

    impl OutputDevice for MockOutput {
        fn close(&mut self) -> AudioResult<()> {
            if self.playing {
                self.playing = false;
                self.devices.closed.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }

        fn is_playing(&self) -> bool {
            self.playing
        }
    }

    /// Serveur simulé qui ne répond qu'une fois la porte ouverte
    struct GatedConnector {
        gate: Arc<Notify>,
        simulated: SimulatedConnector,
    }

    #[async_trait]
    impl VoiceConnector for GatedConnector {
        async fn connect(&self, setup: SessionSetup) -> NetworkResult<TransportLink> {
            self.gate.notified().await;
            self.simulated.connect(setup).await
        }
    }

    struct Harness {
        controller: SessionController,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        remotes: mpsc::UnboundedReceiver<SimulatedRemote>,
        connector: Arc<SimulatedConnector>,
        devices: Arc<MockDevices>,
    }

    fn harness() -> Harness {
        let devices = Arc::new(MockDevices::default());
        let (connector, remotes) = SimulatedConnector::new();
        let connector = Arc::new(connector);
        let (observer, events) = ChannelObserver::new();
        let observer = observer.with_volume();

        let controller = SessionController::new(
            SessionConfig::default(),
            Arc::new(MockCaptureBackend(devices.clone())),
            Arc::new(MockOutputBackend(devices.clone())),
            connector.clone(),
            Arc::new(observer),
        );

        Harness {
            controller,
            events,
            remotes,
            connector,
            devices,
        }
    }

    /// Prochain événement hors volume
    async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
        loop {
            let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
                .await
                .expect("aucun événement reçu")
                .expect("canal d'événements fermé");
            if !matches!(event, SessionEvent::Volume(_)) {
                return event;
            }
        }
    }

    async fn open_session(h: &mut Harness) -> SimulatedRemote {
        h.controller.connect("[SYSTEM NOTE: LIVE TELEMETRY]").await.unwrap();
        let remote = h.remotes.recv().await.unwrap();
        remote.open().unwrap();
        assert_eq!(next_event(&mut h.events).await, SessionEvent::Status(true));
        remote
    }

    fn encoded_tone(samples: usize) -> String {
        PcmCodec::new()
            .encode(&AudioFrame::new(vec![0.1; samples], 24000, 0))
            .unwrap()
            .data
    }

    fn transcription(role: Role, text: &str, is_turn_complete: bool) -> SessionEvent {
        SessionEvent::Transcription {
            role,
            text: text.to_string(),
            is_turn_complete,
        }
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let mut h = harness();
        assert_eq!(h.controller.state(), SessionState::Idle);

        h.controller.connect("[SYSTEM NOTE: LIVE TELEMETRY]").await.unwrap();
        assert_eq!(h.controller.state(), SessionState::Connecting);

        let mut remote = h.remotes.recv().await.unwrap();
        assert!(remote.setup.system_instruction.starts_with(DEFAULT_PERSONA));
        assert!(remote.setup.system_instruction.contains("LIVE TELEMETRY"));
        assert_eq!(remote.setup.queue_capacity, 8);

        remote.open().unwrap();
        assert_eq!(next_event(&mut h.events).await, SessionEvent::Status(true));
        assert_eq!(h.controller.state(), SessionState::Active);
        assert!(h.controller.is_active());

        // Micro à 48 kHz → frame de 160 échantillons à 16 kHz
        h.devices.pipeline.lock().unwrap().as_mut().unwrap().process(&[0.5; 480], 48000);
        let frame = remote.next_frame().await.unwrap();
        assert_eq!(frame.sample_rate, 16000);
        assert_eq!(frame.sample_count(), 160);
        assert!(matches!(h.events.recv().await, Some(SessionEvent::Volume(level)) if level > 0.0));

        remote
            .send_chunk(InboundChunk::Audio { data: encoded_tone(240), sample_rate: 24000 })
            .unwrap();
        remote.send_json(r#"{"serverContent":{"inputTranscription":{"text":"Hel"}}}"#).unwrap();
        remote.send_json(r#"{"serverContent":{"inputTranscription":{"text":"lo"}}}"#).unwrap();
        remote.send_json(r#"{"serverContent":{"turnComplete":true}}"#).unwrap();

        assert_eq!(next_event(&mut h.events).await, transcription(Role::User, "Hel", false));
        assert_eq!(next_event(&mut h.events).await, transcription(Role::User, "Hello", false));
        assert_eq!(next_event(&mut h.events).await, transcription(Role::User, "Hello", true));
        assert_eq!(next_event(&mut h.events).await, transcription(Role::Model, "", true));

        let scheduler = h.devices.scheduler.lock().unwrap().clone().unwrap();
        assert_eq!(scheduler.live_count(), 1);
        let stats = h.controller.stats();
        assert_eq!(stats.frames_sent, 1);
        assert_eq!(stats.chunks_scheduled, 1);

        h.controller.disconnect();
        assert_eq!(h.controller.state(), SessionState::Closed);
        assert!(!h.controller.is_active());
        assert_eq!(next_event(&mut h.events).await, SessionEvent::Status(false));

        assert!(scheduler.is_stopped());
        assert_eq!(scheduler.live_count(), 0);
        assert!(remote.is_closed_by_client());
        assert!(h.devices.pipeline.lock().unwrap().is_none());
        assert_eq!(MockDevices::count(&h.devices.stopped), 1);
        assert_eq!(MockDevices::count(&h.devices.released), 1);
        assert_eq!(MockDevices::count(&h.devices.closed), 1);

        // Deuxième fermeture : aucun effet
        h.controller.disconnect();
        assert_eq!(h.controller.state(), SessionState::Closed);
        assert_eq!(MockDevices::count(&h.devices.released), 1);
        assert_eq!(MockDevices::count(&h.devices.closed), 1);
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reconnect_after_close() {
        let mut h = harness();
        let _first = open_session(&mut h).await;
        h.controller.disconnect();
        assert_eq!(next_event(&mut h.events).await, SessionEvent::Status(false));

        let _second = open_session(&mut h).await;
        assert_eq!(h.controller.state(), SessionState::Active);
        assert_eq!(h.connector.connection_count(), 2);
        assert_eq!(MockDevices::count(&h.devices.acquired), 2);
        assert_eq!(MockDevices::count(&h.devices.released), 1);
    }

    #[tokio::test]
    async fn test_connect_rejected_while_busy() {
        let mut h = harness();

        h.controller.connect("contexte").await.unwrap();
        let result = h.controller.connect("contexte").await;
        assert!(matches!(result, Err(SessionError::InvalidState { .. })));

        let remote = h.remotes.recv().await.unwrap();
        remote.open().unwrap();
        assert_eq!(next_event(&mut h.events).await, SessionEvent::Status(true));

        let result = h.controller.connect("contexte").await;
        assert!(matches!(result, Err(SessionError::InvalidState { .. })));
        assert_eq!(h.controller.state(), SessionState::Active);
        assert_eq!(h.connector.connection_count(), 1);
        assert_eq!(MockDevices::count(&h.devices.acquired), 1);
    }

    #[tokio::test]
    async fn test_microphone_denied() {
        let mut h = harness();
        h.devices.deny_microphone.store(true, Ordering::SeqCst);

        h.controller.connect("contexte").await.unwrap();
        assert!(matches!(h.controller.state(), SessionState::Failed(_)));
        assert_eq!(next_event(&mut h.events).await, SessionEvent::Status(false));
        assert_eq!(h.connector.connection_count(), 0);
        assert_eq!(MockDevices::count(&h.devices.opened), 0);

        // Failed → connect refusé, disconnect → Closed sans notification
        assert!(h.controller.connect("contexte").await.is_err());
        h.controller.disconnect();
        assert_eq!(h.controller.state(), SessionState::Closed);
        assert!(h.events.try_recv().is_err());

        h.devices.deny_microphone.store(false, Ordering::SeqCst);
        h.controller.connect("contexte").await.unwrap();
        assert_eq!(h.controller.state(), SessionState::Connecting);
    }

    #[tokio::test]
    async fn test_network_failure_releases_devices() {
        let mut h = harness();
        h.connector.fail_with("réseau coupé");

        h.controller.connect("contexte").await.unwrap();
        match h.controller.state() {
            SessionState::Failed(reason) => assert!(reason.contains("réseau coupé")),
            other => panic!("état inattendu: {}", other),
        }
        assert_eq!(next_event(&mut h.events).await, SessionEvent::Status(false));

        assert_eq!(MockDevices::count(&h.devices.acquired), 1);
        assert_eq!(MockDevices::count(&h.devices.released), 1);
        assert_eq!(MockDevices::count(&h.devices.opened), 1);
        assert_eq!(MockDevices::count(&h.devices.closed), 1);
    }

    #[tokio::test]
    async fn test_remote_close_tears_down() {
        let mut h = harness();
        let remote = open_session(&mut h).await;

        remote.close("fin de session").unwrap();
        assert_eq!(next_event(&mut h.events).await, SessionEvent::Status(false));
        assert_eq!(h.controller.state(), SessionState::Closed);
        assert_eq!(MockDevices::count(&h.devices.released), 1);
        assert_eq!(MockDevices::count(&h.devices.closed), 1);
        assert!(remote.is_closed_by_client());
    }

    #[tokio::test]
    async fn test_go_away_ends_session() {
        let mut h = harness();
        let remote = open_session(&mut h).await;

        remote.send_json(r#"{"goAway":{"timeLeft":"1s"}}"#).unwrap();
        assert_eq!(next_event(&mut h.events).await, SessionEvent::Status(false));
        assert_eq!(h.controller.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_close_before_setup_complete_fails() {
        let mut h = harness();
        h.controller.connect("contexte").await.unwrap();
        let remote = h.remotes.recv().await.unwrap();

        remote.close("configuration refusée").unwrap();
        assert_eq!(next_event(&mut h.events).await, SessionEvent::Status(false));
        assert_eq!(
            h.controller.state(),
            SessionState::Failed("configuration refusée".to_string())
        );
        assert_eq!(MockDevices::count(&h.devices.released), 1);
        assert_eq!(MockDevices::count(&h.devices.stopped), 0);
    }

    #[tokio::test]
    async fn test_malformed_audio_keeps_session() {
        let mut h = harness();
        let remote = open_session(&mut h).await;

        remote
            .send_chunk(InboundChunk::Audio { data: "pas du base64!".to_string(), sample_rate: 24000 })
            .unwrap();
        remote.send_json(r#"{"serverContent":{"outputTranscription":{"text":"28 degrés"}}}"#).unwrap();

        assert_eq!(next_event(&mut h.events).await, transcription(Role::Model, "28 degrés", false));
        assert_eq!(h.controller.state(), SessionState::Active);
        assert_eq!(h.controller.stats().payloads_dropped, 1);
        assert_eq!(h.controller.stats().chunks_scheduled, 0);
    }

    #[tokio::test]
    async fn test_disconnect_before_connect() {
        let mut h = harness();
        h.controller.disconnect();
        h.controller.disconnect();

        assert_eq!(h.controller.state(), SessionState::Closed);
        assert!(h.events.try_recv().is_err());
        assert_eq!(MockDevices::count(&h.devices.acquired), 0);
        assert_eq!(MockDevices::count(&h.devices.opened), 0);
    }

    #[tokio::test]
    async fn test_disconnect_while_connecting() {
        let mut h = harness();
        h.controller.connect("contexte").await.unwrap();
        let remote = h.remotes.recv().await.unwrap();

        h.controller.disconnect();
        assert_eq!(h.controller.state(), SessionState::Closed);
        assert_eq!(next_event(&mut h.events).await, SessionEvent::Status(false));
        assert!(remote.is_closed_by_client());
        assert_eq!(MockDevices::count(&h.devices.released), 1);
        assert_eq!(MockDevices::count(&h.devices.stopped), 0);
    }

    /// Contrôleur dont la connexion reste en attente jusqu'à `gate.notify_one()`
    fn gated_harness(
        simulated: SimulatedConnector,
    ) -> (SessionController, Arc<Notify>, mpsc::UnboundedReceiver<SessionEvent>, Arc<MockDevices>) {
        let devices = Arc::new(MockDevices::default());
        let gate = Arc::new(Notify::new());
        let (observer, events) = ChannelObserver::new();

        let controller = SessionController::new(
            SessionConfig::default(),
            Arc::new(MockCaptureBackend(devices.clone())),
            Arc::new(MockOutputBackend(devices.clone())),
            Arc::new(GatedConnector { gate: gate.clone(), simulated }),
            Arc::new(observer),
        );
        (controller, gate, events, devices)
    }

    #[tokio::test]
    async fn test_disconnect_during_transport_open_releases_devices() {
        let (simulated, mut remotes) = SimulatedConnector::new();
        let (controller, gate, mut events, devices) = gated_harness(simulated);

        let pending = tokio::spawn({
            let controller = controller.clone();
            async move { controller.connect("contexte").await }
        });
        while MockDevices::count(&devices.opened) == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(controller.state(), SessionState::Connecting);

        // Le transport n'a pas répondu : micro et sortie sont rendus tout de suite
        controller.disconnect();
        assert_eq!(controller.state(), SessionState::Closed);
        assert_eq!(next_event(&mut events).await, SessionEvent::Status(false));
        assert_eq!(MockDevices::count(&devices.released), 1);
        assert_eq!(MockDevices::count(&devices.closed), 1);

        // Le transport arrive après coup : seul le lien est fermé
        gate.notify_one();
        pending.await.unwrap().unwrap();
        let remote = remotes.recv().await.unwrap();
        assert!(remote.is_closed_by_client());

        assert_eq!(controller.state(), SessionState::Closed);
        assert_eq!(MockDevices::count(&devices.acquired), 1);
        assert_eq!(MockDevices::count(&devices.released), 1);
        assert_eq!(MockDevices::count(&devices.closed), 1);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_late_network_failure_after_disconnect_is_ignored() {
        let (simulated, _remotes) = SimulatedConnector::new();
        simulated.fail_with("réseau coupé");
        let (controller, gate, mut events, devices) = gated_harness(simulated);

        let pending = tokio::spawn({
            let controller = controller.clone();
            async move { controller.connect("contexte").await }
        });
        while MockDevices::count(&devices.opened) == 0 {
            tokio::task::yield_now().await;
        }

        controller.disconnect();
        assert_eq!(next_event(&mut events).await, SessionEvent::Status(false));

        gate.notify_one();
        pending.await.unwrap().unwrap();

        assert_eq!(controller.state(), SessionState::Closed);
        assert_eq!(MockDevices::count(&devices.released), 1);
        assert!(events.try_recv().is_err());

        // La session suivante repart de zéro
        gate.notify_one();
        controller.connect("contexte").await.unwrap();
        assert!(matches!(controller.state(), SessionState::Failed(_)));
        assert_eq!(MockDevices::count(&devices.acquired), 2);
        assert_eq!(MockDevices::count(&devices.released), 2);
    }
}
