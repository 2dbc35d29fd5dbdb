//! Planification et lecture de l'audio reçu du serveur
//!
//! Les chunks de voix arrivent par le réseau à intervalles irréguliers, par
//! rafales, et sans alignement particulier. Pour une lecture sans trou ni
//! chevauchement, on maintient un unique curseur `next_start` exprimé en
//! échantillons de l'horloge de sortie :
//!
//! ```text
//! horloge  ──────────|now|──────────────────────────────────→
//! unités             [ chunk 1 ][ chunk 2 ][ chunk 3 ]
//!                                                     ↑ next_start
//! ```
//!
//! - chunk reçu en avance : il démarre exactement à `next_start`
//! - chunk reçu en retard (réseau affamé) : `next_start` est ramené à `now`,
//!   un silence est toléré mais jamais un chevauchement
//!
//! Le curseur est mis à jour uniquement par le chemin de réception, sous le
//! verrou des unités vivantes. Le callback de sortie ne prend ce verrou
//! qu'en `try_lock` et n'avance l'horloge que s'il l'obtient : un bloc
//! manqué est joué en silence sans décaler les unités planifiées.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, TryLockError};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig};
use tracing::{debug, error, info, warn};

use crate::{
    resample, AudioCodec, AudioConfig, AudioError, AudioResult, OutputBackend, OutputDevice,
    PcmCodec, PlaybackUnit, Sample, StatsCounters,
};

/// Horloge de sortie, en échantillons à la fréquence de sortie
///
/// Avancée par le callback de rendu au fur et à mesure que l'audio est
/// effectivement joué. Les tests l'avancent à la main.
#[derive(Debug, Default)]
pub struct OutputClock {
    position: AtomicU64,
}

impl OutputClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instant courant de l'horloge
    pub fn now(&self) -> u64 {
        self.position.load(Ordering::Acquire)
    }

    /// Avance l'horloge de `samples` échantillons
    pub fn advance(&self, samples: u64) {
        self.position.fetch_add(samples, Ordering::AcqRel);
    }
}

/// Résultat de la planification d'un chunk
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScheduledChunk {
    /// Identifiant de l'unité créée
    pub id: u64,

    /// Instant de début planifié (échantillons de l'horloge de sortie)
    pub start: u64,

    /// Durée en échantillons
    pub duration: u64,

    /// Vrai si le curseur a dû être ramené à "maintenant"
    pub starved: bool,
}

impl ScheduledChunk {
    /// Fin (exclue) de l'unité planifiée
    pub fn end(&self) -> u64 {
        self.start + self.duration
    }
}

/// Planificateur de lecture sans trou
///
/// Partagé (`Arc`) entre la tâche de réception, qui planifie, et le
/// callback du périphérique de sortie, qui rend.
pub struct PlaybackScheduler {
    /// Fréquence de l'horloge de sortie (Hz)
    output_rate: u32,

    /// Codec pour décoder les payloads base64
    codec: PcmCodec,

    /// Horloge de sortie
    clock: OutputClock,

    /// Curseur : début du prochain chunk
    next_start: AtomicU64,

    /// Unités planifiées et pas encore terminées
    live: Mutex<Vec<PlaybackUnit>>,

    /// Identifiant de la prochaine unité
    next_id: AtomicU64,

    /// Refuse toute nouvelle unité après `stop_all()`
    stopped: AtomicBool,

    /// Compteurs partagés avec la session
    stats: Arc<StatsCounters>,
}

impl PlaybackScheduler {
    /// Crée un planificateur à la fréquence de sortie de `config`
    pub fn new(config: &AudioConfig, stats: Arc<StatsCounters>) -> Self {
        Self {
            output_rate: config.output_sample_rate,
            codec: PcmCodec::new(),
            clock: OutputClock::new(),
            next_start: AtomicU64::new(0),
            live: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(0),
            stopped: AtomicBool::new(false),
            stats,
        }
    }

    /// Fréquence de l'horloge de sortie
    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Horloge de sortie du planificateur
    pub fn clock(&self) -> &OutputClock {
        &self.clock
    }

    /// Valeur courante du curseur `next_start`
    pub fn next_start(&self) -> u64 {
        self.next_start.load(Ordering::Acquire)
    }

    /// Décode et planifie un payload base64 reçu
    ///
    /// `sample_rate` est la fréquence annoncée par le serveur. Une fréquence
    /// supérieure à celle de sortie est réduite ; une fréquence inférieure
    /// est jouée telle quelle.
    ///
    /// # Erreurs
    /// - `AudioError::InvalidPayload` : payload jeté, la session continue
    pub fn schedule_payload(&self, data: &str, sample_rate: u32) -> AudioResult<ScheduledChunk> {
        let decoded = self.codec.decode(data).inspect_err(|_| {
            StatsCounters::bump(&self.stats.payloads_dropped);
        })?;

        let samples = if sample_rate > self.output_rate {
            resample::downsample(&decoded, sample_rate, self.output_rate)?
        } else {
            if sample_rate != self.output_rate {
                warn!(sample_rate, output_rate = self.output_rate, "fréquence reçue inattendue");
            }
            decoded
        };

        self.schedule_samples(samples)
    }

    /// Planifie un buffer déjà décodé à la fréquence de sortie
    pub fn schedule_samples(&self, samples: Vec<Sample>) -> AudioResult<ScheduledChunk> {
        // Le verrou des unités vivantes sérialise la planification avec le
        // rendu et avec `stop_all()` : l'horloge ne peut pas avancer entre
        // la lecture de `now` et l'insertion de l'unité.
        let mut live = match self.live.lock() {
            Ok(live) => live,
            Err(poisoned) => poisoned.into_inner(),
        };
        if self.stopped.load(Ordering::Acquire) {
            return Err(AudioError::StreamError("Lecture arrêtée".to_string()));
        }

        let duration = samples.len() as u64;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();

        // Point de séquencement unique : start = max(curseur, now)
        let previous = self.next_start.load(Ordering::Acquire);
        let start = previous.max(now);
        let starved = now > previous;
        self.next_start.store(start + duration, Ordering::Release);

        if duration > 0 {
            live.push(PlaybackUnit { id, samples, start });
        }
        drop(live);

        if starved {
            StatsCounters::bump(&self.stats.starvation_resets);
            debug!(now, cursor = previous, "réseau en retard, curseur ramené à maintenant");
        }
        StatsCounters::bump(&self.stats.chunks_scheduled);

        Ok(ScheduledChunk { id, start, duration, starved })
    }

    /// Rend le prochain bloc de l'horloge de sortie dans `output`
    ///
    /// Appelé depuis le callback temps réel : pas d'allocation, `try_lock`
    /// uniquement. Les unités entièrement jouées quittent l'ensemble vivant.
    /// Si la réception tient le verrou, le bloc est rendu en silence et
    /// l'horloge n'avance pas : aucun échantillon planifié n'est sauté.
    pub fn render(&self, output: &mut [Sample]) {
        output.fill(0.0);

        let mut live = match self.live.try_lock() {
            Ok(live) => live,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return,
        };

        let block_start = self.clock.now();
        let block_end = block_start + output.len() as u64;

        for unit in live.iter() {
            let from = unit.start.max(block_start);
            let to = unit.end().min(block_end);
            if from >= to {
                continue;
            }

            let src = &unit.samples[(from - unit.start) as usize..(to - unit.start) as usize];
            let dst = &mut output[(from - block_start) as usize..(to - block_start) as usize];
            for (out, &sample) in dst.iter_mut().zip(src) {
                *out += sample;
            }
        }

        // Fin naturelle : l'unité se retire de l'ensemble vivant
        live.retain(|unit| unit.end() > block_end);
        self.clock.advance(output.len() as u64);
    }

    /// Arrête immédiatement toutes les unités planifiées
    ///
    /// Idempotent. Les chunks reçus ensuite sont refusés.
    pub fn stop_all(&self) {
        self.stopped.store(true, Ordering::Release);

        let mut live = match self.live.lock() {
            Ok(live) => live,
            Err(poisoned) => poisoned.into_inner(),
        };
        let cleared = std::mem::take(&mut *live).len();
        self.next_start.store(self.clock.now(), Ordering::Release);
        drop(live);

        if cleared > 0 {
            debug!(cleared, "unités de lecture arrêtées");
        }
    }

    /// Nombre d'unités encore vivantes
    pub fn live_count(&self) -> usize {
        match self.live.lock() {
            Ok(live) => live.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    /// Vrai si `stop_all()` a été appelé
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}

/// État du callback de sortie
///
/// Adapte l'horloge de sortie à la fréquence du périphérique par maintien
/// d'échantillon quand le périphérique ne supporte pas la fréquence de sortie.
struct OutputRenderer {
    scheduler: Arc<PlaybackScheduler>,

    /// Canaux du périphérique (le mono est copié sur chacun)
    channels: usize,

    /// Échantillons de sortie par frame du périphérique
    step: f64,

    /// Position fractionnaire dans le bloc courant
    phase: f64,

    /// Buffer de rendu préalloué
    scratch: Vec<Sample>,
}

impl OutputRenderer {
    fn new(scheduler: Arc<PlaybackScheduler>, channels: usize, device_rate: u32) -> Self {
        let step = scheduler.output_rate() as f64 / device_rate as f64;
        Self {
            scheduler,
            channels: channels.max(1),
            step,
            phase: 0.0,
            // Assez grand pour les blocs usuels : resize() ne réalloue pas en dessous
            scratch: Vec::with_capacity(16384),
        }
    }

    /// Remplit un buffer entrelacé du périphérique
    fn fill<T: Copy>(&mut self, output: &mut [T], convert: fn(Sample) -> T) {
        let frames = output.len() / self.channels;
        let consumed = (self.phase + frames as f64 * self.step).floor() as usize;

        self.scratch.resize(consumed, 0.0);
        self.scheduler.render(&mut self.scratch);

        for (i, frame) in output.chunks_mut(self.channels).enumerate() {
            let index = (self.phase + i as f64 * self.step).floor() as usize;
            let value = convert(self.scratch.get(index).copied().unwrap_or(0.0));
            frame.fill(value);
        }

        self.phase = (self.phase + frames as f64 * self.step).fract();
    }
}

/// Lecture audio avec cpal
///
/// Le stream de sortie tourne en continu pendant la session et rend ce
/// que le planificateur lui fournit (du silence entre les tours).
pub struct CpalPlayback {
    /// Stream audio actif (None si fermé)
    stream: Option<Stream>,

    /// Nom du périphérique pour debug
    device_name: String,
}

impl CpalPlayback {
    /// Ouvre le périphérique de sortie par défaut et démarre le rendu
    ///
    /// # Erreurs
    /// - `AudioError::NoDeviceFound` si aucun haut-parleur n'est disponible
    /// - `AudioError::ConfigError` / `StreamError` si le stream ne peut pas démarrer
    pub fn open(scheduler: Arc<PlaybackScheduler>) -> AudioResult<Self> {
        let host = cpal::default_host();
        let device = host.default_output_device().ok_or(AudioError::NoDeviceFound)?;

        let device_name = device
            .description()
            .ok()
            .map(|desc| desc.name().to_string())
            .unwrap_or_else(|| "Périphérique inconnu".to_string());

        let (stream_config, sample_format) = Self::select_config(&device, scheduler.output_rate())?;

        info!(
            device = %device_name,
            sample_rate = stream_config.sample_rate,
            channels = stream_config.channels,
            format = ?sample_format,
            "périphérique de sortie ouvert"
        );

        let stream = Self::build_stream(&device, &stream_config, sample_format, scheduler)?;
        stream.play()?;

        Ok(Self {
            stream: Some(stream),
            device_name,
        })
    }

    /// Choisit la fréquence de sortie si le périphérique la supporte,
    /// sinon sa configuration par défaut
    fn select_config(device: &Device, output_rate: u32) -> AudioResult<(StreamConfig, SampleFormat)> {
        let supported = device
            .supported_output_configs()
            .map_err(|e| AudioError::ConfigError(format!("Impossible d'obtenir configs supportées: {}", e)))?
            .find(|range| range.min_sample_rate() <= output_rate && range.max_sample_rate() >= output_rate);

        if let Some(range) = supported {
            let config = range.with_sample_rate(output_rate);
            return Ok((config.config(), config.sample_format()));
        }

        let default_config = device.default_output_config()?;
        warn!(
            device_rate = default_config.sample_rate(),
            output_rate, "fréquence de sortie non supportée, adaptation par maintien d'échantillon"
        );
        Ok((default_config.config(), default_config.sample_format()))
    }

    /// Construit le stream selon le format d'échantillons du périphérique
    fn build_stream(
        device: &Device,
        config: &StreamConfig,
        sample_format: SampleFormat,
        scheduler: Arc<PlaybackScheduler>,
    ) -> AudioResult<Stream> {
        let mut renderer = OutputRenderer::new(scheduler, config.channels as usize, config.sample_rate);
        let on_error = |err: cpal::StreamError| error!(error = %err, "erreur du stream de sortie");

        let stream = match sample_format {
            SampleFormat::F32 => device.build_output_stream(
                config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    renderer.fill(data, |s| s);
                },
                on_error,
                None,
            )?,
            SampleFormat::I16 => device.build_output_stream(
                config,
                move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                    renderer.fill(data, |s| (s.clamp(-1.0, 1.0) * i16::MAX as f32) as i16);
                },
                on_error,
                None,
            )?,
            SampleFormat::U16 => device.build_output_stream(
                config,
                move |data: &mut [u16], _: &cpal::OutputCallbackInfo| {
                    renderer.fill(data, |s| ((s.clamp(-1.0, 1.0) + 1.0) * 0.5 * u16::MAX as f32) as u16);
                },
                on_error,
                None,
            )?,
            _ => {
                return Err(AudioError::ConfigError(format!(
                    "Format d'échantillon non supporté : {:?}",
                    sample_format
                )))
            }
        };

        Ok(stream)
    }
}

impl OutputDevice for CpalPlayback {
    fn close(&mut self) -> AudioResult<()> {
        if let Some(stream) = self.stream.take() {
            stream.pause()?;
            debug!(device = %self.device_name, "stream de sortie fermé");
        }
        Ok(())
    }

    fn is_playing(&self) -> bool {
        self.stream.is_some()
    }

    fn device_info(&self) -> String {
        self.device_name.clone()
    }
}

/// Fabrique de `CpalPlayback` sur le périphérique par défaut
#[derive(Clone, Copy, Debug, Default)]
pub struct CpalOutputBackend;

impl OutputBackend for CpalOutputBackend {
    fn open(&self, scheduler: Arc<PlaybackScheduler>) -> AudioResult<Box<dyn OutputDevice>> {
        Ok(Box::new(CpalPlayback::open(scheduler)?))
    }
}
