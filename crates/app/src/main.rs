// Client vocal de la ferme
//
// Ouvre une session vocale avec l'assistant agronome : le micro part vers
// le serveur, la réponse est jouée sur les haut-parleurs et la conversation
// s'affiche dans le terminal.

mod conversation;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

use audio::{
    AudioConfig, CaptureDevice, CpalCapture, CpalCaptureBackend, CpalOutputBackend, CpalPlayback,
    OutputDevice, PlaybackScheduler, StatsCounters,
};
use network::WebSocketConnector;
use session::{
    context_text, ChannelObserver, SensorHistory, SessionConfig, SessionController, SessionEvent,
    StaticSensorHistory,
};

use conversation::{speaker_label, ConversationLog};

#[derive(Parser)]
#[command(name = "voice-session", author, version, about = "Session vocale avec l'assistant agronome")]
struct Cli {
    /// Logs détaillés (niveau debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ouvre une session vocale jusqu'à Ctrl+C ou fermeture par le serveur
    Run {
        /// Fichier de configuration TOML
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Export CSV des relevés capteurs
        #[arg(short, long)]
        sensors: Option<PathBuf>,

        /// Texte de contexte, à la place des capteurs
        #[arg(long)]
        context: Option<String>,
    },
    /// Affiche le micro et la sortie audio par défaut
    Devices,
    /// Vérifie un fichier de configuration
    CheckConfig {
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run { config, sensors, context } => run_session(config.as_deref(), sensors.as_deref(), context).await,
        Commands::Devices => show_devices(),
        Commands::CheckConfig { config } => check_config(config.as_deref()),
    }
}

/// `RUST_LOG` est prioritaire, sauf en mode verbose
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<SessionConfig> {
    let config = match path {
        Some(path) => SessionConfig::from_toml_file(path)
            .with_context(|| format!("lecture de {}", path.display()))?,
        None => SessionConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Contexte capteurs : texte explicite, sinon dernière mesure du CSV
fn build_context(sensors: Option<&Path>, context: Option<String>) -> anyhow::Result<String> {
    if let Some(text) = context {
        return Ok(text);
    }

    let latest = match sensors {
        Some(path) => StaticSensorHistory::from_csv_file(path)
            .with_context(|| format!("lecture des capteurs {}", path.display()))?
            .latest(),
        None => None,
    };
    Ok(context_text(latest.as_ref()))
}

async fn run_session(config: Option<&Path>, sensors: Option<&Path>, context: Option<String>) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let context = build_context(sensors, context)?;

    if config.network.resolve_api_key().is_none() {
        bail!("clé API manquante : définir GEMINI_API_KEY ou api_key dans la configuration");
    }

    let connector = WebSocketConnector::new(config.network.clone())?;
    let (observer, mut events) = ChannelObserver::new();

    let controller = SessionController::new(
        config,
        Arc::new(CpalCaptureBackend),
        Arc::new(CpalOutputBackend),
        Arc::new(connector),
        Arc::new(observer),
    );

    println!("🚀 Connexion à l'assistant agronome...");
    controller.connect(&context).await?;

    let mut log = ConversationLog::new();
    let ctrl_c = signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                println!("\n🛑 Arrêt demandé");
                controller.disconnect();
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                match event {
                    SessionEvent::Status(true) => println!("✅ Session ouverte, parlez ! (Ctrl+C pour quitter)"),
                    SessionEvent::Status(false) => {
                        println!("\n🔌 Session terminée");
                        break;
                    }
                    SessionEvent::Transcription { role, text, is_turn_complete } => {
                        if let Some(turn) = log.apply(role, &text, is_turn_complete) {
                            println!("\r{} : {}", speaker_label(turn.role), turn.text);
                        } else if !is_turn_complete {
                            print!("\r{} … {}", speaker_label(role), text);
                            io::stdout().flush()?;
                        }
                    }
                    SessionEvent::Volume(_) => {}
                }
            }
        }
    }

    let stats = controller.stats();
    println!("\n📈 Résultats :");
    println!("   💬 Tours échangés : {}", log.turns().len());
    println!("   📤 Frames envoyées : {} / {}", stats.frames_sent, stats.frames_captured);
    println!("   🔊 Chunks joués : {}", stats.chunks_scheduled);
    if stats.frames_dropped > 0 || stats.payloads_dropped > 0 {
        println!(
            "   ⚠️  Jetés : {} frames ({:.1}%), {} payloads",
            stats.frames_dropped,
            stats.drop_percentage(),
            stats.payloads_dropped
        );
    }

    if let Some(reason) = controller.state().failure_reason() {
        bail!("échec de la session : {}", reason);
    }
    Ok(())
}

fn show_devices() -> anyhow::Result<()> {
    print!("🎤 Micro... ");
    io::stdout().flush()?;
    match CpalCapture::new() {
        Ok(capture) => println!("✅ {} ({} Hz)", capture.device_info(), capture.native_sample_rate()),
        Err(e) => println!("❌ {}", e),
    }

    print!("🔊 Sortie... ");
    io::stdout().flush()?;
    let scheduler = Arc::new(PlaybackScheduler::new(
        &AudioConfig::default(),
        Arc::new(StatsCounters::default()),
    ));
    match CpalPlayback::open(scheduler) {
        Ok(mut playback) => {
            println!("✅ {}", playback.device_info());
            playback.close()?;
        }
        Err(e) => println!("❌ {}", e),
    }

    Ok(())
}

fn check_config(path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(path)?;
    info!("configuration valide");

    println!("✅ Configuration validée :");
    println!("   Capture : {} Hz", config.audio.capture_sample_rate);
    println!("   Sortie : {} Hz", config.audio.output_sample_rate);
    println!("   File d'envoi : {} frames", config.audio.outbound_queue_frames);
    println!("   Serveur : {}", config.network.endpoint);
    println!("   Modèle : {}", config.network.model);
    println!("   Voix : {}", config.network.voice_name);
    println!(
        "   Clé API : {}",
        if config.network.resolve_api_key().is_some() { "présente" } else { "absente" }
    );
    println!("   Règles : {}", config.rules.len());

    Ok(())
}
