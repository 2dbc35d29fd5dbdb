//! Messages JSON du protocole de streaming bidirectionnel
//!
//! Déroulement d'une session :
//!
//! ```text
//! client → serveur : { "setup": { model, generationConfig, systemInstruction, ... } }
//! serveur → client : { "setupComplete": {} }                     → Opened
//! client → serveur : { "realtimeInput": { "mediaChunks": [...] } }  (en continu)
//! serveur → client : { "serverContent": { modelTurn, inputTranscription,
//!                                         outputTranscription, turnComplete } }
//! ```
//!
//! Les messages du serveur arrivent en trames texte ou binaires contenant
//! du JSON ; les deux sont acceptées.

use serde::{Deserialize, Serialize};

use audio::EncodedFrame;

use crate::{
    InboundChunk, NetworkConfig, NetworkError, NetworkResult, Role, SessionSetup, TransportEvent,
    DEFAULT_INBOUND_RATE,
};

/// Premier message envoyé après l'ouverture du WebSocket
#[derive(Clone, Debug, Serialize)]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub system_instruction: Content,
    pub input_audio_transcription: Empty,
    pub output_audio_transcription: Empty,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Clone, Debug, Serialize)]
pub struct TextPart {
    pub text: String,
}

/// Objet vide (`{}`) qui active une option côté serveur
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Empty {}

/// Audio du micro envoyé en continu
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<Blob>,
}

/// Données binaires en base64 avec leur type MIME
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub mime_type: String,
    pub data: String,
}

/// Message reçu du serveur
///
/// Tous les champs sont optionnels : un message en porte généralement un seul.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerMessage {
    pub setup_complete: Option<Empty>,
    pub server_content: Option<ServerContent>,
    pub go_away: Option<GoAway>,
    pub error: Option<ServerError>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServerContent {
    pub model_turn: Option<ModelTurn>,
    pub input_transcription: Option<Transcription>,
    pub output_transcription: Option<Transcription>,
    pub turn_complete: bool,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ModelTurn {
    pub parts: Vec<Part>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Part {
    pub inline_data: Option<Blob>,
    pub text: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct Transcription {
    pub text: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GoAway {
    pub time_left: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default)]
pub struct ServerError {
    pub code: Option<i64>,
    pub message: Option<String>,
    pub status: Option<String>,
}

/// Construit le message de configuration de la session
pub fn setup_message(config: &NetworkConfig, setup: &SessionSetup) -> SetupMessage {
    SetupMessage {
        setup: Setup {
            model: config.model.clone(),
            generation_config: GenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: config.voice_name.clone(),
                        },
                    },
                },
            },
            system_instruction: Content {
                parts: vec![TextPart {
                    text: setup.system_instruction.clone(),
                }],
            },
            input_audio_transcription: Empty {},
            output_audio_transcription: Empty {},
        },
    }
}

/// Construit le message transportant une frame du micro
pub fn media_message(frame: &EncodedFrame) -> RealtimeInputMessage {
    RealtimeInputMessage {
        realtime_input: RealtimeInput {
            media_chunks: vec![Blob {
                mime_type: frame.mime_type(),
                data: frame.data.clone(),
            }],
        },
    }
}

/// Lit un message du serveur (trame texte ou binaire)
pub fn parse_server_message(bytes: &[u8]) -> NetworkResult<ServerMessage> {
    serde_json::from_slice(bytes).map_err(|e| NetworkError::InvalidMessage(e.to_string()))
}

/// Fréquence annoncée par un type MIME (`audio/pcm;rate=24000`)
///
/// Retourne 24 kHz si le paramètre est absent ou illisible.
pub fn sample_rate_from_mime(mime_type: &str) -> u32 {
    mime_type
        .split(';')
        .filter_map(|param| param.trim().strip_prefix("rate="))
        .find_map(|rate| rate.trim().parse().ok())
        .unwrap_or(DEFAULT_INBOUND_RATE)
}

/// Classe un message du serveur en événements de transport, dans l'ordre
///
/// Un même message peut porter de l'audio, des transcriptions et une fin de
/// tour. La fin de tour clôt les deux locuteurs.
pub fn classify(message: ServerMessage) -> Vec<TransportEvent> {
    let mut events = Vec::new();

    if message.setup_complete.is_some() {
        events.push(TransportEvent::Opened);
    }

    if let Some(content) = message.server_content {
        let parts = content.model_turn.map(|turn| turn.parts).unwrap_or_default();
        for blob in parts.into_iter().filter_map(|part| part.inline_data) {
            if !blob.mime_type.starts_with("audio/") || blob.data.is_empty() {
                continue;
            }
            events.push(TransportEvent::Chunk(InboundChunk::Audio {
                sample_rate: sample_rate_from_mime(&blob.mime_type),
                data: blob.data,
            }));
        }

        let transcripts = [
            (Role::User, content.input_transcription),
            (Role::Model, content.output_transcription),
        ];
        for (role, transcription) in transcripts {
            if let Some(text) = transcription.and_then(|t| t.text).filter(|t| !t.is_empty()) {
                events.push(TransportEvent::Chunk(InboundChunk::Transcript { role, text }));
            }
        }

        if content.turn_complete {
            events.push(TransportEvent::Chunk(InboundChunk::TurnComplete(Role::User)));
            events.push(TransportEvent::Chunk(InboundChunk::TurnComplete(Role::Model)));
        }
    }

    if let Some(go_away) = message.go_away {
        let reason = match go_away.time_left {
            Some(left) => format!("le serveur ferme la session (reste {})", left),
            None => "le serveur ferme la session".to_string(),
        };
        events.push(TransportEvent::Chunk(InboundChunk::SessionError(reason)));
    }

    if let Some(error) = message.error {
        let reason = error
            .message
            .or(error.status)
            .unwrap_or_else(|| "erreur inconnue".to_string());
        let reason = match error.code {
            Some(code) => format!("{} ({})", reason, code),
            None => reason,
        };
        events.push(TransportEvent::Chunk(InboundChunk::SessionError(reason)));
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use audio::{AudioCodec, AudioFrame, PcmCodec};

    fn events(json: &str) -> Vec<TransportEvent> {
        classify(parse_server_message(json.as_bytes()).unwrap())
    }

    #[test]
    fn test_setup_message_format() {
        let config = NetworkConfig::default();
        let setup = SessionSetup::new("Tu es l'agronome.");
        let value = serde_json::to_value(setup_message(&config, &setup)).unwrap();

        let setup = &value["setup"];
        assert_eq!(setup["model"], config.model.as_str());
        assert_eq!(setup["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Zephyr"
        );
        assert_eq!(setup["systemInstruction"]["parts"][0]["text"], "Tu es l'agronome.");
        assert!(setup["inputAudioTranscription"].as_object().unwrap().is_empty());
        assert!(setup["outputAudioTranscription"].as_object().unwrap().is_empty());
    }

    #[test]
    fn test_media_message_format() {
        let frame = PcmCodec::new()
            .encode(&AudioFrame::new(vec![0.0, 0.5], 16000, 3))
            .unwrap();
        let value = serde_json::to_value(media_message(&frame)).unwrap();

        let chunk = &value["realtimeInput"]["mediaChunks"][0];
        assert_eq!(chunk["mimeType"], "audio/pcm;rate=16000");
        assert_eq!(chunk["data"], frame.data.as_str());
    }

    #[test]
    fn test_setup_complete_opens() {
        assert_eq!(events(r#"{"setupComplete":{}}"#), vec![TransportEvent::Opened]);
    }

    #[test]
    fn test_server_content_classification() {
        let json = r#"{
            "serverContent": {
                "modelTurn": { "parts": [
                    { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAA=" } },
                    { "inlineData": { "mimeType": "audio/pcm", "data": "AQI=" } }
                ] },
                "inputTranscription": { "text": "Hel" },
                "outputTranscription": { "text": "Bon" }
            }
        }"#;

        assert_eq!(
            events(json),
            vec![
                TransportEvent::Chunk(InboundChunk::Audio { data: "AAA=".to_string(), sample_rate: 24000 }),
                TransportEvent::Chunk(InboundChunk::Audio { data: "AQI=".to_string(), sample_rate: 24000 }),
                TransportEvent::Chunk(InboundChunk::Transcript { role: Role::User, text: "Hel".to_string() }),
                TransportEvent::Chunk(InboundChunk::Transcript { role: Role::Model, text: "Bon".to_string() }),
            ]
        );
    }

    #[test]
    fn test_turn_complete_closes_both_roles() {
        assert_eq!(
            events(r#"{"serverContent":{"turnComplete":true}}"#),
            vec![
                TransportEvent::Chunk(InboundChunk::TurnComplete(Role::User)),
                TransportEvent::Chunk(InboundChunk::TurnComplete(Role::Model)),
            ]
        );
    }

    #[test]
    fn test_errors_and_go_away() {
        let go_away = events(r#"{"goAway":{"timeLeft":"10s"}}"#);
        assert!(matches!(
            &go_away[0],
            TransportEvent::Chunk(InboundChunk::SessionError(reason)) if reason.contains("10s")
        ));

        let error = events(r#"{"error":{"code":400,"message":"modèle inconnu"}}"#);
        assert_eq!(
            error,
            vec![TransportEvent::Chunk(InboundChunk::SessionError("modèle inconnu (400)".to_string()))]
        );
    }

    #[test]
    fn test_unknown_and_malformed_messages() {
        assert!(events(r#"{"usageMetadata":{"totalTokenCount":12}}"#).is_empty());
        assert!(events(r#"{"serverContent":{"inputTranscription":{"text":""}}}"#).is_empty());
        assert!(matches!(
            parse_server_message(b"{tronque"),
            Err(NetworkError::InvalidMessage(_))
        ));
    }

    #[test]
    fn test_sample_rate_from_mime() {
        assert_eq!(sample_rate_from_mime("audio/pcm;rate=16000"), 16000);
        assert_eq!(sample_rate_from_mime("audio/pcm; rate=48000"), 48000);
        assert_eq!(sample_rate_from_mime("audio/pcm"), 24000);
        assert_eq!(sample_rate_from_mime("audio/pcm;rate=abc"), 24000);
    }
}
