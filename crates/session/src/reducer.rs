//! Réduction des transcriptions en tours de conversation
//!
//! Le serveur transcrit par petits fragments. Un accumulateur par locuteur
//! reconstitue le texte en cours ; la fin de tour le fige puis le vide.
//! Les deux locuteurs sont indépendants.

use network::{InboundChunk, Role};

/// Texte transmis à l'observateur de transcription
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transcription {
    pub role: Role,
    pub text: String,
    /// Vrai pour un tour figé, faux pour du texte encore en cours
    pub is_turn_complete: bool,
}

/// Accumulateur d'un locuteur
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SpeakerBuffer {
    text: String,
    committed: bool,
}

impl SpeakerBuffer {
    /// Texte accumulé depuis le dernier tour figé
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Vrai si le dernier événement de ce locuteur était une fin de tour
    pub fn is_committed(&self) -> bool {
        self.committed
    }

    fn append(&mut self, fragment: &str) {
        self.text.push_str(fragment);
        self.committed = false;
    }

    fn commit(&mut self) -> String {
        self.committed = true;
        std::mem::take(&mut self.text)
    }
}

/// Réducteur de transcription à deux accumulateurs
#[derive(Clone, Debug, Default)]
pub struct TranscriptionReducer {
    user: SpeakerBuffer,
    model: SpeakerBuffer,
}

impl TranscriptionReducer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ajoute un fragment et retourne le texte en cours du locuteur
    pub fn on_fragment(&mut self, role: Role, fragment: &str) -> Transcription {
        let buffer = self.buffer_mut(role);
        buffer.append(fragment);

        Transcription {
            role,
            text: buffer.text.clone(),
            is_turn_complete: false,
        }
    }

    /// Fige le tour du locuteur et vide son accumulateur
    ///
    /// Un tour vide est quand même signalé ; à l'appelant de l'ignorer.
    pub fn on_turn_complete(&mut self, role: Role) -> Transcription {
        Transcription {
            role,
            text: self.buffer_mut(role).commit(),
            is_turn_complete: true,
        }
    }

    /// Applique un chunk reçu ; None si le chunk ne concerne pas la transcription
    pub fn apply(&mut self, chunk: &InboundChunk) -> Option<Transcription> {
        match chunk {
            InboundChunk::Transcript { role, text } => Some(self.on_fragment(*role, text)),
            InboundChunk::TurnComplete(role) => Some(self.on_turn_complete(*role)),
            _ => None,
        }
    }

    /// Accumulateur d'un locuteur
    pub fn buffer(&self, role: Role) -> &SpeakerBuffer {
        match role {
            Role::User => &self.user,
            Role::Model => &self.model,
        }
    }

    fn buffer_mut(&mut self, role: Role) -> &mut SpeakerBuffer {
        match role {
            Role::User => &mut self.user,
            Role::Model => &mut self.model,
        }
    }
}
