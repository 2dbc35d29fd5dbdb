// Journal de conversation côté terminal
//
// Seuls les tours figés et non vides entrent dans le journal ; le texte
// en cours est affiché à part, sur une ligne réécrite.

use network::Role;

/// Tour de parole figé
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

/// Journal en mémoire de la conversation
#[derive(Debug, Default)]
pub struct ConversationLog {
    turns: Vec<Turn>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applique une transcription ; retourne le tour ajouté s'il y en a un
    pub fn apply(&mut self, role: Role, text: &str, is_turn_complete: bool) -> Option<&Turn> {
        if !is_turn_complete || text.trim().is_empty() {
            return None;
        }

        self.turns.push(Turn {
            role,
            text: text.trim().to_string(),
        });
        self.turns.last()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }
}

/// Libellé affiché pour un locuteur
pub fn speaker_label(role: Role) -> &'static str {
    match role {
        Role::User => "🧑 Vous",
        Role::Model => "🤖 Agronome",
    }
}
