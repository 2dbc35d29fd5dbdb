//! Indicateur de volume pour l'interface
//!
//! Appelé une fois par frame de capture, depuis le callback temps réel :
//! aucune allocation, aucun verrou.

use crate::Sample;

/// Volume maximum rapporté à l'interface
pub const MAX_VOLUME: f32 = 100.0;

/// Calcule un volume perceptif entre 0 et 100
///
/// RMS de la frame × 100 × `gain`, écrêté à [0, 100]. Une frame vide ou
/// silencieuse donne exactement 0.
pub fn volume_level(samples: &[Sample], gain: f32) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|&s| s * s).sum();
    let rms = (sum_squares / samples.len() as f32).sqrt();

    (rms * 100.0 * gain).clamp(0.0, MAX_VOLUME)
}
