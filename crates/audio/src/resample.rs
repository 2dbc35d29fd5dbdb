//! Rééchantillonnage vers une fréquence inférieure
//!
//! Le micro livre souvent du 44.1 ou 48 kHz alors que le serveur attend du
//! 16 kHz. On interpole linéairement entre les deux échantillons source les
//! plus proches de chaque index de sortie.

use crate::{AudioError, AudioResult, Sample};

/// Réduit la fréquence d'échantillonnage de `input`
///
/// La sortie contient `round(len * to / from)` échantillons. Si le voisin
/// de droite d'un index fractionnaire sort du buffer, il vaut zéro.
///
/// # Erreurs
/// - `AudioError::UpsamplingNotSupported` si `to > from`
///
/// # Example
/// ```rust
/// use audio::resample::downsample;
///
/// let out = downsample(&[0.0, 0.5, 1.0, 0.5], 48000, 24000).unwrap();
/// assert_eq!(out, vec![0.0, 1.0]);
/// ```
pub fn downsample(input: &[Sample], from: u32, to: u32) -> AudioResult<Vec<Sample>> {
    if to > from {
        return Err(AudioError::UpsamplingNotSupported { from, to });
    }
    if to == 0 {
        return Err(AudioError::ConfigError("Fréquence cible nulle".to_string()));
    }
    if to == from {
        return Ok(input.to_vec());
    }

    let ratio = from as f64 / to as f64;
    let out_len = output_len(input.len(), from, to);
    let mut output = Vec::with_capacity(out_len);

    for i in 0..out_len {
        let index = i as f64 * ratio;
        let left = index.floor() as usize;
        let right = index.ceil() as usize;
        let weight = (index - left as f64) as f32;

        let left_value = input.get(left).copied().unwrap_or(0.0);
        let right_value = input.get(right).copied().unwrap_or(0.0);

        output.push(left_value + weight * (right_value - left_value));
    }

    Ok(output)
}

/// Longueur de sortie attendue pour `len` échantillons
pub fn output_len(len: usize, from: u32, to: u32) -> usize {
    (len as f64 * to as f64 / from as f64).round() as usize
}
