//! Contexte capteurs transmis au modèle vocal
//!
//! La session ancre la conversation sur la dernière mesure de la ferme.
//! Les mesures viennent d'un export CSV de la feuille de relevés :
//!
//! ```text
//! A: horodatage  B: température  C: humidité  D: lux  E: pluie
//! F: sol (brut 0-4095)  G: eau (brut 0-4095 ou %)  ...  M1: ventilateur
//! ```

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::SessionResult;

/// Pleine échelle du convertisseur analogique des capteurs
const ADC_FULL_SCALE: f64 = 4095.0;

/// Index de la colonne M (état du ventilateur, lu sur l'en-tête)
const FAN_COLUMN: usize = 12;

/// Nombre minimal de colonnes d'une ligne de mesures (A à G)
const MIN_COLUMNS: usize = 7;

/// Mesure des capteurs de la ferme
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    pub timestamp: String,
    /// Température (°C)
    pub temperature: f64,
    /// Humidité de l'air (%)
    pub humidity: f64,
    /// Luminosité (lux)
    pub lux: f64,
    /// Valeur brute du capteur de pluie
    pub rain: f64,
    /// Humidité du sol (%)
    pub soil_moisture: f64,
    /// Niveau du réservoir (%)
    pub water_level: f64,
    pub fan_on: bool,
}

/// Source de l'historique des capteurs
pub trait SensorHistory: Send + Sync {
    /// Mesure la plus récente, si l'historique n'est pas vide
    fn latest(&self) -> Option<SensorReading>;
}

/// Historique en mémoire, dans l'ordre chronologique
#[derive(Clone, Debug, Default)]
pub struct StaticSensorHistory {
    readings: Vec<SensorReading>,
}

impl StaticSensorHistory {
    pub fn new(readings: Vec<SensorReading>) -> Self {
        Self { readings }
    }

    /// Charge un export CSV de la feuille de relevés
    pub fn from_csv_file(path: impl AsRef<Path>) -> SessionResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let readings = parse_sensor_csv(&text);
        debug!(path = %path.as_ref().display(), count = readings.len(), "historique capteurs chargé");
        Ok(Self::new(readings))
    }

    pub fn readings(&self) -> &[SensorReading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

impl SensorHistory for StaticSensorHistory {
    fn latest(&self) -> Option<SensorReading> {
        self.readings.last().cloned()
    }
}

/// Parse l'export CSV de la feuille de relevés
///
/// La première ligne est l'en-tête ; sa colonne M donne l'état du
/// ventilateur pour toutes les mesures. Les lignes sans température ou
/// humidité numérique sont ignorées.
pub fn parse_sensor_csv(text: &str) -> Vec<SensorReading> {
    let text = text.replace('\r', "");
    let mut lines = text.lines();

    let Some(header) = lines.next() else {
        return Vec::new();
    };
    let header = split_csv_line(header);
    let fan_on = header
        .get(FAN_COLUMN)
        .map(|value| {
            let value = value.trim().to_uppercase();
            value == "1" || value == "TRUE"
        })
        .unwrap_or(false);

    let mut readings = Vec::new();
    let mut skipped = 0usize;

    for line in lines {
        let values = split_csv_line(line);
        if values.len() < MIN_COLUMNS {
            continue;
        }

        let (Some(temperature), Some(humidity)) = (parse_number(&values[1]), parse_number(&values[2])) else {
            skipped += 1;
            continue;
        };

        readings.push(SensorReading {
            timestamp: values[0].clone(),
            temperature,
            humidity,
            lux: parse_number(&values[3]).unwrap_or(0.0),
            rain: parse_number(&values[4]).unwrap_or(0.0),
            soil_moisture: soil_percent(parse_number(&values[5])),
            water_level: water_percent(parse_number(&values[6])),
            fan_on,
        });
    }

    if skipped > 0 {
        warn!(skipped, "lignes de capteurs sans température ou humidité ignorées");
    }
    readings
}

/// Humidité du sol : brut 0-4095 ramené en pourcentage borné
fn soil_percent(raw: Option<f64>) -> f64 {
    match raw {
        Some(raw) => ((raw / ADC_FULL_SCALE) * 100.0).clamp(0.0, 100.0).round(),
        None => 0.0,
    }
}

/// Niveau d'eau : déjà en pourcentage, sauf valeur brute (> 100)
fn water_percent(raw: Option<f64>) -> f64 {
    let Some(water) = raw else {
        return 0.0;
    };
    if water > 100.0 {
        ((water / ADC_FULL_SCALE) * 100.0).round()
    } else {
        water.round()
    }
}

fn parse_number(value: &str) -> Option<f64> {
    value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Découpe une ligne CSV ; les virgules entre guillemets ne séparent pas
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => fields.push(clean_field(&std::mem::take(&mut current))),
            _ => current.push(c),
        }
    }
    fields.push(clean_field(&current));
    fields
}

fn clean_field(field: &str) -> String {
    let field = field.trim();
    let field = field.strip_prefix('"').unwrap_or(field);
    let field = field.strip_suffix('"').unwrap_or(field);
    field.to_string()
}

/// Texte de contexte destiné au modèle vocal
pub fn context_text(latest: Option<&SensorReading>) -> String {
    let Some(reading) = latest else {
        return "[SYSTEM NOTE: No live sensor data currently available.]".to_string();
    };

    let mut text = String::from("[SYSTEM NOTE: LIVE TELEMETRY]\n");
    let _ = writeln!(text, "Timestamp: {}", reading.timestamp);
    let _ = writeln!(text, "Temperature: {}°C", reading.temperature);
    let _ = writeln!(text, "Humidity: {}%", reading.humidity);
    let _ = writeln!(text, "Light: {} lux", reading.lux);
    let _ = writeln!(text, "Rain Sensor: {}", reading.rain);
    let _ = writeln!(text, "Soil Moisture: {}%", reading.soil_moisture);
    let _ = writeln!(text, "Water Tank: {}%", reading.water_level);
    let _ = write!(text, "Fan: {}", if reading.fan_on { "ON" } else { "OFF" });
    text
}
