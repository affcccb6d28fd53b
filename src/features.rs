use ndarray::Array2;

use crate::acquisition::EmgSample;
use crate::config::NUM_CHANNELS;

/// Características en el dominio del tiempo calculadas por canal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feature {
    /// Valor absoluto medio
    Mav,
    /// Cruces por cero
    Zc,
    /// Cambios de signo de la pendiente
    Ssc,
    /// Longitud de forma de onda (suma de |primeras diferencias|)
    Wl,
}

impl Feature {
    pub fn name(&self) -> &'static str {
        match self {
            Feature::Mav => "MAV",
            Feature::Zc => "ZC",
            Feature::Ssc => "SSC",
            Feature::Wl => "WL",
        }
    }

    pub fn compute(&self, signal: &[f32]) -> f64 {
        match self {
            Feature::Mav => mean_absolute_value(signal),
            Feature::Zc => zero_crossings(signal) as f64,
            Feature::Ssc => slope_sign_changes(signal) as f64,
            Feature::Wl => waveform_length(signal),
        }
    }
}

fn mean_absolute_value(signal: &[f32]) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    signal.iter().map(|x| x.abs() as f64).sum::<f64>() / signal.len() as f64
}

/// Cruce por cero: muestras consecutivas con signos opuestos
fn zero_crossings(signal: &[f32]) -> usize {
    signal.windows(2).filter(|w| w[0] * w[1] < 0.0).count()
}

/// Cambio de pendiente: la primera diferencia cambia de signo
fn slope_sign_changes(signal: &[f32]) -> usize {
    if signal.len() < 3 {
        return 0;
    }

    let mut count = 0;
    for i in 1..signal.len() - 1 {
        let d_prev = signal[i] - signal[i - 1];
        let d_next = signal[i + 1] - signal[i];
        if d_prev * d_next < 0.0 {
            count += 1;
        }
    }
    count
}

fn waveform_length(signal: &[f32]) -> f64 {
    signal.windows(2).map(|w| (w[1] - w[0]).abs() as f64).sum()
}

/// Extrae la matriz de características [ventanas x (features * canales)].
/// El orden de columnas es por característica y dentro de cada una por canal,
/// igual para entrenamiento y clasificación en vivo.
pub fn extract_feature_matrix(windows: &[&[EmgSample]], features: &[Feature]) -> Array2<f64> {
    let cols = features.len() * NUM_CHANNELS;
    let mut matrix = Array2::zeros((windows.len(), cols));

    let mut channel = Vec::new();
    for (row, window) in windows.iter().enumerate() {
        for (f_idx, feature) in features.iter().enumerate() {
            for ch in 0..NUM_CHANNELS {
                channel.clear();
                channel.extend(window.iter().map(|sample| sample[ch]));
                matrix[[row, f_idx * NUM_CHANNELS + ch]] = feature.compute(&channel);
            }
        }
    }

    matrix
}
