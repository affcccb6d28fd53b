use std::path::PathBuf;

use anyhow::{bail, Result};

use crate::features::Feature;

/// Número de clases de gesto (Hand Close, Hand Open, No Motion, etc.)
pub const NUM_CLASSES: usize = 5;

/// Repeticiones por gesto en una sesión de entrenamiento
pub const NUM_REPS: usize = 5;

/// Canales EMG del brazalete (Myo: 8 electrodos)
pub const NUM_CHANNELS: usize = 8;

/// Frecuencia de muestreo del streamer externo
pub const SAMPLING_RATE: f32 = 200.0; // Hz

/// Tamaño de ventana para extracción de características
pub const WINDOW_SIZE: usize = 40;

/// Desplazamiento entre ventanas consecutivas
pub const WINDOW_INCREMENT: usize = 10;

/// Duración de captura por repetición
pub const REP_TIME_SECS: u64 = 5;

/// Pausa entre repeticiones en el modo guiado por pantalla
pub const TIME_BETWEEN_REPS_SECS: u64 = 1;

/// Conjunto fijo de características por canal
pub const FEATURES: [Feature; 4] = [Feature::Mav, Feature::Zc, Feature::Ssc, Feature::Wl];

/// Identificador del clasificador a entrenar
pub const CLASSIFIER: &str = "SVM";

/// Orden de gestos según el cliente VR
pub const CLIENT_DESCRIPTIONS: [&str; NUM_CLASSES] = [
    "Hand Close",
    "Hand Open",
    "No Motion",
    "Wrist Extension",
    "Wrist Flexion",
];

/// Orden de gestos según este servidor (índice de clase local)
pub const SERVER_DESCRIPTIONS: [&str; NUM_CLASSES] = [
    "No Motion",
    "Hand Close",
    "Hand Open",
    "Wrist Flexion",
    "Wrist Extension",
];

/// Etiquetas para leyendas y ejes de matrices de confusión
pub const LABEL_NAMES: [&str; NUM_CLASSES] = CLIENT_DESCRIPTIONS;

/// Permutación fija: índice de movimiento del cliente VR → clase local.
/// El cliente VR y el servidor no coinciden en el orden de los gestos.
pub const VR_CLASS_REMAP: [usize; NUM_CLASSES] = [1, 2, 0, 4, 3];

/// Dirección donde escucha el relay de la sesión VR
pub const RELAY_BIND_ADDR: &str = "0.0.0.0:5006";

/// Dirección local donde el streamer EMG externo envía datagramas
pub const STREAMER_BIND_ADDR: &str = "127.0.0.1:12345";

pub const DATA_FOLDER: &str = "data";
pub const RESULTS_FILE: &str = "results.csv";
pub const CONFUSION_PLOT_FILE: &str = "confusion_matrices.png";

/// Id de sujeto por defecto (se puede pasar por argumento)
pub const DEFAULT_SUBJECT_ID: u32 = 0;

/// Método de recolección de datos de entrenamiento
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingMethod {
    /// Guiado por indicaciones en consola (reemplaza la UI de pantalla)
    Sgt,
    /// Disparado por el cliente VR vía websocket
    Vr,
}

impl TrainingMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrainingMethod::Sgt => "sgt",
            TrainingMethod::Vr => "vr",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "sgt" => Ok(TrainingMethod::Sgt),
            "vr" => Ok(TrainingMethod::Vr),
            other => bail!("Método de entrenamiento no reconocido: {}", other),
        }
    }
}

/// Configuración de una sesión: sujeto + método + carpeta raíz de datos
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub subject_id: u32,
    pub method: TrainingMethod,
    pub data_folder: PathBuf,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            subject_id: DEFAULT_SUBJECT_ID,
            method: TrainingMethod::Vr,
            data_folder: PathBuf::from(DATA_FOLDER),
        }
    }
}

impl SessionConfig {
    /// Interpreta argumentos posicionales opcionales: [sgt|vr] [subject_id]
    pub fn from_args(args: impl Iterator<Item = String>) -> Result<Self> {
        let mut config = Self::default();

        for arg in args {
            if let Ok(id) = arg.parse::<u32>() {
                config.subject_id = id;
            } else {
                config.method = TrainingMethod::parse(&arg)?;
            }
        }

        Ok(config)
    }

    /// Carpeta del método: data/<sgt|vr>
    pub fn method_folder(&self) -> PathBuf {
        self.data_folder.join(self.method.as_str())
    }

    /// Carpeta de salida del sujeto: data/<método>/subject<N>/
    pub fn output_folder(&self) -> PathBuf {
        self.method_folder()
            .join(format!("subject{}", self.subject_id))
    }
}
