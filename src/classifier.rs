use std::path::Path;
use std::time::Duration;

use linfa::prelude::*;
use linfa_svm::Svm;
use ndarray::{Array1, Array2};
use thiserror::Error;

use crate::acquisition::OnlineAcquisition;
use crate::config::{
    CLASSIFIER, FEATURES, NUM_CLASSES, SAMPLING_RATE, SERVER_DESCRIPTIONS, WINDOW_INCREMENT,
    WINDOW_SIZE,
};
use crate::features::extract_feature_matrix;
use crate::recordings::{collect_recordings, windows_and_labels};

/// Ancho del kernel gaussiano para los SVM uno-contra-resto
const KERNEL_EPS: f64 = 50.0;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("Clasificador no reconocido: {0}")]
    UnknownModel(String),

    #[error("Conjunto de entrenamiento vacío")]
    EmptyTrainingSet,

    #[error("Dimensiones incompatibles: {features} vectores para {labels} etiquetas")]
    DimensionMismatch { features: usize, labels: usize },

    #[error("Fallo entrenando el SVM de la clase {class}: {message}")]
    Train { class: usize, message: String },
}

/// Clasificador de gestos: un SVM con calibración de Platt por clase
/// (uno-contra-resto), entrenado sobre la matriz de características.
pub struct EmgClassifier {
    models: Vec<Svm<f64, Pr>>,
}

impl EmgClassifier {
    /// Entrena el clasificador indicado por `model` ("SVM" es el único
    /// identificador soportado). Un conjunto vacío es un error: se propaga,
    /// no se enmascara.
    pub fn fit(
        model: &str,
        features: &Array2<f64>,
        labels: &[usize],
    ) -> Result<Self, ClassifierError> {
        if model != "SVM" {
            return Err(ClassifierError::UnknownModel(model.to_string()));
        }
        if features.nrows() != labels.len() {
            return Err(ClassifierError::DimensionMismatch {
                features: features.nrows(),
                labels: labels.len(),
            });
        }
        if features.nrows() == 0 {
            return Err(ClassifierError::EmptyTrainingSet);
        }

        let mut models = Vec::with_capacity(NUM_CLASSES);
        for class in 0..NUM_CLASSES {
            let targets: Array1<bool> =
                Array1::from_iter(labels.iter().map(|&label| label == class));
            let dataset = Dataset::new(features.clone(), targets);

            let svm = Svm::<f64, Pr>::params()
                .gaussian_kernel(KERNEL_EPS)
                .fit(&dataset)
                .map_err(|e| ClassifierError::Train {
                    class,
                    message: e.to_string(),
                })?;
            models.push(svm);
        }

        Ok(Self { models })
    }

    /// Puntuación calibrada de cada clase para cada ventana
    fn score_matrix(&self, features: &Array2<f64>) -> Vec<[f64; NUM_CLASSES]> {
        let mut scores = vec![[0.0; NUM_CLASSES]; features.nrows()];
        for (class, model) in self.models.iter().enumerate() {
            let predictions = model.predict(features);
            for (row, pr) in predictions.iter().enumerate() {
                scores[row][class] = **pr as f64;
            }
        }
        scores
    }

    /// Clase más probable por ventana
    pub fn predict(&self, features: &Array2<f64>) -> Vec<usize> {
        self.score_matrix(features)
            .iter()
            .map(|scores| {
                let mut best = 0;
                for class in 1..NUM_CLASSES {
                    if scores[class] > scores[best] {
                        best = class;
                    }
                }
                best
            })
            .collect()
    }

    /// Probabilidades por clase, normalizadas para sumar 1 por ventana
    pub fn predict_probabilities(&self, features: &Array2<f64>) -> Vec<[f64; NUM_CLASSES]> {
        let mut scores = self.score_matrix(features);
        for row in scores.iter_mut() {
            let total: f64 = row.iter().sum();
            if total > 0.0 {
                for value in row.iter_mut() {
                    *value /= total;
                }
            } else {
                *row = [1.0 / NUM_CLASSES as f64; NUM_CLASSES];
            }
        }
        scores
    }
}

/// Entrena el clasificador configurado con las capturas de una carpeta de
/// sujeto, opcionalmente restringidas a un subconjunto de repeticiones.
pub fn create_offline_classifier(
    data_folder: &Path,
    reps: Option<&[usize]>,
) -> anyhow::Result<EmgClassifier> {
    let recordings = collect_recordings(data_folder, reps)?;
    let (windows, labels) = windows_and_labels(&recordings);
    let features = extract_feature_matrix(&windows, &FEATURES);

    let classifier = EmgClassifier::fit(CLASSIFIER, &features, &labels)?;
    println!(
        "🧠 Clasificador {} entrenado con {} ventanas de {:?}",
        CLASSIFIER,
        labels.len(),
        data_folder
    );
    Ok(classifier)
}

/// Formato de salida del clasificador en vivo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Predictions,
    Probabilities,
}

/// Clasificador en vivo: consume ventanas del streamer y escribe cada
/// resultado por consola. El bucle no termina por sí solo.
pub struct OnlineEmgClassifier {
    classifier: EmgClassifier,
    acquisition: OnlineAcquisition,
    output_format: OutputFormat,
}

impl OnlineEmgClassifier {
    pub fn new(
        classifier: EmgClassifier,
        acquisition: OnlineAcquisition,
        output_format: OutputFormat,
    ) -> Self {
        Self {
            classifier,
            acquisition,
            output_format,
        }
    }

    /// Clasifica una ventana cada WINDOW_INCREMENT muestras nuevas
    pub fn run(&mut self) -> Result<(), ClassifierError> {
        let tick = Duration::from_secs_f32(WINDOW_INCREMENT as f32 / SAMPLING_RATE);
        let mut last_classified = 0usize;

        loop {
            std::thread::sleep(tick);

            let available = self.acquisition.len();
            if available < WINDOW_SIZE || available < last_classified + WINDOW_INCREMENT {
                continue;
            }

            let window = match self.acquisition.last_window(WINDOW_SIZE) {
                Some(window) => window,
                None => continue,
            };
            last_classified = available;

            let features = extract_feature_matrix(&[window.as_slice()], &FEATURES);
            match self.output_format {
                OutputFormat::Predictions => {
                    let class = self.classifier.predict(&features)[0];
                    println!("🖐️  {}", SERVER_DESCRIPTIONS[class]);
                }
                OutputFormat::Probabilities => {
                    let probs = self.classifier.predict_probabilities(&features)[0];
                    let line: Vec<String> = SERVER_DESCRIPTIONS
                        .iter()
                        .zip(probs.iter())
                        .map(|(label, p)| format!("{}: {:.2}", label, p))
                        .collect();
                    println!("📊 {}", line.join("  "));
                }
            }
        }
    }
}
