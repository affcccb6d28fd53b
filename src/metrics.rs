use std::collections::BTreeSet;
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ndarray::Array2;
use serde::Deserialize;
use thiserror::Error;

use crate::classifier::EmgClassifier;
use crate::config::{CLASSIFIER, FEATURES, NUM_CLASSES, NUM_REPS};
use crate::features::extract_feature_matrix;
use crate::recordings::{collect_recordings, windows_and_labels};

#[derive(Error, Debug)]
pub enum MetricsError {
    #[error("El registro no contiene ensayos")]
    EmptyLog,

    #[error("Ensayo {trial} con tiempo transcurrido cero")]
    ZeroTrialTime { trial: i64 },

    #[error("Ensayo {trial} sin recorrido del cursor")]
    ZeroPathLength { trial: i64 },

    #[error("Registro inconsistente: {0}")]
    MalformedLog(String),
}

// ---------- Métricas offline ----------

/// Predicciones y etiquetas verdaderas acumuladas de todos los folds.
/// Se puntúa sobre la concatenación completa, no promediando por fold,
/// para que folds de distinto tamaño no sesguen la precisión.
#[derive(Debug, Default)]
pub struct FoldAccumulator {
    predictions: Vec<usize>,
    true_labels: Vec<usize>,
}

impl FoldAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_fold(&mut self, predictions: &[usize], true_labels: &[usize]) {
        self.predictions.extend_from_slice(predictions);
        self.true_labels.extend_from_slice(true_labels);
    }

    /// (precisión, matriz de confusión [verdadera][predicha])
    pub fn score(&self) -> (f64, Array2<f64>) {
        let mut confusion = Array2::zeros((NUM_CLASSES, NUM_CLASSES));
        let mut hits = 0usize;

        for (&predicted, &truth) in self.predictions.iter().zip(self.true_labels.iter()) {
            confusion[[truth, predicted]] += 1.0;
            if predicted == truth {
                hits += 1;
            }
        }

        let total = self.true_labels.len();
        let accuracy = if total > 0 {
            hits as f64 / total as f64
        } else {
            0.0
        };

        (accuracy, confusion)
    }
}

/// Validación cruzada dejando fuera una repetición por fold. Devuelve None
/// (con aviso) si la ruta no es una carpeta.
pub fn cross_validation(data_folder: &Path) -> Result<Option<(f64, Array2<f64>)>> {
    if !data_folder.is_dir() {
        println!("ℹ️  Omitiendo {:?} porque no es una carpeta.", data_folder);
        return Ok(None);
    }

    let mut accumulator = FoldAccumulator::new();

    for held_out in 0..NUM_REPS {
        let train_reps: Vec<usize> = (0..NUM_REPS).filter(|&rep| rep != held_out).collect();
        let test_reps = [held_out];

        let train_recordings = collect_recordings(data_folder, Some(&train_reps))?;
        let (train_windows, train_labels) = windows_and_labels(&train_recordings);
        let train_features = extract_feature_matrix(&train_windows, &FEATURES);

        let classifier = EmgClassifier::fit(CLASSIFIER, &train_features, &train_labels)?;

        let test_recordings = collect_recordings(data_folder, Some(&test_reps))?;
        let (test_windows, test_labels) = windows_and_labels(&test_recordings);
        let test_features = extract_feature_matrix(&test_windows, &FEATURES);

        let predictions = classifier.predict(&test_features);
        accumulator.push_fold(&predictions, &test_labels);
    }

    Ok(Some(accumulator.score()))
}

/// Resultados offline de un sujeto
#[derive(Debug, Clone)]
pub struct SubjectOffline {
    pub subject: String,
    pub accuracy: f64,
    pub confusion: Array2<f64>,
}

/// Validación cruzada para cada carpeta de sujeto dentro de la carpeta del
/// método. Las entradas que no son carpetas se omiten con aviso.
pub fn calculate_offline_metrics(method_folder: &Path) -> Result<Vec<SubjectOffline>> {
    let mut results = Vec::new();

    for subject in subject_folders(method_folder)? {
        let folder = method_folder.join(&subject);
        if let Some((accuracy, confusion)) = cross_validation(&folder)? {
            results.push(SubjectOffline {
                subject,
                accuracy,
                confusion,
            });
        }
    }

    if !results.is_empty() {
        println!("📈 Precisión media: {:.4}", mean_accuracy(&results));
    }

    Ok(results)
}

/// Media aritmética sin ponderar de la precisión por sujeto
pub fn mean_accuracy(results: &[SubjectOffline]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    results.iter().map(|r| r.accuracy).sum::<f64>() / results.len() as f64
}

/// Media elemento a elemento de las matrices de confusión por sujeto
pub fn mean_confusion(results: &[SubjectOffline]) -> Option<Array2<f64>> {
    if results.is_empty() {
        return None;
    }

    let mut mean = Array2::zeros((NUM_CLASSES, NUM_CLASSES));
    for result in results {
        mean = mean + &result.confusion;
    }
    Some(mean / results.len() as f64)
}

fn subject_folders(method_folder: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(method_folder)
        .with_context(|| format!("No se pudo leer la carpeta {:?}", method_folder))?;

    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().to_str().map(|s| s.to_string()))
        .collect();
    names.sort();
    Ok(names)
}

// ---------- Métricas online (tarea de Fitts) ----------

/// Registro de una sesión en línea, tal como lo serializa el runner externo
/// de la tarea de Fitts: posición del cursor y del objetivo como [x, y, ancho],
/// número de ensayo y reloj monótono por muestra.
#[derive(Debug, Clone, Deserialize)]
pub struct FittsLog {
    pub cursor_position: Vec<[f64; 3]>,
    pub goal_circle: Vec<[f64; 3]>,
    pub trial_number: Vec<i64>,
    pub global_clock: Vec<f64>,
}

impl FittsLog {
    fn validate(&self) -> Result<(), MetricsError> {
        let n = self.trial_number.len();
        if self.cursor_position.len() != n
            || self.goal_circle.len() != n
            || self.global_clock.len() != n
        {
            return Err(MetricsError::MalformedLog(
                "series de distinta longitud".to_string(),
            ));
        }
        Ok(())
    }

    fn trials(&self) -> Vec<i64> {
        let unique: BTreeSet<i64> = self.trial_number.iter().copied().collect();
        unique.into_iter().collect()
    }

    fn trial_indices(&self, trial: i64) -> Vec<usize> {
        self.trial_number
            .iter()
            .enumerate()
            .filter(|(_, &t)| t == trial)
            .map(|(idx, _)| idx)
            .collect()
    }
}

fn planar_distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    ((a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)).sqrt()
}

fn cursor_in_target(cursor: &[f64; 3], target: &[f64; 3]) -> bool {
    let cursor_radius = cursor[2] / 2.0;
    let target_radius = target[2] / 2.0;
    planar_distance(cursor, target) < cursor_radius + target_radius
}

/// Índice de dificultad de Fitts dividido por el tiempo del ensayo,
/// promediado sobre los ensayos del sujeto.
pub fn calculate_throughput(log: &FittsLog) -> Result<f64, MetricsError> {
    log.validate()?;
    let trials = log.trials();
    if trials.is_empty() {
        return Err(MetricsError::EmptyLog);
    }

    let mut throughputs = Vec::with_capacity(trials.len());
    for trial in trials {
        let indices = log.trial_indices(trial);
        let first = indices[0];
        let last = *indices.last().unwrap();

        let distance = planar_distance(&log.cursor_position[first], &log.goal_circle[first]);
        let target_width = log.goal_circle[first][2];
        if target_width <= 0.0 {
            return Err(MetricsError::MalformedLog(format!(
                "ensayo {} con ancho de objetivo no positivo",
                trial
            )));
        }

        let index_of_difficulty = (distance / target_width + 1.0).log2();
        let elapsed = log.global_clock[last] - log.global_clock[first];
        if elapsed <= 0.0 {
            return Err(MetricsError::ZeroTrialTime { trial });
        }

        throughputs.push(index_of_difficulty / elapsed);
    }

    Ok(throughputs.iter().sum::<f64>() / throughputs.len() as f64)
}

/// Distancia en línea recta dividida por el recorrido real del cursor,
/// promediada sobre los ensayos del sujeto.
pub fn calculate_efficiency(log: &FittsLog) -> Result<f64, MetricsError> {
    log.validate()?;
    let trials = log.trials();
    if trials.is_empty() {
        return Err(MetricsError::EmptyLog);
    }

    let mut efficiencies = Vec::with_capacity(trials.len());
    for trial in trials {
        let indices = log.trial_indices(trial);
        let first = indices[0];

        let mut travelled = 0.0;
        for pair in indices.windows(2) {
            travelled += planar_distance(
                &log.cursor_position[pair[1]],
                &log.cursor_position[pair[0]],
            );
        }
        if travelled <= 0.0 {
            return Err(MetricsError::ZeroPathLength { trial });
        }

        let fastest_path = planar_distance(&log.cursor_position[first], &log.goal_circle[first]);
        efficiencies.push(fastest_path / travelled);
    }

    Ok(efficiencies.iter().sum::<f64>() / efficiencies.len() as f64)
}

/// Número de transiciones dentro→fuera del objetivo, sumado sobre los
/// ensayos del sujeto.
pub fn calculate_overshoots(log: &FittsLog) -> Result<usize, MetricsError> {
    log.validate()?;

    let mut overshoots = 0usize;
    for trial in log.trials() {
        let indices = log.trial_indices(trial);
        let in_target: Vec<bool> = indices
            .iter()
            .map(|&idx| cursor_in_target(&log.cursor_position[idx], &log.goal_circle[idx]))
            .collect();

        for pair in in_target.windows(2) {
            if pair[0] && !pair[1] {
                overshoots += 1;
            }
        }
    }

    Ok(overshoots)
}

/// Resultados online de un sujeto
#[derive(Debug, Clone)]
pub struct SubjectOnline {
    pub subject: String,
    pub throughput: f64,
    pub efficiency: f64,
    pub overshoots: usize,
}

fn find_pickle_file(folder: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(folder).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .find(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| ext.eq_ignore_ascii_case("pkl"))
                .unwrap_or(false)
        })
}

/// Carga el registro pickled de la sesión en línea de un sujeto
pub fn read_fitts_log(path: &Path) -> Result<FittsLog> {
    let file = File::open(path)
        .with_context(|| format!("No se pudo abrir el registro {:?}", path))?;
    let log: FittsLog = serde_pickle::from_reader(file, serde_pickle::DeOptions::new())
        .with_context(|| format!("Registro pickled inválido en {:?}", path))?;
    Ok(log)
}

/// Métricas en línea por sujeto. Un sujeto sin registro se omite (no cuenta
/// como cero); un registro corrupto o degenerado se omite con aviso en vez
/// de abortar el lote completo.
pub fn calculate_online_metrics(method_folder: &Path) -> Result<Vec<SubjectOnline>> {
    let mut results = Vec::new();

    for subject in subject_folders(method_folder)? {
        let folder = method_folder.join(&subject);
        let pickle_path = match find_pickle_file(&folder) {
            Some(path) => path,
            None => continue,
        };

        let log = match read_fitts_log(&pickle_path) {
            Ok(log) => log,
            Err(e) => {
                eprintln!("⚠️  Omitiendo métricas en línea de {}: {}", subject, e);
                continue;
            }
        };

        let metrics = calculate_throughput(&log).and_then(|throughput| {
            let efficiency = calculate_efficiency(&log)?;
            let overshoots = calculate_overshoots(&log)?;
            Ok((throughput, efficiency, overshoots))
        });

        match metrics {
            Ok((throughput, efficiency, overshoots)) => results.push(SubjectOnline {
                subject,
                throughput,
                efficiency,
                overshoots,
            }),
            Err(e) => eprintln!("⚠️  Omitiendo métricas en línea de {}: {}", subject, e),
        }
    }

    Ok(results)
}

// ---------- Combinación ----------

/// Una fila de la tabla de resultados. Las columnas en línea quedan vacías
/// para los sujetos sin registro de Fitts.
#[derive(Debug, Clone)]
pub struct ResultRow {
    pub method: String,
    pub accuracy: f64,
    pub throughput: Option<f64>,
    pub efficiency: Option<f64>,
    pub overshoots: Option<usize>,
}

/// Una fila por sujeto con métricas offline, emparejada por nombre de
/// carpeta con sus métricas en línea si existen.
pub fn combine_metrics(
    method: &str,
    offline: &[SubjectOffline],
    online: &[SubjectOnline],
) -> Vec<ResultRow> {
    offline
        .iter()
        .map(|subject| {
            let matching = online.iter().find(|o| o.subject == subject.subject);
            ResultRow {
                method: method.to_string(),
                accuracy: subject.accuracy,
                throughput: matching.map(|o| o.throughput),
                efficiency: matching.map(|o| o.efficiency),
                overshoots: matching.map(|o| o.overshoots),
            }
        })
        .collect()
}

/// Escribe la tabla combinada de resultados
pub fn write_results_csv(path: &Path, rows: &[ResultRow]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("No se pudo crear {:?}", path))?;

    writer.write_record(["method", "accuracy", "throughput", "efficiency", "overshoots"])?;
    for row in rows {
        writer.write_record([
            row.method.clone(),
            row.accuracy.to_string(),
            row.throughput.map(|v| v.to_string()).unwrap_or_default(),
            row.efficiency.map(|v| v.to_string()).unwrap_or_default(),
            row.overshoots.map(|v| v.to_string()).unwrap_or_default(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_trial_log(
        cursor: Vec<[f64; 3]>,
        target: [f64; 3],
        clock: Vec<f64>,
    ) -> FittsLog {
        let n = cursor.len();
        FittsLog {
            goal_circle: vec![target; n],
            trial_number: vec![1; n],
            cursor_position: cursor,
            global_clock: clock,
        }
    }

    #[test]
    fn test_score_is_invariant_to_fold_order() {
        let fold_a = (vec![0usize, 1], vec![0usize, 1]);
        let fold_b = (vec![2usize, 2, 3], vec![2usize, 3, 3]);

        let mut forward = FoldAccumulator::new();
        forward.push_fold(&fold_a.0, &fold_a.1);
        forward.push_fold(&fold_b.0, &fold_b.1);

        let mut backward = FoldAccumulator::new();
        backward.push_fold(&fold_b.0, &fold_b.1);
        backward.push_fold(&fold_a.0, &fold_a.1);

        let (acc_fwd, conf_fwd) = forward.score();
        let (acc_bwd, conf_bwd) = backward.score();
        assert_eq!(acc_fwd, acc_bwd);
        assert_eq!(conf_fwd, conf_bwd);
        assert!((acc_fwd - 0.8).abs() < 1e-12);
    }

    #[test]
    fn test_confusion_matrix_orientation() {
        let mut accumulator = FoldAccumulator::new();
        accumulator.push_fold(&[1], &[0]); // predicha 1, verdadera 0

        let (_, confusion) = accumulator.score();
        assert_eq!(confusion[[0, 1]], 1.0);
        assert_eq!(confusion[[1, 0]], 0.0);
    }

    #[test]
    fn test_cross_validation_skips_non_directories() {
        let path = std::env::temp_dir().join(format!("mioscopio_no_dir_{}", std::process::id()));
        std::fs::write(&path, "no soy una carpeta").unwrap();

        let result = cross_validation(&path).unwrap();
        assert!(result.is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_cross_validation_scores_all_held_out_windows() {
        use crate::recordings::{recording_filename, write_recording_csv};

        let dir = std::env::temp_dir().join(format!("mioscopio_cv_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();

        for rep in 0..NUM_REPS {
            for class in 0..NUM_CLASSES {
                let amplitude = (class + 1) as f32 * 0.5;
                let samples: Vec<_> = (0..100)
                    .map(|i| {
                        let value = if i % 2 == 0 { amplitude } else { -amplitude };
                        [value; crate::config::NUM_CHANNELS]
                    })
                    .collect();
                write_recording_csv(&dir.join(recording_filename(rep, class)), &samples).unwrap();
            }
        }

        let (accuracy, confusion) = cross_validation(&dir).unwrap().unwrap();
        assert!((0.0..=1.0).contains(&accuracy));
        // Cada fold aporta sus ventanas a la concatenación: 5 reps x 5 clases x 7
        assert_eq!(confusion.sum(), (NUM_REPS * NUM_CLASSES * 7) as f64);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_overshoots_counts_inside_to_outside_transitions() {
        // Patrón dentro/fuera: [T, T, F, T, F] → exactamente 2 salidas
        let target = [0.0, 0.0, 2.0];
        let cursor = vec![
            [0.0, 0.0, 0.0],
            [0.5, 0.0, 0.0],
            [5.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
            [5.0, 0.0, 0.0],
        ];
        let log = single_trial_log(cursor, target, vec![0.0, 1.0, 2.0, 3.0, 4.0]);

        assert_eq!(calculate_overshoots(&log).unwrap(), 2);
    }

    #[test]
    fn test_throughput_single_trial() {
        // Distancia 5, ancho 2 → ID = log2(3.5); tiempo 2 s
        let target = [0.0, 0.0, 2.0];
        let cursor = vec![[3.0, 4.0, 0.5], [1.0, 1.0, 0.5], [0.0, 0.0, 0.5]];
        let log = single_trial_log(cursor, target, vec![0.0, 1.0, 2.0]);

        let expected = (5.0f64 / 2.0 + 1.0).log2() / 2.0;
        let throughput = calculate_throughput(&log).unwrap();
        assert!((throughput - expected).abs() < 1e-12);
    }

    #[test]
    fn test_throughput_averages_across_trials() {
        let n = 4;
        let log = FittsLog {
            cursor_position: vec![[3.0, 4.0, 0.5]; n],
            goal_circle: vec![[0.0, 0.0, 2.0]; n],
            trial_number: vec![1, 1, 2, 2],
            global_clock: vec![0.0, 1.0, 1.0, 3.0],
        };

        let id = (5.0f64 / 2.0 + 1.0).log2();
        let expected = (id / 1.0 + id / 2.0) / 2.0;
        let throughput = calculate_throughput(&log).unwrap();
        assert!((throughput - expected).abs() < 1e-12);
    }

    #[test]
    fn test_throughput_zero_elapsed_time_is_an_error() {
        let target = [0.0, 0.0, 2.0];
        let cursor = vec![[3.0, 4.0, 0.5], [1.0, 1.0, 0.5]];
        let log = single_trial_log(cursor, target, vec![2.0, 2.0]);

        assert!(matches!(
            calculate_throughput(&log),
            Err(MetricsError::ZeroTrialTime { trial: 1 })
        ));
    }

    #[test]
    fn test_efficiency_straight_path_is_one() {
        let target = [2.0, 0.0, 1.0];
        let cursor = vec![[0.0, 0.0, 0.5], [1.0, 0.0, 0.5], [2.0, 0.0, 0.5]];
        let log = single_trial_log(cursor, target, vec![0.0, 1.0, 2.0]);

        let efficiency = calculate_efficiency(&log).unwrap();
        assert!((efficiency - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_efficiency_zero_path_is_an_error() {
        let target = [2.0, 0.0, 1.0];
        let cursor = vec![[0.0, 0.0, 0.5], [0.0, 0.0, 0.5]];
        let log = single_trial_log(cursor, target, vec![0.0, 1.0]);

        assert!(matches!(
            calculate_efficiency(&log),
            Err(MetricsError::ZeroPathLength { trial: 1 })
        ));
    }

    #[test]
    fn test_empty_log_is_an_error() {
        let log = FittsLog {
            cursor_position: vec![],
            goal_circle: vec![],
            trial_number: vec![],
            global_clock: vec![],
        };
        assert!(matches!(calculate_throughput(&log), Err(MetricsError::EmptyLog)));
        assert!(matches!(calculate_efficiency(&log), Err(MetricsError::EmptyLog)));
        assert_eq!(calculate_overshoots(&log).unwrap(), 0);
    }

    #[test]
    fn test_mismatched_series_are_rejected() {
        let log = FittsLog {
            cursor_position: vec![[0.0, 0.0, 0.5]],
            goal_circle: vec![],
            trial_number: vec![1],
            global_clock: vec![0.0],
        };
        assert!(matches!(
            calculate_throughput(&log),
            Err(MetricsError::MalformedLog(_))
        ));
    }

    #[test]
    fn test_combine_pairs_subjects_by_folder_name() {
        let offline = vec![
            SubjectOffline {
                subject: "subject0".to_string(),
                accuracy: 0.9,
                confusion: Array2::zeros((NUM_CLASSES, NUM_CLASSES)),
            },
            SubjectOffline {
                subject: "subject1".to_string(),
                accuracy: 0.8,
                confusion: Array2::zeros((NUM_CLASSES, NUM_CLASSES)),
            },
        ];
        let online = vec![SubjectOnline {
            subject: "subject1".to_string(),
            throughput: 1.5,
            efficiency: 0.7,
            overshoots: 3,
        }];

        let rows = combine_metrics("vr", &offline, &online);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].method, "vr");
        // Sujeto sin registro en línea: se omite, no cuenta como cero
        assert!(rows[0].throughput.is_none());
        assert_eq!(rows[1].throughput, Some(1.5));
        assert_eq!(rows[1].overshoots, Some(3));
    }

    #[test]
    fn test_mean_accuracy_and_confusion() {
        let mut conf_a = Array2::zeros((NUM_CLASSES, NUM_CLASSES));
        conf_a[[0, 0]] = 4.0;
        let mut conf_b = Array2::zeros((NUM_CLASSES, NUM_CLASSES));
        conf_b[[0, 0]] = 2.0;

        let results = vec![
            SubjectOffline {
                subject: "subject0".to_string(),
                accuracy: 1.0,
                confusion: conf_a,
            },
            SubjectOffline {
                subject: "subject1".to_string(),
                accuracy: 0.5,
                confusion: conf_b,
            },
        ];

        assert!((mean_accuracy(&results) - 0.75).abs() < 1e-12);
        let mean = mean_confusion(&results).unwrap();
        assert_eq!(mean[[0, 0]], 3.0);
        assert!(mean_confusion(&[]).is_none());
    }
}
