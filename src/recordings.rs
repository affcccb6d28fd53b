use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, ensure, Context, Result};
use csv::ReaderBuilder;

use crate::acquisition::EmgSample;
use crate::config::{NUM_CHANNELS, NUM_CLASSES, NUM_REPS, WINDOW_INCREMENT, WINDOW_SIZE};

/// Nombre de archivo para una captura: R_<rep>_C_<clase>.csv
pub fn recording_filename(rep: usize, class: usize) -> String {
    format!("R_{}_C_{}.csv", rep, class)
}

/// Interpreta un nombre de archivo de captura. Devuelve (rep, clase) solo si
/// el nombre cumple exactamente la convención y ambos índices están en rango.
pub fn parse_recording_name(name: &str) -> Option<(usize, usize)> {
    let body = name.strip_prefix("R_")?.strip_suffix(".csv")?;
    let (rep_str, class_str) = body.split_once("_C_")?;

    let rep: usize = rep_str.parse().ok()?;
    let class: usize = class_str.parse().ok()?;

    if rep >= NUM_REPS || class >= NUM_CLASSES {
        return None;
    }

    Some((rep, class))
}

/// Crea la carpeta de salida si no existe. Si existe y ya contiene archivos,
/// termina con error antes de capturar nada (sin recuperación parcial).
pub fn ensure_output_dir(directory: &Path) -> Result<()> {
    println!("💾 Guardando datos en {:?}", directory);

    if !directory.exists() {
        fs::create_dir_all(directory)
            .with_context(|| format!("No se pudo crear la carpeta {:?}", directory))?;
        return Ok(());
    }

    let mut entries = fs::read_dir(directory)
        .with_context(|| format!("No se pudo leer la carpeta {:?}", directory))?;
    if entries.next().is_some() {
        bail!(
            "Ya existen archivos en {:?}. Terminando para no sobrescribir.",
            directory
        );
    }

    Ok(())
}

/// Escribe una captura como CSV con fila de encabezado ch0..ch7
pub fn write_recording_csv(path: &Path, samples: &[EmgSample]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("No se pudo crear el CSV {:?}", path))?;

    let header: Vec<String> = (0..NUM_CHANNELS).map(|ch| format!("ch{}", ch)).collect();
    writer.write_record(&header)?;

    for sample in samples {
        let row: Vec<String> = sample.iter().map(|v| v.to_string()).collect();
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

/// Carga las muestras crudas de una captura
pub fn load_recording_csv(path: impl AsRef<Path>) -> Result<Vec<EmgSample>> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .with_context(|| format!("No se pudo abrir el CSV {:?}", path))?;

    let mut samples = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let record =
            result.with_context(|| format!("Fila {} inválida en {:?}", row_idx + 1, path))?;
        if record.len() < NUM_CHANNELS {
            bail!(
                "La fila {} no tiene {} columnas en {:?}",
                row_idx + 1,
                NUM_CHANNELS,
                path
            );
        }

        let mut sample: EmgSample = [0.0; NUM_CHANNELS];
        for ch in 0..NUM_CHANNELS {
            sample[ch] = record[ch]
                .parse()
                .with_context(|| format!("Valor inválido en fila {}, canal {}", row_idx + 1, ch))?;
        }
        samples.push(sample);
    }

    ensure!(!samples.is_empty(), "El CSV {:?} no contiene datos", path);
    Ok(samples)
}

/// Una captura etiquetada por repetición y clase
#[derive(Debug, Clone)]
pub struct Recording {
    pub rep: usize,
    pub class: usize,
    pub samples: Vec<EmgSample>,
}

impl Recording {
    /// Ventanas deslizantes de `size` muestras con paso `increment`.
    /// Una captura más corta que la ventana no produce ninguna.
    pub fn windows(&self, size: usize, increment: usize) -> Vec<&[EmgSample]> {
        if self.samples.len() < size {
            return Vec::new();
        }

        (0..=self.samples.len() - size)
            .step_by(increment)
            .map(|start| &self.samples[start..start + size])
            .collect()
    }
}

/// Busca en la carpeta del sujeto todos los CSV que cumplan la convención de
/// nombres, opcionalmente restringidos a un subconjunto de repeticiones
/// (así se separan los folds de validación cruzada sin fuga entre ventanas
/// adyacentes de una misma repetición).
pub fn collect_recordings(folder: &Path, reps: Option<&[usize]>) -> Result<Vec<Recording>> {
    let entries = fs::read_dir(folder)
        .with_context(|| format!("No se pudo leer la carpeta de datos {:?}", folder))?;

    let mut recordings = Vec::new();
    for entry in entries {
        let entry = entry?;
        let path: PathBuf = entry.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };

        let (rep, class) = match parse_recording_name(name) {
            Some(pair) => pair,
            None => continue,
        };

        if let Some(allowed) = reps {
            if !allowed.contains(&rep) {
                continue;
            }
        }

        let samples = load_recording_csv(&path)?;
        recordings.push(Recording { rep, class, samples });
    }

    recordings.sort_by_key(|r| (r.rep, r.class));
    Ok(recordings)
}

/// Aplana un conjunto de capturas en (ventanas, etiqueta de clase por
/// ventana) con el tamaño y paso configurados.
pub fn windows_and_labels(recordings: &[Recording]) -> (Vec<&[EmgSample]>, Vec<usize>) {
    let mut windows = Vec::new();
    let mut labels = Vec::new();

    for recording in recordings {
        for window in recording.windows(WINDOW_SIZE, WINDOW_INCREMENT) {
            windows.push(window);
            labels.push(recording.class);
        }
    }

    (windows, labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("mioscopio_{}_{}", tag, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    fn constant_samples(value: f32, count: usize) -> Vec<EmgSample> {
        vec![[value; NUM_CHANNELS]; count]
    }

    #[test]
    fn test_filename_convention_round_trip() {
        for rep in 0..NUM_REPS {
            for class in 0..NUM_CLASSES {
                let name = recording_filename(rep, class);
                assert_eq!(parse_recording_name(&name), Some((rep, class)));
            }
        }
    }

    #[test]
    fn test_parse_rejects_out_of_convention_names() {
        assert_eq!(parse_recording_name("R_5_C_0.csv"), None); // rep fuera de rango
        assert_eq!(parse_recording_name("R_0_C_5.csv"), None); // clase fuera de rango
        assert_eq!(parse_recording_name("R_0_C_1.txt"), None);
        assert_eq!(parse_recording_name("S_0_C_1.csv"), None);
        assert_eq!(parse_recording_name("R_x_C_1.csv"), None);
        assert_eq!(parse_recording_name("resultados.csv"), None);
    }

    #[test]
    fn test_guard_creates_missing_directory() {
        let dir = temp_dir("guard_nuevo");
        ensure_output_dir(&dir).unwrap();
        assert!(dir.exists());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_guard_aborts_on_populated_directory() {
        let dir = temp_dir("guard_lleno");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("R_0_C_0.csv"), "ch0\n1.0\n").unwrap();

        // Con archivos presentes debe abortar antes de cualquier captura
        assert!(ensure_output_dir(&dir).is_err());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_write_and_load_recording() {
        let dir = temp_dir("csv");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join(recording_filename(0, 0));

        let samples = vec![[0.5; NUM_CHANNELS], [-0.25; NUM_CHANNELS]];
        write_recording_csv(&path, &samples).unwrap();

        let loaded = load_recording_csv(&path).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0][0], 0.5);
        assert_eq!(loaded[1][7], -0.25);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_rejects_empty_recording() {
        let dir = temp_dir("csv_vacio");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("R_0_C_0.csv");
        fs::write(&path, "ch0,ch1,ch2,ch3,ch4,ch5,ch6,ch7\n").unwrap();

        assert!(load_recording_csv(&path).is_err());
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_windows_size_and_stride() {
        let recording = Recording {
            rep: 0,
            class: 0,
            samples: constant_samples(1.0, 100),
        };

        let windows = recording.windows(40, 10);
        assert_eq!(windows.len(), 7); // inicios 0, 10, ..., 60
        assert!(windows.iter().all(|w| w.len() == 40));

        let short = Recording {
            rep: 0,
            class: 0,
            samples: constant_samples(1.0, 39),
        };
        assert!(short.windows(40, 10).is_empty());
    }

    #[test]
    fn test_collect_respects_rep_subset() {
        let dir = temp_dir("coleccion");
        fs::create_dir_all(&dir).unwrap();

        for rep in 0..NUM_REPS {
            for class in 0..2 {
                let path = dir.join(recording_filename(rep, class));
                write_recording_csv(&path, &constant_samples(rep as f32, 3)).unwrap();
            }
        }
        // Archivo ajeno a la convención: debe ignorarse
        fs::write(dir.join("notas.txt"), "sesión de prueba").unwrap();

        let held_in = [0usize, 1, 2, 3];
        let recordings = collect_recordings(&dir, Some(&held_in)).unwrap();
        assert_eq!(recordings.len(), 8);
        assert!(recordings.iter().all(|r| r.rep != 4));

        let all = collect_recordings(&dir, None).unwrap();
        assert_eq!(all.len(), 10);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_held_out_rep_never_reaches_the_training_windows() {
        let dir = temp_dir("fold");
        fs::create_dir_all(&dir).unwrap();

        // 5 repeticiones x 5 clases, 100 muestras por captura
        for rep in 0..NUM_REPS {
            for class in 0..NUM_CLASSES {
                let path = dir.join(recording_filename(rep, class));
                let value = if rep == 4 { 99.0 } else { class as f32 };
                write_recording_csv(&path, &constant_samples(value, 100)).unwrap();
            }
        }

        let held_in = [0usize, 1, 2, 3];
        let recordings = collect_recordings(&dir, Some(&held_in)).unwrap();
        let (windows, labels) = windows_and_labels(&recordings);

        // 4 reps x 5 clases x 7 ventanas; la repetición 4 queda fuera entera
        assert_eq!(windows.len(), 4 * NUM_CLASSES * 7);
        assert_eq!(labels.len(), windows.len());
        assert!(windows.iter().all(|w| w[0][0] != 99.0));
        let _ = fs::remove_dir_all(&dir);
    }
}
