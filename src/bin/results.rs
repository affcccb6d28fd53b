use std::path::Path;

use anyhow::Result;
use ndarray::Array2;

use mioscopio::config::{CONFUSION_PLOT_FILE, DATA_FOLDER, RESULTS_FILE};
use mioscopio::metrics::{
    calculate_offline_metrics, calculate_online_metrics, combine_metrics, mean_accuracy,
    mean_confusion, write_results_csv, ResultRow,
};
use mioscopio::plot::plot_confusion_matrices;

fn main() -> Result<()> {
    let data_folder = Path::new(DATA_FOLDER);

    let mut rows: Vec<ResultRow> = Vec::new();
    let mut panels: Vec<(String, Array2<f64>)> = Vec::new();

    for method in ["sgt", "vr"] {
        let method_folder = data_folder.join(method);
        if !method_folder.is_dir() {
            println!("ℹ️  Omitiendo el método {} porque {:?} no existe.", method, method_folder);
            continue;
        }
        println!("\n📊 Método {}", method);

        let offline = calculate_offline_metrics(&method_folder)?;
        let online = calculate_online_metrics(&method_folder)?;
        rows.extend(combine_metrics(method, &offline, &online));

        if let Some(confusion) = mean_confusion(&offline) {
            let title = format!(
                "{} (Accuracy: {:.2}%)",
                method.to_uppercase(),
                mean_accuracy(&offline) * 100.0
            );
            panels.push((title, confusion));
        }
    }

    let results_path = data_folder.join(RESULTS_FILE);
    write_results_csv(&results_path, &rows)?;
    println!(
        "\n💾 Tabla de resultados en {:?} ({} filas)",
        results_path,
        rows.len()
    );

    plot_confusion_matrices(&data_folder.join(CONFUSION_PLOT_FILE), &panels)?;

    Ok(())
}
