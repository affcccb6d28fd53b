use std::path::Path;

use anyhow::Result;
use ndarray::Array2;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::config::{LABEL_NAMES, NUM_CLASSES};

const PANEL_WIDTH: u32 = 640;
const PANEL_HEIGHT: u32 = 560;

/// Dibuja un mapa de calor por panel (método) con las matrices de confusión
/// medias; el título de cada panel lleva la precisión ya formateada.
pub fn plot_confusion_matrices(path: &Path, panels: &[(String, Array2<f64>)]) -> Result<()> {
    if panels.is_empty() {
        return Ok(());
    }

    let width = PANEL_WIDTH * panels.len() as u32;
    let root = BitMapBackend::new(path, (width, PANEL_HEIGHT)).into_drawing_area();
    root.fill(&WHITE)?;

    let areas = root.split_evenly((1, panels.len()));
    for (area, (title, matrix)) in areas.iter().zip(panels.iter()) {
        draw_heatmap(area, title, matrix)?;
    }

    root.present()?;
    println!("🖼️  Matrices de confusión guardadas en {:?}", path);
    Ok(())
}

fn draw_heatmap(
    area: &DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>,
    title: &str,
    matrix: &Array2<f64>,
) -> Result<()> {
    let n = NUM_CLASSES as f64;
    let mut chart = ChartBuilder::on(area)
        .caption(title, ("sans-serif", 22))
        .margin(12)
        .build_cartesian_2d(-1.8f64..n, -0.9f64..n)?;

    let max_value = matrix.iter().cloned().fold(0.0f64, f64::max).max(1e-9);

    let mut cells = Vec::new();
    let mut labels = Vec::new();

    for row in 0..NUM_CLASSES {
        for col in 0..NUM_CLASSES {
            let value = matrix[[row, col]];
            let t = value / max_value;
            // Escala blanco → azul según la magnitud de la celda
            let color = RGBColor(
                255 - (t * 175.0) as u8,
                255 - (t * 115.0) as u8,
                255,
            );

            // Fila 0 (clase verdadera 0) arriba
            let y0 = n - 1.0 - row as f64;
            let x0 = col as f64;
            cells.push(Rectangle::new(
                [(x0, y0), (x0 + 1.0, y0 + 1.0)],
                color.filled(),
            ));

            let centered = Pos::new(HPos::Center, VPos::Center);
            labels.push(Text::new(
                format!("{:.2}", value),
                (x0 + 0.5, y0 + 0.5),
                TextStyle::from(("sans-serif", 15)).color(&BLACK).pos(centered),
            ));
        }
    }

    // Etiquetas de clase: predicha abajo, verdadera a la izquierda
    for class in 0..NUM_CLASSES {
        let centered = Pos::new(HPos::Center, VPos::Center);
        labels.push(Text::new(
            LABEL_NAMES[class].to_string(),
            (class as f64 + 0.5, -0.45),
            TextStyle::from(("sans-serif", 13)).color(&BLACK).pos(centered),
        ));

        let right = Pos::new(HPos::Right, VPos::Center);
        labels.push(Text::new(
            LABEL_NAMES[class].to_string(),
            (-0.1, n - 1.0 - class as f64 + 0.5),
            TextStyle::from(("sans-serif", 13)).color(&BLACK).pos(right),
        ));
    }

    chart.draw_series(cells)?;
    chart.draw_series(labels)?;
    Ok(())
}
