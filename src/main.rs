/*
Sesión de entrenamiento para clasificación de gestos EMG

Recolección de datos etiquetados que:
1. Resuelve la carpeta de salida data/<sgt|vr>/subject<N>/
2. Aborta si la carpeta ya contiene archivos (sin sobrescritura parcial)
3. Modo sgt: captura guiada por consola sobre el set de 5 gestos
4. Modo vr: relay websocket que graba al recibir MovementInfo del cliente VR

Antes de todo, el streamer EMG externo debe estar enviando datagramas:
los 8 canales del brazalete llegan como i16 LE por UDP a 127.0.0.1:12345.

Para compilar y ejecutar:
    ./target/release/mioscopio vr 0
    ./target/release/mioscopio sgt 3
*/

use std::env;
use std::io::Write;
use std::time::Duration;

use anyhow::Result;
use rand::seq::SliceRandom;

use mioscopio::acquisition::OnlineAcquisition;
use mioscopio::config::{
    SessionConfig, TrainingMethod, NUM_CLASSES, NUM_REPS, RELAY_BIND_ADDR, REP_TIME_SECS,
    SERVER_DESCRIPTIONS, STREAMER_BIND_ADDR, TIME_BETWEEN_REPS_SECS,
};
use mioscopio::recordings::{ensure_output_dir, recording_filename, write_recording_csv};
use mioscopio::relay::VrRelay;

fn main() -> Result<()> {
    println!("🎯 Sesión de entrenamiento EMG\n");

    let config = SessionConfig::from_args(env::args().skip(1))?;
    println!(
        "🧍 Sujeto {} | método {}",
        config.subject_id,
        config.method.as_str()
    );

    // La adquisición se abre antes de la guarda: cualquier salida, incluida
    // la terminación por carpeta poblada, la libera en el Drop.
    let acquisition = OnlineAcquisition::start(STREAMER_BIND_ADDR)?;

    let output_folder = config.output_folder();
    ensure_output_dir(&output_folder)?;

    match config.method {
        TrainingMethod::Sgt => screen_guided_training(&acquisition, &config)?,
        TrainingMethod::Vr => {
            let relay = VrRelay::new(RELAY_BIND_ADDR, &output_folder);
            relay.serve(&acquisition)?;
        }
    }

    Ok(())
}

/// Captura guiada por consola: NUM_REPS repeticiones del set de gestos con
/// orden aleatorio por repetición, REP_TIME_SECS de captura por gesto y una
/// pausa fija antes de cada captura.
fn screen_guided_training(acquisition: &OnlineAcquisition, config: &SessionConfig) -> Result<()> {
    let output_folder = config.output_folder();

    println!(
        "\n📋 {} repeticiones de {} gestos, {} s por captura",
        NUM_REPS, NUM_CLASSES, REP_TIME_SECS
    );
    wait_for_enter("Pulsa Enter para empezar...")?;

    let mut order: Vec<usize> = (0..NUM_CLASSES).collect();
    for rep in 0..NUM_REPS {
        order.shuffle(&mut rand::thread_rng());
        println!("\n▶️  Repetición {}/{}", rep + 1, NUM_REPS);

        for &class in &order {
            println!("🖐️  Prepara: {}", SERVER_DESCRIPTIONS[class]);
            std::thread::sleep(Duration::from_secs(TIME_BETWEEN_REPS_SECS));

            acquisition.reset();
            std::thread::sleep(Duration::from_secs(REP_TIME_SECS));
            let samples = acquisition.snapshot();

            let path = output_folder.join(recording_filename(rep, class));
            write_recording_csv(&path, &samples)?;
            println!("✅ {} muestras guardadas en {:?}", samples.len(), path);
        }
    }

    println!("\n🏁 Sesión completa");
    Ok(())
}

fn wait_for_enter(prompt: &str) -> Result<()> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(())
}
