use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, ensure, Context, Result};
use tungstenite::{Message, WebSocket};

use crate::acquisition::OnlineAcquisition;
use crate::config::{NUM_CLASSES, NUM_REPS, REP_TIME_SECS, SERVER_DESCRIPTIONS, VR_CLASS_REMAP};
use crate::recordings::{recording_filename, write_recording_csv};

/// Respuesta fija a cada mensaje del cliente VR
const ACK_MESSAGE: &str = "Keep running!";

/// Activar para trazar cada mensaje recibido/enviado
const TRACE_MESSAGES: bool = false;

fn trace(message: &str) {
    if TRACE_MESSAGES {
        println!("{}", message);
    }
}

/// Eventos del protocolo VR, uno por mensaje entrante
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VrEvent {
    ExperimentStarted,
    ExperimentEnded,
    /// Inicio de un movimiento: repetición 1-based, índice de movimiento en
    /// el orden del cliente VR y marca de tiempo del cliente en epoch ms
    Movement {
        rep_number: usize,
        movement: usize,
        epoch_millis: i64,
    },
    /// Prefijo desconocido o mensaje vacío: se ignora sin suprimir el ack
    Ignored,
}

/// Interpreta un mensaje con campos separados por `|`:
///   ExperimentHasStarted
///   ExperimentHasEnded
///   MovementInfo|<ignorado>|<rep>,<movimiento>,<epoch_ms>
pub fn parse_vr_message(message: &str) -> Result<VrEvent> {
    if message.is_empty() {
        trace("Mensaje nulo o vacío.");
        return Ok(VrEvent::Ignored);
    }

    let parts: Vec<&str> = message.split('|').collect();
    match parts[0].trim() {
        "ExperimentHasStarted" => Ok(VrEvent::ExperimentStarted),
        "ExperimentHasEnded" => Ok(VrEvent::ExperimentEnded),
        "MovementInfo" => {
            if parts.len() < 3 {
                bail!("MovementInfo sin sección de parámetros: {:?}", message);
            }

            let params: Vec<&str> = parts[2].split(',').collect();
            if params.len() < 3 {
                bail!("MovementInfo con parámetros incompletos: {:?}", parts[2]);
            }

            let rep_number: usize = params[0]
                .trim()
                .parse()
                .with_context(|| format!("Repetición inválida: {:?}", params[0]))?;
            let movement: usize = params[1]
                .trim()
                .parse()
                .with_context(|| format!("Movimiento inválido: {:?}", params[1]))?;
            let epoch_millis: i64 = params[2]
                .trim()
                .parse()
                .with_context(|| format!("Marca de tiempo inválida: {:?}", params[2]))?;

            Ok(VrEvent::Movement {
                rep_number,
                movement,
                epoch_millis,
            })
        }
        _ => Ok(VrEvent::Ignored),
    }
}

/// Convierte (repetición 1-based, movimiento del cliente VR) en los índices
/// locales (rep 0-based, clase) del nombre de archivo.
pub fn movement_to_recording(rep_number: usize, movement: usize) -> Result<(usize, usize)> {
    ensure!(
        rep_number >= 1 && rep_number <= NUM_REPS,
        "Repetición fuera de rango: {} (esperada 1..={})",
        rep_number,
        NUM_REPS
    );
    ensure!(
        movement < NUM_CLASSES,
        "Movimiento fuera de rango: {} (esperado 0..{})",
        movement,
        NUM_CLASSES
    );

    Ok((rep_number - 1, VR_CLASS_REMAP[movement]))
}

/// Relay de la sesión VR: puente entre el protocolo de texto del cliente y
/// las capturas temporizadas sobre la adquisición local.
pub struct VrRelay {
    bind_addr: String,
    output_folder: PathBuf,
}

impl VrRelay {
    pub fn new(bind_addr: &str, output_folder: &Path) -> Self {
        Self {
            bind_addr: bind_addr.to_string(),
            output_folder: output_folder.to_path_buf(),
        }
    }

    /// Bucle de aceptación sin fin: una conexión a la vez, la conexión se
    /// mantiene abierta hasta que el cliente la cierre.
    pub fn serve(&self, acquisition: &OnlineAcquisition) -> Result<()> {
        let listener = TcpListener::bind(&self.bind_addr)
            .with_context(|| format!("No se pudo escuchar en {}", self.bind_addr))?;
        println!("🌐 Relay VR escuchando en {}", self.bind_addr);

        for stream in listener.incoming() {
            match stream {
                Ok(stream) => {
                    if let Err(e) = self.handle_connection(stream, acquisition) {
                        eprintln!("❌ Conexión VR terminada con error: {}", e);
                    }
                }
                Err(e) => eprintln!("❌ Error aceptando conexión: {}", e),
            }
        }

        Ok(())
    }

    fn handle_connection(&self, stream: TcpStream, acquisition: &OnlineAcquisition) -> Result<()> {
        let mut websocket: WebSocket<TcpStream> = tungstenite::accept(stream)
            .map_err(|e| anyhow::anyhow!("Handshake websocket fallido: {}", e))?;
        println!("🤝 Cliente VR conectado");

        loop {
            let message = match websocket.read() {
                Ok(message) => message,
                Err(_) => break, // conexión cerrada o rota
            };

            match message {
                Message::Text(text) => {
                    trace(&format!("Recibido: {}", text));
                    self.handle_text(&text, acquisition);
                }
                Message::Close(_) => break,
                _ => {}
            }

            // El ack se envía siempre, también para mensajes ignorados
            if websocket.send(Message::Text(ACK_MESSAGE.into())).is_err() {
                break;
            }
            trace(&format!("Enviado: {}", ACK_MESSAGE));
        }

        println!("👋 Cliente VR desconectado");
        Ok(())
    }

    fn handle_text(&self, text: &str, acquisition: &OnlineAcquisition) {
        match parse_vr_message(text) {
            Ok(VrEvent::ExperimentStarted) => println!("🟢 Experimento iniciado"),
            Ok(VrEvent::ExperimentEnded) => println!("🔴 Experimento terminado"),
            Ok(VrEvent::Movement {
                rep_number,
                movement,
                epoch_millis,
            }) => {
                if let Err(e) = self.capture_movement(acquisition, rep_number, movement, epoch_millis)
                {
                    eprintln!("❌ Captura fallida: {}", e);
                }
            }
            Ok(VrEvent::Ignored) => {}
            Err(e) => eprintln!("⚠️  Mensaje VR malformado: {}", e),
        }
    }

    /// Captura temporizada de un movimiento. El sleep bloquea este mismo
    /// bucle: el cliente VR espera el ack antes de enviar el siguiente
    /// disparo, así que los mensajes intermedios quedan en el transporte.
    pub fn capture_movement(
        &self,
        acquisition: &OnlineAcquisition,
        rep_number: usize,
        movement: usize,
        epoch_millis: i64,
    ) -> Result<PathBuf> {
        let (rep, class) = movement_to_recording(rep_number, movement)?;
        println!(
            "🎙️  Grabando rep {} clase {} ({}) [t_cliente={} ms]",
            rep, class, SERVER_DESCRIPTIONS[class], epoch_millis
        );

        acquisition.reset();
        std::thread::sleep(Duration::from_secs(REP_TIME_SECS));
        let samples = acquisition.snapshot();

        let path = self.output_folder.join(recording_filename(rep, class));
        write_recording_csv(&path, &samples)?;
        println!("✅ Captura guardada en {:?} ({} muestras)", path, samples.len());

        Ok(path)
    }
}
