use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, Sender};

use crate::config::NUM_CHANNELS;

/// Una muestra EMG: un valor por electrodo
pub type EmgSample = [f32; NUM_CHANNELS];

/// Bytes por muestra en el datagrama del streamer (i16 LE por canal)
const BYTES_PER_SAMPLE: usize = NUM_CHANNELS * 2;

/// Normalización de cuentas crudas del brazalete a [-1, 1)
const SAMPLE_SCALE: f32 = 1.0 / 128.0;

/// Decodifica un datagrama del streamer: N muestras de 8 canales i16 LE.
/// Un datagrama con longitud que no sea múltiplo exacto se descarta completo.
pub fn decode_datagram(value: &[u8]) -> Option<Vec<EmgSample>> {
    if value.is_empty() || value.len() % BYTES_PER_SAMPLE != 0 {
        return None;
    }

    let mut samples = Vec::with_capacity(value.len() / BYTES_PER_SAMPLE);
    for chunk in value.chunks_exact(BYTES_PER_SAMPLE) {
        let mut sample: EmgSample = [0.0; NUM_CHANNELS];
        for (ch, pair) in chunk.chunks_exact(2).enumerate() {
            sample[ch] = i16::from_le_bytes([pair[0], pair[1]]) as f32 * SAMPLE_SCALE;
        }
        samples.push(sample);
    }

    Some(samples)
}

/// Escucha del streamer EMG externo como recurso con dueño explícito:
/// `start` adquiere el socket y el hilo receptor, `Drop` los libera.
pub struct OnlineAcquisition {
    shared: Arc<Mutex<Vec<EmgSample>>>,
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
    local_addr: SocketAddr,
}

impl OnlineAcquisition {
    /// Abre el socket UDP y lanza el hilo receptor en segundo plano
    pub fn start(bind_addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(bind_addr)
            .with_context(|| format!("No se pudo abrir el socket del streamer en {}", bind_addr))?;
        socket.set_read_timeout(Some(Duration::from_millis(200)))?;
        let local_addr = socket.local_addr()?;

        let shared: Arc<Mutex<Vec<EmgSample>>> = Arc::new(Mutex::new(Vec::new()));
        let shared_clone = Arc::clone(&shared);
        let (stop_tx, stop_rx) = bounded::<()>(1);

        let handle = std::thread::spawn(move || {
            let mut buf = [0u8; 2048];
            loop {
                if stop_rx.try_recv().is_ok() {
                    break;
                }

                match socket.recv_from(&mut buf) {
                    Ok((len, _addr)) => {
                        if let Some(samples) = decode_datagram(&buf[..len]) {
                            shared_clone.lock().unwrap().extend(samples);
                        }
                    }
                    Err(e)
                        if e.kind() == std::io::ErrorKind::WouldBlock
                            || e.kind() == std::io::ErrorKind::TimedOut =>
                    {
                        continue;
                    }
                    Err(e) => {
                        eprintln!("❌ Error recibiendo datagrama EMG: {}", e);
                        break;
                    }
                }
            }
        });

        println!("📡 Escuchando streamer EMG en {}", local_addr);

        Ok(Self {
            shared,
            stop_tx,
            handle: Some(handle),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Descarta todas las muestras acumuladas
    pub fn reset(&self) {
        self.shared.lock().unwrap().clear();
    }

    /// Copia de las muestras acumuladas desde el último reset
    pub fn snapshot(&self) -> Vec<EmgSample> {
        self.shared.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.shared.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Últimas `size` muestras, o None si aún no hay suficientes
    pub fn last_window(&self, size: usize) -> Option<Vec<EmgSample>> {
        let buffer = self.shared.lock().unwrap();
        if buffer.len() < size {
            return None;
        }
        Some(buffer[buffer.len() - size..].to_vec())
    }
}

impl Drop for OnlineAcquisition {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datagram_for(samples: &[[i16; NUM_CHANNELS]]) -> Vec<u8> {
        let mut bytes = Vec::new();
        for sample in samples {
            for value in sample {
                bytes.extend_from_slice(&value.to_le_bytes());
            }
        }
        bytes
    }

    #[test]
    fn test_decode_single_sample() {
        let raw = [[128i16, -128, 0, 64, -64, 32, -32, 1]];
        let samples = decode_datagram(&datagram_for(&raw)).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0][0], 1.0);
        assert_eq!(samples[0][1], -1.0);
        assert_eq!(samples[0][2], 0.0);
        assert_eq!(samples[0][3], 0.5);
    }

    #[test]
    fn test_decode_multiple_samples() {
        let raw = [[1i16; NUM_CHANNELS], [2i16; NUM_CHANNELS], [3i16; NUM_CHANNELS]];
        let samples = decode_datagram(&datagram_for(&raw)).unwrap();
        assert_eq!(samples.len(), 3);
    }

    #[test]
    fn test_decode_rejects_partial_datagram() {
        let mut bytes = datagram_for(&[[5i16; NUM_CHANNELS]]);
        bytes.pop(); // longitud impar: datagrama truncado
        assert!(decode_datagram(&bytes).is_none());
        assert!(decode_datagram(&[]).is_none());
    }

    #[test]
    fn test_acquisition_buffers_reset_and_snapshot() {
        let acquisition = OnlineAcquisition::start("127.0.0.1:0").unwrap();
        let sender = UdpSocket::bind("127.0.0.1:0").unwrap();

        let bytes = datagram_for(&[[10i16; NUM_CHANNELS], [20i16; NUM_CHANNELS]]);
        sender.send_to(&bytes, acquisition.local_addr()).unwrap();

        // Esperar a que el hilo receptor drene el socket
        let mut waited = 0;
        while acquisition.len() < 2 && waited < 2000 {
            std::thread::sleep(Duration::from_millis(20));
            waited += 20;
        }

        assert_eq!(acquisition.len(), 2);
        let window = acquisition.last_window(2).unwrap();
        assert_eq!(window.len(), 2);
        assert!(acquisition.last_window(3).is_none());

        acquisition.reset();
        assert!(acquisition.is_empty());
        assert!(acquisition.snapshot().is_empty());
    }
}
