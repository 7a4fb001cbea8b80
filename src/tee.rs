//! Tee capture of compiler console output.

use std::{
    io::{self, Write},
    sync::Mutex,
};

struct TeeState {
    downstream: Box<dyn Write + Send>,
    buffer: Vec<u8>,
    closed: bool,
}

/// A writer duplicating everything into a downstream stream and an in-memory
/// buffer. The downstream write, the buffer append, and the open-state check
/// all happen under one mutex, so [`TeeWriter::content`] always observes a
/// consistent snapshot.
pub struct TeeWriter {
    state: Mutex<TeeState>,
}

impl std::fmt::Debug for TeeWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("tee state poisoned");
        f.debug_struct("TeeWriter")
            .field("buffered", &state.buffer.len())
            .field("closed", &state.closed)
            .finish()
    }
}

impl TeeWriter {
    pub fn new(downstream: Box<dyn Write + Send>) -> Self {
        Self {
            state: Mutex::new(TeeState { downstream, buffer: Vec::new(), closed: false }),
        }
    }

    /// A tee writer that only buffers, discarding the pass-through side.
    pub fn sink() -> Self {
        Self::new(Box::new(io::sink()))
    }

    pub fn write_bytes(&self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state.lock().expect("tee state poisoned");
        if state.closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "tee writer is closed"));
        }
        state.downstream.write_all(bytes)?;
        state.buffer.extend_from_slice(bytes);
        Ok(())
    }

    pub fn write_str(&self, text: &str) -> io::Result<()> {
        self.write_bytes(text.as_bytes())
    }

    /// A consistent snapshot of everything buffered so far.
    pub fn content(&self) -> String {
        let state = self.state.lock().expect("tee state poisoned");
        String::from_utf8_lossy(&state.buffer).into_owned()
    }

    /// Flush the downstream side and stop accepting writes. Idempotent.
    pub fn close(&self) -> io::Result<()> {
        let mut state = self.state.lock().expect("tee state poisoned");
        if state.closed {
            return Ok(());
        }
        state.closed = true;
        state.downstream.flush()
    }
}

impl Write for &TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut state = self.state.lock().expect("tee state poisoned");
        state.downstream.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;

    #[test]
    fn duplicates_into_buffer_and_downstream() {
        let downstream: Arc<Mutex<Vec<u8>>> = Arc::new(Mutex::new(Vec::new()));

        struct Shared(Arc<Mutex<Vec<u8>>>);
        impl Write for Shared {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                self.0.lock().unwrap().extend_from_slice(buf);
                Ok(buf.len())
            }
            fn flush(&mut self) -> io::Result<()> {
                Ok(())
            }
        }

        let tee = TeeWriter::new(Box::new(Shared(downstream.clone())));
        tee.write_str("warning: ").unwrap();
        tee.write_str("something\n").unwrap();
        assert_eq!(tee.content(), "warning: something\n");
        assert_eq!(&*downstream.lock().unwrap(), b"warning: something\n");
    }

    #[test]
    fn content_is_the_concatenation_of_concurrent_writes() {
        let tee = Arc::new(TeeWriter::sink());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let tee = tee.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..100 {
                    tee.write_str("ab").unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        let content = tee.content();
        assert_eq!(content.len(), 8 * 100 * 2);
        // writes are atomic under the mutex, so pairs never interleave
        assert!(content.as_bytes().chunks(2).all(|pair| pair == b"ab"));
    }

    #[test]
    fn close_is_idempotent_and_stops_writes() {
        let tee = TeeWriter::sink();
        tee.write_str("before").unwrap();
        tee.close().unwrap();
        tee.close().unwrap();
        assert!(tee.write_str("after").is_err());
        assert_eq!(tee.content(), "before");
    }
}
