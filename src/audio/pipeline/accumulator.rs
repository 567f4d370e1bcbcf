//! Leftover buffer carried between pipeline writes.

/// Collects arbitrary-length PCM chunks and releases them as whole frames.
///
/// Invariant: after every slice pass `len() < frame_len`.
pub struct FrameAccumulator {
    buf: Vec<u8>,
    frame_len: usize,
}

impl FrameAccumulator {
    pub fn new(frame_len: usize) -> Self {
        Self {
            buf: Vec::with_capacity(frame_len * 2),
            frame_len,
        }
    }

    pub fn frame_len(&self) -> usize {
        self.frame_len
    }

    /// Bytes waiting for the rest of their frame.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Appends `chunk` and calls `on_frame` for every complete frame, in
    /// order, without gaps. Stops at the first error; frames already handed
    /// out are consumed either way.
    pub fn push<E, F>(&mut self, chunk: &[u8], mut on_frame: F) -> Result<usize, E>
    where
        F: FnMut(&[u8]) -> Result<(), E>,
    {
        self.buf.extend_from_slice(chunk);

        let mut n = 0;
        let mut result = Ok(());
        while self.buf.len() >= self.frame_len * (n + 1) {
            let frame = &self.buf[n * self.frame_len..(n + 1) * self.frame_len];
            n += 1;
            if let Err(e) = on_frame(frame) {
                result = Err(e);
                break;
            }
        }

        if n > 0 {
            self.buf.drain(..n * self.frame_len);
        }
        if result.is_ok() {
            debug_assert!(self.buf.len() < self.frame_len);
        }
        result.map(|_| n)
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slices_whole_frames_and_keeps_remainder() {
        let mut acc = FrameAccumulator::new(4);
        let mut frames = Vec::new();

        let n = acc
            .push::<(), _>(&[1, 2, 3], |f| {
                frames.push(f.to_vec());
                Ok(())
            })
            .unwrap();
        assert_eq!(n, 0);
        assert_eq!(acc.len(), 3);

        let n = acc
            .push::<(), _>(&[4, 5, 6, 7, 8, 9, 10], |f| {
                frames.push(f.to_vec());
                Ok(())
            })
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(frames, vec![vec![1, 2, 3, 4], vec![5, 6, 7, 8]]);
        assert_eq!(acc.len(), 2);
    }

    #[test]
    fn error_stops_slicing_but_consumes_emitted_frame() {
        let mut acc = FrameAccumulator::new(2);
        let mut calls = 0;
        let err = acc.push(&[0; 7], |_| {
            calls += 1;
            if calls == 2 { Err("boom") } else { Ok(()) }
        });
        assert_eq!(err, Err("boom"));
        assert_eq!(acc.len(), 3);
    }
}
