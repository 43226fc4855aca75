use crate::models::error::EngineError;

/// Circular byte buffer holding captured audio not yet handed to the caller.
///
/// An input packet must be released whole, so whatever part of it does not
/// fit in the caller's buffer is parked here and returned by the next read.
/// Owned by a single session thread; no internal locking.
///
/// Overflow behavior: drops oldest bytes.
#[derive(Debug, Default)]
pub struct RingBuffer {
    buffer: Vec<u8>,
    write_index: usize,
    read_index: usize,
    available: usize,
    capacity: usize,
}

impl RingBuffer {
    /// Allocate a buffer, reporting allocation failure instead of aborting.
    pub fn try_new(capacity: usize) -> Result<Self, EngineError> {
        let mut buffer = Vec::new();
        buffer
            .try_reserve_exact(capacity)
            .map_err(|e| EngineError::ResourceExhausted {
                op: "allocate carry-over buffer",
                reason: format!("{} bytes: {}", capacity, e),
            })?;
        buffer.resize(capacity, 0);
        Ok(Self {
            buffer,
            write_index: 0,
            read_index: 0,
            available: 0,
            capacity,
        })
    }

    /// Append bytes.
    ///
    /// If the buffer overflows, the oldest bytes are dropped.
    /// If `data` is larger than capacity, only the last `capacity` bytes are kept.
    pub fn write(&mut self, data: &[u8]) {
        if data.is_empty() || self.capacity == 0 {
            return;
        }

        let data = if data.len() > self.capacity {
            &data[data.len() - self.capacity..]
        } else {
            data
        };

        let overflow = (self.available + data.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            log::warn!("carry-over buffer overflow, dropping {} bytes", overflow);
            self.read_index = (self.read_index + overflow) % self.capacity;
            self.available -= overflow;
        }

        // at most two contiguous copies
        let first = data.len().min(self.capacity - self.write_index);
        self.buffer[self.write_index..self.write_index + first].copy_from_slice(&data[..first]);
        let rest = data.len() - first;
        if rest > 0 {
            self.buffer[..rest].copy_from_slice(&data[first..]);
        }
        self.write_index = (self.write_index + data.len()) % self.capacity;
        self.available += data.len();
    }

    /// Append `len` zero bytes (a silence-flagged packet remainder).
    pub fn write_silence(&mut self, len: usize) {
        const ZEROS: [u8; 256] = [0; 256];
        let mut remaining = len.min(self.capacity);
        while remaining > 0 {
            let chunk = remaining.min(ZEROS.len());
            self.write(&ZEROS[..chunk]);
            remaining -= chunk;
        }
    }

    /// Move up to `dest.len()` bytes into `dest`. Returns the number moved.
    pub fn read_into(&mut self, dest: &mut [u8]) -> usize {
        let to_read = dest.len().min(self.available);
        if to_read == 0 {
            return 0;
        }

        let first = to_read.min(self.capacity - self.read_index);
        dest[..first].copy_from_slice(&self.buffer[self.read_index..self.read_index + first]);
        let rest = to_read - first;
        if rest > 0 {
            dest[first..to_read].copy_from_slice(&self.buffer[..rest]);
        }
        self.read_index = (self.read_index + to_read) % self.capacity;
        self.available -= to_read;
        to_read
    }

    /// Number of bytes currently buffered.
    pub fn count(&self) -> usize {
        self.available
    }

    pub fn is_empty(&self) -> bool {
        self.available == 0
    }

    /// Reset the buffer to empty state.
    pub fn reset(&mut self) {
        self.write_index = 0;
        self.read_index = 0;
        self.available = 0;
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_all(buf: &mut RingBuffer, count: usize) -> Vec<u8> {
        let mut out = vec![0u8; count];
        let n = buf.read_into(&mut out);
        out.truncate(n);
        out
    }

    #[test]
    fn basic_write_read() {
        let mut buf = RingBuffer::try_new(10).unwrap();
        buf.write(&[1, 2, 3]);

        assert_eq!(buf.count(), 3);
        assert_eq!(read_all(&mut buf, 3), vec![1, 2, 3]);
        assert!(buf.is_empty());
    }

    #[test]
    fn read_partial() {
        let mut buf = RingBuffer::try_new(10).unwrap();
        buf.write(&[1, 2, 3, 4, 5]);

        assert_eq!(read_all(&mut buf, 3), vec![1, 2, 3]);
        assert_eq!(buf.count(), 2);

        let rest = read_all(&mut buf, 10); // request more than available
        assert_eq!(rest, vec![4, 5]);
        assert!(buf.is_empty());
    }

    #[test]
    fn overflow_drops_oldest() {
        let mut buf = RingBuffer::try_new(4).unwrap();
        buf.write(&[1, 2, 3, 4]);
        buf.write(&[5, 6]); // overflow: drops 1, 2

        assert_eq!(buf.count(), 4);
        assert_eq!(read_all(&mut buf, 4), vec![3, 4, 5, 6]);
    }

    #[test]
    fn write_larger_than_capacity() {
        let mut buf = RingBuffer::try_new(3).unwrap();
        buf.write(&[1, 2, 3, 4, 5]); // only last 3 kept

        assert_eq!(buf.count(), 3);
        assert_eq!(read_all(&mut buf, 3), vec![3, 4, 5]);
    }

    #[test]
    fn wraparound() {
        let mut buf = RingBuffer::try_new(4).unwrap();

        buf.write(&[1, 2, 3]);
        read_all(&mut buf, 2); // read_index = 2

        buf.write(&[4, 5, 6]); // wraps around

        assert_eq!(buf.count(), 4);
        assert_eq!(read_all(&mut buf, 4), vec![3, 4, 5, 6]);
    }

    #[test]
    fn reset_clears_buffer() {
        let mut buf = RingBuffer::try_new(10).unwrap();
        buf.write(&[1, 2, 3]);
        buf.reset();

        assert!(buf.is_empty());
        assert!(read_all(&mut buf, 10).is_empty());
    }

    #[test]
    fn silence_is_zero_filled_across_chunks() {
        let mut buf = RingBuffer::try_new(600).unwrap();
        buf.write(&[9]);
        buf.write_silence(520);

        assert_eq!(buf.count(), 521);
        let out = read_all(&mut buf, 521);
        assert_eq!(out[0], 9);
        assert!(out[1..].iter().all(|&b| b == 0));
    }

    #[test]
    fn zero_capacity_ignores_writes() {
        let mut buf = RingBuffer::try_new(0).unwrap();
        buf.write(&[1, 2]);
        assert!(buf.is_empty());
        assert_eq!(buf.capacity(), 0);
    }

    #[test]
    fn huge_capacity_reports_exhaustion() {
        let err = RingBuffer::try_new(usize::MAX).unwrap_err();
        assert!(matches!(err, EngineError::ResourceExhausted { .. }));
    }
}
