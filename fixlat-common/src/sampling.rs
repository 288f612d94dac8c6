//! Fixed-capacity latency sample buffer.
//!
//! One buffer per endpoint. The index only moves forward; writing past the
//! configured capacity is refused with [`SampleError::BufferFull`] instead of
//! growing the buffer or overwriting earlier samples.

use std::time::Instant;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SampleError {
    #[error("sample buffer full (capacity {capacity})")]
    BufferFull { capacity: usize },
}

/// Preallocated array of nanosecond dispatch latencies.
#[derive(Debug, Clone)]
pub struct SampleBuffer {
    samples: Box<[i64]>,
    len: usize,
}

impl SampleBuffer {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: vec![0; capacity].into_boxed_slice(),
            len: 0,
        }
    }

    /// Store one latency and return the index it was written at.
    pub fn record(&mut self, latency_ns: i64) -> Result<usize, SampleError> {
        let index = self.len;
        let capacity = self.samples.len();
        let slot = self
            .samples
            .get_mut(index)
            .ok_or(SampleError::BufferFull { capacity })?;
        *slot = latency_ns;
        self.len += 1;
        Ok(index)
    }

    /// Record `now - receipt`, clamped at zero.
    pub fn record_between(&mut self, receipt: Instant, now: Instant) -> Result<usize, SampleError> {
        let elapsed = now.saturating_duration_since(receipt);
        self.record(i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX))
    }

    /// Record the time elapsed since `receipt`.
    pub fn record_since(&mut self, receipt: Instant) -> Result<usize, SampleError> {
        self.record_between(receipt, Instant::now())
    }

    /// Samples written so far.
    pub fn as_slice(&self) -> &[i64] {
        &self.samples[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.samples.len()
    }

    pub fn is_full(&self) -> bool {
        self.len == self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn records_in_order() {
        let mut buffer = SampleBuffer::with_capacity(3);
        assert_eq!(buffer.record(10).unwrap(), 0);
        assert_eq!(buffer.record(20).unwrap(), 1);
        assert_eq!(buffer.as_slice(), &[10, 20]);
        assert!(!buffer.is_full());
    }

    #[test]
    fn refuses_writes_past_capacity() {
        let mut buffer = SampleBuffer::with_capacity(2);
        buffer.record(1).unwrap();
        buffer.record(2).unwrap();
        assert!(buffer.is_full());
        assert_eq!(
            buffer.record(3),
            Err(SampleError::BufferFull { capacity: 2 })
        );
        assert_eq!(buffer.as_slice(), &[1, 2]);
    }

    #[test]
    fn zero_capacity_is_immediately_full() {
        let mut buffer = SampleBuffer::with_capacity(0);
        assert!(buffer.is_full());
        assert!(buffer.is_empty());
        assert!(buffer.record(1).is_err());
    }

    #[test]
    fn record_between_measures_elapsed_nanos() {
        let mut buffer = SampleBuffer::with_capacity(1);
        let receipt = Instant::now();
        let now = receipt + Duration::from_micros(250);
        buffer.record_between(receipt, now).unwrap();
        assert_eq!(buffer.as_slice(), &[250_000]);
    }

    #[test]
    fn receipt_after_now_clamps_to_zero() {
        let mut buffer = SampleBuffer::with_capacity(1);
        let now = Instant::now();
        buffer
            .record_between(now + Duration::from_millis(1), now)
            .unwrap();
        assert_eq!(buffer.as_slice(), &[0]);
    }

    #[test]
    fn record_since_is_non_negative() {
        let mut buffer = SampleBuffer::with_capacity(1);
        buffer.record_since(Instant::now()).unwrap();
        assert!(buffer.as_slice()[0] >= 0);
    }
}
