//! Single-slot mailbox from a control thread to the audio thread

use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

struct Slot<T> {
    value: Option<T>,
    fresh: bool,
}

/// Hands the newest value from one producer to one real-time consumer.
///
/// Only the most recent `publish` is ever delivered; older unconsumed values
/// are replaced. The consumer side never blocks and never frees memory:
/// `try_consume` gives the callback `&mut T`, and whatever the callback leaves
/// behind in the slot is dropped by the producer on its next `publish`.
pub struct BufferTransfer<T> {
    slot: Mutex<Slot<T>>,
}

impl<T> BufferTransfer<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot { value: None, fresh: false }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `value` as the pending one (producer thread only).
    pub fn publish(&self, value: T) {
        let displaced = {
            let mut slot = self.lock();
            let displaced = slot.value.replace(value);
            slot.fresh = true;
            displaced
        };
        drop(displaced);
    }

    /// Pass the pending value to `f` if one is waiting and the slot is free
    /// (consumer thread only, at most once per block).
    ///
    /// `f` returns whether it accepted the value. A refused value stays
    /// pending and is offered again on the next call. Returns `true` when `f`
    /// accepted.
    pub fn try_consume<F>(&self, f: F) -> bool
    where
        F: FnOnce(&mut T) -> bool,
    {
        let mut slot = match self.slot.try_lock() {
            Ok(slot) => slot,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => return false,
        };
        if !slot.fresh {
            return false;
        }
        let Some(value) = slot.value.as_mut() else {
            return false;
        };
        let accepted = f(value);
        slot.fresh = !accepted;
        accepted
    }

    /// Whether an unconsumed value is waiting
    #[cfg(test)]
    pub(crate) fn has_pending(&self) -> bool {
        self.lock().fresh
    }
}

impl<T> Default for BufferTransfer<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use impulse_core::{AudioBuffer, BufferWithSampleRate};

    fn tagged(tag: f32, sample_rate: f64) -> BufferWithSampleRate {
        BufferWithSampleRate::new(AudioBuffer::from_channels(vec![vec![tag; 64]; 2]), sample_rate)
    }

    #[test]
    fn test_consume_without_publish_is_noop() {
        let transfer: BufferTransfer<BufferWithSampleRate> = BufferTransfer::new();
        let mut calls = 0;
        assert!(!transfer.try_consume(|_| {
            calls += 1;
            true
        }));
        assert!(!transfer.try_consume(|_| {
            calls += 1;
            true
        }));
        assert_eq!(calls, 0);
        assert!(!transfer.has_pending());
    }

    #[test]
    fn test_last_publish_wins() {
        let transfer = BufferTransfer::new();
        transfer.publish(tagged(1.0, 44100.0));
        transfer.publish(tagged(2.0, 48000.0));
        transfer.publish(tagged(3.0, 96000.0));

        let mut seen = Vec::new();
        assert!(transfer.try_consume(|buf| {
            seen.push((buf.buffer.channel(0)[0], buf.sample_rate));
            true
        }));
        assert_eq!(seen, vec![(3.0, 96000.0)]);
    }

    #[test]
    fn test_end_to_end_publish_consume_sequence() {
        let transfer = BufferTransfer::new();
        let mut seen: Vec<(f32, f64)> = Vec::new();
        let mut observe = |buf: &mut BufferWithSampleRate| {
            seen.push((buf.buffer.channel(0)[0], buf.sample_rate));
            true
        };

        transfer.publish(tagged(1.0, 48000.0));
        assert!(transfer.try_consume(&mut observe));
        assert!(!transfer.try_consume(&mut observe));

        transfer.publish(tagged(2.0, 48000.0));
        transfer.publish(tagged(3.0, 48000.0));
        assert!(transfer.try_consume(&mut observe));
        assert!(!transfer.try_consume(&mut observe));

        assert_eq!(seen, vec![(1.0, 48000.0), (3.0, 48000.0)]);
    }

    #[test]
    fn test_consume_fails_while_producer_holds_slot() {
        let transfer = BufferTransfer::new();
        transfer.publish(tagged(1.0, 48000.0));

        let guard = transfer.lock();
        let mut calls = 0;
        assert!(!transfer.try_consume(|_| {
            calls += 1;
            true
        }));
        drop(guard);

        // The failed attempt left the value pending
        assert!(transfer.try_consume(|_| {
            calls += 1;
            true
        }));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_callback_can_take_ownership() {
        let transfer = BufferTransfer::new();
        transfer.publish(tagged(5.0, 22050.0));

        let mut taken = BufferWithSampleRate::default();
        transfer.try_consume(|buf| {
            std::mem::swap(&mut taken, buf);
            true
        });
        assert_eq!(taken.sample_rate, 22050.0);
        assert_eq!(taken.buffer.num_samples(), 64);
    }

    #[test]
    fn test_concurrent_publish_and_consume_never_tear() {
        const PUBLISHES: u32 = 2_000;
        let transfer = BufferTransfer::new();

        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 1..=PUBLISHES {
                    transfer.publish(tagged(i as f32, i as f64));
                }
            });

            let mut last = 0.0f64;
            while last < PUBLISHES as f64 {
                transfer.try_consume(|buf: &mut BufferWithSampleRate| {
                    let tag = buf.sample_rate;
                    for channel in buf.buffer.channels() {
                        assert!(channel.iter().all(|&s| s as f64 == tag), "torn buffer");
                    }
                    assert!(tag > last, "stale buffer delivered");
                    last = tag;
                    true
                });
                std::hint::spin_loop();
            }
        });
    }

    #[test]
    fn test_refused_value_is_offered_again() {
        let transfer = BufferTransfer::new();
        transfer.publish(tagged(7.0, 48000.0));

        assert!(!transfer.try_consume(|_| false));
        assert!(transfer.has_pending());

        let mut seen = None;
        assert!(transfer.try_consume(|buf| {
            seen = Some(buf.buffer.channel(0)[0]);
            true
        }));
        assert_eq!(seen, Some(7.0));
        assert!(!transfer.has_pending());
    }

    #[test]
    fn test_poisoned_slot_still_delivers() {
        let transfer = BufferTransfer::new();
        let _ = std::thread::scope(|s| {
            s.spawn(|| {
                let _guard = transfer.lock();
                panic!("producer panicked while holding the slot");
            })
            .join()
        });

        transfer.publish(tagged(4.0, 48000.0));
        assert!(transfer.try_consume(|buf| buf.buffer.channel(0)[0] == 4.0));
    }
}
