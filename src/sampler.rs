//! Bit-sampling state machine for one caliper.
//!
//! Pure logic, no hardware dependencies. The edge handler feeds it the
//! sampled line levels and a timestamp; the tick path asks it whether the
//! device went quiet. Fully testable on host.
//!
//! # Framing
//!
//! The caliper has no start/stop delimiter. Alignment comes from two rules:
//! - 24 active edges complete a frame, which is published and restarts the count
//! - an inactive edge arriving after a long gap discards the partial frame

use crate::frame::{RawFrame, FRAME_BITS};

/// Outcome of one clock edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EdgeEvent {
    /// Bit shifted in, frame still incomplete.
    Bit,
    /// 24th bit shifted in, `latest` now holds the new frame.
    FrameComplete,
    /// Inactive edge after a gap; partial frame discarded.
    Resync,
    /// Inactive edge, nothing to discard.
    Idle,
}

/// Mutable per-caliper state guarded by the instance lock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SamplerState {
    /// Shift register under construction.
    shift: u32,
    /// Bits accumulated since the last publish or resync (0..24).
    bits: u8,
    /// Timestamp of the most recent clock edge (µs).
    last_edge_us: i64,
    /// True once any active edge is seen, false after the power-loss timeout.
    power: bool,
    /// Most recently completed frame.
    latest: u32,
    frames: u32,
    resyncs: u32,
}

/// Copy of the fields readers are allowed to see.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerSnapshot {
    pub frame: RawFrame,
    pub power: bool,
}

/// Diagnostic counters for one caliper.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaliperStats {
    /// Frames published since the instance was added.
    pub frames: u32,
    /// Partial frames discarded on a timing gap.
    pub resyncs: u32,
    pub power: bool,
}

impl SamplerState {
    pub const fn new() -> Self {
        Self {
            shift: 0,
            bits: 0,
            last_edge_us: 0,
            power: false,
            latest: 0,
            frames: 0,
            resyncs: 0,
        }
    }

    /// Process one clock transition.
    ///
    /// `clock_active` and `data` are the line levels after inversion.
    /// Bits enter at position 23 and move down, so the first bit of the
    /// frame ends up at bit 0.
    #[inline]
    pub fn on_edge(&mut self, clock_active: bool, data: bool, now_us: i64, resync_gap_us: i64) -> EdgeEvent {
        let event = if clock_active {
            self.power = true;
            self.shift = ((data as u32) << (FRAME_BITS - 1)) | (self.shift >> 1);
            self.bits += 1;
            if self.bits >= FRAME_BITS {
                self.latest = self.shift;
                self.bits = 0;
                self.frames = self.frames.wrapping_add(1);
                EdgeEvent::FrameComplete
            } else {
                EdgeEvent::Bit
            }
        } else if now_us.wrapping_sub(self.last_edge_us) > resync_gap_us && self.bits != 0 {
            self.bits = 0;
            self.resyncs = self.resyncs.wrapping_add(1);
            EdgeEvent::Resync
        } else {
            EdgeEvent::Idle
        };

        self.last_edge_us = now_us;
        event
    }

    /// Power-loss check for the periodic tick.
    ///
    /// Returns true exactly once per powered period: when the device has
    /// been silent for at least `power_loss_us`.
    #[inline]
    pub fn expire(&mut self, now_us: i64, power_loss_us: i64) -> bool {
        if self.power && now_us.wrapping_sub(self.last_edge_us) >= power_loss_us {
            self.power = false;
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn snapshot(&self) -> SamplerSnapshot {
        SamplerSnapshot {
            frame: RawFrame::new(self.latest),
            power: self.power,
        }
    }

    #[inline]
    pub fn stats(&self) -> CaliperStats {
        CaliperStats {
            frames: self.frames,
            resyncs: self.resyncs,
            power: self.power,
        }
    }

    /// Bits accumulated toward the current frame.
    #[inline]
    pub fn pending_bits(&self) -> u8 {
        self.bits
    }

    #[inline]
    pub fn last_edge_us(&self) -> i64 {
        self.last_edge_us
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAP: i64 = 1_000;

    /// Clock one frame in, LSB first, 10 µs half period.
    fn clock_frame(state: &mut SamplerState, frame: u32, start_us: i64) -> (i64, usize) {
        let mut t = start_us;
        let mut completed = 0;
        for i in 0..24 {
            let bit = (frame >> i) & 1 == 1;
            if state.on_edge(true, bit, t, GAP) == EdgeEvent::FrameComplete {
                completed += 1;
            }
            t += 10;
            state.on_edge(false, bit, t, GAP);
            t += 10;
        }
        (t, completed)
    }

    #[test]
    fn test_frame_completes_once() {
        let mut s = SamplerState::new();
        let (t, completed) = clock_frame(&mut s, 0x8000C8, 5_000);
        assert_eq!(completed, 1);
        assert_eq!(s.snapshot().frame.raw(), 0x8000C8);
        assert_eq!(s.last_edge_us(), t - 10);
        assert_eq!(s.pending_bits(), 0);
        assert!(s.snapshot().power);
    }

    #[test]
    fn test_gap_resyncs_partial_frame() {
        let mut s = SamplerState::new();
        let mut t = 5_000;
        for _ in 0..10 {
            s.on_edge(true, true, t, GAP);
            t += 10;
            s.on_edge(false, true, t, GAP);
            t += 10;
        }
        assert_eq!(s.pending_bits(), 10);

        // Stall longer than the resync gap, then an inactive edge
        t += 5_000;
        assert_eq!(s.on_edge(false, false, t, GAP), EdgeEvent::Resync);
        assert_eq!(s.pending_bits(), 0);
        assert_eq!(s.stats().resyncs, 1);
        assert_eq!(s.stats().frames, 0);

        let (_, completed) = clock_frame(&mut s, 0x100064, t + 10);
        assert_eq!(completed, 1);
        assert_eq!(s.snapshot().frame.raw(), 0x100064);
    }

    #[test]
    fn test_gap_between_frames_is_not_a_resync() {
        let mut s = SamplerState::new();
        let (t, _) = clock_frame(&mut s, 0x000001, 1_000);
        assert_eq!(s.on_edge(false, false, t + 100_000, GAP), EdgeEvent::Idle);
        assert_eq!(s.stats().resyncs, 0);
    }

    #[test]
    fn test_short_gap_keeps_bits() {
        let mut s = SamplerState::new();
        s.on_edge(true, true, 10_000, GAP);
        assert_eq!(s.on_edge(false, true, 10_500, GAP), EdgeEvent::Idle);
        assert_eq!(s.pending_bits(), 1);
    }

    #[test]
    fn test_active_edge_after_gap_does_not_resync() {
        // Only inactive edges check the gap
        let mut s = SamplerState::new();
        s.on_edge(true, false, 10_000, GAP);
        s.on_edge(true, false, 20_000, GAP);
        assert_eq!(s.pending_bits(), 2);
    }

    #[test]
    fn test_power_expires_once() {
        let mut s = SamplerState::new();
        assert!(!s.expire(1_000_000, 200_000));

        let (t, _) = clock_frame(&mut s, 0, 1_000);
        assert!(!s.expire(t + 199_000, 200_000));
        assert!(s.expire(t + 200_000, 200_000));
        assert!(!s.snapshot().power);
        assert!(!s.expire(t + 400_000, 200_000));
    }

    #[test]
    fn test_second_frame_replaces_first() {
        let mut s = SamplerState::new();
        let (t, _) = clock_frame(&mut s, 0x000123, 1_000);
        let (_, completed) = clock_frame(&mut s, 0x000456, t + 20_000);
        assert_eq!(completed, 1);
        assert_eq!(s.snapshot().frame.raw(), 0x000456);
        assert_eq!(s.stats().frames, 2);
    }
}
