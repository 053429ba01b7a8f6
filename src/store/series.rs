//! Lazy time-series views over a store snapshot.

use super::StoreSnapshot;
use crate::decode::{SLOTS, SUBSAMPLES};

/// One value drawn from the store with its coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeriesPoint {
    pub frame: usize,
    pub slot: usize,
    pub subsample: usize,
    pub value: u16,
}

/// Values of one pixel (channel, subsample) across every frame and slot.
///
/// Ordered frame-major, then by slot. Clone to restart.
#[derive(Debug, Clone)]
pub struct PixelSeries {
    snapshot: StoreSnapshot,
    channel: usize,
    subsample: usize,
    cursor: usize,
}

impl PixelSeries {
    pub(super) fn new(snapshot: StoreSnapshot, channel: usize, subsample: usize) -> Self {
        Self {
            snapshot,
            channel,
            subsample,
            cursor: 0,
        }
    }

    /// Total number of points in the series.
    pub fn total(&self) -> usize {
        self.snapshot.len() * SLOTS
    }
}

impl Iterator for PixelSeries {
    type Item = SeriesPoint;

    fn next(&mut self) -> Option<SeriesPoint> {
        if self.cursor >= self.total() {
            return None;
        }
        let frame = self.cursor / SLOTS;
        let slot = self.cursor % SLOTS;
        self.cursor += 1;

        let value = self
            .snapshot
            .get(frame)?
            .get(slot, self.channel, self.subsample)?;
        Some(SeriesPoint {
            frame,
            slot,
            subsample: self.subsample,
            value,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total() - self.cursor;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for PixelSeries {}

/// Every value of one channel: frame-major, then slot, then subsample.
///
/// Clone to restart.
#[derive(Debug, Clone)]
pub struct ChannelSeries {
    snapshot: StoreSnapshot,
    channel: usize,
    cursor: usize,
}

impl ChannelSeries {
    pub(super) fn new(snapshot: StoreSnapshot, channel: usize) -> Self {
        Self {
            snapshot,
            channel,
            cursor: 0,
        }
    }

    /// Total number of points in the series.
    pub fn total(&self) -> usize {
        self.snapshot.len() * SLOTS * SUBSAMPLES
    }
}

impl Iterator for ChannelSeries {
    type Item = SeriesPoint;

    fn next(&mut self) -> Option<SeriesPoint> {
        if self.cursor >= self.total() {
            return None;
        }
        let per_frame = SLOTS * SUBSAMPLES;
        let frame = self.cursor / per_frame;
        let slot = (self.cursor % per_frame) / SUBSAMPLES;
        let subsample = self.cursor % SUBSAMPLES;
        self.cursor += 1;

        let value = self.snapshot.get(frame)?.get(slot, self.channel, subsample)?;
        Some(SeriesPoint {
            frame,
            slot,
            subsample,
            value,
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.total() - self.cursor;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ChannelSeries {}
