//! Output buffers handed to feature sets.

use crate::image::Interval;

/// The values of one cell: every channel over one spatial interval.
///
/// Channels are stored one after another, each channel dimension 0 fastest,
/// matching the layout of the feature volume where the channel axis comes
/// last.
#[derive(Debug, Clone, PartialEq)]
pub struct CellTarget {
    interval: Interval,
    channels: usize,
    data: Vec<f32>,
}

impl CellTarget {
    /// Zero-initialized target.
    pub fn new(interval: Interval, channels: usize) -> Self {
        let len = interval.volume() * channels;
        Self {
            interval,
            channels,
            data: vec![0.0; len],
        }
    }

    /// Spatial interval covered by the cell.
    pub fn interval(&self) -> &Interval {
        &self.interval
    }

    pub fn channel_count(&self) -> usize {
        self.channels
    }

    /// One mutable slice per channel.
    pub fn slices_mut(&mut self) -> Vec<ChannelSliceMut<'_>> {
        let volume = self.interval.volume().max(1);
        let interval = &self.interval;
        self.data
            .chunks_mut(volume)
            .enumerate()
            .map(|(channel, data)| ChannelSliceMut {
                interval,
                channel,
                data,
            })
            .collect()
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }
}

/// Writable view of one channel of a cell.
#[derive(Debug)]
pub struct ChannelSliceMut<'a> {
    interval: &'a Interval,
    channel: usize,
    data: &'a mut [f32],
}

impl ChannelSliceMut<'_> {
    /// Spatial interval of the slice, in image coordinates.
    pub fn interval(&self) -> &Interval {
        self.interval
    }

    /// Index of the channel this slice belongs to.
    pub fn channel(&self) -> usize {
        self.channel
    }

    /// Write a value at an image position inside the slice.
    ///
    /// # Panics
    /// Panics if the position lies outside the slice's interval.
    pub fn set(&mut self, position: &[i64], value: f32) {
        assert!(
            self.interval.contains(position),
            "position {position:?} outside cell {:?}",
            self.interval
        );
        self.data[self.interval.offset_of(position)] = value;
    }

    /// Fill every position with `f(position)`.
    pub fn fill_with(&mut self, mut f: impl FnMut(&[i64]) -> f32) {
        for (value, position) in self.data.iter_mut().zip(self.interval.positions()) {
            *value = f(&position);
        }
    }

    pub fn fill(&mut self, value: f32) {
        self.data.fill(value);
    }

    pub fn values(&self) -> &[f32] {
        self.data
    }
}
