use crate::error::FeatureError;
use crate::image::{ExtendedView, Interval};

use super::config::FeatureSet;
use super::target::ChannelSliceMut;

/// Multi-scale box smoothing.
///
/// Channel `c` holds the mean of the `(2c + 1)`-wide box around each sample,
/// so channel 0 is the source itself. Samples past the border are replicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoxMean {
    scales: usize,
}

impl BoxMean {
    pub fn new(scales: usize) -> Self {
        Self { scales }
    }

    pub fn scales(&self) -> usize {
        self.scales
    }
}

impl FeatureSet for BoxMean {
    fn channel_count(&self) -> usize {
        self.scales
    }

    fn apply(
        &self,
        source: &ExtendedView,
        targets: &mut [ChannelSliceMut<'_>],
    ) -> Result<(), FeatureError> {
        if targets.len() != self.scales {
            return Err(FeatureError::new(format!(
                "box mean writes {} channels, got {} targets",
                self.scales,
                targets.len()
            )));
        }

        let n = source.num_dimensions();
        let mut missing = false;
        for target in targets.iter_mut() {
            let radius = target.channel() as i64;
            let window = Interval::new(vec![-radius; n], vec![radius; n]);
            let weight = 1.0 / window.volume() as f32;
            let mut sample = vec![0; n];

            target.fill_with(|position| {
                let mut sum = 0.0;
                for offset in window.positions() {
                    for d in 0..n {
                        sample[d] = position[d] + offset[d];
                    }
                    match source.real(&sample) {
                        Some(value) => sum += value,
                        None => missing = true,
                    }
                }
                sum * weight
            });
        }

        if missing {
            return Err(FeatureError::new("box mean requires a real-valued image"));
        }
        Ok(())
    }
}
