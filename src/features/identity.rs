use crate::error::FeatureError;
use crate::image::ExtendedView;

use super::config::FeatureSet;
use super::target::ChannelSliceMut;

/// Copies the (normalized) source samples into a single channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Identity;

impl FeatureSet for Identity {
    fn channel_count(&self) -> usize {
        1
    }

    fn apply(
        &self,
        source: &ExtendedView,
        targets: &mut [ChannelSliceMut<'_>],
    ) -> Result<(), FeatureError> {
        let count = targets.len();
        let [target] = targets else {
            return Err(FeatureError::new(format!(
                "identity writes one channel, got {count} targets"
            )));
        };
        let mut missing = false;
        target.fill_with(|position| {
            source.real(position).unwrap_or_else(|| {
                missing = true;
                0.0
            })
        });
        if missing {
            return Err(FeatureError::new("identity requires a real-valued image"));
        }
        Ok(())
    }
}
