//! Capture configuration and reconciliation.
//!
//! A [`CaptureConfig`] is an immutable value: reconciliation builds a
//! whole new config from the requested settings and reports whether the
//! active stream must be restarted, rather than mutating in place.

use crate::error::CaptureError;
use crate::format::ChannelPosition;

/// Maximum number of channels the server supports per stream.
pub const MAX_CHANNELS: usize = 32;

/// Device identifier that selects whatever device the server considers
/// the current default.
pub const DEFAULT_DEVICE: &str = "default";

/// Which kind of device a source captures from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// A real capture device (microphone, line-in).
    Input,
    /// The monitor source of a playback sink.
    OutputMonitor,
}

/// An ordered assignment of speaker positions to stream channels.
///
/// Positions need not be unique; the server defines the semantics of
/// repeated entries. Equality is order-sensitive and element-wise,
/// which is exactly the comparison reconciliation uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMap {
    positions: Vec<ChannelPosition>,
}

impl ChannelMap {
    /// Creates a channel map from explicit positions.
    ///
    /// # Errors
    ///
    /// Returns an error if the map is empty or longer than
    /// [`MAX_CHANNELS`].
    pub fn new(positions: Vec<ChannelPosition>) -> Result<Self, CaptureError> {
        if positions.is_empty() {
            return Err(CaptureError::EmptyChannelMap);
        }
        if positions.len() > MAX_CHANNELS {
            return Err(CaptureError::TooManyChannels {
                got: positions.len(),
                limit: MAX_CHANNELS,
            });
        }
        Ok(Self { positions })
    }

    /// Creates the default stereo map: front-left, front-right.
    #[must_use]
    pub fn stereo() -> Self {
        Self {
            positions: vec![ChannelPosition::FrontLeft, ChannelPosition::FrontRight],
        }
    }

    /// Returns the number of channels.
    #[must_use]
    pub fn channels(&self) -> u8 {
        self.positions.len() as u8
    }

    /// Returns the ordered positions.
    #[must_use]
    pub fn positions(&self) -> &[ChannelPosition] {
        &self.positions
    }
}

impl Default for ChannelMap {
    fn default() -> Self {
        Self::stereo()
    }
}

/// Raw settings as supplied by the host's configuration surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureSettings {
    /// Device identifier, or [`DEFAULT_DEVICE`].
    pub device_id: String,
    /// Requested channel map.
    pub channel_map: ChannelMap,
}

impl CaptureSettings {
    /// Decodes settings from the integer-coded surface the host exposes:
    /// a device string, a channel count, and one raw position code per
    /// channel slot.
    ///
    /// Unrecognized or missing position codes fall back to the
    /// conventional position for that slot.
    ///
    /// # Errors
    ///
    /// Returns an error if `channel_count` is 0 or above
    /// [`MAX_CHANNELS`].
    pub fn from_raw(
        device_id: &str,
        channel_count: usize,
        slots: &[i64],
    ) -> Result<Self, CaptureError> {
        let positions = (0..channel_count)
            .map(|i| {
                slots
                    .get(i)
                    .copied()
                    .and_then(ChannelPosition::from_raw)
                    .unwrap_or_else(|| ChannelPosition::default_for_slot(i))
            })
            .collect();

        Ok(Self {
            device_id: device_id.to_string(),
            channel_map: ChannelMap::new(positions)?,
        })
    }
}

impl Default for CaptureSettings {
    /// Default surface values: the default device, stereo front pair.
    fn default() -> Self {
        Self {
            device_id: DEFAULT_DEVICE.to_string(),
            channel_map: ChannelMap::stereo(),
        }
    }
}

/// The active configuration of one capture source.
///
/// Built by [`CaptureConfig::reconcile`]; never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    device: String,
    is_default: bool,
    direction: Direction,
    channel_map: ChannelMap,
}

impl CaptureConfig {
    /// Creates the initial, not-yet-configured state for a source.
    ///
    /// The empty device identifier guarantees the first reconciliation
    /// reports a restart.
    #[must_use]
    pub fn initial(direction: Direction) -> Self {
        Self {
            device: String::new(),
            is_default: false,
            direction,
            channel_map: ChannelMap::stereo(),
        }
    }

    /// Returns the configured device identifier.
    #[must_use]
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns `true` if the source follows the server's default device.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// Returns the capture direction.
    #[must_use]
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Returns the configured channel map.
    #[must_use]
    pub fn channel_map(&self) -> &ChannelMap {
        &self.channel_map
    }

    /// Returns the configured channel count.
    #[must_use]
    pub fn channels(&self) -> u8 {
        self.channel_map.channels()
    }

    /// Compares requested settings against this configuration and builds
    /// the configuration that should be active next.
    ///
    /// Returns the new configuration and whether a stream restart is
    /// required: `true` if the device identifier or any channel map
    /// entry changed. When it is `true` the caller must stop the active
    /// stream before starting with the new configuration.
    ///
    /// # Example
    ///
    /// ```
    /// use stream_capture::{CaptureConfig, CaptureSettings, Direction};
    ///
    /// let settings = CaptureSettings::default();
    /// let (config, restart) = CaptureConfig::initial(Direction::Input).reconcile(&settings);
    /// assert!(restart);
    ///
    /// // Applying the same settings again changes nothing.
    /// let (_, restart) = config.reconcile(&settings);
    /// assert!(!restart);
    /// ```
    #[must_use]
    pub fn reconcile(&self, requested: &CaptureSettings) -> (CaptureConfig, bool) {
        let device_changed = self.device != requested.device_id;
        let map_changed = self.channel_map != requested.channel_map;

        let new_config = Self {
            device: requested.device_id.clone(),
            is_default: requested.device_id == DEFAULT_DEVICE,
            direction: self.direction,
            channel_map: requested.channel_map.clone(),
        };

        (new_config, device_changed || map_changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_map(device: &str, positions: Vec<ChannelPosition>) -> CaptureSettings {
        CaptureSettings {
            device_id: device.to_string(),
            channel_map: ChannelMap::new(positions).expect("valid map"),
        }
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let settings = CaptureSettings::default();
        let (config, restart) = CaptureConfig::initial(Direction::Input).reconcile(&settings);
        assert!(restart);
        assert!(config.is_default());

        let (second, restart) = config.reconcile(&settings);
        assert!(!restart);
        assert_eq!(second, config);
    }

    #[test]
    fn test_device_change_requires_restart() {
        let (config, _) =
            CaptureConfig::initial(Direction::Input).reconcile(&CaptureSettings::default());

        let explicit = settings_with_map("alsa_input.usb", config.channel_map().positions().to_vec());
        let (new_config, restart) = config.reconcile(&explicit);
        assert!(restart);
        assert!(!new_config.is_default());
        assert_eq!(new_config.device(), "alsa_input.usb");

        // And back to the default sentinel.
        let (back, restart) = new_config.reconcile(&CaptureSettings::default());
        assert!(restart);
        assert!(back.is_default());
    }

    #[test]
    fn test_single_map_entry_change_requires_restart() {
        let base: Vec<ChannelPosition> = (0..8).map(ChannelPosition::default_for_slot).collect();
        let settings = settings_with_map("dev", base.clone());
        let (config, _) = CaptureConfig::initial(Direction::Input).reconcile(&settings);

        let mut changed = base.clone();
        changed[5] = ChannelPosition::Aux(3);
        let (_, restart) = config.reconcile(&settings_with_map("dev", changed));
        assert!(restart);

        // An identical map (same length, entries, order) does not restart.
        let (_, restart) = config.reconcile(&settings_with_map("dev", base));
        assert!(!restart);
    }

    #[test]
    fn test_channel_count_change_requires_restart() {
        let settings = settings_with_map(
            "dev",
            vec![ChannelPosition::FrontLeft, ChannelPosition::FrontRight],
        );
        let (config, _) = CaptureConfig::initial(Direction::Input).reconcile(&settings);

        let mono = settings_with_map("dev", vec![ChannelPosition::Mono]);
        let (new_config, restart) = config.reconcile(&mono);
        assert!(restart);
        assert_eq!(new_config.channels(), 1);
    }

    #[test]
    fn test_duplicate_positions_are_allowed() {
        let map = ChannelMap::new(vec![ChannelPosition::Mono, ChannelPosition::Mono]);
        assert!(map.is_ok());
    }

    #[test]
    fn test_map_limits() {
        assert!(matches!(
            ChannelMap::new(vec![]),
            Err(CaptureError::EmptyChannelMap)
        ));
        let too_many = vec![ChannelPosition::Mono; MAX_CHANNELS + 1];
        assert!(matches!(
            ChannelMap::new(too_many),
            Err(CaptureError::TooManyChannels { .. })
        ));
        let max = vec![ChannelPosition::Mono; MAX_CHANNELS];
        assert!(ChannelMap::new(max).is_ok());
    }

    #[test]
    fn test_settings_from_raw_with_fallbacks() {
        // Only two explicit codes; remaining slots use conventional defaults.
        let settings = CaptureSettings::from_raw("default", 4, &[2, 1]).expect("valid settings");
        assert_eq!(
            settings.channel_map.positions(),
            &[
                ChannelPosition::FrontRight,
                ChannelPosition::FrontLeft,
                ChannelPosition::FrontCenter,
                ChannelPosition::Lfe,
            ]
        );
    }

    #[test]
    fn test_settings_from_raw_rejects_bad_counts() {
        assert!(CaptureSettings::from_raw("default", 0, &[]).is_err());
        assert!(CaptureSettings::from_raw("default", MAX_CHANNELS + 1, &[]).is_err());
    }
}
