//! Sample format, speaker layout, and channel position mappings.
//!
//! The sound server reports its own sample formats and channel counts;
//! the consuming pipeline speaks a different vocabulary. The functions
//! here are pure table lookups between the two.

/// Server-native sample formats.
///
/// Only the subset the consumer can ingest is enumerated; everything
/// else the server might report resolves to [`SampleFormat::Invalid`]
/// and is substituted during device resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Unsigned 8-bit PCM.
    U8,
    /// Signed 16-bit PCM, little endian.
    S16Le,
    /// Signed 32-bit PCM, little endian.
    S32Le,
    /// 32-bit IEEE float PCM, little endian.
    F32Le,
    /// No usable format. A stream must never be opened with this.
    Invalid,
}

impl SampleFormat {
    /// Returns the size of one sample in bytes, or 0 for `Invalid`.
    #[must_use]
    pub fn bytes_per_sample(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16Le => 2,
            Self::S32Le | Self::F32Le => 4,
            Self::Invalid => 0,
        }
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::U8 => "u8",
            Self::S16Le => "s16le",
            Self::S32Le => "s32le",
            Self::F32Le => "float32le",
            Self::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

/// Sample formats understood by the consuming pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFormat {
    /// Unsigned 8-bit.
    U8Bit,
    /// Signed 16-bit.
    S16Bit,
    /// Signed 32-bit.
    S32Bit,
    /// 32-bit float.
    Float,
    /// No consumer equivalent exists.
    Unknown,
}

/// Speaker layouts understood by the consuming pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeakerLayout {
    /// Single channel.
    Mono,
    /// Two channels: left, right.
    Stereo,
    /// 2.1: stereo plus LFE.
    TwoPointOne,
    /// 4.0 quadraphonic.
    FourPointZero,
    /// 4.1: quad plus LFE.
    FourPointOne,
    /// 5.1 surround.
    FivePointOne,
    /// 7.1 surround.
    SevenPointOne,
    /// No layout equivalent for this channel count.
    Unknown,
}

/// Maps a server-native sample format to the consumer's format.
///
/// Unmapped formats (including `Invalid`) yield [`AudioFormat::Unknown`].
///
/// # Example
///
/// ```
/// use stream_capture::{sample_format_to_audio_format, AudioFormat, SampleFormat};
///
/// assert_eq!(
///     sample_format_to_audio_format(SampleFormat::S16Le),
///     AudioFormat::S16Bit
/// );
/// ```
#[must_use]
pub fn sample_format_to_audio_format(format: SampleFormat) -> AudioFormat {
    match format {
        SampleFormat::U8 => AudioFormat::U8Bit,
        SampleFormat::S16Le => AudioFormat::S16Bit,
        SampleFormat::S32Le => AudioFormat::S32Bit,
        SampleFormat::F32Le => AudioFormat::Float,
        SampleFormat::Invalid => AudioFormat::Unknown,
    }
}

/// Maps a channel count to a consumer speaker layout.
///
/// This is a best-effort heuristic: the server's actual layout semantics
/// for a given channel count may differ from the layout returned here.
/// Counts without a conventional layout yield [`SpeakerLayout::Unknown`].
#[must_use]
pub fn channels_to_speaker_layout(channels: u8) -> SpeakerLayout {
    match channels {
        1 => SpeakerLayout::Mono,
        2 => SpeakerLayout::Stereo,
        3 => SpeakerLayout::TwoPointOne,
        4 => SpeakerLayout::FourPointZero,
        5 => SpeakerLayout::FourPointOne,
        6 => SpeakerLayout::FivePointOne,
        8 => SpeakerLayout::SevenPointOne,
        _ => SpeakerLayout::Unknown,
    }
}

/// Logical speaker positions assignable to the physical channels of a
/// stream, matching the server's channel position vocabulary.
///
/// The integer codes used by the settings surface follow the server's
/// numbering; see [`ChannelPosition::from_raw`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPosition {
    /// Single-channel position.
    Mono,
    /// Front left.
    FrontLeft,
    /// Front right.
    FrontRight,
    /// Front center.
    FrontCenter,
    /// Rear center.
    RearCenter,
    /// Rear left.
    RearLeft,
    /// Rear right.
    RearRight,
    /// Low-frequency effects.
    Lfe,
    /// Front left of center.
    FrontLeftOfCenter,
    /// Front right of center.
    FrontRightOfCenter,
    /// Side left.
    SideLeft,
    /// Side right.
    SideRight,
    /// Auxiliary position 0..=31.
    Aux(u8),
    /// Top center.
    TopCenter,
    /// Top front left.
    TopFrontLeft,
    /// Top front center.
    TopFrontCenter,
    /// Top front right.
    TopFrontRight,
    /// Top rear left.
    TopRearLeft,
    /// Top rear center.
    TopRearCenter,
    /// Top rear right.
    TopRearRight,
}

/// First integer code of the auxiliary position block.
const AUX_BASE: i64 = 12;
/// Number of auxiliary positions.
const AUX_COUNT: i64 = 32;

impl ChannelPosition {
    /// Decodes a raw integer position code from the settings surface.
    ///
    /// Returns `None` for codes outside the server's position range.
    #[must_use]
    pub fn from_raw(raw: i64) -> Option<Self> {
        let position = match raw {
            0 => Self::Mono,
            1 => Self::FrontLeft,
            2 => Self::FrontRight,
            3 => Self::FrontCenter,
            4 => Self::RearCenter,
            5 => Self::RearLeft,
            6 => Self::RearRight,
            7 => Self::Lfe,
            8 => Self::FrontLeftOfCenter,
            9 => Self::FrontRightOfCenter,
            10 => Self::SideLeft,
            11 => Self::SideRight,
            n if (AUX_BASE..AUX_BASE + AUX_COUNT).contains(&n) => Self::Aux((n - AUX_BASE) as u8),
            44 => Self::TopCenter,
            45 => Self::TopFrontLeft,
            46 => Self::TopFrontRight,
            47 => Self::TopFrontCenter,
            48 => Self::TopRearLeft,
            49 => Self::TopRearRight,
            50 => Self::TopRearCenter,
            _ => return None,
        };
        Some(position)
    }

    /// Encodes this position back to its raw integer code.
    #[must_use]
    pub fn to_raw(self) -> i64 {
        match self {
            Self::Mono => 0,
            Self::FrontLeft => 1,
            Self::FrontRight => 2,
            Self::FrontCenter => 3,
            Self::RearCenter => 4,
            Self::RearLeft => 5,
            Self::RearRight => 6,
            Self::Lfe => 7,
            Self::FrontLeftOfCenter => 8,
            Self::FrontRightOfCenter => 9,
            Self::SideLeft => 10,
            Self::SideRight => 11,
            Self::Aux(n) => AUX_BASE + i64::from(n),
            Self::TopCenter => 44,
            Self::TopFrontLeft => 45,
            Self::TopFrontRight => 46,
            Self::TopFrontCenter => 47,
            Self::TopRearLeft => 48,
            Self::TopRearRight => 49,
            Self::TopRearCenter => 50,
        }
    }

    /// Returns the conventional position for a channel slot, used when
    /// the settings surface supplies no explicit map entry.
    ///
    /// The first eight slots follow the usual 7.1 assignment; the rest
    /// fall back to auxiliary positions.
    #[must_use]
    pub fn default_for_slot(slot: usize) -> Self {
        match slot {
            0 => Self::FrontLeft,
            1 => Self::FrontRight,
            2 => Self::FrontCenter,
            3 => Self::Lfe,
            4 => Self::RearLeft,
            5 => Self::RearRight,
            6 => Self::SideLeft,
            7 => Self::SideRight,
            n => Self::Aux(((n - 8) % AUX_COUNT as usize) as u8),
        }
    }
}
