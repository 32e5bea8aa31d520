use std::fmt;

/// Sample encoding as named by `arecord -f`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    S16Le,
    U8,
}

impl SampleFormat {
    pub fn as_arecord(&self) -> &'static str {
        match self {
            Self::S16Le => "S16_LE",
            Self::U8 => "U8",
        }
    }

    pub fn bits(&self) -> u16 {
        match self {
            Self::S16Le => 16,
            Self::U8 => 8,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_arecord())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub sample_format: SampleFormat,
    pub channels: u16,
}

impl AudioFormat {
    pub fn bytes_per_second(&self) -> u64 {
        u64::from(self.sample_rate)
            * u64::from(self.channels)
            * u64::from(self.sample_format.bits() / 8)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels = if self.channels == 1 { "mono" } else { "stereo" };
        write!(f, "{} Hz, {}, {}", self.sample_rate, self.sample_format, channels)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QualityPreset {
    #[default]
    Cd,
    Dat,
    Phone,
    Voice,
}

impl QualityPreset {
    pub const ALL: [QualityPreset; 4] = [Self::Cd, Self::Dat, Self::Phone, Self::Voice];

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "cd" => Some(Self::Cd),
            "dat" => Some(Self::Dat),
            "phone" => Some(Self::Phone),
            "voice" => Some(Self::Voice),
            _ => None,
        }
    }

    /// Resolve a preset name, falling back to the default for unknown names.
    ///
    /// The boolean is false when the fallback was used.
    pub fn resolve(name: &str) -> (Self, bool) {
        match Self::from_name(name) {
            Some(preset) => (preset, true),
            None => (Self::default(), false),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cd => "cd",
            Self::Dat => "dat",
            Self::Phone => "phone",
            Self::Voice => "voice",
        }
    }

    pub fn format(&self) -> AudioFormat {
        let (sample_rate, sample_format, channels) = match self {
            Self::Cd => (44100, SampleFormat::S16Le, 2),
            Self::Dat => (48000, SampleFormat::S16Le, 2),
            Self::Phone => (8000, SampleFormat::U8, 1),
            Self::Voice => (22050, SampleFormat::S16Le, 1),
        };
        AudioFormat {
            sample_rate,
            sample_format,
            channels,
        }
    }
}

impl fmt::Display for QualityPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
