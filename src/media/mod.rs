use std::time::Duration;

pub mod rtp;
pub mod source;

/// Negotiated shape of the outgoing media stream.
///
/// All derivations treat a zero field as "use the PCMU default", so a
/// zeroed struct and [`MediaOptions::default()`] describe the same stream:
/// 20 ms packets of 8 kHz mono μ-law, 160 bytes per packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaOptions {
    /// Milliseconds of audio carried by one RTP packet.
    pub ptime_ms: u32,
    /// Samples per second of the encoded audio.
    pub sample_rate_hz: u32,
    /// Bytes per sample (1 for μ-law).
    pub sample_width_bytes: u32,
    /// 1 for mono, 2 for stereo.
    pub channels: u32,
}

impl Default for MediaOptions {
    fn default() -> Self {
        MediaOptions {
            ptime_ms: 20,
            sample_rate_hz: 8000,
            sample_width_bytes: 1,
            channels: 1,
        }
    }
}

impl MediaOptions {
    pub fn ptime(&self) -> u32 {
        if self.ptime_ms == 0 {
            20
        } else {
            self.ptime_ms
        }
    }

    pub fn sample_rate(&self) -> u32 {
        if self.sample_rate_hz == 0 {
            8000
        } else {
            self.sample_rate_hz
        }
    }

    pub fn sample_width(&self) -> u32 {
        if self.sample_width_bytes == 0 {
            1
        } else {
            self.sample_width_bytes
        }
    }

    pub fn channel_count(&self) -> u32 {
        if self.channels == 0 {
            1
        } else {
            self.channels
        }
    }

    pub fn frames_per_second(&self) -> u32 {
        1000 / self.ptime()
    }

    /// Samples carried by one packet, which is also the RTP timestamp
    /// increment between consecutive packets.
    pub fn samples_per_frame(&self) -> u32 {
        self.sample_rate() / self.frames_per_second()
    }

    /// Payload size of one RTP packet and the read-chunk size of the
    /// audio source.
    pub fn buffer_size(&self) -> usize {
        (self.samples_per_frame() * self.sample_width() * self.channel_count()) as usize
    }

    /// Wall-clock gap between consecutive packets.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.ptime() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pcmu_defaults() {
        let opts = MediaOptions::default();
        assert_eq!(opts.frames_per_second(), 50);
        assert_eq!(opts.samples_per_frame(), 160);
        assert_eq!(opts.buffer_size(), 160);
        assert_eq!(opts.frame_interval(), Duration::from_millis(20));
    }

    #[test]
    fn test_zero_fields_fall_back_to_defaults() {
        let opts = MediaOptions {
            ptime_ms: 0,
            sample_rate_hz: 0,
            sample_width_bytes: 0,
            channels: 0,
        };
        assert_eq!(opts.ptime(), 20);
        assert_eq!(opts.sample_rate(), 8000);
        assert_eq!(opts.buffer_size(), 160);
    }

    #[test]
    fn test_wideband_stereo_derivations() {
        let opts = MediaOptions {
            ptime_ms: 10,
            sample_rate_hz: 16000,
            sample_width_bytes: 2,
            channels: 2,
        };
        assert_eq!(opts.frames_per_second(), 100);
        assert_eq!(opts.samples_per_frame(), 160);
        assert_eq!(opts.buffer_size(), 640);
        assert_eq!(opts.frame_interval(), Duration::from_millis(10));
    }
}
