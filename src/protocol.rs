//! Wire protocol for audio packets.
//!
//! ## Packet format
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                      Audio Packet Header (28 bytes)                  │
//! ├───────┬─────┬─────┬────────┬────────┬──────┬─────┬──────┬─────┬─────┤
//! │Magic 4│Ver 1│Cdc 1│Chans  1│Rsvd   1│Rate 4│Seq 4│Time 8│Spc 2│Len 2│
//! │ AUD0  │  1  │  0  │  1|2   │   --   │  Hz  │ u32 │ µs   │ u16 │ u16 │
//! ├───────┴─────┴─────┴────────┴────────┴──────┴─────┴──────┴─────┴─────┤
//! │                    PCM16LE interleaved payload (variable)            │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Parsing is allocation-light: the header fields are read directly off the
//! input slice and only the sample array is copied into the produced
//! `AudioFrame`. Rejects never allocate.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::constants::{CODEC_PCM16LE, HEADER_SIZE, PACKET_MAGIC, PROTOCOL_VERSION};

/// One successfully parsed packet's worth of interleaved PCM16 audio.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    pub sample_rate: u32,
    pub channels: u8,
    pub seq: u32,
    pub send_time_us: u64,
    pub samples_per_channel: u16,
    /// Interleaved signed 16-bit samples, length == samples_per_channel * channels.
    pub payload: Vec<i16>,
}

impl AudioFrame {
    /// Number of PCM16 samples expected given the frame's own metadata.
    pub fn expected_len(&self) -> usize {
        self.samples_per_channel as usize * self.channels as usize
    }

    /// Whether the payload length matches the frame's declared metadata.
    pub fn is_well_formed(&self) -> bool {
        self.payload.len() == self.expected_len()
    }
}

/// Reasons a buffer was rejected by `PacketCodec::parse`.
///
/// The codec's hot-path callers (`NetReceiver`) only care about "accepted or
/// not" for counter purposes, but the reason is retained so tests and
/// diagnostics can distinguish malformed headers from oversized payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    TooShort,
    BadMagic,
    UnsupportedVersion,
    UnsupportedCodec,
    InvalidChannels,
    InvalidPayloadLen,
    TruncatedPayload,
}

/// Stateless packet parser/encoder for the fixed 28-byte wire header.
pub struct PacketCodec;

impl PacketCodec {
    /// Parse `data` into an `AudioFrame`, or reject it.
    ///
    /// This never panics and never allocates on the reject path.
    pub fn parse(data: &[u8]) -> Result<AudioFrame, RejectReason> {
        if data.len() < HEADER_SIZE {
            return Err(RejectReason::TooShort);
        }

        if data[0..4] != PACKET_MAGIC {
            return Err(RejectReason::BadMagic);
        }

        let version = data[4];
        if version != PROTOCOL_VERSION {
            return Err(RejectReason::UnsupportedVersion);
        }

        let codec = data[5];
        if codec != CODEC_PCM16LE {
            return Err(RejectReason::UnsupportedCodec);
        }

        let channels = data[6];
        if channels != 1 && channels != 2 {
            return Err(RejectReason::InvalidChannels);
        }
        // data[7] is reserved and ignored.

        let mut header = &data[8..HEADER_SIZE];
        let sample_rate = header.get_u32_le();
        let seq = header.get_u32_le();
        let send_time_us = header.get_u64_le();
        let samples_per_channel = header.get_u16_le();
        let payload_len = header.get_u16_le() as usize;

        if payload_len == 0 || payload_len % 2 != 0 {
            return Err(RejectReason::InvalidPayloadLen);
        }
        let declared_len = samples_per_channel as usize * channels as usize * 2;
        if payload_len != declared_len {
            return Err(RejectReason::InvalidPayloadLen);
        }
        if HEADER_SIZE + payload_len > data.len() {
            return Err(RejectReason::TruncatedPayload);
        }

        let payload_bytes = &data[HEADER_SIZE..HEADER_SIZE + payload_len];
        let mut payload = Vec::with_capacity(payload_len / 2);
        for chunk in payload_bytes.chunks_exact(2) {
            payload.push(i16::from_le_bytes([chunk[0], chunk[1]]));
        }

        Ok(AudioFrame {
            sample_rate,
            channels,
            seq,
            send_time_us,
            samples_per_channel,
            payload,
        })
    }

    /// Encode a frame back into wire bytes. Used by tests and any loopback
    /// tooling; the production receive path never needs to encode.
    pub fn encode(frame: &AudioFrame) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + frame.payload.len() * 2);
        buf.put_slice(&PACKET_MAGIC);
        buf.put_u8(PROTOCOL_VERSION);
        buf.put_u8(CODEC_PCM16LE);
        buf.put_u8(frame.channels);
        buf.put_u8(0); // reserved
        buf.put_u32_le(frame.sample_rate);
        buf.put_u32_le(frame.seq);
        buf.put_u64_le(frame.send_time_us);
        buf.put_u16_le(frame.samples_per_channel);
        buf.put_u16_le((frame.payload.len() * 2) as u16);
        for sample in &frame.payload {
            buf.put_i16_le(*sample);
        }
        buf.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_frame() -> AudioFrame {
        AudioFrame {
            sample_rate: 48_000,
            channels: 1,
            seq: 7,
            send_time_us: 123_456_789,
            samples_per_channel: 4,
            payload: vec![1, -1, 32767, -32768],
        }
    }

    #[test]
    fn round_trips_a_valid_frame() {
        let frame = sample_frame();
        let wire = PacketCodec::encode(&frame);
        let parsed = PacketCodec::parse(&wire).expect("should parse");

        assert_eq!(parsed.sample_rate, frame.sample_rate);
        assert_eq!(parsed.channels, frame.channels);
        assert_eq!(parsed.seq, frame.seq);
        assert_eq!(parsed.send_time_us, frame.send_time_us);
        assert_eq!(parsed.samples_per_channel, frame.samples_per_channel);
        assert_eq!(parsed.payload, frame.payload);
        assert!(parsed.is_well_formed());
    }

    #[test]
    fn rejects_too_short() {
        let buf = vec![0u8; HEADER_SIZE - 1];
        assert_eq!(PacketCodec::parse(&buf), Err(RejectReason::TooShort));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut wire = PacketCodec::encode(&sample_frame()).to_vec();
        wire[0] = b'X';
        assert_eq!(PacketCodec::parse(&wire), Err(RejectReason::BadMagic));
    }

    #[test]
    fn rejects_unsupported_version() {
        let mut wire = PacketCodec::encode(&sample_frame()).to_vec();
        wire[4] = 2;
        assert_eq!(
            PacketCodec::parse(&wire),
            Err(RejectReason::UnsupportedVersion)
        );
    }

    #[test]
    fn rejects_unsupported_codec() {
        let mut wire = PacketCodec::encode(&sample_frame()).to_vec();
        wire[5] = 1;
        assert_eq!(
            PacketCodec::parse(&wire),
            Err(RejectReason::UnsupportedCodec)
        );
    }

    #[test]
    fn rejects_invalid_channels() {
        let mut wire = PacketCodec::encode(&sample_frame()).to_vec();
        wire[6] = 3;
        assert_eq!(
            PacketCodec::parse(&wire),
            Err(RejectReason::InvalidChannels)
        );
    }

    #[test]
    fn rejects_zero_payload_len_exactly_at_header_boundary() {
        // 28 bytes, payload_len = 0 encoded in the header.
        let mut wire = PacketCodec::encode(&sample_frame()).to_vec();
        wire.truncate(HEADER_SIZE);
        wire[26] = 0;
        wire[27] = 0;
        assert_eq!(
            PacketCodec::parse(&wire),
            Err(RejectReason::InvalidPayloadLen)
        );
    }

    #[test]
    fn rejects_odd_payload_len() {
        let mut wire = PacketCodec::encode(&sample_frame()).to_vec();
        // Bump the declared payload length by one without extending the buffer's
        // trailing sample, making it both odd and truncated; odd must win if checked first.
        wire[26] = 7;
        wire[27] = 0;
        assert_eq!(
            PacketCodec::parse(&wire),
            Err(RejectReason::InvalidPayloadLen)
        );
    }

    #[test]
    fn rejects_payload_overrunning_buffer() {
        let mut wire = PacketCodec::encode(&sample_frame()).to_vec();
        wire[26] = 200;
        wire[27] = 0;
        assert_eq!(
            PacketCodec::parse(&wire),
            Err(RejectReason::TruncatedPayload)
        );
    }

    proptest::proptest! {
        #[test]
        fn parse_never_panics(data: Vec<u8>) {
            let _ = PacketCodec::parse(&data);
        }

        #[test]
        fn accepted_frames_always_have_matching_payload_len(
            channels in proptest::sample::select(vec![1u8, 2u8]),
            samples_per_channel in 1u16..960,
            sample_rate in 8_000u32..192_000,
            seq in proptest::num::u32::ANY,
            send_time_us in proptest::num::u64::ANY,
            samples in proptest::collection::vec(proptest::num::i16::ANY, 0..1920),
        ) {
            let payload_len = samples_per_channel as usize * channels as usize;
            let mut payload = samples;
            payload.resize(payload_len, 0);

            let frame = AudioFrame {
                sample_rate,
                channels,
                seq,
                send_time_us,
                samples_per_channel,
                payload,
            };
            let wire = PacketCodec::encode(&frame);
            let parsed = PacketCodec::parse(&wire).expect("well-formed frame must parse");
            prop_assert_eq!(parsed.payload.len(), parsed.expected_len());
            prop_assert!(parsed.channels == 1 || parsed.channels == 2);
        }

        /// §8's first testable invariant: parse either rejects or returns a
        /// frame whose payload length equals samples_per_channel * channels *
        /// 2 bytes. Mutating the declared `samples_per_channel` field alone,
        /// leaving the actual payload bytes and `payload_len` untouched, must
        /// never be accepted as well-formed.
        #[test]
        fn shape_mismatch_between_declared_samples_and_payload_is_rejected(
            channels in proptest::sample::select(vec![1u8, 2u8]),
            samples_per_channel in 1u16..960,
            bogus_samples_per_channel in 1u16..960,
            sample_rate in 8_000u32..192_000,
            seq in proptest::num::u32::ANY,
            send_time_us in proptest::num::u64::ANY,
        ) {
            prop_assume!(bogus_samples_per_channel != samples_per_channel);

            let payload_len = samples_per_channel as usize * channels as usize;
            let frame = AudioFrame {
                sample_rate,
                channels,
                seq,
                send_time_us,
                samples_per_channel,
                payload: vec![0i16; payload_len],
            };
            let mut wire = PacketCodec::encode(&frame).to_vec();
            // samples_per_channel sits at header offset 8 + 4 + 4 + 8 = 24.
            wire[24..26].copy_from_slice(&bogus_samples_per_channel.to_le_bytes());

            match PacketCodec::parse(&wire) {
                Err(_) => {}
                Ok(parsed) => prop_assert_eq!(parsed.payload.len(), parsed.expected_len()),
            }
        }
    }
}
