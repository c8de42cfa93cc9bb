//! Real-time PCM16 audio receiver core: wire-protocol parsing, a bounded
//! jitter buffer with an adaptive controller, and the playout pipeline that
//! drives a local audio output from a lossy, jittery packet stream.

pub mod audio;
pub mod constants;
pub mod control;
pub mod error;
pub mod net;
pub mod protocol;
pub mod session;

pub use error::{AudioSinkError, NetworkError, ReceiverError, Result};
pub use protocol::{AudioFrame, PacketCodec, RejectReason};
pub use session::{SessionConfig, SessionSupervisor};
