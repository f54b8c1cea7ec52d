mod backend;
mod backends;
mod result;
mod ssd;

pub use backend::{
    build_detector, DetectorSettings, InferenceBackend, InferenceTarget, PersonDetector,
};
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use result::{detect_intrusion, DetectionBox};
pub use ssd::{decode_ssd_rows, SSD_ROW_LEN};
