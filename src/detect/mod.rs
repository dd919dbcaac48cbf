mod backend;
mod backends;
mod nms;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::{StubBackend, StubResponse};
#[cfg(feature = "backend-tract")]
pub use backends::{TractBackend, TractSettings};
pub use nms::non_max_suppression;
pub use registry::{BackendRegistry, SharedBackend};
pub use result::{BoundingBox, Detection};
