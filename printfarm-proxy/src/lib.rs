//! Per-session proxying between clients and printers on the private network:
//! control socket relay, motion-JPEG reframing and resource fetches.

pub mod control;
pub mod error;
pub mod frame;
pub mod multipart;
pub mod relay;
pub mod resource;
pub mod session;
pub mod upstream;
pub mod video;

pub use error::{ProxyError, ProxyResult};
pub use relay::{ControlFrame, RelayOutcome};
pub use resource::{FetchedResource, ResourceFetcher};
pub use session::SessionTracker;
pub use upstream::UpstreamEndpoints;
pub use video::VideoStreamProxy;
