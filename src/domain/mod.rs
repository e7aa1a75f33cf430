mod container;
pub mod error;
mod estimate;
mod http;
pub mod image;
mod sample;
pub mod traits;

pub use container::{ContainerId, ContainerState, ProcessStatus};
pub use error::{HarnessError, Result};
pub use estimate::{Estimate, MetaData, SampleSize};
pub use http::{JSON_CONTENT_TYPE, Method, RequestBody, Response};
pub use sample::Sample;
pub use traits::{BuildRequest, ContainerProcess, ContainerRuntime};
