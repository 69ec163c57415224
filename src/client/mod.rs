//! Client-side core: the conductor state machine and the user-facing handles

pub mod conductor;
pub mod context;
pub mod events;
pub mod image;
pub mod log_buffers;
pub mod proxy;
pub mod publication;
pub mod registration;
pub mod subscription;

pub use conductor::ClientConductor;
pub use context::{
    ClientContext, ErrorHandler, OnAvailableImage, OnNewPublication, OnNewSubscription,
    OnUnavailableImage,
};
pub use events::{DriverEvent, DriverEventSource, NullEventSource};
pub use image::Image;
pub use log_buffers::LogBuffers;
pub use proxy::DriverProxy;
pub use publication::{ExclusivePublication, Publication};
pub use registration::RegistrationStatus;
pub use subscription::{ImageArray, Subscription};
