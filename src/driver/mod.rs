//! Media driver context and the command-and-control file layout

pub mod cnc;
pub mod context;

pub use cnc::{
    is_driver_active, CncFile, CncMetadata, BROADCAST_BUFFER_TRAILER_LENGTH, CNC_FILE,
    CNC_METADATA_LENGTH, CNC_VERSION,
};
pub use context::{
    aeron_dir_from_env, default_aeron_dir, dir_delete, parse_bool, parse_u64, DriverContext,
    ThreadingMode,
};
