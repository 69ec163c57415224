//! Error types and handling for the transport core

/// Result type alias for transport core operations
pub type Result<T> = std::result::Result<T, AeronError>;

/// Error taxonomy shared by the driver-side and client-side components
#[derive(Debug, thiserror::Error)]
pub enum AeronError {
    /// I/O related errors (file operations, mmap, etc.)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Memory allocation or mapping failures
    #[error("Memory error: {message}")]
    Memory { message: String },

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// The media driver has not responded within the allowed interval
    #[error("Driver timeout: {message}")]
    DriverTimeout { message: String },

    /// The media driver rejected a registration command
    #[error("Registration error {code}: {message}")]
    Registration { code: i32, message: String },

    /// A bounded shared resource is full (command ring, error log, ...)
    #[error("Resource exhausted: {resource}")]
    ResourceExhausted { resource: String },

    /// The client conductor has been terminated by an inter-service timeout
    #[error("Client conductor terminated: {message}")]
    ClientTerminated { message: String },

    /// Command encoding/decoding errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl AeronError {
    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create a memory error
    pub fn memory(message: impl Into<String>) -> Self {
        Self::Memory {
            message: message.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a driver timeout error
    pub fn driver_timeout(message: impl Into<String>) -> Self {
        Self::DriverTimeout {
            message: message.into(),
        }
    }

    /// Create a registration error from a driver error response
    pub fn registration(code: i32, message: impl Into<String>) -> Self {
        Self::Registration {
            code,
            message: message.into(),
        }
    }

    /// Create a resource exhausted error
    pub fn resource_exhausted(resource: impl Into<String>) -> Self {
        Self::ResourceExhausted {
            resource: resource.into(),
        }
    }

    /// Create a client terminated error
    pub fn client_terminated(message: impl Into<String>) -> Self {
        Self::ClientTerminated {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }
}

// Convert from common error types
impl From<std::io::Error> for AeronError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

impl From<bincode::Error> for AeronError {
    fn from(err: bincode::Error) -> Self {
        Self::serialization(format!("Bincode error: {}", err))
    }
}
