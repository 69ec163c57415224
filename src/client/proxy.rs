//! Client-to-driver command proxy over the to-driver ring

use std::sync::{
    atomic::{AtomicI64, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};

use crate::{
    error::{AeronError, Result},
    ringbuf::ManyToOneRingBuffer,
};

pub const ADD_PUBLICATION_MSG_TYPE_ID: i32 = 0x01;
pub const REMOVE_PUBLICATION_MSG_TYPE_ID: i32 = 0x02;
pub const ADD_EXCLUSIVE_PUBLICATION_MSG_TYPE_ID: i32 = 0x03;
pub const ADD_SUBSCRIPTION_MSG_TYPE_ID: i32 = 0x04;
pub const REMOVE_SUBSCRIPTION_MSG_TYPE_ID: i32 = 0x05;
pub const CLIENT_KEEPALIVE_MSG_TYPE_ID: i32 = 0x06;
pub const ADD_DESTINATION_MSG_TYPE_ID: i32 = 0x07;
pub const REMOVE_DESTINATION_MSG_TYPE_ID: i32 = 0x08;

/// Attempts before a full ring surfaces as `ResourceExhausted`
const OFFER_RETRY_LIMIT: usize = 3;

/// Add a publication or exclusive publication
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublicationCommand {
    pub client_id: i64,
    pub correlation_id: i64,
    pub stream_id: i32,
    pub channel: String,
}

/// Remove a previously registered resource
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoveCommand {
    pub client_id: i64,
    pub correlation_id: i64,
    pub registration_id: i64,
}

/// Add a subscription
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubscriptionCommand {
    pub client_id: i64,
    pub correlation_id: i64,
    pub stream_id: i32,
    pub channel: String,
}

/// Add or remove a destination on a multi-destination channel
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DestinationCommand {
    pub client_id: i64,
    pub correlation_id: i64,
    pub registration_id: i64,
    pub channel: String,
}

/// Keepalive heartbeat carrying only the correlated client
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CorrelatedCommand {
    pub client_id: i64,
    pub correlation_id: i64,
}

/// Encodes conductor commands into the to-driver ring and allocates the
/// registration ids the driver echoes back.
#[derive(Debug)]
pub struct DriverProxy {
    ring: Arc<ManyToOneRingBuffer>,
    client_id: i64,
    next_correlation_id: AtomicI64,
}

impl DriverProxy {
    pub fn new(ring: Arc<ManyToOneRingBuffer>, client_id: i64) -> Self {
        Self {
            ring,
            client_id,
            next_correlation_id: AtomicI64::new(1),
        }
    }

    /// Id identifying this client process to the driver
    pub fn client_id(&self) -> i64 {
        self.client_id
    }

    /// Allocate the next registration/correlation id
    pub fn next_correlation_id(&self) -> i64 {
        self.next_correlation_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn add_publication(&self, channel: &str, stream_id: i32) -> Result<i64> {
        let correlation_id = self.next_correlation_id();
        let command = PublicationCommand {
            client_id: self.client_id,
            correlation_id,
            stream_id,
            channel: channel.to_string(),
        };

        self.offer(ADD_PUBLICATION_MSG_TYPE_ID, &bincode::serialize(&command)?)?;
        Ok(correlation_id)
    }

    pub fn add_exclusive_publication(&self, channel: &str, stream_id: i32) -> Result<i64> {
        let correlation_id = self.next_correlation_id();
        let command = PublicationCommand {
            client_id: self.client_id,
            correlation_id,
            stream_id,
            channel: channel.to_string(),
        };

        self.offer(
            ADD_EXCLUSIVE_PUBLICATION_MSG_TYPE_ID,
            &bincode::serialize(&command)?,
        )?;
        Ok(correlation_id)
    }

    pub fn remove_publication(&self, registration_id: i64) -> Result<i64> {
        let correlation_id = self.next_correlation_id();
        let command = RemoveCommand {
            client_id: self.client_id,
            correlation_id,
            registration_id,
        };

        self.offer(REMOVE_PUBLICATION_MSG_TYPE_ID, &bincode::serialize(&command)?)?;
        Ok(correlation_id)
    }

    pub fn add_subscription(&self, channel: &str, stream_id: i32) -> Result<i64> {
        let correlation_id = self.next_correlation_id();
        let command = SubscriptionCommand {
            client_id: self.client_id,
            correlation_id,
            stream_id,
            channel: channel.to_string(),
        };

        self.offer(ADD_SUBSCRIPTION_MSG_TYPE_ID, &bincode::serialize(&command)?)?;
        Ok(correlation_id)
    }

    pub fn remove_subscription(&self, registration_id: i64) -> Result<i64> {
        let correlation_id = self.next_correlation_id();
        let command = RemoveCommand {
            client_id: self.client_id,
            correlation_id,
            registration_id,
        };

        self.offer(
            REMOVE_SUBSCRIPTION_MSG_TYPE_ID,
            &bincode::serialize(&command)?,
        )?;
        Ok(correlation_id)
    }

    pub fn add_destination(&self, registration_id: i64, channel: &str) -> Result<i64> {
        let correlation_id = self.next_correlation_id();
        let command = DestinationCommand {
            client_id: self.client_id,
            correlation_id,
            registration_id,
            channel: channel.to_string(),
        };

        self.offer(ADD_DESTINATION_MSG_TYPE_ID, &bincode::serialize(&command)?)?;
        Ok(correlation_id)
    }

    pub fn remove_destination(&self, registration_id: i64, channel: &str) -> Result<i64> {
        let correlation_id = self.next_correlation_id();
        let command = DestinationCommand {
            client_id: self.client_id,
            correlation_id,
            registration_id,
            channel: channel.to_string(),
        };

        self.offer(
            REMOVE_DESTINATION_MSG_TYPE_ID,
            &bincode::serialize(&command)?,
        )?;
        Ok(correlation_id)
    }

    pub fn client_keepalive(&self) -> Result<()> {
        let command = CorrelatedCommand {
            client_id: self.client_id,
            correlation_id: 0,
        };

        self.offer(CLIENT_KEEPALIVE_MSG_TYPE_ID, &bincode::serialize(&command)?)
    }

    fn offer(&self, msg_type_id: i32, payload: &[u8]) -> Result<()> {
        for _ in 0..OFFER_RETRY_LIMIT {
            if self.ring.write(msg_type_id, payload)? {
                return Ok(());
            }
            std::hint::spin_loop();
        }

        Err(AeronError::resource_exhausted("to-driver ring"))
    }
}
