//! Data channels used for chunked transfers

mod data_channel;

pub use data_channel::{
    is_transfer_label, DataChannel, CONTROL_CHANNEL_LABEL, TRANSFER_CHANNEL_PREFIX,
};
