//! Core traits for coders and caches

mod cache;
mod coder;

pub use cache::Cache;
pub use coder::{CacheDecoder, CacheEncoder, JsonDecoder, JsonEncoder, RedisRepresentable};

#[cfg(feature = "msgpack")]
pub use coder::{MsgPackDecoder, MsgPackEncoder};

#[cfg(feature = "bincode")]
pub use coder::{BincodeDecoder, BincodeEncoder};
