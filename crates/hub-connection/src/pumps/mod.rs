//! Read and write pumps of the event channel.

pub(crate) mod read;
pub(crate) mod write;
