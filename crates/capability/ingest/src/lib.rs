//! 读数摄入：流式解码 + 逐条发布。

mod decoder;
mod ingestor;

pub use decoder::{DecodeError, Decoded, MAX_RECORD_BYTES, ReadingDecoder};
pub use ingestor::{ErrorClass, IngestError, IngestReport, Ingestor};
