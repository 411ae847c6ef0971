//! 连续 JSON 对象流的增量解码。

use domain::{InvalidReading, Reading, ReadingPayload};
use tokio::io::{AsyncRead, AsyncReadExt};

const READ_CHUNK: usize = 8 * 1024;

/// 单条记录的最大字节数，超过视为畸形输入。
pub const MAX_RECORD_BYTES: usize = 1024 * 1024;

/// 单次解码结果。
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// 合法读数
    Reading(Reading),
    /// 能解析但不满足读数约束
    Invalid(ReadingPayload, InvalidReading),
    /// 输入结束
    End,
}

/// 解码错误（均视为客户端错误）。
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed record: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("record exceeds size limit")]
    TooLarge,
    #[error("read error: {0}")]
    Io(#[from] std::io::Error),
}

/// 从字节流逐条解码读数，缓冲区只保留当前未完成的记录。
pub struct ReadingDecoder<R> {
    reader: R,
    buf: Vec<u8>,
    eof: bool,
}

impl<R: AsyncRead + Unpin> ReadingDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(READ_CHUNK),
            eof: false,
        }
    }

    /// 解码下一条记录；只在当前缓冲不足以构成完整记录时才继续读取。
    pub async fn decode_next(&mut self) -> Result<Decoded, DecodeError> {
        loop {
            self.skip_whitespace();
            if self.buf.is_empty() {
                if self.eof {
                    return Ok(Decoded::End);
                }
                self.fill().await?;
                continue;
            }

            let (next, consumed) = {
                let mut stream =
                    serde_json::Deserializer::from_slice(&self.buf).into_iter::<ReadingPayload>();
                let next = stream.next();
                (next, stream.byte_offset())
            };
            match next {
                Some(Ok(payload)) => {
                    self.buf.drain(..consumed);
                    return Ok(classify(payload));
                }
                Some(Err(err)) if err.is_eof() && !self.eof => {
                    if self.buf.len() > MAX_RECORD_BYTES {
                        return Err(DecodeError::TooLarge);
                    }
                    self.fill().await?;
                }
                Some(Err(err)) => return Err(DecodeError::Malformed(err)),
                None => {
                    self.buf.clear();
                }
            }
        }
    }

    async fn fill(&mut self) -> Result<(), DecodeError> {
        let mut chunk = [0u8; READ_CHUNK];
        let read = self.reader.read(&mut chunk).await?;
        if read == 0 {
            self.eof = true;
        } else {
            self.buf.extend_from_slice(&chunk[..read]);
        }
        Ok(())
    }

    fn skip_whitespace(&mut self) {
        let leading = self
            .buf
            .iter()
            .take_while(|byte| byte.is_ascii_whitespace())
            .count();
        if leading > 0 {
            self.buf.drain(..leading);
        }
    }
}

fn classify(payload: ReadingPayload) -> Decoded {
    match payload.validate() {
        Ok(reading) => Decoded::Reading(reading),
        Err(reason) => Decoded::Invalid(payload, reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn whitespace_only_input_ends() {
        let mut decoder = ReadingDecoder::new(&b" \n\t \n"[..]);
        assert_eq!(decoder.decode_next().await.unwrap(), Decoded::End);
    }

    #[tokio::test]
    async fn truncated_record_is_malformed() {
        let mut decoder = ReadingDecoder::new(&br#"{"sensor":"speed","value":6"#[..]);
        assert!(matches!(
            decoder.decode_next().await,
            Err(DecodeError::Malformed(_))
        ));
    }
}
