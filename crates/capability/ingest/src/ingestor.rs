//! 摄入入口：解码 → 校验 → 发布。

use crate::decoder::{DecodeError, Decoded, ReadingDecoder};
use api_contract::IngestResponse;
use domain::{CancelSignal, InvalidPolicy, ReadingPayload};
use lada_transport::{Publisher, TransportError};
use std::sync::Arc;
use tokio::io::AsyncRead;
use tracing::{Instrument, debug, info, info_span, warn};

/// 错误分类（供外部 HTTP 层映射状态码）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Client,
    Server,
    Timeout,
}

/// 摄入错误。
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error("encode error: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("publish error: {0}")]
    Publish(#[source] TransportError),
    #[error("ingest cancelled")]
    Cancelled,
}

impl IngestError {
    pub fn class(&self) -> ErrorClass {
        match self {
            IngestError::Decode(_) => ErrorClass::Client,
            IngestError::Encode(_) | IngestError::Publish(_) => ErrorClass::Server,
            IngestError::Cancelled => ErrorClass::Timeout,
        }
    }
}

/// 单次摄入结果。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub published: usize,
    /// 仅在 [`InvalidPolicy::Report`] 下累积
    pub invalid: Vec<ReadingPayload>,
}

impl IngestReport {
    pub fn into_response(self) -> IngestResponse {
        IngestResponse {
            invalid: self.invalid,
        }
    }
}

/// 摄入器：每条合法读数发布完成后才解码下一条（自然背压）。
#[derive(Clone)]
pub struct Ingestor {
    publisher: Arc<dyn Publisher>,
    policy: InvalidPolicy,
}

impl Ingestor {
    pub fn new(publisher: Arc<dyn Publisher>, policy: InvalidPolicy) -> Self {
        Self { publisher, policy }
    }

    pub fn policy(&self) -> InvalidPolicy {
        self.policy
    }

    /// 摄入一个读数流。
    ///
    /// - 畸形记录：整次调用中止（Client）；之前已发布的读数不会撤回
    /// - 不合法记录：按策略跳过或累积到报告中，不中止
    /// - 发布失败：整次调用中止（Server），不再解码后续记录
    /// - 取消：优先于其它错误，返回 Timeout
    pub async fn ingest<R>(
        &self,
        reader: R,
        cancel: &CancelSignal,
    ) -> Result<IngestReport, IngestError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let ids = lada_telemetry::new_request_ids();
        let span = info_span!(
            "ingest",
            ingest_id = %ids.request_id,
            trace_id = %ids.trace_id
        );
        self.run(reader, cancel).instrument(span).await
    }

    async fn run<R>(&self, reader: R, cancel: &CancelSignal) -> Result<IngestReport, IngestError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let mut decoder = ReadingDecoder::new(reader);
        let mut report = IngestReport::default();

        loop {
            if cancel.is_cancelled() {
                return Err(IngestError::Cancelled);
            }
            let decoded = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(IngestError::Cancelled),
                decoded = decoder.decode_next() => decoded,
            };
            let decoded = match decoded {
                Ok(decoded) => decoded,
                Err(err) => {
                    warn!(target: "lada.ingest", error = %err, "ingest_malformed");
                    return Err(err.into());
                }
            };

            match decoded {
                Decoded::End => break,
                Decoded::Invalid(payload, reason) => {
                    lada_telemetry::record_reading_decoded();
                    lada_telemetry::record_reading_invalid();
                    warn!(
                        target: "lada.ingest",
                        sensor = %payload.sensor,
                        value = payload.value,
                        reason = %reason,
                        "reading_invalid"
                    );
                    if self.policy == InvalidPolicy::Report {
                        report.invalid.push(payload);
                    }
                }
                Decoded::Reading(reading) => {
                    lada_telemetry::record_reading_decoded();
                    let body = serde_json::to_vec(&reading).map_err(IngestError::Encode)?;
                    if cancel.is_cancelled() {
                        return Err(IngestError::Cancelled);
                    }
                    let published = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(IngestError::Cancelled),
                        published = self.publisher.publish(body) => published,
                    };
                    if let Err(err) = published {
                        lada_telemetry::record_publish_failure();
                        warn!(target: "lada.ingest", error = %err, "reading_publish_failed");
                        return Err(IngestError::Publish(err));
                    }
                    lada_telemetry::record_reading_published();
                    report.published += 1;
                    debug!(
                        target: "lada.ingest",
                        sensor = %reading.sensor,
                        value = reading.value,
                        timestamp = %reading.timestamp,
                        "reading_ingested"
                    );
                }
            }
        }

        info!(
            target: "lada.ingest",
            published = report.published,
            invalid = report.invalid.len(),
            "ingest_completed"
        );
        Ok(report)
    }
}
