//! 문서 싱크 계약
//!
//! 배치 작성기는 [`DocumentSink`]에 [`BulkRequest`]를 커밋하고, 싱크는
//! 항목별 성공/실패를 담은 [`BulkResponse`] 또는 배치 전체 실패([`SinkError`])를 돌려줍니다.
//! 재시도 정책이 필요하다면 싱크 구현이 책임집니다.

use std::fmt::Write as _;
use std::future::Future;
use std::time::Duration;

/// 요청 하나당 더해지는 추정 오버헤드 (바이트)
pub const REQUEST_OVERHEAD_BYTES: u64 = 50;

/// 문서 한 건의 색인 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRequest {
    /// 대상 인덱스 이름
    pub index: String,
    /// 문서 타입 태그
    pub doc_type: String,
    /// 직렬화된 JSON 문서
    pub source: String,
}

impl IndexRequest {
    pub fn new(index: impl Into<String>, doc_type: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: doc_type.into(),
            source: source.into(),
        }
    }

    /// 배치 크기 계산에 쓰이는 추정 바이트 수
    pub fn estimated_size_bytes(&self) -> u64 {
        self.source.len() as u64 + REQUEST_OVERHEAD_BYTES
    }
}

/// 한 번에 커밋되는 요청 묶음
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkRequest {
    /// 작성기 내에서 단조 증가하는 실행 번호
    pub execution_id: u64,
    pub requests: Vec<IndexRequest>,
    /// 요청들의 추정 크기 합
    pub estimated_size_bytes: u64,
}

impl BulkRequest {
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// 개별 항목의 커밋 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItemResponse {
    pub index: String,
    pub doc_type: String,
    /// 실패 사유. 성공이면 `None`
    pub failure: Option<String>,
}

impl BulkItemResponse {
    /// 성공 항목
    pub fn success(request: &IndexRequest) -> Self {
        Self {
            index: request.index.clone(),
            doc_type: request.doc_type.clone(),
            failure: None,
        }
    }

    /// 실패 항목
    pub fn failed(request: &IndexRequest, reason: impl Into<String>) -> Self {
        Self {
            index: request.index.clone(),
            doc_type: request.doc_type.clone(),
            failure: Some(reason.into()),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.failure.is_some()
    }
}

/// 배치 커밋 결과
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BulkResponse {
    /// 요청 순서와 같은 순서의 항목별 결과
    pub items: Vec<BulkItemResponse>,
    /// 싱크가 보고한 소요 시간
    pub took: Duration,
}

impl BulkResponse {
    /// 실패한 항목이 하나라도 있는지 확인합니다.
    pub fn has_failures(&self) -> bool {
        self.items.iter().any(BulkItemResponse::is_failed)
    }

    /// 실패 항목 수
    pub fn failure_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_failed()).count()
    }

    /// 실패 항목을 `[위치]: index [..], type [..], message [..]` 형식으로 나열합니다.
    pub fn failure_message(&self) -> String {
        let mut message = String::from("failure in bulk execution:");
        for (pos, item) in self.items.iter().enumerate() {
            if let Some(reason) = &item.failure {
                let _ = write!(
                    message,
                    "\n[{pos}]: index [{}], type [{}], message [{reason}]",
                    item.index, item.doc_type
                );
            }
        }
        message
    }
}

/// 배치 전체의 커밋 실패
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// 싱크에 연결할 수 없음
    #[error("sink unavailable: {0}")]
    Unavailable(String),

    /// 싱크가 배치를 거부함
    #[error("bulk request rejected: {0}")]
    Rejected(String),

    #[error("sink io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 문서 싱크
///
/// 여러 플러시 태스크가 동시에 `commit`을 호출할 수 있습니다.
pub trait DocumentSink: Send + Sync + 'static {
    /// 배치를 커밋합니다.
    fn commit(
        &self,
        request: BulkRequest,
    ) -> impl Future<Output = Result<BulkResponse, SinkError>> + Send;
}
