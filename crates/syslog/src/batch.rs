//! 대기 중인 색인 요청 묶음
//!
//! [`Batch`]는 배치 작성기 태스크만 소유하며, 플러시 시점에 통째로 교체됩니다.
//! 한 요청이 두 배치에 들어가거나 교체 중에 사라지는 일은 구조상 없습니다.

use std::time::Instant;

use crate::sink::{BulkRequest, IndexRequest};

/// 누적 중인 배치
#[derive(Debug)]
pub struct Batch {
    requests: Vec<IndexRequest>,
    /// 누적 추정 크기 (바이트)
    estimated_bytes: u64,
    /// 첫 요청이 들어온 시점
    started: Option<Instant>,
}

impl Batch {
    /// 빈 배치를 생성합니다.
    pub fn new() -> Self {
        Self {
            requests: Vec::new(),
            estimated_bytes: 0,
            started: None,
        }
    }

    /// 요청을 추가하고 누적값을 갱신합니다.
    pub fn push(&mut self, request: IndexRequest) {
        if self.started.is_none() {
            self.started = Some(Instant::now());
        }
        self.estimated_bytes += request.estimated_size_bytes();
        self.requests.push(request);
    }

    /// 누적된 요청 수
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// 누적 추정 크기
    pub fn estimated_bytes(&self) -> u64 {
        self.estimated_bytes
    }

    /// 첫 요청이 들어온 시점 (비어있으면 `None`)
    pub fn started(&self) -> Option<Instant> {
        self.started
    }

    /// 개수 또는 크기 임계값에 도달했는지 확인합니다.
    pub fn should_flush(&self, bulk_actions: usize, bulk_size_bytes: u64) -> bool {
        self.requests.len() >= bulk_actions || self.estimated_bytes >= bulk_size_bytes
    }

    /// 누적된 내용을 벌크 요청으로 꺼내고 배치를 비웁니다.
    pub fn take(&mut self, execution_id: u64) -> BulkRequest {
        let batch = std::mem::take(self);
        BulkRequest {
            execution_id,
            requests: batch.requests,
            estimated_size_bytes: batch.estimated_bytes,
        }
    }
}

impl Default for Batch {
    fn default() -> Self {
        Self::new()
    }
}
