//! 수신 큐 -- 생산자와 단일 소비자 사이의 유한 FIFO
//!
//! `Mutex<VecDeque>`와 두 개의 `Condvar`로 구성됩니다.
//! - `not_empty`: 소비자 대기 (레코드 도착 또는 close)
//! - `space`: Suspend/Block 전략에서 대기 중인 생산자 (low watermark 이하로 내려가거나 close)
//!
//! 큐는 깊이가 바뀔 때마다 [`BackpressureController`]에 관측값을 기록하므로
//! 컨트롤러의 판단은 항상 큐 잠금 안에서 본 깊이와 일치합니다.

use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use logflux_core::types::LogRecord;

use crate::backpressure::{BackpressureAction, BackpressureController};

/// 제출 결과
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// 큐에 들어감
    Enqueued,
    /// 가장 오래된 레코드를 축출한 뒤 들어감
    EnqueuedAfterEviction,
    /// 버려짐 (DropNew 또는 하드 용량 초과)
    Dropped,
    /// 큐가 닫혀 거부됨
    Closed,
}

impl Admission {
    /// 레코드가 큐에 들어갔는지 확인합니다.
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::Enqueued | Self::EnqueuedAfterEviction)
    }
}

/// 소비자 측 `pop_timeout` 결과
#[derive(Debug)]
pub enum Pop {
    Record(LogRecord),
    /// 제한 시간 동안 레코드가 없음
    Idle,
    /// 닫혔고 비어 있음
    Closed,
}

struct QueueInner {
    items: VecDeque<LogRecord>,
    closed: bool,
}

/// 백프레셔를 적용하는 유한 수신 큐
pub struct AdmissionQueue {
    inner: Mutex<QueueInner>,
    not_empty: Condvar,
    space: Condvar,
    capacity: usize,
    suspend_timeout: Duration,
    controller: Arc<BackpressureController>,
}

impl AdmissionQueue {
    pub fn new(
        capacity: usize,
        suspend_timeout: Duration,
        controller: Arc<BackpressureController>,
    ) -> Self {
        Self {
            inner: Mutex::new(QueueInner {
                items: VecDeque::with_capacity(capacity.min(10_000)),
                closed: false,
            }),
            not_empty: Condvar::new(),
            space: Condvar::new(),
            capacity,
            suspend_timeout,
            controller,
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 레코드를 제출합니다.
    ///
    /// Suspend/Block 전략에서는 호출 스레드가 대기할 수 있습니다.
    pub fn submit(&self, record: LogRecord) -> Admission {
        let mut inner = self.lock();
        if inner.closed {
            return Admission::Closed;
        }

        self.controller.record_queue_size(inner.items.len());
        let admission = match self.controller.decide() {
            BackpressureAction::None => {
                if inner.items.len() >= self.capacity {
                    Admission::Dropped
                } else {
                    inner.items.push_back(record);
                    Admission::Enqueued
                }
            }
            BackpressureAction::DropNew => Admission::Dropped,
            BackpressureAction::DropOldest => {
                if inner.items.pop_front().is_some() {
                    inner.items.push_back(record);
                    Admission::EnqueuedAfterEviction
                } else {
                    inner.items.push_back(record);
                    Admission::Enqueued
                }
            }
            BackpressureAction::Suspend => {
                let deadline = Instant::now() + self.suspend_timeout;
                while !inner.closed && !self.controller.should_resume() {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    let (guard, _) = self
                        .space
                        .wait_timeout(inner, deadline - now)
                        .unwrap_or_else(PoisonError::into_inner);
                    inner = guard;
                }
                if inner.closed {
                    Admission::Closed
                } else if inner.items.len() < self.capacity {
                    inner.items.push_back(record);
                    Admission::Enqueued
                } else {
                    Admission::Dropped
                }
            }
            BackpressureAction::Block => {
                while !inner.closed
                    && (!self.controller.should_resume() || inner.items.len() >= self.capacity)
                {
                    inner = self.space.wait(inner).unwrap_or_else(PoisonError::into_inner);
                }
                if inner.closed {
                    Admission::Closed
                } else {
                    inner.items.push_back(record);
                    Admission::Enqueued
                }
            }
        };

        if admission.is_accepted() {
            self.controller.record_queue_size(inner.items.len());
            self.not_empty.notify_one();
        }
        admission
    }

    /// 레코드 하나를 꺼냅니다. 최대 `timeout`만큼 대기합니다.
    ///
    /// 닫힌 뒤에도 남은 레코드는 모두 꺼낼 수 있습니다.
    pub fn pop_timeout(&self, timeout: Duration) -> Pop {
        let deadline = Instant::now() + timeout;
        let mut inner = self.lock();
        loop {
            if let Some(record) = inner.items.pop_front() {
                let len = inner.items.len();
                self.controller.record_queue_size(len);
                if self.controller.should_resume() || len + 1 == self.capacity {
                    self.space.notify_all();
                }
                return Pop::Record(record);
            }
            if inner.closed {
                return Pop::Closed;
            }
            let now = Instant::now();
            if now >= deadline {
                return Pop::Idle;
            }
            let (guard, _) = self
                .not_empty
                .wait_timeout(inner, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            inner = guard;
        }
    }

    /// 큐를 닫고 대기 중인 모든 스레드를 깨웁니다.
    pub fn close(&self) {
        let mut inner = self.lock();
        inner.closed = true;
        drop(inner);
        self.not_empty.notify_all();
        self.space.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
