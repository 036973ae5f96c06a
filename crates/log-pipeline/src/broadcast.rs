//! 브로드캐스트 허브 -- 재생 버퍼를 가진 팬아웃
//!
//! 모든 구독자는 하나의 append-only 링(`Arc<LogRecord>` + 시퀀스 번호)을 공유하고
//! 각자 독립된 커서를 가집니다. 새 구독자는 최근 `replay_size`개부터 읽기 시작하여
//! 재생 버퍼를 받은 뒤 실시간 레코드로 이어집니다.
//!
//! 링은 `max(replay_size, live_capacity)`개만 보관합니다. 느린 구독자의 커서가 보관
//! 범위 밖으로 밀려나면 [`BroadcastError::Lagged`]로 건너뛴 개수를 알리고 가장 오래된
//! 보관 레코드부터 다시 읽습니다. 발행자는 구독자를 기다리지 않습니다.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use logflux_core::types::{LogLevel, LogRecord};

/// 구독 수신 에러
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BroadcastError {
    /// 보관 범위를 벗어나 건너뛴 레코드 수
    #[error("subscriber lagged behind by {0} records")]
    Lagged(u64),
    /// 허브가 닫혔고 남은 레코드가 없음
    #[error("broadcast hub closed")]
    Closed,
}

struct HubInner {
    entries: VecDeque<(u64, Arc<LogRecord>)>,
    next_seq: u64,
    closed: bool,
}

impl HubInner {
    fn first_seq(&self) -> u64 {
        self.entries.front().map_or(self.next_seq, |(seq, _)| *seq)
    }
}

/// 재생 버퍼를 가진 브로드캐스트 허브
pub struct BroadcastHub {
    inner: Mutex<HubInner>,
    notify: Notify,
    retain: usize,
    replay_size: usize,
    min_level: AtomicU8,
    subscribers: AtomicUsize,
}

impl BroadcastHub {
    pub fn new(replay_size: usize, live_capacity: usize, min_level: LogLevel) -> Arc<Self> {
        let retain = replay_size.max(live_capacity).max(1);
        Arc::new(Self {
            inner: Mutex::new(HubInner {
                entries: VecDeque::with_capacity(retain.min(10_000)),
                next_seq: 0,
                closed: false,
            }),
            notify: Notify::new(),
            retain,
            replay_size,
            min_level: AtomicU8::new(level_u8(min_level)),
            subscribers: AtomicUsize::new(0),
        })
    }

    fn lock(&self) -> MutexGuard<'_, HubInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 레코드를 발행합니다. 최소 레벨 미만이거나 닫혔으면 `false`.
    pub fn publish(&self, record: Arc<LogRecord>) -> bool {
        if record.level() < self.min_level() {
            return false;
        }
        let mut inner = self.lock();
        if inner.closed {
            return false;
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.push_back((seq, record));
        while inner.entries.len() > self.retain {
            inner.entries.pop_front();
        }
        drop(inner);
        self.notify.notify_waiters();
        true
    }

    /// 새 구독을 만듭니다. 재생 버퍼부터 시작합니다.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let inner = self.lock();
        let replay_start = inner.next_seq.saturating_sub(self.replay_size as u64);
        let cursor = replay_start.max(inner.first_seq());
        drop(inner);
        self.subscribers.fetch_add(1, Ordering::AcqRel);
        tracing::debug!(cursor, "new broadcast subscriber");
        Subscription {
            hub: Arc::clone(self),
            cursor,
        }
    }

    /// 허브를 닫습니다. 구독자는 남은 레코드를 읽은 뒤 `Closed`를 받습니다.
    pub fn close(&self) {
        self.lock().closed = true;
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.load(Ordering::Acquire)
    }

    pub fn min_level(&self) -> LogLevel {
        LogLevel::from_index(usize::from(self.min_level.load(Ordering::Acquire)))
            .unwrap_or(LogLevel::Debug)
    }

    pub fn set_min_level(&self, level: LogLevel) {
        self.min_level.store(level_u8(level), Ordering::Release);
    }

    /// 지금까지 발행된 레코드 수
    pub fn published(&self) -> u64 {
        self.lock().next_seq
    }
}

/// 허브 구독
pub struct Subscription {
    hub: Arc<BroadcastHub>,
    cursor: u64,
}

impl Subscription {
    /// 다음 레코드를 기다립니다.
    pub async fn recv(&mut self) -> Result<Arc<LogRecord>, BroadcastError> {
        let hub = Arc::clone(&self.hub);
        loop {
            let notified = hub.notify.notified();
            tokio::pin!(notified);
            // try_recv 이후의 발행을 놓치지 않도록 먼저 등록
            notified.as_mut().enable();

            if let Some(record) = self.try_recv()? {
                return Ok(record);
            }
            notified.await;
        }
    }

    /// 대기하지 않고 읽습니다. 읽을 레코드가 없으면 `Ok(None)`.
    pub fn try_recv(&mut self) -> Result<Option<Arc<LogRecord>>, BroadcastError> {
        let inner = self.hub.lock();
        let first = inner.first_seq();
        if self.cursor < first {
            let skipped = first - self.cursor;
            self.cursor = first;
            return Err(BroadcastError::Lagged(skipped));
        }
        if self.cursor < inner.next_seq {
            // cursor >= first 이므로 인덱스는 보관 범위 안
            let idx = usize::try_from(self.cursor - first).unwrap_or(usize::MAX);
            if let Some((_, record)) = inner.entries.get(idx) {
                self.cursor += 1;
                return Ok(Some(Arc::clone(record)));
            }
        }
        if inner.closed {
            return Err(BroadcastError::Closed);
        }
        Ok(None)
    }

    /// 아직 읽지 않은 보관 레코드 수
    pub fn pending(&self) -> u64 {
        let inner = self.hub.lock();
        inner.next_seq.saturating_sub(self.cursor.max(inner.first_seq()))
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.subscribers.fetch_sub(1, Ordering::AcqRel);
    }
}

fn level_u8(level: LogLevel) -> u8 {
    u8::try_from(level.index()).unwrap_or(0)
}
