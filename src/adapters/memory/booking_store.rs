use crate::domain::{
    AuditQuery, Booking, BookingId, BookingLogEntry, CivilDate, LogEntryId, ResourceId, UserId,
};
use crate::ports::{
    AuditLog, BookingStore as BookingStoreTrait, DuplicateProbe, StatusChange, StoreError,
    StoreResult,
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Default)]
struct State {
    bookings: HashMap<BookingId, Booking>,
    log: Vec<BookingLogEntry>,
}

/// In-memory implementation of BookingStore and AuditLog
///
/// Bookings and log entries live behind one mutex, so a status change and its
/// log entry are applied in the same critical section.
/// Failure switches let tests simulate an unavailable store, a failing audit
/// log, or a slow backend.
#[derive(Default)]
pub struct BookingStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
    fail_audit_writes: AtomicBool,
    latency_ms: AtomicU64,
}

impl BookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `StoreError::Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Make every log write fail with `StoreError::AuditWrite`
    pub fn fail_audit_writes(&self, fail: bool) {
        self.fail_audit_writes.store(fail, Ordering::SeqCst);
    }

    /// Delay every call, and every exported log entry, by the given duration
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::SeqCst);
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn round_trip(&self) -> StoreResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "in-memory store is marked unavailable".into(),
            ));
        }
        Ok(())
    }

    fn check_audit_writable(&self) -> StoreResult<()> {
        if self.fail_audit_writes.load(Ordering::SeqCst) {
            return Err(StoreError::AuditWrite(
                "in-memory audit log rejected the write".into(),
            ));
        }
        Ok(())
    }
}

fn newest_date_first(bookings: &mut [Booking]) {
    bookings.sort_by(|a, b| {
        (b.date, b.start_time, b.created_at).cmp(&(a.date, a.start_time, a.created_at))
    });
}

#[async_trait]
impl BookingStoreTrait for BookingStore {
    async fn insert(&self, booking: Booking, entry: BookingLogEntry) -> StoreResult<()> {
        self.round_trip().await?;
        let mut state = self.lock();

        let window = booking.window();
        let taken = state
            .bookings
            .values()
            .filter(|b| {
                b.resource_id == booking.resource_id && b.conflicts_with(booking.date, &window)
            })
            .min_by_key(|b| b.created_at)
            .map(|b| b.id);
        if let Some(existing) = taken {
            return Err(StoreError::SlotTaken(existing));
        }

        if let Some(key) = booking.idempotency_key.as_deref() {
            let key_taken = state.bookings.values().any(|b| {
                b.requester_id == booking.requester_id && b.idempotency_key.as_deref() == Some(key)
            });
            if key_taken {
                return Err(StoreError::IdempotencyKeyTaken(key.to_string()));
            }
        }

        self.check_audit_writable()?;
        state.log.push(entry);
        state.bookings.insert(booking.id, booking);
        Ok(())
    }

    async fn apply_transition(
        &self,
        change: StatusChange,
        entry: BookingLogEntry,
    ) -> StoreResult<Booking> {
        self.round_trip().await?;
        let mut state = self.lock();

        let current = state
            .bookings
            .get(&change.booking_id)
            .ok_or(StoreError::BookingNotFound(change.booking_id))?;
        if current.status != change.expected {
            return Err(StoreError::StatusMismatch {
                expected: change.expected,
                actual: current.status,
            });
        }

        self.check_audit_writable()?;
        let mut updated = current.clone();
        updated.status = change.new;
        updated.status_changed_at = change.changed_at;

        state.log.push(entry);
        state.bookings.insert(updated.id, updated.clone());
        Ok(updated)
    }

    async fn get(&self, booking_id: BookingId) -> StoreResult<Option<Booking>> {
        self.round_trip().await?;
        Ok(self.lock().bookings.get(&booking_id).cloned())
    }

    async fn find_by_resource(
        &self,
        resource_id: &ResourceId,
        from: CivilDate,
        to: CivilDate,
    ) -> StoreResult<Vec<Booking>> {
        self.round_trip().await?;
        let mut found: Vec<Booking> = self
            .lock()
            .bookings
            .values()
            .filter(|b| &b.resource_id == resource_id && b.date >= from && b.date <= to)
            .cloned()
            .collect();
        found.sort_by(|a, b| (a.date, a.start_time).cmp(&(b.date, b.start_time)));
        Ok(found)
    }

    async fn find_active_by_resource(
        &self,
        resource_id: &ResourceId,
    ) -> StoreResult<Vec<Booking>> {
        self.round_trip().await?;
        Ok(self
            .lock()
            .bookings
            .values()
            .filter(|b| &b.resource_id == resource_id && b.status.is_active())
            .cloned()
            .collect())
    }

    async fn find_by_requester(&self, requester_id: &UserId) -> StoreResult<Vec<Booking>> {
        self.round_trip().await?;
        let mut found: Vec<Booking> = self
            .lock()
            .bookings
            .values()
            .filter(|b| &b.requester_id == requester_id)
            .cloned()
            .collect();
        newest_date_first(&mut found);
        Ok(found)
    }

    async fn list_all(&self) -> StoreResult<Vec<Booking>> {
        self.round_trip().await?;
        let mut found: Vec<Booking> = self.lock().bookings.values().cloned().collect();
        newest_date_first(&mut found);
        Ok(found)
    }

    async fn find_duplicate(&self, probe: &DuplicateProbe) -> StoreResult<Option<Booking>> {
        self.round_trip().await?;
        Ok(self
            .lock()
            .bookings
            .values()
            .filter(|b| probe.matches(b))
            .max_by_key(|b| b.created_at)
            .cloned())
    }
}

#[async_trait]
impl AuditLog for BookingStore {
    async fn append(&self, entry: BookingLogEntry) -> StoreResult<LogEntryId> {
        self.round_trip().await?;
        self.check_audit_writable()?;
        let id = entry.id;
        self.lock().log.push(entry);
        Ok(id)
    }

    async fn query(&self, filter: &AuditQuery, limit: usize) -> StoreResult<Vec<BookingLogEntry>> {
        self.round_trip().await?;
        let mut found: Vec<BookingLogEntry> = self
            .lock()
            .log
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        // 同時刻のエントリは追記順の逆
        found.reverse();
        found.sort_by(|a, b| b.occurred_at.cmp(&a.occurred_at));
        found.truncate(limit);
        Ok(found)
    }

    fn stream_all(&self) -> BoxStream<'_, StoreResult<BookingLogEntry>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return stream::once(async {
                Err(StoreError::Unavailable(
                    "in-memory store is marked unavailable".into(),
                ))
            })
            .boxed();
        }
        let mut entries = self.lock().log.clone();
        entries.sort_by_key(|e| e.occurred_at);
        let latency = Duration::from_millis(self.latency_ms.load(Ordering::SeqCst));
        stream::iter(entries)
            .then(move |entry| async move {
                if !latency.is_zero() {
                    tokio::time::sleep(latency).await;
                }
                Ok(entry)
            })
            .boxed()
    }
}
