//! Per-session state with serialized turn processing. Turns for the same
//! session never interleave; concurrent callers beyond the configured queue
//! depth are rejected instead of piling up.

use std::{
	collections::HashMap,
	ops::{Deref, DerefMut},
	sync::{
		Arc, Mutex,
		atomic::{AtomicU32, Ordering},
	},
};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use uuid::Uuid;

use aisle_domain::ConversationState;

use crate::{ServiceError, ServiceResult};

#[derive(Clone)]
struct Entry {
	state: Arc<AsyncMutex<ConversationState>>,
	in_flight: Arc<AtomicU32>,
}

pub struct SessionStore {
	queue_depth: u32,
	entries: Mutex<HashMap<Uuid, Entry>>,
}

impl SessionStore {
	pub fn new(queue_depth: u32) -> Self {
		Self { queue_depth, entries: Mutex::new(HashMap::new()) }
	}

	/// Acquires exclusive access to a session's state, creating the session
	/// on first use. Fails fast with [`ServiceError::SessionBusy`] once the
	/// queue depth is reached.
	pub async fn checkout(&self, session_id: Uuid) -> ServiceResult<SessionGuard> {
		let entry = {
			let mut entries = self.entries.lock().map_err(|_| ServiceError::InvalidRequest {
				message: "Session store is poisoned.".into(),
			})?;

			entries
				.entry(session_id)
				.or_insert_with(|| Entry {
					state: Arc::new(AsyncMutex::new(ConversationState::new(session_id))),
					in_flight: Arc::new(AtomicU32::new(0)),
				})
				.clone()
		};

		if entry.in_flight.fetch_add(1, Ordering::SeqCst) >= self.queue_depth {
			entry.in_flight.fetch_sub(1, Ordering::SeqCst);

			return Err(ServiceError::SessionBusy { session_id });
		}

		let guard = entry.state.clone().lock_owned().await;

		Ok(SessionGuard { guard, in_flight: entry.in_flight })
	}

	/// Drops a session outright. The next turn for the same id starts fresh.
	pub fn evict(&self, session_id: Uuid) {
		if let Ok(mut entries) = self.entries.lock() {
			entries.remove(&session_id);
		}
	}

	pub fn len(&self) -> usize {
		self.entries.lock().map(|entries| entries.len()).unwrap_or(0)
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

pub struct SessionGuard {
	guard: OwnedMutexGuard<ConversationState>,
	in_flight: Arc<AtomicU32>,
}

impl SessionGuard {
	/// Replaces corrupted state with a fresh one for the same session.
	pub fn restore(&mut self) {
		let session_id = self.guard.session_id;

		*self.guard = ConversationState::new(session_id);
	}
}

impl Deref for SessionGuard {
	type Target = ConversationState;

	fn deref(&self) -> &Self::Target {
		&self.guard
	}
}

impl DerefMut for SessionGuard {
	fn deref_mut(&mut self) -> &mut Self::Target {
		&mut self.guard
	}
}

impl Drop for SessionGuard {
	fn drop(&mut self) {
		self.in_flight.fetch_sub(1, Ordering::SeqCst);
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn sessions_are_created_on_first_checkout() {
		let store = SessionStore::new(1);
		let session_id = Uuid::new_v4();

		assert!(store.is_empty());

		let guard = store.checkout(session_id).await.expect("checkout failed");

		assert_eq!(guard.session_id, session_id);
		assert_eq!(store.len(), 1);
	}

	#[tokio::test]
	async fn second_checkout_beyond_queue_depth_is_rejected() {
		let store = SessionStore::new(1);
		let session_id = Uuid::new_v4();
		let _held = store.checkout(session_id).await.expect("checkout failed");

		match store.checkout(session_id).await {
			Err(ServiceError::SessionBusy { session_id: busy }) => assert_eq!(busy, session_id),
			Err(err) => panic!("expected SessionBusy, got {err:?}"),
			Ok(_) => panic!("expected SessionBusy, got a guard"),
		}
	}

	#[tokio::test]
	async fn checkout_is_available_again_after_release() {
		let store = SessionStore::new(1);
		let session_id = Uuid::new_v4();

		{
			let mut guard = store.checkout(session_id).await.expect("checkout failed");
			guard.turn = 3;
		}

		let guard = store.checkout(session_id).await.expect("checkout failed");

		assert_eq!(guard.turn, 3);
	}

	#[tokio::test]
	async fn restore_resets_state_but_keeps_the_session_id() {
		let store = SessionStore::new(1);
		let session_id = Uuid::new_v4();
		let mut guard = store.checkout(session_id).await.expect("checkout failed");

		guard.turn = 7;
		guard.restore();

		assert_eq!(guard.session_id, session_id);
		assert_eq!(guard.turn, 0);
	}

	#[tokio::test]
	async fn distinct_sessions_do_not_block_each_other() {
		let store = SessionStore::new(1);
		let _a = store.checkout(Uuid::new_v4()).await.expect("checkout failed");
		let _b = store.checkout(Uuid::new_v4()).await.expect("checkout failed");

		assert_eq!(store.len(), 2);
	}
}
